//! Session controller: the public surface of a social client.
//!
//! Provides:
//! - Login / logout lifecycle against a log URL and agent filter
//! - Message send to a roster member
//! - Roster and profile snapshots
//! - Event stream of presence changes and delivered messages
//!
//! ```text
//!   Offline ──login ok──► Online ──logout──► Offline
//!      ▲                    │
//!      └───login failed─────┘ (poll task stopped, roster untouched)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::channel::{LogChannel, LogConnector};
use crate::error::{ChannelError, SocialError};
use crate::event::SocialEvent;
use crate::poll::{PollHandle, PollLoop, Reconciler};
use crate::protocol::{now_millis, AppendAck, Identity, MessageEnvelope};
use crate::roster::{ParticipantRecord, UserProfile};
use crate::router::Watermark;

/// Client-side tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Delay between the end of one poll cycle and the start of the next.
    pub poll_interval: Duration,
    /// Payload appended at login so other clients notice us.
    pub announce_payload: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            announce_payload: "ONLINE".to_string(),
        }
    }
}

impl ClientConfig {
    /// Short interval for tests.
    pub fn for_testing() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            ..Self::default()
        }
    }
}

/// Where to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginConfig {
    pub log_url: String,
    /// Partition of the log this session reads and writes.
    pub agent: String,
}

impl LoginConfig {
    pub fn new(log_url: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            log_url: log_url.into(),
            agent: agent.into(),
        }
    }
}

struct ActiveSession {
    login: LoginConfig,
    channel: Arc<dyn LogChannel>,
    poll: PollLoop,
    handle: PollHandle,
}

/// Drives one local identity through login, polling, messaging and logout.
pub struct SessionController {
    identity: Identity,
    config: ClientConfig,
    connector: Arc<dyn LogConnector>,
    reconciler: Arc<Mutex<Reconciler>>,
    session: Option<ActiveSession>,
    event_tx: mpsc::UnboundedSender<SocialEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SocialEvent>>,
}

impl SessionController {
    pub fn new(identity: Identity, connector: Arc<dyn LogConnector>, config: ClientConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            reconciler: Arc::new(Mutex::new(Reconciler::new(identity.clone()))),
            identity,
            config,
            connector,
            session: None,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Controller with a freshly generated `U.<uuid>` identity.
    pub fn with_generated_identity(connector: Arc<dyn LogConnector>, config: ClientConfig) -> Self {
        Self::new(Identity::generate(), connector, config)
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<SocialEvent>> {
        self.event_rx.take()
    }

    /// Connect, start polling, then announce presence.
    ///
    /// The returned record describes the local participant; it is not added
    /// to the roster, which learns about us from our own announce record.
    pub async fn login(&mut self, login: LoginConfig) -> Result<ParticipantRecord, SocialError> {
        if self.session.is_some() {
            return Err(SocialError::AlreadyOnline);
        }

        let channel = self
            .connector
            .connect(&login.log_url)
            .await
            .map_err(|e| SocialError::FailedConnection(e.to_string()))?;

        let generation = self.reconciler.lock().await.begin_session();
        let poll = PollLoop::new(
            channel.clone(),
            login.agent.clone(),
            self.reconciler.clone(),
            self.event_tx.clone(),
            self.config.poll_interval,
            generation,
        );
        let handle = poll.clone().spawn();

        if let Err(e) = channel
            .append(&login.agent, &self.identity, &self.config.announce_payload)
            .await
        {
            log::warn!("Announce to {} failed: {e}", login.log_url);
            drop(handle.stop());
            self.reconciler.lock().await.end_session();
            return Err(SocialError::FailedConnection(e.to_string()));
        }

        log::info!(
            "{} online at {} (agent {})",
            self.identity,
            login.log_url,
            login.agent
        );
        let now = now_millis();
        self.session = Some(ActiveSession {
            login,
            channel,
            poll,
            handle,
        });
        Ok(ParticipantRecord::online(self.identity.clone(), now, now))
    }

    /// Stop polling and mark the local participant offline.
    ///
    /// When no session is active the local entry is still updated (and
    /// announced) before `Offline` is returned.
    pub async fn logout(&mut self) -> Result<ParticipantRecord, SocialError> {
        let Some(active) = self.session.take() else {
            self.mark_local_offline().await;
            return Err(SocialError::Offline);
        };

        // An in-flight fetch finishes on its own; its result is discarded.
        drop(active.handle.stop());
        let record = self.mark_local_offline().await;
        log::info!("{} logged out of {}", self.identity, active.login.log_url);
        Ok(record)
    }

    /// Append a message addressed to `destination`.
    pub async fn send_message(&self, destination: &str, body: &str) -> Result<AppendAck, SocialError> {
        let active = self.session.as_ref().ok_or(SocialError::Offline)?;

        if !self.reconciler.lock().await.roster().contains(destination) {
            return Err(SocialError::InvalidDestination(destination.to_string()));
        }

        let payload = MessageEnvelope::new(destination, body)
            .encode()
            .map_err(ChannelError::from)?;
        let ack = active
            .channel
            .append(&active.login.agent, &self.identity, &payload)
            .await?;
        log::debug!("Sent message to {destination} (seq {})", ack.sequence);
        Ok(ack)
    }

    /// Snapshot of every known profile.
    pub async fn get_users(&self) -> Result<HashMap<Identity, UserProfile>, SocialError> {
        self.require_online()?;
        Ok(self.reconciler.lock().await.roster().users())
    }

    /// Snapshot of every roster entry.
    pub async fn get_clients(&self) -> Result<HashMap<Identity, ParticipantRecord>, SocialError> {
        self.require_online()?;
        Ok(self.reconciler.lock().await.roster().clients())
    }

    /// Run one poll cycle immediately, outside the regular schedule.
    pub async fn poll_now(&self) -> Result<usize, SocialError> {
        let active = self.session.as_ref().ok_or(SocialError::Offline)?;
        Ok(active.poll.tick().await?)
    }

    pub fn is_online(&self) -> bool {
        self.session.is_some()
    }

    pub fn local_identity(&self) -> &Identity {
        &self.identity
    }

    pub fn login_config(&self) -> Option<&LoginConfig> {
        self.session.as_ref().map(|s| &s.login)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Highest log timestamp processed so far.
    pub async fn watermark(&self) -> Watermark {
        self.reconciler.lock().await.watermark()
    }

    fn require_online(&self) -> Result<(), SocialError> {
        if self.session.is_some() {
            Ok(())
        } else {
            Err(SocialError::Offline)
        }
    }

    async fn mark_local_offline(&self) -> ParticipantRecord {
        let mut reconciler = self.reconciler.lock().await;
        reconciler.end_session();
        let outcome = reconciler
            .roster_mut()
            .apply_presence(&self.identity, false, now_millis());
        for event in outcome.events {
            let _ = self.event_tx.send(event);
        }
        outcome.record
    }
}
