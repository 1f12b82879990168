//! The poll cycle: refetch the whole log, reconcile roster and deliveries.
//!
//! ```text
//!   ┌────────────── PollLoop task ──────────────┐
//!   │                                           │
//!   │  read_all(agent) ──► Reconciler::process_batch()
//!   │        │                 │  every record: roster beacon (online)
//!   │        │ Err → skip      │  every record: route vs. baseline watermark
//!   │        ▼                 ▼  after batch: watermark = max(ts)
//!   │   sleep(interval) ◄── events ──► mpsc
//!   │        │
//!   └────────┘  (stop signal ends the sleep, never an in-flight fetch)
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::channel::LogChannel;
use crate::error::ChannelError;
use crate::event::SocialEvent;
use crate::protocol::{now_millis, Identity, LogRecord, Timestamp};
use crate::roster::RosterStore;
use crate::router::{MessageRouter, Watermark};

/// Roster plus watermark for one local identity.
///
/// Each session gets a new generation number so a poll that completes after
/// logout cannot write into the roster again.
#[derive(Debug)]
pub struct Reconciler {
    local: Identity,
    roster: RosterStore,
    watermark: Watermark,
    generation: u64,
}

impl Reconciler {
    pub fn new(local: Identity) -> Self {
        Self {
            local,
            roster: RosterStore::new(),
            watermark: Watermark::default(),
            generation: 0,
        }
    }

    /// Reconcile one full fetch of the log.
    pub fn process_batch(&mut self, records: &[LogRecord], now: Timestamp) -> Vec<SocialEvent> {
        let baseline = self.watermark;
        let mut events = Vec::new();

        for record in records {
            // Any record is a liveness beacon from its sender.
            let outcome = self.roster.apply_presence(&record.sender, true, now);
            events.extend(outcome.events);

            if let Some(message) = MessageRouter::route(record, &self.local, baseline) {
                events.push(SocialEvent::Message(message));
            }
            self.watermark.advance(record.timestamp);
        }

        events
    }

    pub fn local(&self) -> &Identity {
        &self.local
    }

    pub fn roster(&self) -> &RosterStore {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut RosterStore {
        &mut self.roster
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new session generation and return it.
    pub fn begin_session(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Invalidate the current generation.
    pub fn end_session(&mut self) {
        self.generation += 1;
    }
}

/// One session's polling of one agent log.
#[derive(Clone)]
pub struct PollLoop {
    channel: Arc<dyn LogChannel>,
    agent: String,
    reconciler: Arc<Mutex<Reconciler>>,
    events: mpsc::UnboundedSender<SocialEvent>,
    interval: Duration,
    generation: u64,
}

impl PollLoop {
    pub fn new(
        channel: Arc<dyn LogChannel>,
        agent: impl Into<String>,
        reconciler: Arc<Mutex<Reconciler>>,
        events: mpsc::UnboundedSender<SocialEvent>,
        interval: Duration,
        generation: u64,
    ) -> Self {
        Self {
            channel,
            agent: agent.into(),
            reconciler,
            events,
            interval,
            generation,
        }
    }

    /// Run a single cycle. Returns the number of records reconciled.
    ///
    /// A failed fetch leaves roster and watermark untouched.
    pub async fn tick(&self) -> Result<usize, ChannelError> {
        let records = self.channel.read_all(&self.agent).await?;

        let mut reconciler = self.reconciler.lock().await;
        if reconciler.generation() != self.generation {
            log::debug!("Dropping poll result for ended session on {}", self.agent);
            return Ok(0);
        }
        let events = reconciler.process_batch(&records, now_millis());

        log::debug!(
            "Polled {} records from {} ({} events)",
            records.len(),
            self.agent,
            events.len()
        );
        // Sent while the reconciler is held so concurrent ticks cannot interleave.
        for event in events {
            // Receiver gone means nobody is listening; keep polling anyway.
            let _ = self.events.send(event);
        }
        Ok(records.len())
    }

    /// Spawn the repeating task: tick now, then tick again `interval` after
    /// each completed cycle until stopped.
    pub fn spawn(self) -> PollHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                if let Err(e) = self.tick().await {
                    log::warn!("Poll of {} skipped: {e}", self.agent);
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = stop_rx.changed() => break,
                }
            }
            log::debug!("Poll loop for {} stopped", self.agent);
        });
        PollHandle {
            stop: stop_tx,
            task,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Owner handle for a spawned [`PollLoop`].
pub struct PollHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Prevent any further cycle from being scheduled.
    ///
    /// A fetch already in flight is allowed to finish; the returned handle
    /// resolves once the task has exited.
    pub fn stop(self) -> JoinHandle<()> {
        let _ = self.stop.send(true);
        self.task
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
