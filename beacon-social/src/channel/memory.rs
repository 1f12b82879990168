//! In-process log shared by every handle cloned from it.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::{LogChannel, LogConnector};
use crate::error::ChannelError;
use crate::protocol::{AppendAck, Identity, LogRecord, Timestamp};
use crate::storage::LogStore;

/// Shared in-memory log.
///
/// Clones share the same records. Availability can be toggled to simulate
/// an unreachable log.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    store: Arc<LogStore>,
    available: Arc<AtomicBool>,
    reads: Arc<AtomicU64>,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    pub fn new() -> Self {
        Self {
            store: Arc::new(LogStore::in_memory()),
            available: Arc::new(AtomicBool::new(true)),
            reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Make every subsequent request fail (`false`) or succeed (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Inject a record with an explicit timestamp.
    pub async fn push(
        &self,
        agent: &str,
        sender: impl Into<Identity>,
        payload: &str,
        timestamp: Timestamp,
    ) -> Result<AppendAck, ChannelError> {
        let sender = sender.into();
        Ok(self.store.append_at(agent, &sender, payload, timestamp).await?)
    }

    /// Successful `read_all` calls served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    fn check_available(&self) -> Result<(), ChannelError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChannelError::Unreachable("memory log offline".into()))
        }
    }
}

#[async_trait]
impl LogChannel for MemoryLog {
    async fn append(
        &self,
        agent: &str,
        sender: &Identity,
        payload: &str,
    ) -> Result<AppendAck, ChannelError> {
        self.check_available()?;
        Ok(self.store.append(agent, sender, payload).await?)
    }

    async fn read_all(&self, agent: &str) -> Result<Vec<LogRecord>, ChannelError> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.read_all(agent).await)
    }
}

/// Any URL resolves to this same log.
#[async_trait]
impl LogConnector for MemoryLog {
    async fn connect(&self, _url: &str) -> Result<Arc<dyn LogChannel>, ChannelError> {
        self.check_available()?;
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_records() {
        let log = MemoryLog::new();
        let other = log.clone();
        log.append("lobby", &Identity::from("U.a"), "ONLINE").await.unwrap();

        let records = other.read_all("lobby").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(other.read_count(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_log_fails_requests() {
        let log = MemoryLog::new();
        log.set_available(false);
        assert!(log.append("lobby", &Identity::from("U.a"), "x").await.is_err());
        assert!(log.read_all("lobby").await.is_err());
        assert!(log.connect("mem://").await.is_err());
        assert_eq!(log.read_count(), 0);

        log.set_available(true);
        assert!(log.read_all("lobby").await.is_ok());
    }

    #[tokio::test]
    async fn test_push_uses_given_timestamp() {
        let log = MemoryLog::new();
        log.push("lobby", "U.a", "ONLINE", 42).await.unwrap();
        let records = log.read_all("lobby").await.unwrap();
        assert_eq!(records[0].timestamp, 42);
    }
}
