//! Storage for the shared log itself (used by the log server and by the
//! in-memory test log).
//!
//! ```text
//! append(agent, sender, payload)
//!       │
//!       ▼
//! ┌──────────────┐   optional   ┌───────────────────┐
//! │ LogStore     │ ───────────► │ Journal (file)    │
//! │ agent → [..] │              │ length-prefixed   │
//! └──────────────┘ ◄─────────── │ bincode frames    │
//!                    recovery   └───────────────────┘
//! ```
//!
//! Timestamps are assigned by the store and are strictly increasing, so two
//! appends in the same millisecond still order correctly against a reader's
//! watermark.

pub mod journal;

pub use journal::{scan as scan_journal, Journal, JournalEntry, JournalScan};

use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::error::JournalError;
use crate::protocol::{now_millis, AppendAck, Identity, LogRecord, Timestamp};

#[derive(Debug, Default)]
struct StoreState {
    logs: HashMap<String, Vec<LogRecord>>,
    next_sequence: u64,
    last_timestamp: Timestamp,
}

impl StoreState {
    fn next_timestamp(&self) -> Timestamp {
        now_millis().max(self.last_timestamp + 1)
    }
}

/// Per-agent append-only record lists.
#[derive(Debug)]
pub struct LogStore {
    state: RwLock<StoreState>,
    journal: Option<Journal>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LogStore {
    /// Volatile store.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            journal: None,
        }
    }

    /// Persistent store, replaying whatever the journal at `path` holds.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let journal = Journal::open(path).await?;
        let scan = journal.read_all().await?;

        let mut state = StoreState {
            next_sequence: scan.next_sequence(),
            last_timestamp: scan.last_timestamp(),
            ..StoreState::default()
        };
        for entry in &scan.entries {
            state
                .logs
                .entry(entry.agent.clone())
                .or_default()
                .push(entry.to_record());
        }
        log::info!(
            "Recovered {} log records across {} agents from {}",
            scan.entries.len(),
            state.logs.len(),
            journal.path().display()
        );

        Ok(Self {
            state: RwLock::new(state),
            journal: Some(journal),
        })
    }

    /// Append with a store-assigned timestamp.
    pub async fn append(
        &self,
        agent: &str,
        sender: &Identity,
        payload: &str,
    ) -> Result<AppendAck, JournalError> {
        self.append_inner(agent, sender, payload, None).await
    }

    /// Append with an explicit timestamp (imports, tests).
    ///
    /// The store clock is raised to `timestamp` if it is newer, so later
    /// store-stamped appends still sort after it.
    pub async fn append_at(
        &self,
        agent: &str,
        sender: &Identity,
        payload: &str,
        timestamp: Timestamp,
    ) -> Result<AppendAck, JournalError> {
        self.append_inner(agent, sender, payload, Some(timestamp)).await
    }

    async fn append_inner(
        &self,
        agent: &str,
        sender: &Identity,
        payload: &str,
        timestamp: Option<Timestamp>,
    ) -> Result<AppendAck, JournalError> {
        let mut state = self.state.write().await;
        let timestamp = timestamp.unwrap_or_else(|| state.next_timestamp());
        let sequence = state.next_sequence;

        if let Some(journal) = &self.journal {
            let entry = JournalEntry::new(sequence, agent, sender.clone(), payload, timestamp);
            journal.append(&entry).await?;
        }

        state.next_sequence += 1;
        state.last_timestamp = state.last_timestamp.max(timestamp);
        state
            .logs
            .entry(agent.to_string())
            .or_default()
            .push(LogRecord::new(sender.clone(), payload, timestamp));

        Ok(AppendAck {
            sequence,
            timestamp,
        })
    }

    /// Every record appended under `agent`, in append order.
    pub async fn read_all(&self, agent: &str) -> Vec<LogRecord> {
        self.state
            .read()
            .await
            .logs
            .get(agent)
            .cloned()
            .unwrap_or_default()
    }

    /// Total records across all agents.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.logs.values().map(Vec::len).sum()
    }

    /// Agents with at least one record.
    pub async fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.state.read().await.logs.keys().cloned().collect();
        agents.sort();
        agents
    }

    pub fn is_persistent(&self) -> bool {
        self.journal.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_agents_are_partitioned() {
        let store = LogStore::in_memory();
        let a = Identity::from("U.a");
        store.append("lobby", &a, "ONLINE").await.unwrap();
        store.append("other", &a, "ONLINE").await.unwrap();
        store.append("lobby", &a, "again").await.unwrap();

        assert_eq!(store.read_all("lobby").await.len(), 2);
        assert_eq!(store.read_all("other").await.len(), 1);
        assert!(store.read_all("missing").await.is_empty());
        assert_eq!(store.record_count().await, 3);
        assert_eq!(store.agents().await, ["lobby", "other"]);
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let store = LogStore::in_memory();
        let a = Identity::from("U.a");
        let mut last = 0;
        for _ in 0..50 {
            let ack = store.append("lobby", &a, "x").await.unwrap();
            assert!(ack.timestamp > last);
            last = ack.timestamp;
        }
    }

    #[tokio::test]
    async fn test_append_at_raises_clock() {
        let store = LogStore::in_memory();
        let a = Identity::from("U.a");
        let future = now_millis() + 60_000;
        store.append_at("lobby", &a, "x", future).await.unwrap();
        let ack = store.append("lobby", &a, "y").await.unwrap();
        assert_eq!(ack.timestamp, future + 1);
        assert_eq!(ack.sequence, 1);
    }

    #[tokio::test]
    async fn test_persistent_store_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.journal");
        let a = Identity::from("U.a");

        let last_ack = {
            let store = LogStore::open(&path).await.unwrap();
            assert!(store.is_persistent());
            store.append("lobby", &a, "ONLINE").await.unwrap();
            store.append("lobby", &a, "hello").await.unwrap()
        };

        let store = LogStore::open(&path).await.unwrap();
        let records = store.read_all("lobby").await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].payload, "hello");

        let ack = store.append("lobby", &a, "after restart").await.unwrap();
        assert_eq!(ack.sequence, 2);
        assert!(ack.timestamp > last_ack.timestamp);
    }
}
