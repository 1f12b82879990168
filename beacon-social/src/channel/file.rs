//! Log stored in a local journal file, shared by any process that opens it.
//!
//! Every `read_all` rereads the whole file, which matches the no-cursor
//! contract of the log exactly. Appends compute sequence and timestamp from
//! a scan taken under the journal's exclusive file lock, so concurrent
//! writers never stamp two records alike.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::LogChannel;
use crate::error::ChannelError;
use crate::protocol::{now_millis, AppendAck, Identity, LogRecord};
use crate::storage::{Journal, JournalEntry};

#[derive(Debug)]
pub struct FileLog {
    journal: Journal,
}

impl FileLog {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ChannelError> {
        let journal = Journal::open(path).await?;
        log::debug!("Opened file log {}", journal.path().display());
        Ok(Self { journal })
    }

    pub fn path(&self) -> &Path {
        self.journal.path()
    }
}

#[async_trait]
impl LogChannel for FileLog {
    async fn append(
        &self,
        agent: &str,
        sender: &Identity,
        payload: &str,
    ) -> Result<AppendAck, ChannelError> {
        let agent = agent.to_string();
        let sender = sender.clone();
        let payload = payload.to_string();
        let entry = self
            .journal
            .append_with(move |scan| {
                let timestamp = now_millis().max(scan.last_timestamp() + 1);
                JournalEntry::new(scan.next_sequence(), agent, sender, payload, timestamp)
            })
            .await?;

        Ok(AppendAck {
            sequence: entry.sequence,
            timestamp: entry.timestamp,
        })
    }

    async fn read_all(&self, agent: &str) -> Result<Vec<LogRecord>, ChannelError> {
        let scan = self.journal.read_all().await?;
        Ok(scan
            .entries
            .iter()
            .filter(|e| e.agent == agent)
            .map(JournalEntry::to_record)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_two_handles_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.journal");
        let first = FileLog::open(&path).await.unwrap();
        let second = FileLog::open(&path).await.unwrap();

        let a = Identity::from("U.a");
        let b = Identity::from("U.b");
        let ack1 = first.append("lobby", &a, "ONLINE").await.unwrap();
        let ack2 = second.append("lobby", &b, "ONLINE").await.unwrap();
        second.append("elsewhere", &b, "ONLINE").await.unwrap();

        assert_eq!(ack1.sequence, 0);
        assert_eq!(ack2.sequence, 1);
        assert!(ack2.timestamp > ack1.timestamp);

        let records = first.read_all("lobby").await.unwrap();
        let senders: Vec<_> = records.iter().map(|r| r.sender.as_str()).collect();
        assert_eq!(senders, ["U.a", "U.b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_never_share_stamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.journal");
        let first = Arc::new(FileLog::open(&path).await.unwrap());
        let second = Arc::new(FileLog::open(&path).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..40 {
            let log = if i % 2 == 0 { first.clone() } else { second.clone() };
            tasks.push(tokio::spawn(async move {
                let sender = Identity::from(format!("U.w{i}"));
                log.append("lobby", &sender, "ONLINE").await.unwrap()
            }));
        }
        let mut acks = Vec::new();
        for task in tasks {
            acks.push(task.await.unwrap());
        }

        let sequences: HashSet<_> = acks.iter().map(|a| a.sequence).collect();
        let timestamps: HashSet<_> = acks.iter().map(|a| a.timestamp).collect();
        assert_eq!(sequences.len(), 40);
        assert_eq!(timestamps.len(), 40);

        let records = first.read_all("lobby").await.unwrap();
        assert_eq!(records.len(), 40);
        assert!(records.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_empty_file_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileLog::open(dir.path().join("empty.journal")).await.unwrap();
        assert!(log.read_all("lobby").await.unwrap().is_empty());
        assert!(log.path().exists());
    }
}
