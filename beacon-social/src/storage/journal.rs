//! Append-only journal file backing persistent logs.
//!
//! File layout:
//! ```text
//! ┌────────────┬──────────────────────────┬────────────┬──────────────────────────┬──
//! │ len: u32le │ JournalEntry (bincode)   │ len: u32le │ JournalEntry (bincode)   │ …
//! └────────────┴──────────────────────────┴────────────┴──────────────────────────┴──
//! ```
//!
//! Each entry carries a checksum over its fields. Scanning skips entries that
//! fail to decode or verify, and stops at a truncated tail.

use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::JournalError;
use crate::protocol::{Identity, LogRecord, Timestamp};

/// Upper bound on a single frame. Larger length prefixes mean corruption.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// A single journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Store-wide, monotonically increasing.
    pub sequence: u64,
    /// Log partition (agent filter).
    pub agent: String,
    pub sender: Identity,
    pub payload: String,
    pub timestamp: Timestamp,
    pub checksum: u32,
}

impl JournalEntry {
    pub fn new(
        sequence: u64,
        agent: impl Into<String>,
        sender: Identity,
        payload: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        let agent = agent.into();
        let payload = payload.into();
        let checksum = Self::compute_checksum(sequence, &agent, &sender, &payload, timestamp);
        Self {
            sequence,
            agent,
            sender,
            payload,
            timestamp,
            checksum,
        }
    }

    pub fn verify(&self) -> bool {
        self.checksum
            == Self::compute_checksum(
                self.sequence,
                &self.agent,
                &self.sender,
                &self.payload,
                self.timestamp,
            )
    }

    /// FNV-1a over all fields.
    fn compute_checksum(
        sequence: u64,
        agent: &str,
        sender: &Identity,
        payload: &str,
        timestamp: Timestamp,
    ) -> u32 {
        let mut hash: u32 = 0x811c_9dc5;
        let mut mix = |bytes: &[u8]| {
            for byte in bytes {
                hash ^= *byte as u32;
                hash = hash.wrapping_mul(0x0100_0193);
            }
        };
        mix(&sequence.to_le_bytes());
        mix(agent.as_bytes());
        mix(&[0]);
        mix(sender.as_str().as_bytes());
        mix(&[0]);
        mix(payload.as_bytes());
        mix(&timestamp.to_le_bytes());
        hash
    }

    pub fn encode(&self) -> Result<Vec<u8>, JournalError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| JournalError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, JournalError> {
        let (entry, _): (Self, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| JournalError::Serialization(e.to_string()))?;
        Ok(entry)
    }

    /// Length-prefixed frame, ready to append.
    pub fn to_frame(&self) -> Result<Vec<u8>, JournalError> {
        let body = self.encode()?;
        if body.len() > MAX_FRAME_BYTES {
            return Err(JournalError::FrameTooLarge(body.len()));
        }
        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    pub fn to_record(&self) -> LogRecord {
        LogRecord {
            sender: self.sender.clone(),
            payload: self.payload.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Result of scanning journal bytes.
#[derive(Debug, Clone, Default)]
pub struct JournalScan {
    /// Valid entries, sorted by sequence.
    pub entries: Vec<JournalEntry>,
    /// Frames skipped as undecodable, failing checksum, or truncated.
    pub corrupted: usize,
}

impl JournalScan {
    /// Next unused sequence number.
    pub fn next_sequence(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.sequence + 1)
    }

    /// Newest timestamp in the journal.
    pub fn last_timestamp(&self) -> Timestamp {
        self.entries.iter().map(|e| e.timestamp).max().unwrap_or(0)
    }
}

/// Parse a whole journal image.
pub fn scan(bytes: &[u8]) -> JournalScan {
    let mut result = JournalScan::default();
    let mut offset = 0;

    while offset < bytes.len() {
        if bytes.len() - offset < 4 {
            result.corrupted += 1;
            break;
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[offset..offset + 4]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        offset += 4;

        if len > MAX_FRAME_BYTES || bytes.len() - offset < len {
            // Cannot resynchronize past a bad length prefix.
            result.corrupted += 1;
            break;
        }

        match JournalEntry::decode(&bytes[offset..offset + len]) {
            Ok(entry) if entry.verify() => result.entries.push(entry),
            _ => result.corrupted += 1,
        }
        offset += len;
    }

    result.entries.sort_by_key(|e| e.sequence);
    result
}

/// Handle to a journal file on disk.
///
/// Every read and write holds an advisory lock on the file (shared for
/// reads, exclusive for writes), so handles in different processes never
/// interleave a scan with another writer's append.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Open (creating if needed) the journal at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and sync it to disk.
    pub async fn append(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        let entry = entry.clone();
        self.append_with(move |_| entry).await.map(|_| ())
    }

    /// Scan the file and append the entry built from that scan, both under
    /// one exclusive lock. Returns the entry written.
    pub async fn append_with<F>(&self, build: F) -> Result<JournalEntry, JournalError>
    where
        F: FnOnce(&JournalScan) -> JournalEntry + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<JournalEntry, JournalError> {
            let file = OpenOptions::new().read(true).append(true).open(&path)?;
            let mut lock = RwLock::new(file);
            let mut guard = lock.write()?;

            let mut bytes = Vec::new();
            guard.read_to_end(&mut bytes)?;
            let entry = build(&scan(&bytes));

            guard.write_all(&entry.to_frame()?)?;
            guard.sync_data()?;
            Ok(entry)
        })
        .await
        .map_err(|e| JournalError::Io(e.to_string()))?
    }

    /// Read and scan the whole file.
    pub async fn read_all(&self) -> Result<JournalScan, JournalError> {
        let path = self.path.clone();
        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, JournalError> {
            let file = OpenOptions::new().read(true).open(&path)?;
            let lock = RwLock::new(file);
            let guard = lock.read()?;
            let mut bytes = Vec::new();
            (&*guard).read_to_end(&mut bytes)?;
            Ok(bytes)
        })
        .await
        .map_err(|e| JournalError::Io(e.to_string()))??;

        let scan = scan(&bytes);
        if scan.corrupted > 0 {
            log::warn!(
                "Journal {}: skipped {} corrupted frames",
                self.path.display(),
                scan.corrupted
            );
        }
        Ok(scan)
    }
}
