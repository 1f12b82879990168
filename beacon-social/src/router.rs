//! Delivery of messages addressed to the local identity.
//!
//! The log has no cursor, so every poll sees every record again. A record is
//! delivered only if its timestamp is strictly newer than the watermark
//! captured at the start of the poll cycle; the watermark then moves to the
//! newest timestamp in the batch.

use serde::{Deserialize, Serialize};

use crate::protocol::{Identity, LogRecord, MessageEnvelope, Timestamp};
use crate::roster::ParticipantRecord;

/// Newest record timestamp processed so far. Never moves backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Watermark(Timestamp);

impl Watermark {
    pub fn new(ts: Timestamp) -> Self {
        Self(ts)
    }

    pub fn value(&self) -> Timestamp {
        self.0
    }

    /// Raise to `ts` if newer. Returns whether the watermark moved.
    pub fn advance(&mut self, ts: Timestamp) -> bool {
        if ts > self.0 {
            self.0 = ts;
            true
        } else {
            false
        }
    }

    /// Whether a record stamped `ts` is newer than this watermark.
    pub fn admits(&self, ts: Timestamp) -> bool {
        ts > self.0
    }
}

/// A message delivered to the local identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    /// Sender, expressed as an online presence snapshot at send time.
    pub from: ParticipantRecord,
    pub body: String,
}

/// Stateless message filter.
pub struct MessageRouter;

impl MessageRouter {
    /// Decide whether `record` is a fresh message for `local`.
    ///
    /// `watermark_before` must be the value captured before the current
    /// batch started, so all records in one batch share a baseline.
    pub fn route(
        record: &LogRecord,
        local: &Identity,
        watermark_before: Watermark,
    ) -> Option<DeliveredMessage> {
        let envelope = match MessageEnvelope::parse(&record.payload) {
            Ok(envelope) => envelope,
            Err(_) => {
                log::trace!("Beacon from {} ({} bytes)", record.sender, record.payload.len());
                return None;
            }
        };

        if envelope.to != *local || !watermark_before.admits(record.timestamp) {
            return None;
        }

        Some(DeliveredMessage {
            from: ParticipantRecord::online(
                record.sender.clone(),
                record.timestamp,
                record.timestamp,
            ),
            body: envelope.body(),
        })
    }
}
