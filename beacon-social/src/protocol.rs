//! Data carried by the shared log, and the binary frames spoken to a log server.
//!
//! Log records are opaque to the log itself. A record whose payload parses
//! as a JSON [`MessageEnvelope`] is a user message; any other payload is a
//! presence beacon:
//!
//! ```text
//! LogRecord { from: "U.1f3c…", msg: "ONLINE", time: 1718000000000 }             beacon
//! LogRecord { from: "U.1f3c…", msg: "{\"to\":\"U.9a0e…\",\"msg\":\"hi\"}", … }  message
//! ```
//!
//! Server frames (bincode-encoded, one per WebSocket binary message):
//! ```text
//! client ── LogRequest::Append  { request_id, agent, sender, payload } ──► server
//!        ◄─ LogResponse::Appended { request_id, ack } ───────────────────
//! client ── LogRequest::ReadAll { request_id, agent } ──────────────────► server
//!        ◄─ LogResponse::Records  { request_id, records } ───────────────
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::ProtocolError;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// Participant identity. User id and client id are the same thing here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identity (`U.<uuid>`).
    pub fn generate() -> Self {
        Self(format!("U.{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One entry as read back from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "from")]
    pub sender: Identity,
    #[serde(rename = "msg")]
    pub payload: String,
    #[serde(rename = "time")]
    pub timestamp: Timestamp,
}

impl LogRecord {
    pub fn new(sender: impl Into<Identity>, payload: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            sender: sender.into(),
            payload: payload.into(),
            timestamp,
        }
    }
}

/// Point-to-point message, serialized as JSON into a record payload.
///
/// Other writers may put any JSON value in `msg`; only a missing `msg` makes
/// the payload a beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub to: Identity,
    pub msg: serde_json::Value,
}

impl MessageEnvelope {
    pub fn new(to: impl Into<Identity>, msg: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            msg: serde_json::Value::String(msg.into()),
        }
    }

    /// Message text. Non-string values are rendered as compact JSON.
    pub fn body(&self) -> String {
        match &self.msg {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// Serialize to the JSON payload stored in the log.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Parse a record payload. Beacons and garbage fail here.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(payload).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Acknowledgement returned by a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendAck {
    /// Store-wide sequence number of the record.
    pub sequence: u64,
    /// Timestamp the log stamped on the record.
    pub timestamp: Timestamp,
}

/// Request frame sent to a log server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogRequest {
    Append {
        request_id: u64,
        agent: String,
        sender: Identity,
        payload: String,
    },
    ReadAll {
        request_id: u64,
        agent: String,
    },
}

impl LogRequest {
    pub fn request_id(&self) -> u64 {
        match self {
            LogRequest::Append { request_id, .. } | LogRequest::ReadAll { request_id, .. } => {
                *request_id
            }
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_frame(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode_frame(bytes)
    }
}

/// Response frame sent back by a log server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogResponse {
    Appended { request_id: u64, ack: AppendAck },
    Records { request_id: u64, records: Vec<LogRecord> },
    Failed { request_id: u64, reason: String },
}

impl LogResponse {
    pub fn request_id(&self) -> u64 {
        match self {
            LogResponse::Appended { request_id, .. }
            | LogResponse::Records { request_id, .. }
            | LogResponse::Failed { request_id, .. } => *request_id,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_frame(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode_frame(bytes)
    }
}

fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
}

fn decode_frame<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    Ok(value)
}
