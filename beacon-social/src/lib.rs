//! # beacon-social: Presence and messaging over a polled shared log
//!
//! Every client appends records to a shared append-only log and periodically
//! rereads all of it. Presence is inferred from who has written; direct
//! messages are records whose payload names a recipient.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐  append / read_all  ┌─────────────────┐
//! │ SessionController │ ◄─────────────────► │ LogChannel      │
//! │ (per identity)    │                     │ memory│file│ws  │
//! └────────┬──────────┘                     └────────┬────────┘
//!          │ spawns                                  │ ws://
//!          ▼                                         ▼
//! ┌───────────────────┐                     ┌─────────────────┐
//! │ PollLoop          │                     │ LogServer       │
//! │  └─ Reconciler    │                     │  └─ LogStore    │
//! │      ├─ RosterStore                     │      └─ Journal │
//! │      └─ Watermark + MessageRouter       └─────────────────┘
//! └────────┬──────────┘
//!          ▼
//!     SocialEvent (mpsc)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Identities, log records, message envelope, wire frames
//! - [`roster`]: Participant and profile maps kept in lockstep
//! - [`router`]: Watermark and message delivery filter
//! - [`poll`]: Periodic full refetch and reconciliation
//! - [`session`]: Login/logout lifecycle and public operations
//! - [`channel`]: Log transports (in-memory, file, WebSocket)
//! - [`storage`]: Append-only journal and per-agent record store
//! - [`server`]: WebSocket log server

pub mod channel;
pub mod error;
pub mod event;
pub mod poll;
pub mod protocol;
pub mod roster;
pub mod router;
pub mod server;
pub mod session;
pub mod storage;

// Re-exports for convenience
pub use channel::{FileLog, LogChannel, LogConnector, MemoryLog, RemoteLog, UrlConnector};
pub use error::{ChannelError, JournalError, ProtocolError, SocialError};
pub use event::SocialEvent;
pub use poll::{PollHandle, PollLoop, Reconciler};
pub use protocol::{AppendAck, Identity, LogRecord, LogRequest, LogResponse, MessageEnvelope, Timestamp};
pub use roster::{ParticipantRecord, PresenceStatus, RosterStore, UserProfile};
pub use router::{DeliveredMessage, MessageRouter, Watermark};
pub use server::{LogServer, LogServerConfig, ServerStats};
pub use session::{ClientConfig, LoginConfig, SessionController};
pub use storage::{Journal, JournalEntry, LogStore};
