//! Error types for the social surface and the log transports.

use thiserror::Error;

/// Errors raised by a [`LogChannel`](crate::channel::LogChannel) or a
/// [`LogConnector`](crate::channel::LogConnector).
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The log could not be reached.
    #[error("Log unreachable: {0}")]
    Unreachable(String),

    /// The connection to the log was lost mid-request.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The log answered but refused the request.
    #[error("Log rejected request: {0}")]
    Rejected(String),

    /// The log answered with something we did not ask for.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// No transport registered for this URL.
    #[error("Unsupported log URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Frame encoding or decoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Journal I/O failed.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Wire codec errors.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Append-only journal errors.
#[derive(Debug, Clone, Error)]
pub enum JournalError {
    #[error("Journal I/O error: {0}")]
    Io(String),

    #[error("Journal serialization error: {0}")]
    Serialization(String),

    #[error("Journal frame too large: {0} bytes")]
    FrameTooLarge(usize),
}

impl From<std::io::Error> for JournalError {
    fn from(e: std::io::Error) -> Self {
        JournalError::Io(e.to_string())
    }
}

/// Errors surfaced by [`SessionController`](crate::session::SessionController).
#[derive(Debug, Clone, Error)]
pub enum SocialError {
    /// `login` called while a session is active.
    #[error("Already online")]
    AlreadyOnline,

    /// `login` could not reach the log or announce itself.
    #[error("Failed to connect to log: {0}")]
    FailedConnection(String),

    /// Operation requires an active session.
    #[error("Offline")]
    Offline,

    /// `send_message` target is not in the roster.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Append failed while online.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl SocialError {
    /// Boundary error code, as reported to the event-dispatch layer.
    pub fn code(&self) -> &'static str {
        match self {
            SocialError::AlreadyOnline => "LOGIN_ALREADYONLINE",
            SocialError::FailedConnection(_) => "LOGIN_FAILEDCONNECTION",
            SocialError::Offline => "OFFLINE",
            SocialError::InvalidDestination(_) => "SEND_INVALIDDESTINATION",
            SocialError::Channel(_) => "CHANNEL_ERROR",
        }
    }
}
