//! Access to the shared log.
//!
//! The log offers exactly two operations: append a record, and read every
//! record visible so far. There is no cursor and no push; callers refetch
//! the whole set on every poll.
//!
//! | URL                 | Channel       |
//! |---------------------|---------------|
//! | `ws://host:port`    | [`RemoteLog`] |
//! | `file:///some/path` | [`FileLog`]   |
//! | (in-process)        | [`MemoryLog`] |

pub mod file;
pub mod memory;
pub mod remote;

pub use file::FileLog;
pub use memory::MemoryLog;
pub use remote::RemoteLog;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ChannelError;
use crate::protocol::{AppendAck, Identity, LogRecord};

/// A shared append-only log, partitioned by agent filter.
#[async_trait]
pub trait LogChannel: Send + Sync {
    /// Append an opaque payload on behalf of `sender`.
    async fn append(
        &self,
        agent: &str,
        sender: &Identity,
        payload: &str,
    ) -> Result<AppendAck, ChannelError>;

    /// Fetch every record under `agent`, oldest first.
    async fn read_all(&self, agent: &str) -> Result<Vec<LogRecord>, ChannelError>;
}

/// Opens a [`LogChannel`] for a login URL.
#[async_trait]
pub trait LogConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn LogChannel>, ChannelError>;
}

/// Picks a transport from the URL scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlConnector;

#[async_trait]
impl LogConnector for UrlConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn LogChannel>, ChannelError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(Arc::new(FileLog::open(path).await?));
        }
        if url.starts_with("ws://") {
            return Ok(Arc::new(RemoteLog::connect(url).await?));
        }
        let scheme = url.split("://").next().unwrap_or(url);
        Err(ChannelError::UnsupportedScheme(scheme.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_scheme_rejected() {
        let err = UrlConnector.connect("gopher://example").await.err().unwrap();
        assert!(matches!(err, ChannelError::UnsupportedScheme(s) if s == "gopher"));
    }

    #[tokio::test]
    async fn test_file_scheme_opens_file_log() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", dir.path().join("shared.journal").display());
        let channel = UrlConnector.connect(&url).await.unwrap();

        let me = Identity::from("U.a");
        channel.append("lobby", &me, "ONLINE").await.unwrap();
        let records = channel.read_all("lobby").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sender, me);
    }

    #[tokio::test]
    async fn test_unreachable_ws_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = UrlConnector.connect(&format!("ws://127.0.0.1:{port}")).await;
        assert!(result.is_err());
    }
}
