//! WebSocket log server.
//!
//! ```text
//! RemoteLog A ──┐
//!               ├── LogServer ── LogStore ── agent → [records]
//! RemoteLog B ──┘                   │
//!                                   └── Journal (optional, append-only file)
//! ```
//!
//! Each connection carries bincode-encoded [`LogRequest`] frames and gets
//! exactly one [`LogResponse`] per request, tagged with the same id. A frame
//! that does not decode closes the connection. The server never pushes;
//! clients learn about new records by polling.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

use crate::error::JournalError;
use crate::protocol::{LogRequest, LogResponse};
use crate::storage::LogStore;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct LogServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Journal file (None = in-memory only)
    pub storage_path: Option<PathBuf>,
}

impl Default for LogServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9191".to_string(),
            storage_path: None,
        }
    }
}

impl LogServerConfig {
    pub fn for_testing(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            storage_path: None,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_appends: u64,
    pub total_reads: u64,
    pub total_bytes: u64,
    pub rejected_frames: u64,
}

/// The log server.
pub struct LogServer {
    config: LogServerConfig,
    store: Arc<LogStore>,
    stats: Arc<RwLock<ServerStats>>,
}

impl LogServer {
    /// Open the server's store, recovering the journal if one is configured.
    pub async fn open(config: LogServerConfig) -> Result<Self, JournalError> {
        let store = match &config.storage_path {
            Some(path) => LogStore::open(path.clone()).await?,
            None => LogStore::in_memory(),
        };
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Volatile server; `storage_path` is ignored.
    pub fn in_memory(config: LogServerConfig) -> Self {
        Self::with_store(config, Arc::new(LogStore::in_memory()))
    }

    /// Serve an existing store.
    pub fn with_store(config: LogServerConfig, store: Arc<LogStore>) -> Self {
        Self {
            config,
            store,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Start listening for WebSocket connections.
    ///
    /// This runs the accept loop until the listener fails. Call from an
    /// async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!(
            "Log server listening on {} ({})",
            self.config.bind_addr,
            if self.store.is_persistent() { "journaled" } else { "in-memory" }
        );

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let store = self.store.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, store, stats.clone()).await {
                    log::error!("Connection error from {addr}: {e}");
                }
                stats.write().await.active_connections -= 1;
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        store: Arc<LogStore>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        log::info!("WebSocket connection established from {addr}");

        while let Some(msg) = ws_receiver.next().await {
            match msg? {
                Message::Binary(data) => {
                    stats.write().await.total_bytes += data.len() as u64;
                    let request = match LogRequest::decode(&data) {
                        Ok(request) => request,
                        Err(e) => {
                            // No request id to answer with; close so the client fails fast.
                            log::warn!("Undecodable frame from {addr}, closing: {e}");
                            stats.write().await.rejected_frames += 1;
                            ws_sender.send(Message::Close(None)).await?;
                            break;
                        }
                    };
                    let response = Self::handle_request(&store, &stats, request).await;
                    ws_sender
                        .send(Message::Binary(response.encode()?.into()))
                        .await?;
                }
                Message::Ping(data) => {
                    ws_sender.send(Message::Pong(data)).await?;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        log::info!("Connection from {addr} closed");
        Ok(())
    }

    async fn handle_request(
        store: &LogStore,
        stats: &RwLock<ServerStats>,
        request: LogRequest,
    ) -> LogResponse {
        match request {
            LogRequest::Append {
                request_id,
                agent,
                sender,
                payload,
            } => match store.append(&agent, &sender, &payload).await {
                Ok(ack) => {
                    stats.write().await.total_appends += 1;
                    log::trace!("{sender} appended to {agent} (seq {})", ack.sequence);
                    LogResponse::Appended { request_id, ack }
                }
                Err(e) => {
                    log::error!("Append to {agent} failed: {e}");
                    LogResponse::Failed {
                        request_id,
                        reason: e.to_string(),
                    }
                }
            },
            LogRequest::ReadAll { request_id, agent } => {
                let records = store.read_all(&agent).await;
                stats.write().await.total_reads += 1;
                LogResponse::Records {
                    request_id,
                    records,
                }
            }
        }
    }

    /// Get current server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Identity;

    #[test]
    fn test_server_config_default() {
        let config = LogServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9191");
        assert!(config.storage_path.is_none());
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = LogServer::in_memory(LogServerConfig::default());
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.total_appends, 0);
        assert!(!server.store().is_persistent());
    }

    #[tokio::test]
    async fn test_open_with_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogServerConfig {
            storage_path: Some(dir.path().join("log.journal")),
            ..LogServerConfig::default()
        };
        let server = LogServer::open(config).await.unwrap();
        assert!(server.store().is_persistent());
    }

    #[tokio::test]
    async fn test_handle_request_append_then_read() {
        let store = LogStore::in_memory();
        let stats = RwLock::new(ServerStats::default());

        let appended = LogServer::handle_request(
            &store,
            &stats,
            LogRequest::Append {
                request_id: 7,
                agent: "lobby".into(),
                sender: Identity::from("U.a"),
                payload: "ONLINE".into(),
            },
        )
        .await;
        assert!(matches!(appended, LogResponse::Appended { request_id: 7, .. }));

        let read = LogServer::handle_request(
            &store,
            &stats,
            LogRequest::ReadAll {
                request_id: 8,
                agent: "lobby".into(),
            },
        )
        .await;
        match read {
            LogResponse::Records { request_id, records } => {
                assert_eq!(request_id, 8);
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].payload, "ONLINE");
            }
            other => panic!("unexpected response {other:?}"),
        }

        let stats = stats.read().await;
        assert_eq!(stats.total_appends, 1);
        assert_eq!(stats.total_reads, 1);
    }
}
