//! WebSocket connection to a [`LogServer`](crate::server::LogServer).
//!
//! One socket carries strictly alternating request/response frames. A
//! broken socket is dropped and reopened on the next request, so a poll
//! that fails on a dead connection heals on the following cycle. Every
//! connect and every request is bounded by the request timeout; a server
//! that stops answering counts as unreachable.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::LogChannel;
use crate::error::ChannelError;
use crate::protocol::{AppendAck, Identity, LogRecord, LogRequest, LogResponse};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default bound on connecting and on each request/response exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RemoteLog {
    url: String,
    request_timeout: Duration,
    next_request_id: AtomicU64,
    socket: Mutex<Option<Socket>>,
}

impl RemoteLog {
    /// Connect eagerly so an unreachable server fails at login.
    pub async fn connect(url: impl Into<String>) -> Result<Self, ChannelError> {
        Self::connect_with_timeout(url, DEFAULT_REQUEST_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let url = url.into();
        let socket = open_socket(&url, request_timeout).await?;
        log::info!("Connected to log server {url}");
        Ok(Self {
            url,
            request_timeout,
            next_request_id: AtomicU64::new(1),
            socket: Mutex::new(Some(socket)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn request(&self, request: LogRequest) -> Result<LogResponse, ChannelError> {
        let mut guard = self.socket.lock().await;
        if guard.is_none() {
            log::debug!("Reconnecting to log server {}", self.url);
            *guard = Some(open_socket(&self.url, self.request_timeout).await?);
        }

        let outcome = match guard.as_mut() {
            Some(socket) => {
                match tokio::time::timeout(self.request_timeout, exchange(socket, &request)).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        log::warn!(
                            "Request {} to {} timed out after {:?}",
                            request.request_id(),
                            self.url,
                            self.request_timeout
                        );
                        Err(ChannelError::Unreachable(format!(
                            "no response from {} within {:?}",
                            self.url, self.request_timeout
                        )))
                    }
                }
            }
            None => Err(ChannelError::ConnectionClosed),
        };
        if outcome.is_err() {
            *guard = None;
        }
        outcome
    }
}

async fn open_socket(url: &str, limit: Duration) -> Result<Socket, ChannelError> {
    let (socket, _) = tokio::time::timeout(limit, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| ChannelError::Unreachable(format!("connect to {url} timed out")))?
        .map_err(|e| ChannelError::Unreachable(e.to_string()))?;
    Ok(socket)
}

/// Send one request and wait for the response with the same id.
async fn exchange(socket: &mut Socket, request: &LogRequest) -> Result<LogResponse, ChannelError> {
    let encoded = request.encode()?;
    socket
        .send(Message::Binary(encoded.into()))
        .await
        .map_err(|_| ChannelError::ConnectionClosed)?;

    while let Some(msg) = socket.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                let response = LogResponse::decode(&data)?;
                if response.request_id() == request.request_id() {
                    return Ok(response);
                }
                log::warn!(
                    "Discarding stale response {} (waiting for {})",
                    response.request_id(),
                    request.request_id()
                );
            }
            Ok(Message::Ping(data)) => {
                socket
                    .send(Message::Pong(data))
                    .await
                    .map_err(|_| ChannelError::ConnectionClosed)?;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    Err(ChannelError::ConnectionClosed)
}

#[async_trait]
impl LogChannel for RemoteLog {
    async fn append(
        &self,
        agent: &str,
        sender: &Identity,
        payload: &str,
    ) -> Result<AppendAck, ChannelError> {
        let request = LogRequest::Append {
            request_id: self.request_id(),
            agent: agent.to_string(),
            sender: sender.clone(),
            payload: payload.to_string(),
        };
        match self.request(request).await? {
            LogResponse::Appended { ack, .. } => Ok(ack),
            LogResponse::Failed { reason, .. } => Err(ChannelError::Rejected(reason)),
            other => Err(ChannelError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    async fn read_all(&self, agent: &str) -> Result<Vec<LogRecord>, ChannelError> {
        let request = LogRequest::ReadAll {
            request_id: self.request_id(),
            agent: agent.to_string(),
        };
        match self.request(request).await? {
            LogResponse::Records { records, .. } => Ok(records),
            LogResponse::Failed { reason, .. } => Err(ChannelError::Rejected(reason)),
            other => Err(ChannelError::UnexpectedResponse(format!("{other:?}"))),
        }
    }
}
