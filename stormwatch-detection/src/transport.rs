//! Frame transports: the push channel carrying analysed frames from the Detection Server
//!
//! A [`FrameTransport`] opens one [`FrameChannel`] per device subscription. The
//! channel yields raw text messages; decoding and state updates happen in the
//! stream session, so transports stay free of session semantics.

use async_trait::async_trait;
use futures::StreamExt;
use stormwatch_core::{DetectionServerConfig, StormwatchError};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

/// One item read from a frame channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A text message to be decoded
    Message(String),
    /// A message that could not be read as text
    Undecodable {
        /// Why the message was unreadable
        reason: String,
    },
    /// The remote side ended the channel
    Closed {
        /// Close reason, if the remote sent one
        reason: Option<String>,
    },
    /// The channel broke
    Error(StormwatchError),
}

/// An open subscription channel
#[async_trait]
pub trait FrameChannel: Send {
    /// Wait for the next item. After `Closed` or `Error` the channel is spent.
    async fn next_event(&mut self) -> ChannelEvent;

    /// Close the channel from our side
    async fn close(&mut self);
}

/// Opens subscription channels for devices
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Open a subscription for one device
    async fn open(&self, device_id: &str) -> Result<Box<dyn FrameChannel>, StormwatchError>;

    /// Short transport name for logs
    fn name(&self) -> &'static str;
}

/// WebSocket transport to the Detection Server's `/video/ws` endpoint
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    config: DetectionServerConfig,
}

impl WebSocketTransport {
    /// Create a transport for the configured server
    pub fn new(config: DetectionServerConfig) -> Result<Self, StormwatchError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Server configuration in use
    pub fn config(&self) -> &DetectionServerConfig {
        &self.config
    }
}

#[async_trait]
impl FrameTransport for WebSocketTransport {
    async fn open(&self, device_id: &str) -> Result<Box<dyn FrameChannel>, StormwatchError> {
        let url = self.config.stream_url(device_id)?;
        debug!(device_id, url = %url, "Opening WebSocket subscription");

        let (stream, _) = tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| StormwatchError::Connection {
                device_id: device_id.to_string(),
                reason: "WebSocket connection timeout".to_string(),
            })?
            .map_err(|e| StormwatchError::Connection {
                device_id: device_id.to_string(),
                reason: format!("WebSocket connection failed: {}", e),
            })?;

        debug!(device_id, "WebSocket subscription established");
        Ok(Box::new(WebSocketChannel {
            device_id: device_id.to_string(),
            stream,
            finished: false,
        }))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// Channel over an established WebSocket
pub struct WebSocketChannel {
    device_id: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    finished: bool,
}

#[async_trait]
impl FrameChannel for WebSocketChannel {
    async fn next_event(&mut self) -> ChannelEvent {
        if self.finished {
            return ChannelEvent::Closed { reason: None };
        }

        loop {
            return match self.stream.next().await {
                Some(Ok(Message::Text(text))) => ChannelEvent::Message(text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => ChannelEvent::Message(text),
                    Err(e) => ChannelEvent::Undecodable {
                        reason: format!("binary message is not UTF-8: {}", e),
                    },
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                    trace!(device_id = %self.device_id, "Skipping control frame");
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    self.finished = true;
                    ChannelEvent::Closed {
                        reason: frame.map(|f| f.reason.into_owned()).filter(|r| !r.is_empty()),
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    ChannelEvent::Error(StormwatchError::Connection {
                        device_id: self.device_id.clone(),
                        reason: format!("WebSocket error: {}", e),
                    })
                }
                None => {
                    self.finished = true;
                    ChannelEvent::Closed { reason: None }
                }
            };
        }
    }

    async fn close(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Err(e) = self.stream.close(None).await {
            debug!(device_id = %self.device_id, "WebSocket close handshake failed: {}", e);
        }
    }
}

impl std::fmt::Debug for WebSocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketChannel")
            .field("device_id", &self.device_id)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = DetectionServerConfig::default();
        config.stream_path.clear();
        assert!(WebSocketTransport::new(config).is_err());
    }

    #[tokio::test]
    async fn test_open_fails_when_server_is_down() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = DetectionServerConfig::new(&format!("http://127.0.0.1:{}", port)).unwrap();
        config.connect_timeout = std::time::Duration::from_secs(2);
        let transport = WebSocketTransport::new(config).unwrap();

        let error = transport.open("cam1").await.err().unwrap();
        assert_eq!(error.error_code(), "CONNECTION_FAILED");
        assert!(error.to_string().contains("cam1"));
    }
}
