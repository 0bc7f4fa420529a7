//! WebSocket channel transport backed by tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use tether_types::wire::{ClientMessage, InboundFrame};

use crate::transport::{ChannelConnection, ChannelError, ChannelTransport};

/// Production transport: one WebSocket per connect call, bearer token on
/// the upgrade request, handshake bounded by a timeout.
pub struct WsTransport {
    handshake_timeout: Duration,
}

impl WsTransport {
    #[must_use]
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn connect(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<Box<dyn ChannelConnection>, ChannelError> {
        let mut request = url
            .into_client_request()
            .map_err(|err| ChannelError::Connect {
                detail: err.to_string(),
            })?;
        let bearer: HeaderValue =
            format!("Bearer {access_token}")
                .parse()
                .map_err(|_| ChannelError::Connect {
                    detail: "access token is not a valid header value".into(),
                })?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let handshake = connect_async(request);
        let (stream, response) = tokio::time::timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| ChannelError::HandshakeTimeout)?
            .map_err(|err| ChannelError::Connect {
                detail: err.to_string(),
            })?;
        debug!(status = %response.status(), "Channel handshake complete");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ChannelConnection for WsConnection {
    async fn next_frame(&mut self) -> Result<Option<InboundFrame>, ChannelError> {
        loop {
            let message = match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(message)) => message,
                Some(Err(err)) => {
                    return Err(ChannelError::Io {
                        detail: err.to_string(),
                    });
                }
            };
            match message {
                Message::Text(text) => {
                    if let Some(frame) = decode_text_frame(&text) {
                        return Ok(Some(frame));
                    }
                }
                Message::Close(_) => return Ok(None),
                // Pings are answered by the stream itself during polling.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                Message::Binary(_) => debug!("Ignoring unexpected binary channel frame"),
            }
        }
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), ChannelError> {
        let json = message.to_json().map_err(|err| ChannelError::Io {
            detail: err.to_string(),
        })?;
        self.stream
            .send(Message::Text(json))
            .await
            .map_err(|err| ChannelError::Io {
                detail: err.to_string(),
            })
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Decode one text frame. A frame the wire layer cannot make sense of is
/// dropped with a warning; bad inbound data never costs the connection.
fn decode_text_frame(text: &str) -> Option<InboundFrame> {
    match InboundFrame::parse(text) {
        Ok(frame) => Some(frame),
        Err(err) => {
            warn!("Dropping unintelligible channel frame: {err}");
            None
        }
    }
}
