//! WebSocket transport to the chat server.
//!
//! The server pushes JSON text frames, one [`ServerEvent`] per frame.
//! Malformed frames are logged and skipped rather than killing the
//! connection; a close frame or read error ends it.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use parlor_proto::codec::decode_event;
use parlor_proto::event::ServerEvent;

use super::{Connection, Connector, TransportError};

/// Default timeout for establishing the WebSocket connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connector dialing one server URL (ws:// or wss://).
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Creates a connector for the given server URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The server URL this connector dials.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    type Conn = WsConnection;

    async fn connect(&self) -> Result<WsConnection, TransportError> {
        let (stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&self.url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = %self.url, "WebSocket connect timed out");
                    TransportError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = %self.url, err = %e, "WebSocket connect failed");
                    map_ws_connect_error(&self.url, e)
                })?;
        tracing::info!(url = %self.url, "WebSocket connected");
        Ok(WsConnection { stream })
    }
}

/// One live WebSocket connection.
pub struct WsConnection {
    stream: WsStream,
}

impl Connection for WsConnection {
    async fn next_event(&mut self) -> Result<ServerEvent, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(frame))) => match decode_event(frame.as_str()) {
                    Ok(event) => return Ok(event),
                    Err(err) => {
                        // Malformed frame: log and skip, don't disconnect.
                        tracing::warn!(%err, "malformed server frame, skipping");
                    }
                },
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("WebSocket closed by server");
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!("unexpected binary frame ignored");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::warn!(err = %e, "WebSocket read error");
                    return Err(TransportError::ConnectionClosed);
                }
                None => return Err(TransportError::ConnectionClosed),
            }
        }
    }
}

/// Map a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(url: &str, err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            // DNS/network failures surface as io errors.
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                TransportError::Unreachable(url.to_string())
            } else {
                TransportError::Io(io_err)
            }
        }
        WsError::Tls(_) => TransportError::Io(std::io::Error::other(format!("TLS error: {err}"))),
        WsError::Http(response) => TransportError::Io(std::io::Error::other(format!(
            "server HTTP error: status {}",
            response.status()
        ))),
        other => TransportError::Io(std::io::Error::other(format!("connection error: {other}"))),
    }
}
