//! Transport layer for the live server connection.
//!
//! Defines the [`Connector`] and [`Connection`] traits the session
//! supervisor drives. Concrete implementations:
//! - [`ws::WsConnector`] — WebSocket connection to the chat server
//! - [`loopback::LoopbackConnector`] — in-process scripted connector for testing

pub mod loopback;
pub mod session;
pub mod ws;

use parlor_proto::event::ServerEvent;

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the server has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The server is not reachable at the configured address.
    #[error("server {0} is unreachable")]
    Unreachable(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the session layer emits toward the sync engine.
///
/// Emission order is the engine's ordering guarantee: a `Connected`
/// precedes every event of its connection, and a `Disconnected`
/// follows the last one. No event of a dead connection is ever
/// delivered after its `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connection to the server was established (first or again).
    Connected,
    /// The current connection was lost; a reconnect attempt follows.
    Disconnected,
    /// A decoded server event from the live connection.
    Event(ServerEvent),
}

/// Factory for live connections. The session supervisor calls
/// [`Connector::connect`] once per (re)connection attempt.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced on success.
    type Conn: Connection;

    /// Establish one connection to the server.
    fn connect(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Conn, TransportError>> + Send;
}

/// One live connection delivering decoded server events in arrival
/// order.
pub trait Connection: Send + 'static {
    /// Await the next server event.
    ///
    /// Malformed frames are skipped inside the implementation; an
    /// error from this method always means the connection is dead.
    fn next_event(
        &mut self,
    ) -> impl std::future::Future<Output = Result<ServerEvent, TransportError>> + Send;
}
