//! Scripted in-process connector for testing.
//!
//! A [`LoopbackConnector`] satisfies connect attempts from a script
//! its paired [`LoopbackController`] writes: each accepted attempt
//! yields a channel-backed connection the test feeds events into, and
//! dropping that feeder simulates a connection loss. Rejections let
//! tests exercise the retry path without a network.

use tokio::sync::{Mutex, mpsc};

use parlor_proto::event::ServerEvent;

use super::{Connection, Connector, TransportError};

enum ScriptedOutcome {
    Accept(mpsc::Receiver<ServerEvent>),
    Reject,
}

/// Test double for the server side of the transport.
pub struct LoopbackController {
    script_tx: mpsc::Sender<ScriptedOutcome>,
}

impl LoopbackController {
    /// Accepts the next connect attempt and returns the feeder for
    /// its events. Dropping the feeder closes the connection.
    ///
    /// # Panics
    ///
    /// Panics when the connector side has been dropped.
    #[allow(clippy::expect_used)]
    pub async fn open_connection(&self) -> mpsc::Sender<ServerEvent> {
        let (tx, rx) = mpsc::channel(64);
        self.script_tx
            .send(ScriptedOutcome::Accept(rx))
            .await
            .expect("connector side dropped");
        tx
    }

    /// Rejects the next connect attempt with an unreachable error.
    ///
    /// # Panics
    ///
    /// Panics when the connector side has been dropped.
    #[allow(clippy::expect_used)]
    pub async fn reject_next(&self) {
        self.script_tx
            .send(ScriptedOutcome::Reject)
            .await
            .expect("connector side dropped");
    }
}

/// In-process connector following a [`LoopbackController`] script.
pub struct LoopbackConnector {
    script_rx: Mutex<mpsc::Receiver<ScriptedOutcome>>,
}

impl LoopbackConnector {
    /// Creates a connector and the controller scripting it.
    #[must_use]
    pub fn new() -> (Self, LoopbackController) {
        let (script_tx, script_rx) = mpsc::channel(64);
        (
            Self {
                script_rx: Mutex::new(script_rx),
            },
            LoopbackController { script_tx },
        )
    }
}

impl Connector for LoopbackConnector {
    type Conn = LoopbackConnection;

    async fn connect(&self) -> Result<LoopbackConnection, TransportError> {
        let mut script = self.script_rx.lock().await;
        match script.recv().await {
            Some(ScriptedOutcome::Accept(events)) => Ok(LoopbackConnection { events }),
            Some(ScriptedOutcome::Reject) => {
                Err(TransportError::Unreachable("loopback".to_string()))
            }
            // Controller dropped: the script is over.
            None => Err(TransportError::Unreachable("loopback".to_string())),
        }
    }
}

/// One scripted connection.
pub struct LoopbackConnection {
    events: mpsc::Receiver<ServerEvent>,
}

impl Connection for LoopbackConnection {
    async fn next_event(&mut self) -> Result<ServerEvent, TransportError> {
        self.events
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)
    }
}
