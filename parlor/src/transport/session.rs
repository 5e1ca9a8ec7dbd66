//! Session supervisor: owns the connect/read/reconnect lifecycle.
//!
//! A [`Session`] runs one background task that repeatedly connects
//! through a [`Connector`], pumps decoded events into an ordered
//! channel, and schedules reconnects with exponential backoff when the
//! connection drops. The consumer sees a single linear stream of
//! [`SessionEvent`]s regardless of how many physical connections come
//! and go underneath.

use std::time::Duration;

use tokio::sync::mpsc;

use super::{Connection, Connector, SessionEvent, TransportError};

/// Reconnect tuning for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay before the first retry after a failed connect.
    pub initial_backoff: Duration,
    /// Upper bound the doubling backoff saturates at.
    pub max_backoff: Duration,
    /// Capacity of the session event channel.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            event_buffer: 256,
        }
    }
}

/// Handle to a running session's background task.
///
/// Dropping the handle leaves the task running until the event
/// receiver is dropped; call [`SessionHandle::shutdown`] for an
/// orderly stop.
pub struct SessionHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    /// Stops the supervisor and waits for its task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }

    /// Whether the supervisor task is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// The reconnecting session layer.
pub struct Session;

impl Session {
    /// Spawns the supervisor task and returns its handle plus the
    /// ordered event stream.
    #[must_use]
    pub fn spawn<C: Connector>(
        connector: C,
        config: SessionConfig,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(supervise(connector, config, event_tx, shutdown_rx));
        (SessionHandle { shutdown_tx, task }, event_rx)
    }
}

/// Connect, pump, reconnect — forever, until shutdown or the consumer
/// drops the receiver.
async fn supervise<C: Connector>(
    connector: C,
    config: SessionConfig,
    events: mpsc::Sender<SessionEvent>,
    mut shutdown: mpsc::Receiver<()>,
) {
    let mut backoff = config.initial_backoff;

    loop {
        let connect = tokio::select! {
            _ = shutdown.recv() => break,
            result = connector.connect() => result,
        };

        let mut conn = match connect {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(%err, delay = ?backoff, "connect failed, retrying");
                tokio::select! {
                    _ = shutdown.recv() => break,
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(config.max_backoff);
                continue;
            }
        };

        // A successful connect resets the retry schedule.
        backoff = config.initial_backoff;
        tracing::info!("session connected");
        if events.send(SessionEvent::Connected).await.is_err() {
            break;
        }

        if pump(&mut conn, &events, &mut shutdown).await.is_break() {
            break;
        }

        tracing::info!("session disconnected");
        if events.send(SessionEvent::Disconnected).await.is_err() {
            break;
        }
    }
    tracing::debug!("session supervisor exiting");
}

/// Forwards events from one connection until it dies. Returns
/// `Break` when the supervisor itself must stop.
async fn pump<C: Connection>(
    conn: &mut C,
    events: &mpsc::Sender<SessionEvent>,
    shutdown: &mut mpsc::Receiver<()>,
) -> std::ops::ControlFlow<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return std::ops::ControlFlow::Break(()),
            result = conn.next_event() => match result {
                Ok(event) => {
                    // Ordered backpressured send: events of one
                    // connection reach the consumer in arrival order.
                    if events.send(SessionEvent::Event(event)).await.is_err() {
                        return std::ops::ControlFlow::Break(());
                    }
                }
                Err(TransportError::ConnectionClosed) => {
                    return std::ops::ControlFlow::Continue(());
                }
                Err(err) => {
                    tracing::warn!(%err, "connection read error");
                    return std::ops::ControlFlow::Continue(());
                }
            },
        }
    }
}
