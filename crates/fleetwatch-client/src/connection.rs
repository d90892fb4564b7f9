//! Realtime connection management.
//!
//! A [`ConnectionManager`] owns at most one connection task. The task
//! connects through a [`Connector`], forwards every text frame to the frame
//! channel in arrival order, and on failure walks the [`Backoff`] schedule.
//! Once the schedule is exhausted the manager parks in
//! [`ConnectionState::Closed`] until [`ConnectionManager::reconnect`].
//!
//! ```text
//! Idle -> Connecting -> Open -> (drop) -> Connecting -> ... -> Closed
//!                                   close() -> Closing -> Closed
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use fleetwatch_core::{Backoff, BackoffStep, ReconnectPolicy, log_connection_event};

use crate::error::{ClientError, Result};

/// Inbound text frames from one open connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Opens realtime connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url`. The returned stream ends or yields an error when the
    /// connection drops.
    async fn connect(&self, url: &str) -> Result<FrameStream>;
}

/// [`Connector`] over WebSocket.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

        let frames = ws.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| format!("{} {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    Some(Err(ClientError::ConnectionClosed(reason)))
                }
                // Ping/pong are answered by tungstenite; binary frames are not part of the protocol.
                Ok(_) => None,
                Err(e) => Some(Err(ClientError::WebSocket(e))),
            }
        });
        Ok(Box::pin(frames))
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether a connection task is (or should be) running.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    pub fn indicator(&self) -> &'static str {
        match self {
            ConnectionState::Open => "●",
            ConnectionState::Connecting => "◐",
            ConnectionState::Idle | ConnectionState::Closing | ConnectionState::Closed => "○",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Events published by the connection task.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// A retry is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// The retry budget is spent; no further automatic attempts.
    RetriesExhausted { attempts: u32 },
    /// A transport error that took the reconnect path.
    Error(String),
}

/// Channels and settings shared with the connection task.
#[derive(Clone)]
struct TaskContext {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    frames: mpsc::Sender<String>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl TaskContext {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state");
            let _ = self.events.send(ConnectionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }
}

struct RunningTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Owns the realtime connection and its reconnect policy.
pub struct ConnectionManager {
    ctx: TaskContext,
    task: Mutex<Option<RunningTask>>,
}

impl ConnectionManager {
    /// Create a manager. Frames go to `frames`; lifecycle events to `events`.
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
        frames: mpsc::Sender<String>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            ctx: TaskContext {
                url: url.into(),
                policy,
                connector,
                frames,
                events,
                state: Arc::new(state),
            },
            task: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.ctx.url
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.ctx.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.state.subscribe()
    }

    /// Start the connection task. No-op while one is already running.
    pub fn open(&self) {
        let Ok(mut slot) = self.task.lock() else {
            warn!("connection task slot poisoned");
            return;
        };

        if let Some(task) = slot.as_ref()
            && !task.handle.is_finished()
        {
            debug!(state = %self.state(), "open ignored, connection task running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = self.ctx.clone();
        ctx.set_state(ConnectionState::Connecting);
        let handle = tokio::spawn(run_connection(ctx, shutdown_rx));
        *slot = Some(RunningTask {
            handle,
            shutdown: shutdown_tx,
        });
    }

    /// Stop the connection task, cancelling any pending retry.
    pub async fn close(&self) {
        let running = match self.task.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };

        if let Some(task) = running {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                warn!(error = %e, "connection task ended abnormally");
            }
        }
        self.ctx.set_state(ConnectionState::Closed);
    }

    /// Manual reconnect: drop any current connection and start over with a
    /// fresh retry budget.
    pub async fn reconnect(&self) {
        log_connection_event!("manual_reconnect", url = %self.ctx.url);
        self.close().await;
        self.open();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.task.lock()
            && let Some(task) = slot.take()
        {
            let _ = task.shutdown.send(true);
            task.handle.abort();
        }
    }
}

async fn run_connection(ctx: TaskContext, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = Backoff::new(ctx.policy.clone());

    loop {
        ctx.set_state(ConnectionState::Connecting);
        let attempt = tokio::select! {
            result = ctx.connector.connect(&ctx.url) => result,
            _ = shutdown.changed() => {
                ctx.set_state(ConnectionState::Closed);
                return;
            }
        };

        match attempt {
            Ok(mut stream) => {
                backoff.reset();
                ctx.set_state(ConnectionState::Open);
                log_connection_event!("open", url = %ctx.url);

                let reason = loop {
                    let text = tokio::select! {
                        frame = stream.next() => match frame {
                            Some(Ok(text)) => text,
                            Some(Err(e)) => break e.to_string(),
                            None => break "stream ended".to_string(),
                        },
                        _ = shutdown.changed() => {
                            close_stream(&ctx, stream);
                            return;
                        }
                    };

                    // A full frame buffer must not keep shutdown from being seen.
                    tokio::select! {
                        sent = ctx.frames.send(text) => {
                            if sent.is_err() {
                                debug!("frame consumer gone, stopping connection");
                                ctx.set_state(ConnectionState::Closed);
                                return;
                            }
                        }
                        _ = shutdown.changed() => {
                            close_stream(&ctx, stream);
                            return;
                        }
                    }
                };

                warn!(url = %ctx.url, reason = %reason, "connection dropped");
                ctx.emit(ConnectionEvent::Error(reason));
            }
            Err(e) => {
                warn!(url = %ctx.url, error = %e, "connect failed");
                ctx.emit(ConnectionEvent::Error(e.to_string()));
            }
        }

        match backoff.next_step() {
            BackoffStep::Retry { attempt, delay } => {
                log_connection_event!(
                    "retry",
                    attempt,
                    delay_ms = delay.as_millis() as u64
                );
                ctx.emit(ConnectionEvent::Reconnecting { attempt, delay });
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        ctx.set_state(ConnectionState::Closed);
                        return;
                    }
                }
            }
            BackoffStep::Exhausted { attempts } => {
                log_connection_event!("exhausted", attempts);
                ctx.set_state(ConnectionState::Closed);
                ctx.emit(ConnectionEvent::RetriesExhausted { attempts });
                return;
            }
        }
    }
}

fn close_stream(ctx: &TaskContext, stream: FrameStream) {
    ctx.set_state(ConnectionState::Closing);
    drop(stream);
    log_connection_event!("closed", url = %ctx.url);
    ctx.set_state(ConnectionState::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }

    #[test]
    fn test_active_states() {
        assert!(ConnectionState::Open.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(!ConnectionState::Closed.is_active());
        assert!(!ConnectionState::Idle.is_active());
    }

    struct Refusing;

    #[async_trait]
    impl Connector for Refusing {
        async fn connect(&self, _url: &str) -> Result<FrameStream> {
            Err(ClientError::ConnectionFailed("refused".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_retry() {
        let (frames_tx, _frames_rx) = mpsc::channel(8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(
            "ws://unused",
            ReconnectPolicy::default(),
            Arc::new(Refusing),
            frames_tx,
            events_tx,
        );

        manager.open();
        loop {
            if let Some(ConnectionEvent::Reconnecting { attempt, .. }) = events_rx.recv().await {
                assert_eq!(attempt, 1);
                break;
            }
        }

        manager.close().await;
        assert_eq!(manager.state(), ConnectionState::Closed);

        tokio::time::advance(Duration::from_secs(60)).await;
        while let Ok(event) = events_rx.try_recv() {
            assert!(!matches!(event, ConnectionEvent::Reconnecting { .. }));
        }
    }
}
