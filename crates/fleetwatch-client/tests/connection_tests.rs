//! Realtime connection lifecycle tests.
//!
//! These tests verify that the connection manager:
//! 1. Follows the exponential backoff schedule and stops after the cap
//! 2. Resets the retry budget after a successful open
//! 3. Keeps at most one connection task alive
//! 4. Delivers frames in arrival order, over a real WebSocket too

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, stream};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

use fleetwatch_client::{
    ClientError, ConnectionEvent, ConnectionManager, ConnectionState, Connector, FrameStream,
    Result, WsConnector,
};
use fleetwatch_core::ReconnectPolicy;

/// What the next `connect` call does.
enum Script {
    Fail,
    /// Open, deliver these frames, then drop the connection.
    Deliver(Vec<&'static str>),
    /// Open, deliver these frames, then stay open.
    Hold(Vec<&'static str>),
    /// Open and repeat this frame forever.
    Flood(&'static str),
}

/// Connector that plays back a script; fails once the script is empty.
struct ScriptedConnector {
    script: Mutex<VecDeque<Script>>,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            attempts: Mutex::new(Vec::new()),
        })
    }

    fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    fn gaps(&self) -> Vec<Duration> {
        let attempts = self.attempts.lock().unwrap();
        attempts.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<FrameStream> {
        self.attempts.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();

        match next {
            None | Some(Script::Fail) => {
                Err(ClientError::ConnectionFailed("connection refused".into()))
            }
            Some(Script::Deliver(frames)) => Ok(Box::pin(stream::iter(
                frames
                    .into_iter()
                    .map(|f| Ok::<_, ClientError>(f.to_string())),
            ))),
            Some(Script::Hold(frames)) => Ok(Box::pin(
                stream::iter(
                    frames
                        .into_iter()
                        .map(|f| Ok::<_, ClientError>(f.to_string())),
                )
                .chain(stream::pending()),
            )),
            Some(Script::Flood(frame)) => Ok(Box::pin(stream::repeat_with(move || {
                Ok::<_, ClientError>(frame.to_string())
            }))),
        }
    }
}

struct Harness {
    manager: ConnectionManager,
    frames: mpsc::Receiver<String>,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

fn harness(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Harness {
    harness_at("ws://fleet.test/ws", connector, policy)
}

fn harness_at(url: &str, connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Harness {
    let (frames_tx, frames) = mpsc::channel(64);
    let (events_tx, events) = mpsc::unbounded_channel();
    Harness {
        manager: ConnectionManager::new(url, policy, connector, frames_tx, events_tx),
        frames,
        events,
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn retry_delays(events: &[ConnectionEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::Reconnecting { delay, .. } => Some(delay.as_millis() as u64),
            _ => None,
        })
        .collect()
}

// ============================================================
// Backoff
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_backoff_schedule_then_terminal_closed() {
    let connector = ScriptedConnector::new(vec![]);
    let mut h = harness(connector.clone(), ReconnectPolicy::default());

    h.manager.open();
    tokio::time::sleep(Duration::from_secs(40)).await;

    let events = drain(&mut h.events);
    assert_eq!(retry_delays(&events), vec![1000, 2000, 4000, 8000, 16000]);
    assert_eq!(connector.attempt_count(), 6);
    assert_eq!(
        connector.gaps(),
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000),
            Duration::from_millis(8000),
            Duration::from_millis(16000),
        ]
    );
    assert!(events.contains(&ConnectionEvent::RetriesExhausted { attempts: 5 }));
    assert_eq!(h.manager.state(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempt_count(), 6, "no attempt after exhaustion");
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_retry_count() {
    let connector = ScriptedConnector::new(vec![
        Script::Fail,
        Script::Fail,
        Script::Deliver(vec![r#"{"type":"ping"}"#]),
        Script::Fail,
        Script::Hold(vec![]),
    ]);
    let mut h = harness(connector.clone(), ReconnectPolicy::default());

    h.manager.open();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let events = drain(&mut h.events);
    // 1s, 2s, then the open resets: the next two retries start over at 1s, 2s.
    assert_eq!(retry_delays(&events), vec![1000, 2000, 1000, 2000]);
    assert_eq!(h.manager.state(), ConnectionState::Open);
    assert_eq!(h.frames.try_recv().unwrap(), r#"{"type":"ping"}"#);
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect_after_exhaustion() {
    let connector = ScriptedConnector::new(vec![Script::Fail, Script::Fail, Script::Hold(vec![])]);
    let policy = ReconnectPolicy::new(Duration::from_millis(100), 1);
    let mut h = harness(connector.clone(), policy);

    h.manager.open();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(connector.attempt_count(), 2);
    assert_eq!(h.manager.state(), ConnectionState::Closed);
    assert!(drain(&mut h.events).contains(&ConnectionEvent::RetriesExhausted { attempts: 1 }));

    h.manager.reconnect().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(connector.attempt_count(), 3);
    assert_eq!(h.manager.state(), ConnectionState::Open);
}

// ============================================================
// Lifecycle
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_open_while_running_is_noop() {
    let connector = ScriptedConnector::new(vec![Script::Hold(vec![])]);
    let h = harness(connector.clone(), ReconnectPolicy::default());

    h.manager.open();
    h.manager.open();
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.manager.open();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(h.manager.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_close_walks_closing_to_closed() {
    let connector = ScriptedConnector::new(vec![Script::Hold(vec![])]);
    let mut h = harness(connector.clone(), ReconnectPolicy::default());

    h.manager.open();
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.manager.close().await;

    let states: Vec<ConnectionState> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            ConnectionEvent::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ]
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_frames_delivered_in_order() {
    let connector = ScriptedConnector::new(vec![Script::Hold(vec!["one", "two", "three"])]);
    let mut h = harness(connector, ReconnectPolicy::default());

    h.manager.open();
    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(h.frames.recv().await.unwrap());
    }
    assert_eq!(received, vec!["one", "two", "three"]);
}

#[tokio::test(start_paused = true)]
async fn test_close_with_full_frame_buffer() {
    let connector = ScriptedConnector::new(vec![Script::Flood(r#"{"type":"ping"}"#)]);
    let h = harness(connector.clone(), ReconnectPolicy::default());

    // Nobody reads `h.frames`, so the 64-slot buffer fills and stays full.
    h.manager.open();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.manager.state(), ConnectionState::Open);

    tokio::time::timeout(Duration::from_secs(5), h.manager.close())
        .await
        .expect("close returns while the frame buffer is full");
    assert_eq!(h.manager.state(), ConnectionState::Closed);
    assert_eq!(connector.attempt_count(), 1);
}

// ============================================================
// Real WebSocket transport
// ============================================================

#[tokio::test]
async fn test_ws_connector_against_local_server() {
    fleetwatch_core::logging::init_test_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"agent_update","payload":{"id":"scout","status":"running"}}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        ws.send(Message::Text(r#"{"type":"notification","payload":{"message":"hi"}}"#.into()))
            .await
            .unwrap();
        ws.close(None).await.unwrap();
    });

    let mut h = harness_at(
        &format!("ws://{addr}/ws"),
        Arc::new(WsConnector),
        ReconnectPolicy::new(Duration::from_millis(50), 1),
    );
    h.manager.open();

    let first = tokio::time::timeout(Duration::from_secs(5), h.frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(first.contains("agent_update"));
    let second = tokio::time::timeout(Duration::from_secs(5), h.frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(second.contains("notification"), "binary frames are skipped");

    server.await.unwrap();

    // The server closed; the manager takes the reconnect path and, with a
    // single retry against a dead listener, ends in Closed.
    let mut saw_retry = false;
    let mut exhausted = false;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_secs(5), h.events.recv()).await
    {
        match event {
            ConnectionEvent::Reconnecting { attempt: 1, .. } => saw_retry = true,
            ConnectionEvent::RetriesExhausted { .. } => {
                exhausted = true;
                break;
            }
            _ => {}
        }
    }
    assert!(saw_retry);
    assert!(exhausted);
    assert_eq!(h.manager.state(), ConnectionState::Closed);
}
