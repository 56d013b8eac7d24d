//! Test helpers for integration tests
//!
//! [`MockPlatform`] is one axum server playing both sides the client talks
//! to: scripted REST replies under `/api` and a WebSocket gateway at
//! `/gateway/`. Every accepted gateway connection is handed to the test as a
//! [`GatewayPeer`] it drives frame by frame.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chat_client::Event;
use chat_common::{BotToken, ClientConfig};
use chat_gateway::{ConnectionStatus, GatewayHandle, GatewayMessage, OpCode};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long any single step may take before the test fails
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Token every test client identifies with
pub const TEST_TOKEN: &str = "integration-token";

// ============================================================================
// REST
// ============================================================================

/// One scripted REST reply
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// `null` sends an empty body
    pub body: Value,
    /// Held this long before the reply is sent
    pub latency: Option<Duration>,
}

impl MockReply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
            latency: None,
        }
    }

    pub fn delayed(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A request the mock received
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// `"METHOD /path"`, relative to the API base
    pub route: String,
    pub body: Value,
    pub at: Instant,
}

#[derive(Default)]
struct RestScript {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RestScript {
    fn next_reply(&self, route: &str) -> MockReply {
        self.replies
            .lock()
            .get_mut(route)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| MockReply::json(404, json!({ "code": 0, "message": "404: Not Found" })))
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Clone)]
struct MockState {
    rest: Arc<RestScript>,
    peers: mpsc::UnboundedSender<GatewayPeer>,
}

/// Mock platform instance that manages lifecycle
pub struct MockPlatform {
    pub addr: SocketAddr,
    rest: Arc<RestScript>,
    peers: mpsc::UnboundedReceiver<GatewayPeer>,
    _handle: JoinHandle<()>,
}

impl MockPlatform {
    /// Start a new mock platform on an ephemeral port
    pub async fn start() -> Result<Self> {
        let rest = Arc::new(RestScript::default());
        let (peers_tx, peers) = mpsc::unbounded_channel();
        let state = MockState {
            rest: rest.clone(),
            peers: peers_tx,
        };

        let app = Router::new()
            .route("/gateway/", get(accept_gateway))
            .fallback(rest_reply)
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            rest,
            peers,
            _handle: handle,
        })
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn gateway_url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// Client configuration pointed at this platform, with short backoffs
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(BotToken::new(TEST_TOKEN)?);
        config.rest.api_base_url = self.api_url();
        config.rest.max_retries = 1;
        config.gateway.url = Some(self.gateway_url());
        config.gateway.max_reconnects = 3;
        config.gateway.backoff_base_ms = 10;
        config.gateway.backoff_max_ms = 50;
        config.gateway.hello_timeout_ms = 2_000;
        Ok(config)
    }

    /// Queue a reply for `"METHOD /path"`. Unscripted routes get a 404.
    pub fn reply(&self, route: &str, status: u16, body: Value) {
        self.reply_with(route, MockReply::json(status, body));
    }

    pub fn reply_with(&self, route: &str, reply: MockReply) {
        self.rest
            .replies
            .lock()
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Routes called so far, in arrival order
    pub fn calls(&self) -> Vec<String> {
        self.rest.calls.lock().iter().map(|c| c.route.clone()).collect()
    }

    pub fn calls_to(&self, route: &str) -> Vec<RecordedCall> {
        self.rest
            .calls
            .lock()
            .iter()
            .filter(|c| c.route == route)
            .cloned()
            .collect()
    }

    /// Wait for the next gateway connection
    /// Wait until `route` has been requested at least once
    pub async fn wait_for_call(&self, route: &str) -> Result<()> {
        tokio::time::timeout(STEP_TIMEOUT, async {
            while self.calls_to(route).is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .with_context(|| format!("timed out waiting for {route}"))
    }

    pub async fn next_peer(&mut self) -> Result<GatewayPeer> {
        tokio::time::timeout(STEP_TIMEOUT, self.peers.recv())
            .await
            .context("timed out waiting for a gateway connection")?
            .ok_or_else(|| anyhow!("mock platform stopped"))
    }

    /// Fail if anyone connects within `window`
    pub async fn expect_no_peer(&mut self, window: Duration) -> Result<()> {
        match tokio::time::timeout(window, self.peers.recv()).await {
            Ok(Some(_)) => bail!("unexpected gateway connection"),
            _ => Ok(()),
        }
    }
}

async fn rest_reply(State(state): State<MockState>, method: Method, uri: Uri, body: Bytes) -> Response {
    let path = uri.path().strip_prefix("/api").unwrap_or(uri.path());
    let route = format!("{method} {path}");
    state.rest.calls.lock().push(RecordedCall {
        route: route.clone(),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        at: Instant::now(),
    });

    let reply = state.rest.next_reply(&route);
    if let Some(latency) = reply.latency {
        tokio::time::sleep(latency).await;
    }
    let mut builder = Response::builder()
        .status(reply.status)
        .header("content-type", "application/json");
    for (name, value) in &reply.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let body = if reply.body.is_null() {
        Body::empty()
    } else {
        Body::from(reply.body.to_string())
    };
    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// ============================================================================
// Gateway
// ============================================================================

/// What the client did on a gateway connection
#[derive(Debug)]
pub enum PeerEvent {
    Frame(GatewayMessage),
    /// Client sent a close frame
    Closed(Option<u16>),
}

/// Server side of one gateway connection.
///
/// Heartbeats are counted and, unless disabled, acknowledged automatically;
/// every other client frame is queued for the test. Dropping the peer hangs
/// up without a close frame.
pub struct GatewayPeer {
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<PeerEvent>,
    auto_ack: Arc<AtomicBool>,
    heartbeats: Arc<AtomicU64>,
    hang_up: Option<oneshot::Sender<()>>,
    sequence: u64,
}

async fn accept_gateway(ws: WebSocketUpgrade, State(state): State<MockState>) -> Response {
    ws.on_upgrade(move |socket| serve_peer(socket, state.peers))
}

async fn serve_peer(socket: WebSocket, peers: mpsc::UnboundedSender<GatewayPeer>) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let (inbound, inbound_rx) = mpsc::unbounded_channel();
    let (hang_up, mut hung_up) = oneshot::channel();
    let auto_ack = Arc::new(AtomicBool::new(true));
    let heartbeats = Arc::new(AtomicU64::new(0));

    let peer = GatewayPeer {
        outbound: outbound.clone(),
        inbound: inbound_rx,
        auto_ack: auto_ack.clone(),
        heartbeats: heartbeats.clone(),
        hang_up: Some(hang_up),
        sequence: 0,
    };
    if peers.send(peer).is_err() {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    loop {
        let message = tokio::select! {
            _ = &mut hung_up => break,
            message = stream.next() => match message {
                Some(Ok(message)) => message,
                _ => break,
            },
        };

        match message {
            Message::Text(text) => {
                let Ok(frame) = GatewayMessage::from_json(&text) else {
                    continue;
                };
                if frame.op == OpCode::Heartbeat {
                    heartbeats.fetch_add(1, Ordering::SeqCst);
                    if auto_ack.load(Ordering::SeqCst) {
                        if let Ok(ack) = GatewayMessage::new(OpCode::HeartbeatAck, Value::Null).to_json() {
                            let _ = outbound.send(Message::Text(ack));
                        }
                    }
                    continue;
                }
                let _ = inbound.send(PeerEvent::Frame(frame));
            }
            Message::Close(frame) => {
                let _ = inbound.send(PeerEvent::Closed(frame.map(|f| f.code)));
                break;
            }
            _ => {}
        }
    }

    writer.abort();
}

impl GatewayPeer {
    pub fn send(&self, frame: &GatewayMessage) -> Result<()> {
        self.outbound
            .send(Message::Text(frame.to_json()?))
            .map_err(|_| anyhow!("gateway peer disconnected"))
    }

    pub fn hello(&self, heartbeat_interval_ms: u64) -> Result<()> {
        self.send(&GatewayMessage::new(
            OpCode::Hello,
            json!({ "heartbeat_interval": heartbeat_interval_ms }),
        ))
    }

    /// Send a dispatch with the next sequence number
    pub fn dispatch(&mut self, event: &str, data: Value) -> Result<u64> {
        self.sequence += 1;
        self.send(&GatewayMessage::dispatch(event, self.sequence, data))?;
        Ok(self.sequence)
    }

    /// Continue numbering dispatches after `sequence`
    pub fn resume_sequence_at(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn request_reconnect(&self) -> Result<()> {
        self.send(&GatewayMessage::new(OpCode::Reconnect, Value::Null))
    }

    pub fn invalidate_session(&self, resumable: bool) -> Result<()> {
        self.send(&GatewayMessage::new(OpCode::InvalidSession, Value::Bool(resumable)))
    }

    /// Close with a code
    pub fn close(&self, code: u16) -> Result<()> {
        self.outbound
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: "".into(),
            })))
            .map_err(|_| anyhow!("gateway peer disconnected"))
    }

    /// Drop the connection without a close frame
    pub fn hang_up(&mut self) {
        if let Some(hang_up) = self.hang_up.take() {
            let _ = hang_up.send(());
        }
    }

    /// Stop acknowledging heartbeats
    pub fn stop_acking(&self) {
        self.auto_ack.store(false, Ordering::SeqCst);
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::SeqCst)
    }

    /// Next non-heartbeat frame from the client
    pub async fn next_frame(&mut self) -> Result<GatewayMessage> {
        match self.next_event().await? {
            PeerEvent::Frame(frame) => Ok(frame),
            PeerEvent::Closed(code) => bail!("client closed the connection ({code:?})"),
        }
    }

    pub async fn expect_op(&mut self, op: OpCode) -> Result<GatewayMessage> {
        let frame = self.next_frame().await?;
        if frame.op != op {
            bail!("expected {op}, got {}", frame.op);
        }
        Ok(frame)
    }

    /// Wait for the client's close frame, skipping anything before it.
    /// `None` means the client went away without one.
    pub async fn expect_close(&mut self) -> Result<Option<u16>> {
        loop {
            match tokio::time::timeout(STEP_TIMEOUT, self.inbound.recv())
                .await
                .context("timed out waiting for close")?
            {
                Some(PeerEvent::Closed(code)) => return Ok(code),
                Some(PeerEvent::Frame(_)) => {}
                None => return Ok(None),
            }
        }
    }

    /// Hello, expect Identify, then READY. Returns the Identify frame.
    pub async fn accept_identify(&mut self, heartbeat_interval_ms: u64, ready: Value) -> Result<GatewayMessage> {
        self.hello(heartbeat_interval_ms)?;
        let identify = self.expect_op(OpCode::Identify).await?;
        self.dispatch("READY", ready)?;
        Ok(identify)
    }

    async fn next_event(&mut self) -> Result<PeerEvent> {
        tokio::time::timeout(STEP_TIMEOUT, self.inbound.recv())
            .await
            .context("timed out waiting for a client frame")?
            .ok_or_else(|| anyhow!("gateway connection ended"))
    }
}

// ============================================================================
// Waiting
// ============================================================================

/// Next event matching `matches`
pub async fn next_event<F>(events: &mut broadcast::Receiver<Event>, mut matches: F) -> Result<Event>
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return Ok(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => bail!("event stream closed"),
            }
        }
    })
    .await
    .context("timed out waiting for event")?
}

/// Wait until the connection reports `status`
pub async fn wait_for_status(handle: &GatewayHandle, status: ConnectionStatus) -> Result<()> {
    let mut updates = handle.subscribe_status();
    tokio::time::timeout(STEP_TIMEOUT, updates.wait_for(|s| *s == status))
        .await
        .with_context(|| format!("timed out waiting for {status}"))?
        .map_err(|_| anyhow!("connection dropped its status channel"))?;
    Ok(())
}
