//! Gateway connection runner
//!
//! [`GatewayConnection::run`] owns the socket for the lifetime of the client.
//! Each pass opens the transport, waits for Hello, starts the heartbeat and
//! writer tasks, sends Identify or Resume, then reads frames until the
//! connection ends. The pass reports what to do next, and the outer loop
//! resumes, re-identifies after backoff, or terminates.
//!
//! Dispatch frames are forwarded in wire order on an unbounded channel so a
//! slow consumer never stalls the reader (and with it, heartbeat ACKs).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat_common::{Backoff, BotToken, GatewayConfig};
use chat_core::Intents;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::heartbeat::Heartbeat;
use super::session::{ConnectionStatus, Session};
use crate::error::GatewayError;
use crate::protocol::{
    disposition, CloseDisposition, GatewayMessage, HelloPayload, IdentifyPayload,
    IdentifyProperties, OpCode, ReadyPayload, ResumePayload,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Gateway API version and encoding appended to every connect URL
const GATEWAY_QUERY: &str = "v=10&encoding=json";

/// Close code sent when dropping a connection we intend to resume
const RESUMABLE_CLOSE: u16 = 4000;

/// Close code sent on orderly shutdown; the server discards the session
const NORMAL_CLOSE: u16 = 1000;

/// How long the writer gets to flush on teardown
const WRITER_FLUSH: Duration = Duration::from_secs(2);

/// Connection settings
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Base gateway URL, without query parameters
    pub url: String,
    pub token: BotToken,
    pub intents: Intents,
    /// Consecutive connection attempts that may fail before giving up
    pub max_reconnects: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub hello_timeout: Duration,
    pub properties: IdentifyProperties,
}

impl GatewayOptions {
    /// Options with default policy for `url`
    #[must_use]
    pub fn new(url: impl Into<String>, token: BotToken) -> Self {
        Self::from_config(&GatewayConfig::default(), url, token)
    }

    #[must_use]
    pub fn from_config(config: &GatewayConfig, url: impl Into<String>, token: BotToken) -> Self {
        Self {
            url: url.into(),
            token,
            intents: config.intents,
            max_reconnects: config.max_reconnects,
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
            hello_timeout: config.hello_timeout(),
            properties: IdentifyProperties::default(),
        }
    }
}

/// One inbound dispatch frame
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Event name, e.g. `MESSAGE_CREATE`
    pub event: String,
    pub sequence: Option<u64>,
    pub data: Value,
}

/// Connection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Transport connections opened
    pub connects: u64,
    /// Connection attempts after the first
    pub reconnects: u64,
    pub identifies: u64,
    /// Successful resumes (`RESUMED` received)
    pub resumes: u64,
    pub heartbeats: u64,
    /// Connections dropped for a missed heartbeat ACK
    pub zombies: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub connects: AtomicU64,
    pub reconnects: AtomicU64,
    pub identifies: AtomicU64,
    pub resumes: AtomicU64,
    pub heartbeats: AtomicU64,
    pub zombies: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> GatewayStats {
        GatewayStats {
            connects: self.connects.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            identifies: self.identifies.load(Ordering::Relaxed),
            resumes: self.resumes.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            zombies: self.zombies.load(Ordering::Relaxed),
        }
    }
}

/// Items for the writer task
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(GatewayMessage),
    Close(u16),
}

/// What the outer loop does after a connection ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Shutdown,
    /// Reconnect and resume if a session exists
    Resume,
    /// Forget the session and identify from scratch
    Reidentify,
}

/// State shared between the runner and its handles
struct Shared {
    session: Arc<Mutex<Session>>,
    status: watch::Sender<ConnectionStatus>,
    shutdown: watch::Sender<bool>,
    commands: mpsc::UnboundedSender<GatewayMessage>,
    counters: Arc<Counters>,
}

/// Control handle for a running [`GatewayConnection`]
#[derive(Clone)]
pub struct GatewayHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for GatewayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayHandle")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl GatewayHandle {
    /// Queue a control frame, e.g. a presence update
    ///
    /// Frames are written once the session is ready. Identify and Resume
    /// belong to the connection itself and are rejected.
    ///
    /// # Errors
    /// `Protocol` for ops the application may not send, `Shutdown` once the
    /// connection has terminated
    pub fn send(&self, op: OpCode, data: Value) -> Result<(), GatewayError> {
        if !op.is_client_op() || matches!(op, OpCode::Identify | OpCode::Resume) {
            return Err(GatewayError::Protocol(format!(
                "op {op} cannot be sent by the application"
            )));
        }
        if self.status().is_terminated() {
            return Err(GatewayError::Shutdown);
        }
        self.shared
            .commands
            .send(GatewayMessage::new(op, data))
            .map_err(|_| GatewayError::Shutdown)
    }

    /// Close the connection with code 1000 and stop reconnecting
    pub fn close(&self) {
        if !self.shared.shutdown.send_replace(true) {
            tracing::info!("Gateway close requested");
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Watch status transitions
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Snapshot of the current session
    #[must_use]
    pub fn session(&self) -> Session {
        self.shared.session.lock().clone()
    }

    #[must_use]
    pub fn stats(&self) -> GatewayStats {
        self.shared.counters.snapshot()
    }
}

/// A gateway connection with resume and reconnect
pub struct GatewayConnection {
    options: GatewayOptions,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
    commands: mpsc::UnboundedReceiver<GatewayMessage>,
    /// Command taken from the queue but not written; sent first next session
    unsent: Option<GatewayMessage>,
    events: mpsc::UnboundedSender<Dispatch>,
    /// Set when the current pass reached `READY` or `RESUMED`
    established: bool,
}

impl GatewayConnection {
    /// Create a connection. Nothing happens until [`run`](Self::run) is polled.
    #[must_use]
    pub fn new(options: GatewayOptions) -> (Self, GatewayHandle, mpsc::UnboundedReceiver<Dispatch>) {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (shutdown_tx, shutdown) = watch::channel(false);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            session: Arc::new(Mutex::new(Session::new())),
            status,
            shutdown: shutdown_tx,
            commands: commands_tx,
            counters: Arc::new(Counters::default()),
        });
        let handle = GatewayHandle { shared: shared.clone() };
        let connection = Self {
            options,
            shared,
            shutdown,
            commands,
            unsent: None,
            events,
            established: false,
        };
        (connection, handle, events_rx)
    }

    /// Drive the connection until it is closed or fails for good
    ///
    /// # Errors
    /// A fatal close code, or `ReconnectsExhausted` once more than
    /// `max_reconnects` consecutive attempts failed to establish a session
    pub async fn run(mut self) -> Result<(), GatewayError> {
        let mut backoff = Backoff::new(self.options.backoff_base, self.options.backoff_max);
        let mut failures: u32 = 0;

        let result = loop {
            if *self.shutdown.borrow() {
                break Ok(());
            }

            let outcome = self.connect_and_run().await;
            let established = std::mem::take(&mut self.established);
            if established {
                backoff.reset();
                failures = 0;
            }

            let next = match outcome {
                Ok(Outcome::Shutdown) | Err(GatewayError::Shutdown) => break Ok(()),
                Ok(next) => next,
                Err(err) if err.is_fatal() => {
                    tracing::error!(error = %err, "Gateway terminated");
                    break Err(err);
                }
                Err(GatewayError::Closed(code)) => match disposition(code) {
                    CloseDisposition::Reidentify => Outcome::Reidentify,
                    _ => Outcome::Resume,
                },
                Err(err) => {
                    tracing::warn!(error = %err, "Gateway connection failed");
                    Outcome::Resume
                }
            };

            self.set_status(ConnectionStatus::Disconnected);
            if next == Outcome::Reidentify {
                self.shared.session.lock().clear();
            }

            if !established {
                failures = failures.saturating_add(1);
                if failures > self.options.max_reconnects {
                    tracing::error!(attempts = failures, "Reconnect budget exhausted");
                    break Err(GatewayError::ReconnectsExhausted { attempts: failures });
                }
            }

            let delay = backoff.next_delay();
            tracing::info!(
                delay_ms = delay.as_millis(),
                failures,
                resume = self.shared.session.lock().can_resume(),
                "Reconnecting"
            );
            if until_shutdown(&mut self.shutdown, tokio::time::sleep(delay))
                .await
                .is_none()
            {
                break Ok(());
            }
            self.shared.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        };

        self.set_status(ConnectionStatus::Terminated);
        result
    }

    /// One connection: transport, handshake, read loop, teardown
    async fn connect_and_run(&mut self) -> Result<Outcome, GatewayError> {
        let (resuming, url) = {
            let session = self.shared.session.lock();
            let base = session.resume_url().unwrap_or(self.options.url.as_str());
            (session.can_resume(), gateway_url(base))
        };

        self.set_status(ConnectionStatus::Connecting);
        self.shared.counters.connects.fetch_add(1, Ordering::Relaxed);
        tracing::info!(url = %url, resuming, "Connecting to gateway");

        let Some(connected) = until_shutdown(&mut self.shutdown, connect_async(url.as_str())).await else {
            return Ok(Outcome::Shutdown);
        };
        let (stream, _) = connected?;
        let (sink, mut reader) = stream.split();

        let hello_timeout = self.options.hello_timeout;
        let Some(hello) = until_shutdown(
            &mut self.shutdown,
            tokio::time::timeout(hello_timeout, wait_for_hello(&mut reader)),
        )
        .await
        else {
            return Ok(Outcome::Shutdown);
        };
        let hello = hello.map_err(|_| GatewayError::HelloTimeout)??;

        let interval = Duration::from_millis(hello.heartbeat_interval);
        self.shared.session.lock().set_heartbeat_interval(interval);
        tracing::debug!(interval_ms = hello.heartbeat_interval, "Received Hello");

        let (outbound, outbound_rx) = mpsc::channel(64);
        let mut writer = tokio::spawn(write_frames(sink, outbound_rx));

        let acked = Arc::new(AtomicBool::new(true));
        let (zombie_tx, zombie_rx) = oneshot::channel();
        let heartbeat = tokio::spawn(
            Heartbeat {
                interval,
                session: self.shared.session.clone(),
                acked: acked.clone(),
                outbound: outbound.clone(),
                zombie: zombie_tx,
                counters: self.shared.counters.clone(),
            }
            .run(),
        );

        let handshake = self.handshake(resuming)?;
        if outbound.send(Outbound::Frame(handshake)).await.is_err() {
            tracing::debug!("Writer closed before handshake");
        }

        let outcome = self.event_loop(&mut reader, &outbound, &acked, zombie_rx).await;

        heartbeat.abort();
        let close = match outcome {
            Ok(Outcome::Resume) => Some(RESUMABLE_CLOSE),
            Ok(Outcome::Reidentify | Outcome::Shutdown) => Some(NORMAL_CLOSE),
            Err(_) => None,
        };
        if let Some(code) = close {
            let _ = outbound.send(Outbound::Close(code)).await;
        }
        drop(outbound);
        tokio::select! {
            _ = &mut writer => {}
            () = tokio::time::sleep(WRITER_FLUSH) => writer.abort(),
        }

        outcome
    }

    /// Build Identify or Resume and update status to match
    fn handshake(&self, resuming: bool) -> Result<GatewayMessage, GatewayError> {
        let token = self.options.token.expose().to_string();
        let frame = if resuming {
            let session = self.shared.session.lock().clone();
            tracing::info!(
                session_id = session.session_id().unwrap_or_default(),
                seq = ?session.sequence(),
                "Resuming session"
            );
            GatewayMessage::resume(&ResumePayload {
                token,
                session_id: session.session_id().unwrap_or_default().to_string(),
                seq: session.sequence().unwrap_or(0),
            })?
        } else {
            tracing::info!(intents = self.options.intents.bits(), "Identifying");
            self.shared.counters.identifies.fetch_add(1, Ordering::Relaxed);
            GatewayMessage::identify(&IdentifyPayload {
                token,
                intents: self.options.intents,
                properties: self.options.properties.clone(),
            })?
        };
        self.set_status(if resuming {
            ConnectionStatus::Resuming
        } else {
            ConnectionStatus::Identifying
        });
        Ok(frame)
    }

    async fn event_loop(
        &mut self,
        reader: &mut WsReader,
        outbound: &mpsc::Sender<Outbound>,
        acked: &AtomicBool,
        mut zombie: oneshot::Receiver<()>,
    ) -> Result<Outcome, GatewayError> {
        loop {
            tokio::select! {
                biased;

                () = shutdown_signal(&mut self.shutdown) => {
                    tracing::info!("Closing gateway connection");
                    return Ok(Outcome::Shutdown);
                }

                _ = &mut zombie => {
                    tracing::warn!("Zombie connection, forcing resume");
                    return Ok(Outcome::Resume);
                }

                Some(frame) = next_command(&mut self.unsent, &mut self.commands), if self.established => {
                    tracing::debug!(op = %frame.op, "Sending command");
                    if let Err(mpsc::error::SendError(Outbound::Frame(frame))) =
                        outbound.send(Outbound::Frame(frame)).await
                    {
                        tracing::debug!(op = %frame.op, "Writer closed, command kept for the next session");
                        self.unsent = Some(frame);
                        return Ok(Outcome::Resume);
                    }
                }

                message = reader.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match GatewayMessage::from_json(&text) {
                            Ok(frame) => frame,
                            Err(err) => {
                                tracing::warn!(error = %err, "Dropping malformed frame");
                                continue;
                            }
                        };
                        if let Some(outcome) = self.handle_frame(frame, outbound, acked).await? {
                            return Ok(outcome);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map_or(NORMAL_CLOSE, |f| f.code.into());
                        return close_outcome(code);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "Gateway read failed");
                        return Ok(Outcome::Resume);
                    }
                    None => {
                        tracing::warn!("Gateway stream ended");
                        return Ok(Outcome::Resume);
                    }
                },
            }
        }
    }

    /// Handle one frame. `Some` ends the connection.
    async fn handle_frame(
        &mut self,
        frame: GatewayMessage,
        outbound: &mpsc::Sender<Outbound>,
        acked: &AtomicBool,
    ) -> Result<Option<Outcome>, GatewayError> {
        match frame.op {
            OpCode::Dispatch => {
                self.handle_dispatch(frame)?;
                Ok(None)
            }
            OpCode::Heartbeat => {
                let sequence = self.shared.session.lock().sequence();
                let _ = outbound
                    .send(Outbound::Frame(GatewayMessage::heartbeat(sequence)))
                    .await;
                Ok(None)
            }
            OpCode::HeartbeatAck => {
                acked.store(true, Ordering::Release);
                Ok(None)
            }
            OpCode::Reconnect => {
                tracing::info!("Server requested reconnect");
                Ok(Some(Outcome::Resume))
            }
            OpCode::InvalidSession => {
                let resumable = frame.is_resumable();
                tracing::info!(resumable, "Session invalidated");
                Ok(Some(if resumable {
                    Outcome::Resume
                } else {
                    Outcome::Reidentify
                }))
            }
            op => {
                tracing::debug!(op = %op, "Ignoring unexpected op");
                Ok(None)
            }
        }
    }

    /// Record the sequence, track session state, and forward the event
    fn handle_dispatch(&mut self, frame: GatewayMessage) -> Result<(), GatewayError> {
        let Some(event) = frame.t.clone() else {
            tracing::warn!(seq = ?frame.s, "Dispatch without event name");
            return Ok(());
        };
        if let Some(seq) = frame.s {
            self.shared.session.lock().record_sequence(seq);
        }

        match event.as_str() {
            "READY" => {
                let ready: ReadyPayload = frame.data()?;
                tracing::info!(session_id = %ready.session_id, "Session established");
                self.shared.session.lock().establish(&ready);
                self.established = true;
                self.set_status(ConnectionStatus::Ready);
            }
            "RESUMED" => {
                tracing::info!(seq = ?frame.s, "Session resumed");
                self.shared.counters.resumes.fetch_add(1, Ordering::Relaxed);
                self.established = true;
                self.set_status(ConnectionStatus::Ready);
            }
            _ => {}
        }

        let dispatch = Dispatch {
            event,
            sequence: frame.s,
            data: frame.d,
        };
        if self.events.send(dispatch).is_err() {
            tracing::debug!("Dispatch receiver dropped");
        }
        Ok(())
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.shared.status.send_replace(status);
        if previous != status {
            tracing::debug!(from = %previous, to = %status, "Gateway status changed");
        }
    }
}

/// Append the version query to a gateway URL
fn gateway_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.contains('?') {
        format!("{base}&{GATEWAY_QUERY}")
    } else {
        format!("{base}/?{GATEWAY_QUERY}")
    }
}

/// Map a close code to the next step, or a fatal error
fn close_outcome(code: u16) -> Result<Outcome, GatewayError> {
    match disposition(code) {
        CloseDisposition::Fatal => Err(GatewayError::fatal_close(code)),
        CloseDisposition::Reidentify => {
            tracing::info!(code, "Gateway closed, session discarded");
            Ok(Outcome::Reidentify)
        }
        CloseDisposition::Resume => {
            tracing::warn!(code, "Gateway closed, will resume");
            Ok(Outcome::Resume)
        }
    }
}

/// Read until Hello. A close frame here is classified like any other.
async fn wait_for_hello(reader: &mut WsReader) -> Result<HelloPayload, GatewayError> {
    loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame = GatewayMessage::from_json(&text)?;
                if frame.op == OpCode::Hello {
                    return Ok(frame.data()?);
                }
                tracing::debug!(op = %frame.op, "Ignoring frame before Hello");
            }
            Some(Ok(Message::Close(frame))) => {
                let code = frame.as_ref().map_or(NORMAL_CLOSE, |f| f.code.into());
                close_outcome(code)?;
                return Err(GatewayError::Closed(code));
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(err.into()),
            None => return Err(GatewayError::Protocol("connection closed before Hello".into())),
        }
    }
}

/// Serialize outbound frames onto the socket. A close frame ends the task.
async fn write_frames(mut sink: WsSink, mut outbound: mpsc::Receiver<Outbound>) {
    while let Some(item) = outbound.recv().await {
        let (message, closing) = match item {
            Outbound::Frame(frame) => match frame.to_json() {
                Ok(json) => (Message::Text(json.into()), false),
                Err(err) => {
                    tracing::error!(error = %err, "Failed to encode frame");
                    continue;
                }
            },
            Outbound::Close(code) => (
                Message::Close(Some(CloseFrame {
                    code: code.into(),
                    reason: "".into(),
                })),
                true,
            ),
        };
        if let Err(err) = sink.send(message).await {
            tracing::debug!(error = %err, "Gateway write failed");
            return;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

/// The command left over from a broken session, then the queue
async fn next_command(
    unsent: &mut Option<GatewayMessage>,
    commands: &mut mpsc::UnboundedReceiver<GatewayMessage>,
) -> Option<GatewayMessage> {
    match unsent.take() {
        Some(frame) => Some(frame),
        None => commands.recv().await,
    }
}

/// Resolves once shutdown is requested
async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

async fn until_shutdown<F: std::future::Future>(
    shutdown: &mut watch::Receiver<bool>,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = shutdown_signal(shutdown) => None,
        output = fut => Some(output),
    }
}
