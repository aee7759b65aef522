//! Reconnecting WebSocket session.
//!
//! A [`WebSocketSession`] is one logical stream bound to a URL. It is driven by a
//! tokio task that owns the socket and walks the state machine
//!
//! ```text
//! connecting --(open)--> open --(remote close, retryable, connections left)--> connecting
//! connecting --(error, budget left)--> connecting
//! connecting --(error, budget exhausted | timeout)--> closed
//! open --(remote close, not retryable | connections exhausted)--> closed
//! any --(close())--> closing --> closed
//! ```
//!
//! The handle only enqueues commands; lifecycle and inbound frames come back as
//! [`WsEvent`]s on the receiver returned with the handle. `Close` is always the
//! last event.

use crate::resilience::retry::{Decision, WebSocketRetryPolicy};
use crate::transport::TransportError;
use crate::{Error, ErrorContext, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_NO_STATUS: u16 = 1005;
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code reported when no attempt opened within the configured timeout.
pub const CLOSE_CONNECTION_TIMEOUT: u16 = 3008;

const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Message>;
type SocketStream = SplitStream<Socket>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Application payload of a data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
        }
    }
}

#[derive(Debug)]
pub enum WsEvent {
    /// A physical connection attempt started.
    Connecting { connection: u32, attempt: u32 },
    Open { connection: u32, attempt: u32 },
    Message(Frame),
    /// Connection attempts were exhausted before the socket ever opened.
    Error(Error),
    /// Terminal. No event follows.
    Close { code: u16, reason: String },
}

pub type WsEvents = mpsc::UnboundedReceiver<WsEvent>;

#[derive(Debug, Clone)]
pub struct WebSocketClientConfig {
    pub base_url: Url,
    pub retry: WebSocketRetryPolicy,
    /// Per-attempt connection timeout. Zero disables it.
    pub timeout: Duration,
}

impl WebSocketClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            retry: WebSocketRetryPolicy::ws_default(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_retry(mut self, retry: WebSocketRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Factory for sessions sharing one retry and timeout configuration.
#[derive(Debug, Clone)]
pub struct WebSocketClient {
    config: Arc<WebSocketClientConfig>,
}

impl WebSocketClient {
    pub fn new(config: WebSocketClientConfig) -> Self {
        if rustls::crypto::CryptoProvider::get_default().is_none() {
            // Another thread may win the race; either provider is fine.
            let _ = rustls::crypto::ring::default_provider().install_default();
        }
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &WebSocketClientConfig {
        &self.config
    }

    /// Start a session for `url`, resolved against the base URL.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create_session(&self, url: &str) -> Result<(WebSocketSession, WsEvents)> {
        let url = self.config.base_url.join(url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid WebSocket URL: {}", e),
                ErrorContext::new()
                    .with_field_path("url")
                    .with_details(url.to_string())
                    .with_source("websocket_client"),
            )
        })?;
        Ok(WebSocketSession::spawn(
            url,
            self.config.retry.clone(),
            self.config.timeout,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Closure {
    code: u16,
    reason: String,
}

impl Closure {
    fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    fn from_frame(frame: Option<&CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self::new(u16::from(frame.code), frame.reason.to_string()),
            None => Self::new(CLOSE_NO_STATUS, ""),
        }
    }
}

enum Command {
    /// A frame, optionally bound to one logical connection.
    Send(Message, Option<u32>),
    Close(Closure),
}

enum Ended {
    Manual(Closure),
    Remote(Closure),
}

/// Handle to one logical WebSocket stream.
///
/// Dropping the handle closes the session with code 1000.
#[derive(Debug)]
pub struct WebSocketSession {
    url: Url,
    state: watch::Receiver<WsState>,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Send(_, connection) => write!(f, "Send({:?})", connection),
            Command::Close(c) => write!(f, "Close({})", c.code),
        }
    }
}

impl WebSocketSession {
    fn spawn(url: Url, retry: WebSocketRetryPolicy, timeout: Duration) -> (Self, WsEvents) {
        let (state_tx, state_rx) = watch::channel(WsState::Connecting);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            url: url.clone(),
            retry,
            timeout,
            state: state_tx,
            commands: command_rx,
            events: event_tx,
            connection_count: 0,
            connection_attempt: 0,
        };
        tokio::spawn(driver.run());

        (
            Self {
                url,
                state: state_rx,
                commands: command_tx,
            },
            event_rx,
        )
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn ready_state(&self) -> WsState {
        *self.state.borrow()
    }

    /// Queue a frame for the open socket.
    ///
    /// Fails with [`Error::Usage`] unless the session is open.
    pub fn send(&self, frame: Frame) -> Result<()> {
        if self.ready_state() != WsState::Open {
            return Err(Error::usage("WebSocket is not open"));
        }
        self.commands
            .send(Command::Send(frame.into(), None))
            .map_err(|_| Error::usage("WebSocket is not open"))
    }

    /// Queue a frame for logical connection `connection` only.
    ///
    /// The frame is dropped if that connection closed before it was written,
    /// even when a later connection is already open.
    pub fn send_to(&self, connection: u32, frame: Frame) -> Result<()> {
        if self.ready_state() != WsState::Open {
            return Err(Error::usage("WebSocket is not open"));
        }
        self.commands
            .send(Command::Send(frame.into(), Some(connection)))
            .map_err(|_| Error::usage("WebSocket is not open"))
    }

    /// Close the session for good. A no-op once closing or closed.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        if matches!(self.ready_state(), WsState::Closing | WsState::Closed) {
            return;
        }
        let _ = self
            .commands
            .send(Command::Close(Closure::new(code, reason)));
    }

    /// Resolve once the session reached `Closed`.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == WsState::Closed).await;
    }
}

struct Driver {
    url: Url,
    retry: WebSocketRetryPolicy,
    timeout: Duration,
    state: watch::Sender<WsState>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<WsEvent>,
    connection_count: u32,
    connection_attempt: u32,
}

impl Driver {
    async fn run(mut self) {
        let closure = self.drive().await;
        self.state.send_replace(WsState::Closed);
        info!(
            url = %self.url,
            code = closure.code,
            reason = %closure.reason,
            connections = self.connection_count,
            "WebSocket session closed"
        );
        self.emit(WsEvent::Close {
            code: closure.code,
            reason: closure.reason,
        });
    }

    /// Run logical connections until one ends terminally.
    async fn drive(&mut self) -> Closure {
        loop {
            self.connection_count += 1;
            self.connection_attempt = 0;

            let socket = match self.open().await {
                Ok(socket) => socket,
                Err(closure) => return closure,
            };
            let closure = match self.pump(socket).await {
                Ended::Manual(closure) => return closure,
                Ended::Remote(closure) => closure,
            };

            if self.retry.connections_exhausted(self.connection_count) {
                info!(
                    code = closure.code,
                    connections = self.connection_count,
                    "WebSocket connection budget exhausted"
                );
                return closure;
            }
            // The per-connection budget is fresh after an open; only the code counts.
            let policy = &self.retry.per_connection;
            if !policy.matches(closure.code) {
                return closure;
            }

            let delay = policy.compute_delay(1);
            self.state.send_replace(WsState::Connecting);
            info!(
                code = closure.code,
                reason = %closure.reason,
                delay_ms = delay.as_millis() as u64,
                "WebSocket closed with a retryable code, reconnecting"
            );
            if let Err(closure) = self.pause(delay).await {
                return closure;
            }
        }
    }

    /// Physical attempts of the current logical connection.
    async fn open(&mut self) -> std::result::Result<Socket, Closure> {
        loop {
            self.connection_attempt += 1;
            let connection = self.connection_count;
            let attempt = self.connection_attempt;
            self.state.send_replace(WsState::Connecting);
            debug!(url = %self.url, connection, attempt, "WebSocket connecting");
            self.emit(WsEvent::Connecting { connection, attempt });

            let connect = connect_async(self.url.as_str().to_owned());
            tokio::pin!(connect);
            let deadline = deadline(self.timeout);
            tokio::pin!(deadline);

            let result = loop {
                tokio::select! {
                    biased;
                    command = self.commands.recv() => {
                        if let Some(closure) = self.idle_command(command) {
                            return Err(closure);
                        }
                    }
                    _ = &mut deadline => {
                        warn!(
                            url = %self.url,
                            connection,
                            attempt,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "WebSocket connection timed out"
                        );
                        self.state.send_replace(WsState::Closing);
                        return Err(Closure::new(
                            CLOSE_CONNECTION_TIMEOUT,
                            "WebSocket connection timeout",
                        ));
                    }
                    result = &mut connect => break result,
                }
            };

            match result {
                Ok((socket, _response)) => {
                    self.state.send_replace(WsState::Open);
                    info!(url = %self.url, connection, attempt, "WebSocket open");
                    self.emit(WsEvent::Open { connection, attempt });
                    self.connection_attempt = 0;
                    return Ok(socket);
                }
                Err(err) => match self.retry.per_connection.decide(attempt, true) {
                    Decision::Retry { delay } => {
                        warn!(
                            connection,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "WebSocket connection attempt failed, retrying"
                        );
                        self.pause(delay).await?;
                    }
                    Decision::Fail => {
                        warn!(
                            connection,
                            attempt,
                            error = %err,
                            "WebSocket connection failed, attempts exhausted"
                        );
                        self.emit(WsEvent::Error(Error::Transport(TransportError::WebSocket(err))));
                        return Err(Closure::new(CLOSE_ABNORMAL, "WebSocket connection error"));
                    }
                },
            }
        }
    }

    /// Forward frames both ways until either side closes.
    async fn pump(&mut self, socket: Socket) -> Ended {
        let (mut sink, mut stream) = socket.split();
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send(_, Some(target))) if target != self.connection_count => {
                        debug!(
                            target,
                            connection = self.connection_count,
                            "dropping frame for a previous connection"
                        );
                    }
                    Some(Command::Send(message, _)) => {
                        if let Err(err) = sink.send(message).await {
                            warn!(error = %err, "WebSocket send failed");
                        }
                    }
                    Some(Command::Close(closure)) => {
                        return Ended::Manual(self.shutdown(sink, stream, closure).await);
                    }
                    None => {
                        let closure = Closure::new(CLOSE_NORMAL, "WebSocket session dropped");
                        return Ended::Manual(self.shutdown(sink, stream, closure).await);
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.emit(WsEvent::Message(Frame::Text(text))),
                    Some(Ok(Message::Binary(data))) => self.emit(WsEvent::Message(Frame::Binary(data))),
                    Some(Ok(Message::Close(frame))) => {
                        let closure = Closure::from_frame(frame.as_ref());
                        debug!(code = closure.code, reason = %closure.reason, "WebSocket close frame received");
                        // Flush the close reply queued by tungstenite.
                        let _ = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, sink.close()).await;
                        return Ended::Remote(closure);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "WebSocket read failed");
                        return Ended::Remote(Closure::new(CLOSE_ABNORMAL, err.to_string()));
                    }
                    None => {
                        return Ended::Remote(Closure::new(
                            CLOSE_ABNORMAL,
                            "connection closed without a close frame",
                        ));
                    }
                },
            }
        }
    }

    async fn shutdown(
        &self,
        mut sink: SocketSink,
        mut stream: SocketStream,
        closure: Closure,
    ) -> Closure {
        self.state.send_replace(WsState::Closing);
        debug!(code = closure.code, reason = %closure.reason, "WebSocket closing");
        let frame = CloseFrame {
            code: CloseCode::from(closure.code),
            reason: Cow::Owned(closure.reason.clone()),
        };
        let handshake = async {
            if let Err(err) = sink.send(Message::Close(Some(frame))).await {
                debug!(error = %err, "close frame not sent");
                return;
            }
            while let Some(message) = stream.next().await {
                if matches!(message, Ok(Message::Close(_)) | Err(_)) {
                    break;
                }
            }
        };
        if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, handshake)
            .await
            .is_err()
        {
            warn!(code = closure.code, "peer did not acknowledge the close frame");
        }
        closure
    }

    /// Wait out a backoff delay. A close request cuts it short.
    async fn pause(&mut self, delay: Duration) -> std::result::Result<(), Closure> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => {
                    if let Some(closure) = self.idle_command(command) {
                        return Err(closure);
                    }
                }
                _ = &mut sleep => return Ok(()),
            }
        }
    }

    /// Handle a command received while no socket is open.
    fn idle_command(&self, command: Option<Command>) -> Option<Closure> {
        match command {
            Some(Command::Send(..)) => {
                debug!("dropping frame queued while the socket is not open");
                None
            }
            Some(Command::Close(closure)) => {
                self.state.send_replace(WsState::Closing);
                Some(closure)
            }
            None => {
                self.state.send_replace(WsState::Closing);
                Some(Closure::new(CLOSE_NORMAL, "WebSocket session dropped"))
            }
        }
    }

    fn emit(&self, event: WsEvent) {
        let _ = self.events.send(event);
    }
}

async fn deadline(timeout: Duration) {
    if timeout.is_zero() {
        std::future::pending::<()>().await
    } else {
        tokio::time::sleep(timeout).await
    }
}
