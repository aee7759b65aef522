//! Live transcription session.
//!
//! A [`LiveV2Session`] creates the session over HTTP, streams audio over a
//! reconnecting WebSocket and re-emits every server message as a typed event.
//! All state lives in a driver task; the handle only queues commands, so none of
//! its methods can fail.
//!
//! ```text
//! starting -> started -> connecting <-> connected
//!     \           \          \             /
//!      +-----------+----------+-> ending -> ended
//! ```

use crate::live::buffer::AudioBuffer;
use crate::live::events::{
    self, ConnectionInfo, Emitter, EndingInfo, EventKind, ListenerId, LiveEvent,
};
use crate::transport::websocket::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use crate::transport::{
    Frame, HttpClient, RequestOptions, WebSocketClient, WebSocketSession, WsEvent, WsEvents,
};
use crate::types::init::{LiveV2InitRequest, LiveV2InitResponse};
use crate::types::messages::{LifecycleMessage, LiveV2WebSocketMessage};
use crate::{Error, Result};
use bytes::Bytes;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

const STOP_RECORDING: &str = r#"{"type":"stop_recording"}"#;
const REASON_ENDED_BY_USER: &str = "Session ended by user";
const REASON_START_FAILED: &str = "Couldn't start a new session";
const REASON_HANDLE_DROPPED: &str = "Session handle dropped";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LiveStatus {
    Starting,
    Started,
    Connecting,
    Connected,
    Ending,
    Ended,
}

impl LiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveStatus::Starting => "starting",
            LiveStatus::Started => "started",
            LiveStatus::Connecting => "connecting",
            LiveStatus::Connected => "connected",
            LiveStatus::Ending => "ending",
            LiveStatus::Ended => "ended",
        }
    }

    /// `ending` or `ended`: audio and stop requests are ignored from here on.
    pub fn is_closing(&self) -> bool {
        matches!(self, LiveStatus::Ending | LiveStatus::Ended)
    }
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Command {
    Audio(Bytes),
    StopRecording,
    EndSession,
}

/// Handle to one live transcription session.
///
/// Dropping the handle ends the session with code 1000. Listeners registered
/// through [`on`](Self::on) run on the session's driver task and must not block.
pub struct LiveV2Session {
    correlation_id: Uuid,
    status: watch::Receiver<LiveStatus>,
    created: watch::Receiver<Option<LiveV2InitResponse>>,
    commands: mpsc::UnboundedSender<Command>,
    emitter: Emitter,
}

impl fmt::Debug for LiveV2Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveV2Session")
            .field("correlation_id", &self.correlation_id)
            .field("status", &self.status())
            .field("session_id", &self.session_id())
            .finish()
    }
}

impl LiveV2Session {
    /// Spawn the driver task. Must be called from within a tokio runtime.
    pub(crate) fn start(
        init: LiveV2InitRequest,
        http: Arc<HttpClient>,
        ws: Arc<WebSocketClient>,
    ) -> Self {
        let correlation_id = Uuid::new_v4();
        let (status_tx, status_rx) = watch::channel(LiveStatus::Starting);
        let (created_tx, created_rx) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let emitter = Emitter::new();

        let driver = Driver {
            correlation_id,
            init,
            http,
            ws_client: ws,
            status: status_tx,
            created: created_tx,
            commands: command_rx,
            emitter: emitter.clone(),
            cancel: CancellationToken::new(),
            buffer: AudioBuffer::new(),
            ws: None,
            open_connection: None,
            stop_requested: false,
        };
        let span = info_span!("live_session", correlation_id = %correlation_id);
        tokio::spawn(driver.run().instrument(span));

        Self {
            correlation_id,
            status: status_rx,
            created: created_rx,
            commands: command_tx,
            emitter,
        }
    }

    /// Client-side id of this session, recorded on its log lines.
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn status(&self) -> LiveStatus {
        *self.status.borrow()
    }

    /// Server session id, once the session was created.
    pub fn session_id(&self) -> Option<String> {
        self.created.borrow().as_ref().map(|r| r.id.clone())
    }

    /// Wait for the server session id.
    ///
    /// Fails if the session ends before it was created.
    pub async fn wait_session_id(&self) -> Result<String> {
        let mut created = self.created.clone();
        let response = created
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::usage("live session ended before it was created"))?;
        response
            .as_ref()
            .map(|r| r.id.clone())
            .ok_or_else(|| Error::usage("live session ended before it was created"))
    }

    /// Resolve once the session reached `ended`.
    pub async fn ended(&self) {
        let mut status = self.status.clone();
        let _ = status.wait_for(|s| *s == LiveStatus::Ended).await;
    }

    /// Queue audio for the session. A no-op once ending.
    ///
    /// The bytes are retained until the server acknowledges them and are replayed
    /// on every reconnection.
    pub fn send_audio(&self, chunk: impl AsRef<[u8]>) {
        let chunk = chunk.as_ref();
        if chunk.is_empty() || self.status().is_closing() {
            return;
        }
        let _ = self
            .commands
            .send(Command::Audio(Bytes::copy_from_slice(chunk)));
    }

    /// Ask the server to finish processing and close the session.
    pub fn stop_recording(&self) {
        if self.status().is_closing() {
            return;
        }
        let _ = self.commands.send(Command::StopRecording);
    }

    /// End the session now, dropping any audio not yet processed.
    pub fn end_session(&self) {
        if self.status() == LiveStatus::Ended {
            return;
        }
        let _ = self.commands.send(Command::EndSession);
    }

    pub fn on<E: EventKind>(
        &self,
        callback: impl Fn(&E::Payload) + Send + Sync + 'static,
    ) -> ListenerId {
        self.emitter.on::<E>(callback)
    }

    pub fn once<E: EventKind>(
        &self,
        callback: impl Fn(&E::Payload) + Send + Sync + 'static,
    ) -> ListenerId {
        self.emitter.once::<E>(callback)
    }

    /// Remove a listener. Returns whether it was still registered.
    pub fn off<E: EventKind>(&self, id: ListenerId) -> bool {
        self.emitter.off::<E>(id)
    }

    pub fn remove_all_listeners(&self) {
        self.emitter.remove_all();
    }

    /// Receive lifecycle, message and error events in emission order.
    ///
    /// The receiver yields `None` after [`LiveEvent::Ended`].
    pub fn events(&self) -> mpsc::UnboundedReceiver<LiveEvent> {
        self.emitter.channel()
    }
}

async fn create_session(
    http: Arc<HttpClient>,
    init: LiveV2InitRequest,
    cancel: CancellationToken,
) -> Result<LiveV2InitResponse> {
    let body = serde_json::to_value(init.with_acknowledgments_forced())?;
    http.post("/v2/live", RequestOptions::json(body).cancel(cancel))
        .await?
        .json()
}

struct Driver {
    correlation_id: Uuid,
    init: LiveV2InitRequest,
    http: Arc<HttpClient>,
    ws_client: Arc<WebSocketClient>,
    status: watch::Sender<LiveStatus>,
    created: watch::Sender<Option<LiveV2InitResponse>>,
    commands: mpsc::UnboundedReceiver<Command>,
    emitter: Emitter,
    cancel: CancellationToken,
    buffer: AudioBuffer,
    ws: Option<WebSocketSession>,
    /// Logical connection whose open was handled and which got the replay.
    open_connection: Option<u32>,
    stop_requested: bool,
}

impl Driver {
    async fn run(mut self) {
        info!("live session starting");
        let create = create_session(self.http.clone(), self.init.clone(), self.cancel.clone());
        tokio::pin!(create);

        let created = loop {
            tokio::select! {
                result = &mut create => break result,
                command = self.commands.recv() => {
                    if self.command(command).is_break() {
                        return;
                    }
                }
            }
        };

        let socket_events = match created.and_then(|response| self.connect(response)) {
            Ok(socket_events) => socket_events,
            Err(err) => {
                warn!(error = %err, "live session could not be started");
                self.emitter.emit::<events::Error>(&Arc::new(err));
                self.destroy(CLOSE_ABNORMAL, Some(REASON_START_FAILED.to_string()));
                return;
            }
        };
        self.pump(socket_events).await;
    }

    /// Publish the created session and open its socket.
    fn connect(&mut self, response: LiveV2InitResponse) -> Result<WsEvents> {
        info!(session_id = %response.id, "live session created");
        self.created.send_replace(Some(response.clone()));
        self.transition(LiveStatus::Started);
        self.emitter.emit::<events::Started>(&response);

        if self.init.wants_lifecycle_events() {
            self.emitter
                .emit_message(&LiveV2WebSocketMessage::StartSession(LifecycleMessage {
                    session_id: response.id.clone(),
                    created_at: response.created_at.clone(),
                }));
        }

        let (ws, events) = self.ws_client.create_session(&response.url)?;
        self.ws = Some(ws);
        Ok(events)
    }

    async fn pump(&mut self, mut socket_events: WsEvents) {
        loop {
            let flow = tokio::select! {
                command = self.commands.recv() => self.command(command),
                event = socket_events.recv() => match event {
                    Some(event) => self.socket_event(event),
                    None => {
                        self.destroy(CLOSE_ABNORMAL, Some("WebSocket session lost".to_string()));
                        ControlFlow::Break(())
                    }
                },
            };
            if flow.is_break() {
                return;
            }
        }
    }

    fn command(&mut self, command: Option<Command>) -> ControlFlow<()> {
        match command {
            Some(Command::Audio(chunk)) => {
                if !self.is_closing() {
                    self.buffer.push(&chunk);
                    self.send(Frame::Binary(chunk.to_vec()));
                }
                ControlFlow::Continue(())
            }
            Some(Command::StopRecording) => {
                if !self.is_closing() {
                    info!(buffered = self.buffer.len(), "stop recording requested");
                    self.begin_ending(CLOSE_NORMAL, None);
                    self.stop_requested = true;
                    self.send(Frame::Text(STOP_RECORDING.to_string()));
                }
                ControlFlow::Continue(())
            }
            Some(Command::EndSession) => {
                self.destroy(CLOSE_NORMAL, Some(REASON_ENDED_BY_USER.to_string()));
                ControlFlow::Break(())
            }
            None => {
                self.destroy(CLOSE_NORMAL, Some(REASON_HANDLE_DROPPED.to_string()));
                ControlFlow::Break(())
            }
        }
    }

    fn socket_event(&mut self, event: WsEvent) -> ControlFlow<()> {
        match event {
            WsEvent::Connecting { connection, attempt } => {
                self.open_connection = None;
                self.transition(LiveStatus::Connecting);
                self.emitter
                    .emit::<events::Connecting>(&ConnectionInfo { connection, attempt });
            }
            WsEvent::Open { connection, attempt } => {
                self.open_connection = Some(connection);
                if !self.buffer.is_empty() {
                    debug!(
                        bytes = self.buffer.len(),
                        offset = self.buffer.bytes_sent(),
                        "replaying unacknowledged audio"
                    );
                    self.send(Frame::Binary(self.buffer.pending().to_vec()));
                }
                if self.stop_requested {
                    self.send(Frame::Text(STOP_RECORDING.to_string()));
                }
                self.transition(LiveStatus::Connected);
                self.emitter
                    .emit::<events::Connected>(&ConnectionInfo { connection, attempt });
            }
            WsEvent::Message(Frame::Text(text)) => self.message(&text),
            WsEvent::Message(Frame::Binary(data)) => {
                debug!(bytes = data.len(), "ignoring binary frame from server");
            }
            WsEvent::Error(err) => {
                warn!(error = %err, "WebSocket error");
                self.emitter.emit::<events::Error>(&Arc::new(err));
            }
            WsEvent::Close { code, reason } => {
                self.open_connection = None;
                let reason = (!reason.is_empty()).then_some(reason);
                self.destroy(code, reason);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn message(&mut self, text: &str) {
        let message = match LiveV2WebSocketMessage::from_json(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "invalid message from server");
                self.emitter.emit::<events::Error>(&Arc::new(err));
                return;
            }
        };
        debug!(kind = %message.kind(), "message received");

        if let Some(byte_end) = message.acknowledged_byte_end() {
            self.buffer.acknowledge(byte_end);
        }
        if message.is_acknowledgment() && !self.init.wants_acknowledgments() {
            return;
        }
        self.emitter.emit_message(&message);
    }

    /// Write to the connection that got the replay. Without one the frame
    /// only lives in the buffer until the next open.
    fn send(&self, frame: Frame) {
        let (Some(ws), Some(connection)) = (&self.ws, self.open_connection) else {
            return;
        };
        if let Err(err) = ws.send_to(connection, frame) {
            // The socket closed under us; the next open replays the buffer.
            debug!(error = %err, connection, "frame not sent");
        }
    }

    fn is_closing(&self) -> bool {
        self.status.borrow().is_closing()
    }

    /// Move to `next` unless the session is already ending.
    fn transition(&self, next: LiveStatus) {
        self.status.send_if_modified(|status| {
            if status.is_closing() || *status == next {
                return false;
            }
            debug!(from = %status, to = %next, "live session status");
            *status = next;
            true
        });
    }

    fn begin_ending(&mut self, code: u16, reason: Option<String>) {
        if self.is_closing() {
            return;
        }
        self.status.send_replace(LiveStatus::Ending);
        info!(code, reason = reason.as_deref().unwrap_or(""), "live session ending");
        self.emitter.emit::<events::Ending>(&EndingInfo { code, reason });
    }

    /// Terminal transition. Runs once; the driver stops right after.
    fn destroy(&mut self, code: u16, reason: Option<String>) {
        if *self.status.borrow() == LiveStatus::Ended {
            return;
        }
        self.begin_ending(code, reason.clone());
        self.status.send_replace(LiveStatus::Ended);
        self.cancel.cancel();
        if let Some(ws) = self.ws.take() {
            ws.close(CLOSE_NORMAL, "");
        }
        self.open_connection = None;
        self.buffer.clear();

        info!(
            code,
            reason = reason.as_deref().unwrap_or(""),
            session_id = self.created.borrow().as_ref().map(|r| r.id.as_str()).unwrap_or(""),
            "live session ended"
        );
        self.emitter.emit::<events::Ended>(&EndingInfo { code, reason });
        self.emitter.release();
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.cancel.cancel();
        debug!(correlation_id = %self.correlation_id, "live session driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_order() {
        assert!(LiveStatus::Starting < LiveStatus::Started);
        assert!(LiveStatus::Connected < LiveStatus::Ending);
        assert!(LiveStatus::Ending < LiveStatus::Ended);
        assert!(LiveStatus::Ending.is_closing());
        assert!(!LiveStatus::Connecting.is_closing());
        assert_eq!(LiveStatus::Connected.to_string(), "connected");
    }

    #[test]
    fn test_stop_recording_payload() {
        let value: serde_json::Value = serde_json::from_str(STOP_RECORDING).unwrap();
        assert_eq!(value["type"], "stop_recording");
    }
}
