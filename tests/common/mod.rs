//! Shared fixtures: a scripted HTTP responder, a scripted WebSocket server and
//! test logging.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Surface library logs with `RUST_LOG=gladia_live=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(10);

/// A local port with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// One scripted HTTP answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, String),
    Text(u16, String),
    /// Read the request and never answer.
    Stall,
}

/// HTTP/1.1 server answering each connection with the next scripted reply.
///
/// Once the script is exhausted the last reply repeats. Every response closes
/// its connection, so one request maps to one connection.
pub struct ScriptedHttp {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedHttp {
    pub async fn start(script: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(VecDeque::from(script)));

        let (hits_task, requests_task) = (hits.clone(), requests.clone());
        tokio::spawn(async move {
            let mut last = Reply::Text(500, "script exhausted".into());
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                hits_task.fetch_add(1, Ordering::SeqCst);
                let reply = {
                    let mut script = script.lock().unwrap();
                    match script.pop_front() {
                        Some(reply) => {
                            last = reply.clone();
                            reply
                        }
                        None => last.clone(),
                    }
                };
                let requests = requests_task.clone();
                tokio::spawn(serve_http(stream, reply, requests));
            }
        });

        Self {
            addr,
            hits,
            requests,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Raw request heads and bodies, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve_http(mut stream: TcpStream, reply: Reply, requests: Arc<Mutex<Vec<String>>>) {
    let request = read_request(&mut stream).await;
    requests.lock().unwrap().push(request);

    let (status, content_type, body) = match reply {
        Reply::Json(status, body) => (status, "application/json", body),
        Reply::Text(status, body) => (status, "text/plain", body),
        Reply::Stall => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return;
        }
    };
    let response = format!(
        "HTTP/1.1 {} Status\r\ncontent-type: {}\r\ncontent-length: {}\r\nx-aipi-call-id: call-{}\r\nconnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        status,
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            break;
        };
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&data);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= head_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// One step of a scripted WebSocket connection.
#[derive(Debug, Clone)]
pub enum WsStep {
    Send(String),
    /// Wait until a binary frame arrives.
    ExpectBinary,
    /// Wait until a text frame arrives.
    ExpectText,
    Sleep(Duration),
    /// Send a close frame and wait for the client's reply.
    Close(u16, &'static str),
    /// Drop the TCP connection without a close frame.
    Drop,
}

/// Frame received by the server, tagged with its 1-based connection index.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Text(usize, String),
    Binary(usize, Vec<u8>),
    Close(usize, Option<u16>),
}

/// WebSocket server running one script per accepted connection.
///
/// Connections past the end of the scripts just read until the client leaves.
pub struct ScriptedWs {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Received>>>,
}

impl ScriptedWs {
    pub async fn start(scripts: Vec<Vec<WsStep>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let scripts = Arc::new(scripts);

        let (connections_task, received_task) = (connections.clone(), received.clone());
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let index = connections_task.fetch_add(1, Ordering::SeqCst) + 1;
                let script = scripts.get(index - 1).cloned().unwrap_or_default();
                tokio::spawn(serve_ws(stream, index, script, received_task.clone()));
            }
        });

        Self {
            addr,
            connections,
            received,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    /// All binary payloads received on `connection`, concatenated.
    pub fn audio_on(&self, connection: usize) -> Vec<u8> {
        self.received()
            .into_iter()
            .filter_map(|r| match r {
                Received::Binary(c, data) if c == connection => Some(data),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn texts_on(&self, connection: usize) -> Vec<String> {
        self.received()
            .into_iter()
            .filter_map(|r| match r {
                Received::Text(c, text) if c == connection => Some(text),
                _ => None,
            })
            .collect()
    }
}

async fn serve_ws(
    stream: TcpStream,
    index: usize,
    script: Vec<WsStep>,
    received: Arc<Mutex<Vec<Received>>>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let record = |message: &Message| {
        let entry = match message {
            Message::Text(text) => Received::Text(index, text.to_string()),
            Message::Binary(data) => Received::Binary(index, data.to_vec()),
            Message::Close(frame) => Received::Close(index, frame.as_ref().map(|f| u16::from(f.code))),
            _ => return,
        };
        received.lock().unwrap().push(entry);
    };

    for step in script {
        match step {
            WsStep::Send(text) => {
                if ws.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            WsStep::ExpectBinary | WsStep::ExpectText => loop {
                match ws.next().await {
                    Some(Ok(message)) => {
                        record(&message);
                        let done = match (&step, &message) {
                            (WsStep::ExpectBinary, Message::Binary(_)) => true,
                            (WsStep::ExpectText, Message::Text(_)) => true,
                            (_, Message::Close(_)) => {
                                let _ = ws.flush().await;
                                return;
                            }
                            _ => false,
                        };
                        if done {
                            break;
                        }
                    }
                    _ => return,
                }
            },
            WsStep::Sleep(duration) => tokio::time::sleep(duration).await,
            WsStep::Close(code, reason) => {
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                };
                let _ = ws.close(Some(frame)).await;
                while let Some(Ok(message)) = ws.next().await {
                    record(&message);
                }
                return;
            }
            WsStep::Drop => return,
        }
    }

    while let Some(Ok(message)) = ws.next().await {
        record(&message);
    }
}

/// Server message acknowledging audio up to `byte_end`.
pub fn ack(byte_start: u64, byte_end: u64) -> String {
    format!(
        r#"{{"type":"audio_chunk","session_id":"sess","created_at":"2024-01-01T00:00:00Z","acknowledged":true,"data":{{"byte_range":[{},{}],"time_range":[0.0,0.1]}}}}"#,
        byte_start, byte_end
    )
}

pub fn transcript(text: &str, is_final: bool) -> String {
    format!(
        r#"{{"type":"transcript","session_id":"sess","created_at":"2024-01-01T00:00:00Z","data":{{"id":"00_00000000","is_final":{},"utterance":{{"start":0.0,"end":1.0,"confidence":0.9,"channel":0,"words":[],"text":"{}","language":"en"}}}}}}"#,
        is_final, text
    )
}

pub fn stop_recording_ack() -> String {
    r#"{"type":"stop_recording","session_id":"sess","created_at":"2024-01-01T00:00:00Z","acknowledged":true,"data":{"recording_duration":1.0,"recording_left_to_process":0.0}}"#.to_string()
}

/// `POST /v2/live` response pointing at `ws_url`.
pub fn init_response(ws_url: &str) -> String {
    format!(
        r#"{{"id":"sess","created_at":"2024-01-01T00:00:00Z","url":"{}/v2/live?token=abc"}}"#,
        ws_url
    )
}
