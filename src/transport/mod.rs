//! Network transports: a retrying HTTP client and a reconnecting WebSocket session.

pub mod http;
pub mod websocket;

pub use http::{HttpClient, HttpClientConfig, HttpResponse, RequestBody, RequestOptions};
pub use websocket::{
    Frame, WebSocketClient, WebSocketClientConfig, WebSocketSession, WsEvent, WsEvents, WsState,
};

/// Failures below the application protocol.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
