use crate::live::session::LiveV2Session;
use crate::transport::{HttpClient, WebSocketClient};
use crate::types::init::LiveV2InitRequest;
use std::sync::Arc;

/// Entry point of the live v2 API.
///
/// Cheap to clone; sessions started from one client share its HTTP connection
/// pool and retry configuration.
#[derive(Clone)]
pub struct LiveV2Client {
    http: Arc<HttpClient>,
    ws: Arc<WebSocketClient>,
}

impl LiveV2Client {
    pub fn new(http: HttpClient, ws: WebSocketClient) -> Self {
        Self::from_parts(Arc::new(http), Arc::new(ws))
    }

    pub fn from_parts(http: Arc<HttpClient>, ws: Arc<WebSocketClient>) -> Self {
        Self { http, ws }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn websocket(&self) -> &WebSocketClient {
        &self.ws
    }

    /// Create a session and start streaming as soon as it is ready.
    ///
    /// Returns immediately; creation and connection progress are reported as
    /// events on the returned session. Must be called from within a tokio runtime.
    pub fn start_session(&self, init: LiveV2InitRequest) -> LiveV2Session {
        LiveV2Session::start(init, self.http.clone(), self.ws.clone())
    }
}

impl std::fmt::Debug for LiveV2Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveV2Client")
            .field("http_base_url", &self.http.config().base_url.as_str())
            .field("ws_base_url", &self.ws.config().base_url.as_str())
            .finish()
    }
}
