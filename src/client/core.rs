use crate::client::options::ClientOptions;
use crate::live::LiveV2Client;
use crate::transport::{HttpClient, WebSocketClient};
use crate::Result;
use tracing::debug;

/// Entry point of the API.
///
/// Holds validated [`ClientOptions`]; each API surface is built from them on
/// demand, optionally with per-surface overrides.
#[derive(Debug, Clone)]
pub struct GladiaClient {
    options: ClientOptions,
}

impl GladiaClient {
    /// Validate `options` and keep them for later surfaces.
    pub fn new(options: ClientOptions) -> Result<Self> {
        options.resolve()?;
        Ok(Self { options })
    }

    pub fn builder() -> crate::client::GladiaClientBuilder {
        crate::client::GladiaClientBuilder::new()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Live v2 client with the client options.
    pub fn live_v2(&self) -> Result<LiveV2Client> {
        self.live_v2_with(&ClientOptions::default())
    }

    /// Live v2 client with `overrides` applied on top of the client options.
    pub fn live_v2_with(&self, overrides: &ClientOptions) -> Result<LiveV2Client> {
        let resolved = self.options.merge(overrides).resolve()?;
        debug!(
            http_base_url = %resolved.http.base_url,
            ws_base_url = %resolved.ws.base_url,
            "building live v2 client"
        );
        let http = HttpClient::new(resolved.http)?;
        let ws = WebSocketClient::new(resolved.ws);
        Ok(LiveV2Client::new(http, ws))
    }
}
