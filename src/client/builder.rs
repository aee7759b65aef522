use crate::client::core::GladiaClient;
use crate::client::options::{ClientOptions, Region};
use crate::resilience::retry::{RetryPolicy, WebSocketRetryPolicy};
use crate::Result;
use std::time::Duration;

/// Builder for [`GladiaClient`].
///
/// ```rust,no_run
/// use gladia_live::client::{GladiaClientBuilder, Region};
///
/// # fn main() -> gladia_live::Result<()> {
/// let client = GladiaClientBuilder::new()
///     .api_key("your-api-key")
///     .region(Region::EuWest)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct GladiaClientBuilder {
    options: ClientOptions,
}

impl GladiaClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from settings read with [`ClientOptions::from_env`].
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            options: ClientOptions::from_env()?,
        })
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.options.api_key = Some(api_key.into());
        self
    }

    /// Base URL of the API. Any of http, https, ws or wss.
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.options.api_url = Some(api_url.into());
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.options.region = Some(region);
        self
    }

    /// Add a default header. `X-GLADIA-VERSION` values accumulate.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let overrides = ClientOptions {
            http_headers: vec![(name.into(), value.into())],
            ..ClientOptions::default()
        };
        self.options = self.options.merge(&overrides);
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let overrides = ClientOptions {
            http_query_params: vec![(key.into(), value.into())],
            ..ClientOptions::default()
        };
        self.options = self.options.merge(&overrides);
        self
    }

    pub fn http_retry(mut self, retry: RetryPolicy) -> Self {
        self.options.http_retry = Some(retry);
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.options.http_timeout = Some(timeout);
        self
    }

    pub fn ws_retry(mut self, retry: WebSocketRetryPolicy) -> Self {
        self.options.ws_retry = Some(retry);
        self
    }

    pub fn ws_timeout(mut self, timeout: Duration) -> Self {
        self.options.ws_timeout = Some(timeout);
        self
    }

    /// Overlay a whole set of options on what was configured so far.
    pub fn options(mut self, overrides: &ClientOptions) -> Self {
        self.options = self.options.merge(overrides);
        self
    }

    /// Validate the options and build the client.
    pub fn build(self) -> Result<GladiaClient> {
        GladiaClient::new(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::options::HEADER_VERSION;

    #[test]
    fn test_builder_accumulates_version_headers() {
        let client = GladiaClientBuilder::new()
            .api_url("http://localhost:1234")
            .header("X-GLADIA-VERSION", "app/1")
            .header("x-gladia-version", "plugin/2")
            .header("X-Trace", "a")
            .header("x-trace", "b")
            .build()
            .unwrap();
        assert_eq!(client.options().header(HEADER_VERSION), Some("app/1 plugin/2"));
        assert_eq!(client.options().header("X-TRACE"), Some("b"));
    }

    #[test]
    fn test_build_validates() {
        assert!(GladiaClientBuilder::new().build().is_err());
        assert!(GladiaClientBuilder::new().api_key("k").build().is_ok());
        assert!(GladiaClientBuilder::new()
            .api_url("gopher://localhost")
            .build()
            .is_err());
    }
}
