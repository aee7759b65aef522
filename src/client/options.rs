//! Client configuration: optional settings, their merge, and resolution into
//! transport configurations.

use crate::resilience::retry::{RetryPolicy, WebSocketRetryPolicy};
use crate::transport::{HttpClientConfig, WebSocketClientConfig};
use crate::{Error, ErrorContext, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.gladia.io";
pub const HEADER_API_KEY: &str = "x-gladia-key";
pub const HEADER_ORIGIN: &str = "x-gladia-origin";
pub const HEADER_VERSION: &str = "x-gladia-version";

const ORIGIN: &str = "sdk/rust";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Version token appended to `X-GLADIA-VERSION`.
pub fn sdk_version() -> String {
    format!("SdkRust/{}", env!("CARGO_PKG_VERSION"))
}

/// Processing region, sent as the `region` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    EuWest,
    UsWest,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::EuWest => "eu-west",
            Region::UsWest => "us-west",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eu-west" => Ok(Region::EuWest),
            "us-west" => Ok(Region::UsWest),
            other => Err(Error::configuration_with_context(
                format!("unknown region {:?}", other),
                ErrorContext::new()
                    .with_field_path("region")
                    .with_details("expected eu-west or us-west"),
            )),
        }
    }
}

/// Client settings. Every field is optional; unset fields fall back to the
/// defaults when the options are resolved.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub region: Option<Region>,
    /// Extra HTTP headers. Names compare case-insensitively.
    pub http_headers: Vec<(String, String)>,
    pub http_query_params: Vec<(String, String)>,
    pub http_retry: Option<RetryPolicy>,
    /// Per-attempt HTTP timeout. Zero disables it.
    pub http_timeout: Option<Duration>,
    pub ws_retry: Option<WebSocketRetryPolicy>,
    /// Per-attempt connection timeout. Zero disables it.
    pub ws_timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from `GLADIA_*` environment variables.
    ///
    /// - `GLADIA_API_KEY`
    /// - `GLADIA_API_URL`
    /// - `GLADIA_REGION` (`eu-west` or `us-west`)
    /// - `GLADIA_HTTP_TIMEOUT_MS`
    /// - `GLADIA_WS_TIMEOUT_MS`
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Ok(Self {
            api_key: var("GLADIA_API_KEY"),
            api_url: var("GLADIA_API_URL"),
            region: var("GLADIA_REGION").map(|r| r.parse()).transpose()?,
            http_timeout: var("GLADIA_HTTP_TIMEOUT_MS")
                .map(|v| parse_millis("GLADIA_HTTP_TIMEOUT_MS", &v))
                .transpose()?,
            ws_timeout: var("GLADIA_WS_TIMEOUT_MS")
                .map(|v| parse_millis("GLADIA_WS_TIMEOUT_MS", &v))
                .transpose()?,
            ..Self::default()
        })
    }

    /// `self` overlaid with `overrides`.
    ///
    /// Set scalar fields of `overrides` win. Headers and query parameters merge
    /// key by key with `overrides` winning, except `X-GLADIA-VERSION` whose
    /// values are joined with a space in application order.
    pub fn merge(&self, overrides: &ClientOptions) -> ClientOptions {
        let mut http_headers = self.http_headers.clone();
        for (name, value) in &overrides.http_headers {
            set_header(&mut http_headers, name, value);
        }
        let mut http_query_params = self.http_query_params.clone();
        for (key, value) in &overrides.http_query_params {
            set_param(&mut http_query_params, key, value);
        }

        ClientOptions {
            api_key: overrides.api_key.clone().or_else(|| self.api_key.clone()),
            api_url: overrides.api_url.clone().or_else(|| self.api_url.clone()),
            region: overrides.region.or(self.region),
            http_headers,
            http_query_params,
            http_retry: overrides
                .http_retry
                .clone()
                .or_else(|| self.http_retry.clone()),
            http_timeout: overrides.http_timeout.or(self.http_timeout),
            ws_retry: overrides.ws_retry.clone().or_else(|| self.ws_retry.clone()),
            ws_timeout: overrides.ws_timeout.or(self.ws_timeout),
        }
    }

    /// Value of a header, by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.http_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Validate and apply defaults.
    pub fn resolve(&self) -> Result<ResolvedOptions> {
        let api_url = self.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        let base = Url::parse(api_url).map_err(|e| {
            config_error(
                format!("invalid api url: {}", e),
                "api_url",
                api_url.to_string(),
            )
        })?;
        if !matches!(base.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(config_error(
                format!("unsupported api url scheme {:?}", base.scheme()),
                "api_url",
                "expected http, https, ws or wss",
            ));
        }
        if self.api_key.is_none() && is_gladia_host(&base) {
            return Err(config_error(
                "an api key is required to reach the Gladia API",
                "api_key",
                "set it on the client or through GLADIA_API_KEY",
            ));
        }

        let http_base = with_scheme(&base, http_scheme(base.scheme()))?;
        let ws_base = with_scheme(&base, ws_scheme(base.scheme()))?;

        let mut query_params = Vec::new();
        if let Some(region) = self.region {
            query_params.push(("region".to_string(), region.as_str().to_string()));
        }
        for (key, value) in &self.http_query_params {
            set_param(&mut query_params, key, value);
        }

        let mut http = HttpClientConfig::new(http_base)
            .with_headers(self.header_map()?)
            .with_retry(self.http_retry.clone().unwrap_or_default())
            .with_timeout(self.http_timeout.unwrap_or(DEFAULT_TIMEOUT));
        http.query_params = query_params;

        let ws = WebSocketClientConfig::new(ws_base)
            .with_retry(self.ws_retry.clone().unwrap_or_default())
            .with_timeout(self.ws_timeout.unwrap_or(DEFAULT_TIMEOUT));

        Ok(ResolvedOptions { http, ws })
    }

    /// Default headers, then caller headers, then the api key, then the SDK
    /// version appended to any caller-supplied version.
    fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = vec![(HEADER_ORIGIN.to_string(), ORIGIN.to_string())];
        for (name, value) in &self.http_headers {
            set_header(&mut headers, name, value);
        }
        if let Some(key) = &self.api_key {
            set_header(&mut headers, HEADER_API_KEY, key);
        }
        set_header(&mut headers, HEADER_VERSION, &sdk_version());

        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                config_error(format!("invalid header name: {}", e), "http_headers", name.clone())
            })?;
            let value = HeaderValue::from_str(&value).map_err(|e| {
                config_error(
                    format!("invalid value for header {}: {}", name, e),
                    "http_headers",
                    name.clone(),
                )
            })?;
            map.insert(header, value);
        }
        Ok(map)
    }
}

/// Options with defaults applied, ready to build transports.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub http: HttpClientConfig,
    pub ws: WebSocketClientConfig,
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
        Some((_, existing)) if name.eq_ignore_ascii_case(HEADER_VERSION) => {
            if existing.is_empty() {
                *existing = value.to_string();
            } else if !value.is_empty() {
                existing.push(' ');
                existing.push_str(value);
            }
        }
        Some((_, existing)) => *existing = value.to_string(),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

fn set_param(params: &mut Vec<(String, String)>, key: &str, value: &str) {
    match params.iter_mut().find(|(k, _)| k == key) {
        Some((_, existing)) => *existing = value.to_string(),
        None => params.push((key.to_string(), value.to_string())),
    }
}

fn is_gladia_host(url: &Url) -> bool {
    url.host_str()
        .map(|host| host == "gladia.io" || host.ends_with(".gladia.io"))
        .unwrap_or(false)
}

fn http_scheme(scheme: &str) -> &'static str {
    match scheme {
        "ws" | "http" => "http",
        _ => "https",
    }
}

fn ws_scheme(scheme: &str) -> &'static str {
    match scheme {
        "ws" | "http" => "ws",
        _ => "wss",
    }
}

fn with_scheme(base: &Url, scheme: &str) -> Result<Url> {
    let mut url = base.clone();
    url.set_scheme(scheme).map_err(|_| {
        config_error(
            format!("cannot use scheme {} for {}", scheme, base),
            "api_url",
            base.to_string(),
        )
    })?;
    Ok(url)
}

fn parse_millis(name: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| config_error(format!("invalid {}: {}", name, e), name, value.to_string()))
}

fn config_error(message: impl Into<String>, field: &str, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("client_options"),
    )
}
