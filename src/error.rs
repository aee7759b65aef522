use crate::transport::TransportError;
use serde_json::Value;
use thiserror::Error;

/// Structured error context for configuration and usage failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Option key that caused the error (e.g., "api_url", "http_headers.X-GLADIA-VERSION")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., the rejected value)
    pub details: Option<String>,
    /// Component that produced the error (e.g., "client_options")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Response body attached to an [`HttpError`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            ResponseBody::Text(_) => None,
        }
    }
}

/// A non-2xx HTTP response, with the diagnostics needed to report it upstream.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpError {
    pub message: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Vendor call id from the `x-aipi-call-id` response header.
    pub id: Option<String>,
    /// `request_id` field of a JSON error body.
    pub request_id: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<ResponseBody>,
}

impl HttpError {
    /// Build the error and its display message.
    ///
    /// The message is `"<reason> | <request id> | <status> | <METHOD> <path>"`, skipping
    /// parts that are unknown. The reason prefers the body's `message` field, then the
    /// status text.
    pub fn new(
        method: &str,
        url: &url::Url,
        status: u16,
        status_text: Option<&str>,
        headers: Vec<(String, String)>,
        body: Option<ResponseBody>,
    ) -> Self {
        let id = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("x-aipi-call-id"))
            .map(|(_, v)| v.clone());
        let json = body.as_ref().and_then(ResponseBody::as_json);
        let request_id = json
            .and_then(|v| v.get("request_id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let body_message = json
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());

        let mut parts: Vec<String> = vec![body_message
            .or(status_text.filter(|s| !s.is_empty()))
            .unwrap_or("An error occurred")
            .to_string()];
        if let Some(rid) = request_id.as_ref().or(id.as_ref()) {
            parts.push(rid.clone());
        }
        parts.push(status.to_string());
        parts.push(format!("{} {}", method, url.path()));

        Self {
            message: parts.join(" | "),
            method: method.to_string(),
            url: url.to_string(),
            status,
            id,
            request_id,
            headers,
            body,
        }
    }
}

/// Unified error type for the live transcription client.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Request timed out after {timeout_ms}ms on attempt {attempt} (duration={elapsed_ms}ms) for {method} {url}")]
    Timeout {
        timeout_ms: u64,
        attempt: u32,
        elapsed_ms: u64,
        method: String,
        url: String,
    },

    #[error("Request aborted by the caller after {elapsed_ms}ms for {method} {url}")]
    Aborted {
        elapsed_ms: u64,
        method: String,
        url: String,
    },

    #[error("HTTP request failed after {attempts} attempts over {elapsed_ms}ms for {method} {url}")]
    RetriesExhausted {
        attempts: u32,
        elapsed_ms: u64,
        method: String,
        url: String,
        errors: Vec<Error>,
    },

    #[error("Invalid message received: {message}")]
    Protocol { message: String, raw: String },

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    pub fn protocol(msg: impl Into<String>, raw: impl Into<String>) -> Self {
        Error::Protocol {
            message: msg.into(),
            raw: raw.into(),
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// HTTP status of the failure, looking through an aggregate at its last attempt.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(e) => Some(e.status),
            Error::RetriesExhausted { errors, .. } => errors.last().and_then(Error::status),
            _ => None,
        }
    }

    /// Errors recorded for each failed attempt of an exhausted request.
    pub fn attempt_errors(&self) -> &[Error] {
        match self {
            Error::RetriesExhausted { errors, .. } => errors,
            _ => &[],
        }
    }

    /// True for failures that happened below HTTP (connect, DNS, TLS, socket).
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
