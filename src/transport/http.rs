use crate::error::{HttpError, ResponseBody};
use crate::resilience::retry::{Decision, RetryPolicy};
use crate::transport::TransportError;
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Static configuration of an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: Url,
    /// Default headers; per-call headers override them key by key.
    pub headers: HeaderMap,
    /// Default query parameters; they only fill keys absent from the request URL.
    pub query_params: Vec<(String, String)>,
    pub retry: RetryPolicy,
    /// Per-attempt timeout. Zero disables it.
    pub timeout: Duration,
}

impl HttpClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            headers: HeaderMap::new(),
            query_params: Vec::new(),
            retry: RetryPolicy::http_default(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    /// Caller cancellation. Cancelling it aborts the request without retry.
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(body: Value) -> Self {
        Self {
            body: Some(RequestBody::Json(body)),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Successful response: decoded JSON when the server declared it, the raw response otherwise.
#[derive(Debug)]
pub enum HttpResponse {
    Json(Value),
    Raw(reqwest::Response),
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            HttpResponse::Json(v) => Ok(serde_json::from_value(v)?),
            HttpResponse::Raw(resp) => Err(Error::protocol(
                format!(
                    "expected a JSON response from {}, got content-type {:?}",
                    resp.url(),
                    resp.headers().get(CONTENT_TYPE)
                ),
                String::new(),
            )),
        }
    }

    pub fn into_raw(self) -> Option<reqwest::Response> {
        match self {
            HttpResponse::Raw(resp) => Some(resp),
            HttpResponse::Json(_) => None,
        }
    }
}

enum Attempt {
    Done(HttpResponse),
    Failed(Error),
    TimedOut,
    Aborted,
}

/// HTTP client with per-attempt timeout, caller cancellation and status-based retry.
pub struct HttpClient {
    client: reqwest::Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::GET, url, options).await
    }

    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::POST, url, options).await
    }

    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::PUT, url, options).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::DELETE, url, options).await
    }

    /// Resolve `url` against the base URL and fill in default query parameters.
    pub fn resolve_url(&self, url: &str) -> Result<Url> {
        let mut resolved = self.config.base_url.join(url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid request URL: {}", e),
                ErrorContext::new()
                    .with_field_path("url")
                    .with_details(url.to_string())
                    .with_source("http_client"),
            )
        })?;
        apply_default_query(&mut resolved, &self.config.query_params);
        Ok(resolved)
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        let url = self.resolve_url(url)?;
        let headers = merge_headers(&self.config.headers, &options.headers);
        let cancel = options.cancel.as_ref();
        let started = Instant::now();
        let mut errors: Vec<Error> = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(aborted(&method, &url, started));
            }

            let outcome = self
                .attempt(&method, &url, &headers, options.body.as_ref(), cancel)
                .await;
            let err = match outcome {
                Attempt::Done(response) => {
                    debug!(
                        method = %method,
                        url = %url,
                        attempt,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "HTTP request succeeded"
                    );
                    return Ok(response);
                }
                Attempt::Aborted => return Err(aborted(&method, &url, started)),
                Attempt::TimedOut => {
                    return Err(Error::Timeout {
                        timeout_ms: self.config.timeout.as_millis() as u64,
                        attempt,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        method: method.to_string(),
                        url: url.to_string(),
                    })
                }
                Attempt::Failed(err) => err,
            };

            let retryable = match &err {
                Error::Http(e) => self.config.retry.matches(e.status),
                _ => true,
            };
            match self.config.retry.decide(attempt, retryable) {
                Decision::Retry { delay } => {
                    warn!(
                        method = %method,
                        url = %url,
                        attempt,
                        http_status = err.status(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "HTTP attempt failed, retrying"
                    );
                    errors.push(err);
                    if !backoff(delay, cancel).await {
                        return Err(aborted(&method, &url, started));
                    }
                }
                Decision::Fail => {
                    if matches!(err, Error::Http(_)) && errors.is_empty() {
                        return Err(err);
                    }
                    errors.push(err);
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        method: method.to_string(),
                        url: url.to_string(),
                        errors,
                    });
                }
            }
        }
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&RequestBody>,
        cancel: Option<&CancellationToken>,
    ) -> Attempt {
        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers.clone());
        builder = match body {
            Some(RequestBody::Json(v)) => builder.json(v),
            Some(RequestBody::Text(s)) => builder.body(s.clone()),
            Some(RequestBody::Bytes(b)) => builder.body(b.clone()),
            None => builder,
        };

        let exchange = async {
            let response = builder
                .send()
                .await
                .map_err(|e| Error::Transport(TransportError::Http(e)))?;
            read_response(method, url, response).await
        };
        let timeout = self.config.timeout;
        let deadline = async move {
            if timeout.is_zero() {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(timeout).await
            }
        };
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Attempt::Aborted,
            _ = deadline => Attempt::TimedOut,
            result = exchange => match result {
                Ok(response) => Attempt::Done(response),
                Err(err) => Attempt::Failed(err),
            },
        }
    }
}

async fn read_response(method: &Method, url: &Url, response: reqwest::Response) -> Result<HttpResponse> {
    let status = response.status();
    if status.is_success() {
        if is_json(response.headers()) {
            let value = response
                .json::<Value>()
                .await
                .map_err(|e| Error::Transport(TransportError::Http(e)))?;
            return Ok(HttpResponse::Json(value));
        }
        return Ok(HttpResponse::Raw(response));
    }

    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response
        .text()
        .await
        .ok()
        .map(|text| match serde_json::from_str::<Value>(&text) {
            Ok(v) => ResponseBody::Json(v),
            Err(_) => ResponseBody::Text(text),
        });
    Err(Error::Http(HttpError::new(
        method.as_str(),
        url,
        status.as_u16(),
        status.canonical_reason(),
        headers,
        body,
    )))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

fn aborted(method: &Method, url: &Url, started: Instant) -> Error {
    Error::Aborted {
        elapsed_ms: started.elapsed().as_millis() as u64,
        method: method.to_string(),
        url: url.to_string(),
    }
}

/// Sleep for `delay`; returns false if the caller cancelled first.
async fn backoff(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        },
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}

/// Merge header maps; keys are case-insensitive and `overrides` replaces every value of a key it sets.
pub fn merge_headers(base: &HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut merged = base.clone();
    for name in overrides.keys() {
        merged.remove(name);
        for value in overrides.get_all(name) {
            merged.append(name.clone(), value.clone());
        }
    }
    merged
}

/// Append each default whose key is absent from the URL's query.
pub fn apply_default_query(url: &mut Url, defaults: &[(String, String)]) {
    let missing: Vec<&(String, String)> = defaults
        .iter()
        .filter(|(key, _)| !url.query_pairs().any(|(existing, _)| existing == key.as_str()))
        .collect();
    if missing.is_empty() {
        return;
    }
    let mut pairs = url.query_pairs_mut();
    for (key, value) in missing {
        pairs.append_pair(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpClient {
        let config = HttpClientConfig::new(Url::parse(base).unwrap())
            .with_query_param("region", "eu-west");
        HttpClient::new(config).unwrap()
    }

    #[test]
    fn test_merge_headers_is_case_insensitive_and_override_wins() {
        let mut base = HeaderMap::new();
        base.insert(
            HeaderName::from_bytes(b"X-Gladia-Origin").unwrap(),
            HeaderValue::from_static("sdk/rust"),
        );
        base.insert("accept", HeaderValue::from_static("application/json"));
        let mut overrides = HeaderMap::new();
        overrides.insert("x-gladia-origin", HeaderValue::from_static("custom"));

        let merged = merge_headers(&base, &overrides);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("X-GLADIA-ORIGIN").unwrap(), "custom");
        assert_eq!(merged.get("accept").unwrap(), "application/json");
    }

    #[test]
    fn test_default_query_fills_only_absent_keys() {
        let mut url = Url::parse("https://api.gladia.io/v2/live?region=us-west").unwrap();
        apply_default_query(
            &mut url,
            &[
                ("region".to_string(), "eu-west".to_string()),
                ("debug".to_string(), "1".to_string()),
            ],
        );
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("region".to_string(), "us-west".to_string()),
                ("debug".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_default_query_leaves_url_untouched_when_nothing_missing() {
        let mut url = Url::parse("https://api.gladia.io/v2/live").unwrap();
        apply_default_query(&mut url, &[]);
        assert_eq!(url.as_str(), "https://api.gladia.io/v2/live");
    }

    #[tokio::test]
    async fn test_resolve_url_joins_base_and_defaults() {
        let http = client("https://api.gladia.io");
        let url = http.resolve_url("/v2/live").unwrap();
        assert_eq!(url.as_str(), "https://api.gladia.io/v2/live?region=eu-west");

        let url = http.resolve_url("https://other.example/v2/live?region=us-west").unwrap();
        assert_eq!(url.as_str(), "https://other.example/v2/live?region=us-west");
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_aborts_without_network() {
        // Port 9 (discard) is never contacted because the token is already cancelled.
        let http = client("http://127.0.0.1:9");
        let token = CancellationToken::new();
        token.cancel();
        let err = http
            .post("/v2/live", RequestOptions::new().cancel(token))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Aborted { .. }), "got {err:?}");
        assert!(err.to_string().starts_with("Request aborted by the caller after"));
    }
}
