use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ratelimit::RateBudget;

/// Longest single wait between attempts, regardless of what the server hints.
const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

/// How much of an upstream error body is kept in error messages.
const BODY_SNIPPET_LEN: usize = 240;

/// HTTP method set needed by the resource services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Per-call retry policy. `retry_on_429` is disabled for probing calls whose
/// absence the caller treats as optional data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_on_429: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_on_429: true,
        }
    }
}

/// One outgoing request. Immutable once handed to [`ApiClient::request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
    pub retry: RetryPolicy,
}

impl RequestEnvelope {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_json_body(mut self, body: &Value) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Fully resolved request handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// Raw transport response before JSON decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Network-level failure (connect, timeout, protocol). Always treated as
/// transient and retried under the envelope's policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

/// Transport contract so tests can script responses without a network.
pub trait HttpTransport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: PreparedRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;
}

/// Production transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Arc<reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent("revlens/0.1.0")
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute<'a>(
        &'a self,
        request: PreparedRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
            };

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            builder = builder.timeout(request.timeout);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|error| {
                if error.is_timeout() {
                    TransportError::new(format!("request timeout: {error}"))
                } else if error.is_connect() {
                    TransportError::new(format!("connection failed: {error}"))
                } else {
                    TransportError::new(format!("request failed: {error}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|error| TransportError::new(format!("failed to read body: {error}")))?;

            Ok(TransportResponse { status, body })
        })
    }
}

/// Rate-limited HTTP client with bounded retry.
///
/// Every attempt, including retries, starts from a fresh
/// [`RateBudget::acquire`]. The attempt state machine is:
/// success and non-429 4xx are terminal; 429 and transient failures loop
/// through a bounded wait back into a new attempt.
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    budget: RateBudget,
    base_url: String,
    api_key: String,
    timeout: Duration,
    attempts: AtomicU64,
}

impl ApiClient {
    pub fn new(config: &EngineConfig, budget: RateBudget) -> Self {
        Self::with_transport(config, budget, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(
        config: &EngineConfig,
        budget: RateBudget,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            budget,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            timeout: config.request_timeout,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }

    /// Total attempts issued over the client's lifetime, retries included.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub async fn request(&self, envelope: &RequestEnvelope) -> Result<Value, EngineError> {
        let max_attempts = envelope.retry.max_retries.saturating_add(1);
        let mut attempt = 0_u32;

        loop {
            self.budget.acquire().await;
            self.attempts.fetch_add(1, Ordering::Relaxed);
            attempt += 1;

            let outcome = self.transport.execute(self.prepare(envelope)).await;

            let failure = match outcome {
                Ok(response) if response.is_success() => {
                    return serde_json::from_str(&response.body).map_err(EngineError::from);
                }
                Ok(response) if response.status == 429 => {
                    if !envelope.retry.retry_on_429 || attempt >= max_attempts {
                        return Err(EngineError::RateLimitExhausted {
                            attempts: attempt,
                            message: snippet(&response.body),
                        });
                    }

                    let wait = clamp_wait(
                        retry_hint_seconds(&response.body)
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| exponential_delay(attempt)),
                    );
                    tracing::warn!(
                        path = %envelope.path,
                        attempt,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited upstream, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Ok(response) if response.status == 401 || response.status == 403 => {
                    return Err(EngineError::Unauthorized {
                        status: response.status,
                    });
                }
                Ok(response) if response.status < 500 => {
                    return Err(EngineError::ClientRejected {
                        status: response.status,
                        message: snippet(&response.body),
                    });
                }
                Ok(response) => format!("status {}: {}", response.status, snippet(&response.body)),
                Err(error) => error.message().to_owned(),
            };

            if attempt >= max_attempts {
                return Err(EngineError::TransientUpstream {
                    attempts: attempt,
                    message: failure,
                });
            }

            let wait = clamp_wait(jittered(exponential_delay(attempt)));
            tracing::warn!(
                path = %envelope.path,
                attempt,
                wait_secs = wait.as_secs_f64(),
                error = %failure,
                "transient upstream failure, backing off"
            );
            tokio::time::sleep(wait).await;
        }
    }

    fn prepare(&self, envelope: &RequestEnvelope) -> PreparedRequest {
        let mut url = format!("{}/{}", self.base_url, envelope.path.trim_start_matches('/'));
        for (index, (name, value)) in envelope.query.iter().enumerate() {
            let separator = if index == 0 { '?' } else { '&' };
            url.push(separator);
            url.push_str(&urlencoding::encode(name));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }

        let mut headers = vec![
            (
                String::from("authorization"),
                format!("Api-Key {}", self.api_key),
            ),
            (String::from("accept"), String::from("application/json")),
        ];
        if envelope.body.is_some() {
            headers.push((
                String::from("content-type"),
                String::from("application/json"),
            ));
        }

        PreparedRequest {
            method: envelope.method,
            url,
            headers,
            body: envelope.body.clone(),
            timeout: self.timeout,
        }
    }
}

/// Wait hint from a 429 body: a structured `retry_after` field, or the first
/// integer-seconds token embedded in the error detail.
fn retry_hint_seconds(body: &str) -> Option<u64> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(seconds) = value.get("retry_after").and_then(Value::as_u64) {
            return Some(seconds);
        }
        if let Some(detail) = value.pointer("/errors/0/detail").and_then(Value::as_str) {
            return embedded_seconds(detail);
        }
    }

    embedded_seconds(body)
}

fn embedded_seconds(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();

    digits.parse().ok().filter(|&seconds| seconds > 0)
}

fn exponential_delay(attempt: u32) -> Duration {
    Duration::from_secs_f64(2_f64.powi(attempt.min(16) as i32))
}

fn jittered(delay: Duration) -> Duration {
    // +/- 25% so synchronized retries across resources spread out.
    let scale = 0.75 + fastrand::f64() * 0.5;
    Duration::from_secs_f64(delay.as_secs_f64() * scale)
}

fn clamp_wait(delay: Duration) -> Duration {
    delay.min(MAX_RETRY_WAIT)
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= BODY_SNIPPET_LEN {
        trimmed.to_owned()
    } else {
        let mut cut = BODY_SNIPPET_LEN;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &trimmed[..cut])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::ratelimit::RateBudget;

    /// Transport that pops one scripted step per attempt.
    struct ScriptedTransport {
        steps: Mutex<Vec<Result<TransportResponse, TransportError>>>,
    }

    impl ScriptedTransport {
        fn new(mut steps: Vec<Result<TransportResponse, TransportError>>) -> Self {
            steps.reverse();
            Self {
                steps: Mutex::new(steps),
            }
        }

        fn respond(status: u16, body: &str) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse {
                status,
                body: body.to_owned(),
            })
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn execute<'a>(
            &'a self,
            _request: PreparedRequest,
        ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>
        {
            let step = self
                .steps
                .lock()
                .expect("script lock must not be poisoned")
                .pop()
                .expect("script must cover every attempt");
            Box::pin(async move { step })
        }
    }

    fn client(transport: ScriptedTransport) -> ApiClient {
        let config = EngineConfig::new("pk_test");
        ApiClient::with_transport(
            &config,
            RateBudget::with_limits(1_000, 10_000),
            Arc::new(transport),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn honors_server_retry_hint_before_each_retry() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::respond(429, r#"{"retry_after": 7}"#),
            ScriptedTransport::respond(
                429,
                r#"{"errors":[{"detail":"throttled, retry in 7 seconds"}]}"#,
            ),
            ScriptedTransport::respond(200, r#"{"data": []}"#),
        ]);
        let client = client(transport);
        let started = tokio::time::Instant::now();

        let value = client
            .request(&RequestEnvelope::get("metrics"))
            .await
            .expect("third attempt must succeed");

        assert_eq!(value, json!({ "data": [] }));
        assert_eq!(client.attempts(), 3);
        assert!(started.elapsed() >= Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_exponential_backoff_without_a_hint() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::respond(429, "too many requests"),
            ScriptedTransport::respond(200, "{}"),
        ]);
        let client = client(transport);
        let started = tokio::time::Instant::now();

        client
            .request(&RequestEnvelope::get("metrics"))
            .await
            .expect("second attempt must succeed");

        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_429_surfaces_as_rate_limit_exhausted() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::respond(429, r#"{"retry_after": 1}"#),
            ScriptedTransport::respond(429, r#"{"retry_after": 1}"#),
        ]);
        let client = client(transport);
        let envelope = RequestEnvelope::get("metrics").with_retry(RetryPolicy {
            max_retries: 1,
            retry_on_429: true,
        });

        let error = client.request(&envelope).await.expect_err("must exhaust");

        assert!(matches!(
            error,
            EngineError::RateLimitExhausted { attempts: 2, .. }
        ));
        assert_eq!(client.attempts(), 2);
    }

    #[tokio::test]
    async fn client_errors_are_never_retried() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::respond(
            400,
            r#"{"errors":[{"detail":"unsupported filter combination"}]}"#,
        )]);
        let client = client(transport);

        let error = client
            .request(&RequestEnvelope::get("metric-aggregates"))
            .await
            .expect_err("must fail fast");

        assert!(matches!(
            error,
            EngineError::ClientRejected { status: 400, .. }
        ));
        assert_eq!(client.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_then_surface() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::new("connection reset")),
            ScriptedTransport::respond(503, "upstream unavailable"),
            ScriptedTransport::respond(502, "bad gateway"),
        ]);
        let client = client(transport);
        let envelope = RequestEnvelope::get("flows").with_retry(RetryPolicy {
            max_retries: 2,
            retry_on_429: true,
        });

        let error = client.request(&envelope).await.expect_err("must exhaust");

        assert!(matches!(
            error,
            EngineError::TransientUpstream { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn unauthorized_is_terminal() {
        let transport =
            ScriptedTransport::new(vec![ScriptedTransport::respond(401, "invalid key")]);
        let client = client(transport);

        let error = client
            .request(&RequestEnvelope::get("metrics"))
            .await
            .expect_err("must fail");

        assert!(matches!(error, EngineError::Unauthorized { status: 401 }));
    }

    #[test]
    fn retry_hint_parses_structured_and_embedded_forms() {
        assert_eq!(retry_hint_seconds(r#"{"retry_after": 30}"#), Some(30));
        assert_eq!(
            retry_hint_seconds(r#"{"errors":[{"detail":"retry in 12 seconds"}]}"#),
            Some(12)
        );
        assert_eq!(retry_hint_seconds("throttled, wait 5s"), Some(5));
        assert_eq!(retry_hint_seconds("too many requests"), None);
    }

    #[test]
    fn waits_are_clamped_to_the_ceiling() {
        assert_eq!(clamp_wait(Duration::from_secs(600)), MAX_RETRY_WAIT);
        assert_eq!(
            clamp_wait(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn query_parameters_are_percent_encoded() {
        let config = EngineConfig::new("pk_test");
        let client = ApiClient::with_transport(
            &config,
            RateBudget::with_limits(10, 100),
            Arc::new(ScriptedTransport::new(Vec::new())),
        );
        let envelope = RequestEnvelope::get("campaigns")
            .with_query("filter", "equals(messages.channel,'email')");

        let prepared = client.prepare(&envelope);

        assert!(prepared.url.starts_with(crate::config::DEFAULT_BASE_URL));
        assert!(prepared.url.contains("filter="));
        assert!(!prepared.url.contains('\''));
    }
}
