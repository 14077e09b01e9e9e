//! Delivery of queue records to the external analysis API.
//!
//! One call to [`DeliveryClient::attempt_delivery`] makes up to
//! `max_retries` sequential POSTs for a single record and classifies the
//! result into a [`DeliveryOutcome`] whose `status` is stored on the record.

pub mod health;
pub mod retry;

use serde::Serialize;

use crate::models::{DeliveryConfig, QueueRecord};

pub use retry::RetryPolicy;

const STATUS_BODY_LIMIT: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// 2xx with a truthy `success` flag.
    Success,
    /// 2xx without confirmation.
    Ambiguous,
    /// 4xx.
    Rejected,
    /// 5xx after the retry budget ran out.
    ServerError,
    /// Connection, timeout or other transport failure after the retry budget ran out.
    TransportError,
    Unknown,
    /// No API URL configured; nothing was sent.
    Misconfigured,
}

impl OutcomeKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, OutcomeKind::ServerError | OutcomeKind::TransportError)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub kind: OutcomeKind,
    pub status: String,
    /// HTTP requests issued for this record during this call.
    pub attempts: u32,
}

impl DeliveryOutcome {
    pub fn success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

/// The JSON body sent for each record. Nothing else leaves the service.
#[derive(Debug, Serialize, PartialEq)]
pub struct Payload<'a> {
    pub user_id: i64,
    pub quiz_id: i64,
    pub attempt_id: i64,
    pub attempt_state: &'a str,
    pub time_queued: i64,
}

impl<'a> From<&'a QueueRecord> for Payload<'a> {
    fn from(record: &'a QueueRecord) -> Self {
        Self {
            user_id: record.user_id,
            quiz_id: record.quiz_id,
            attempt_id: record.attempt_id,
            attempt_state: &record.state,
            time_queued: record.time_created,
        }
    }
}

pub struct DeliveryClient {
    client: reqwest::Client,
    api_url: Option<String>,
    policy: RetryPolicy,
}

impl DeliveryClient {
    pub fn with_policy(config: &DeliveryConfig, policy: RetryPolicy) -> Result<Self, DeliveryError> {
        Ok(Self {
            client: build_http_client(config)?,
            api_url: config
                .api_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            policy,
        })
    }

    pub async fn attempt_delivery(&self, record: &QueueRecord) -> DeliveryOutcome {
        let Some(api_url) = self.api_url.as_deref() else {
            tracing::warn!("API URL not configured, cannot deliver attempt {}", record.attempt_id);
            return DeliveryOutcome {
                kind: OutcomeKind::Misconfigured,
                status: "no_api_url".to_string(),
                attempts: 0,
            };
        };

        let payload = Payload::from(record);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let (kind, status) = match self.client.post(api_url).json(&payload).send().await {
                Ok(resp) => {
                    let code = resp.status().as_u16();
                    match resp.text().await {
                        Ok(body) => {
                            let (kind, status) = classify(code, &body);
                            log_response(record, attempt, code, kind, &body);
                            (kind, status)
                        }
                        Err(e) => transport_failure(record, attempt, &e),
                    }
                }
                Err(e) => transport_failure(record, attempt, &e),
            };

            if kind.is_retryable() && self.policy.allows_retry_after(attempt) {
                self.policy.wait().await;
                continue;
            }

            return DeliveryOutcome {
                kind,
                status,
                attempts: attempt,
            };
        }
    }
}

fn transport_failure(record: &QueueRecord, attempt: u32, err: &reqwest::Error) -> (OutcomeKind, String) {
    tracing::warn!(
        "Transport error on try {attempt} for attempt {}: {err}",
        record.attempt_id
    );
    (
        OutcomeKind::TransportError,
        format!("transport_err:{}", transport_kind(err)),
    )
}

fn log_response(record: &QueueRecord, attempt: u32, code: u16, kind: OutcomeKind, body: &str) {
    let attempt_id = record.attempt_id;
    match kind {
        OutcomeKind::Success => {
            tracing::debug!("Delivered attempt {attempt_id} (HTTP {code})");
        }
        OutcomeKind::ServerError => {
            tracing::warn!("Server error HTTP {code} on try {attempt} for attempt {attempt_id}");
        }
        OutcomeKind::Ambiguous => {
            tracing::warn!("Unconfirmed API response for attempt {attempt_id}: {body}");
        }
        OutcomeKind::Rejected => {
            tracing::warn!("Client error HTTP {code} for attempt {attempt_id}: {body}");
        }
        _ => {
            tracing::warn!("Unexpected HTTP {code} for attempt {attempt_id}");
        }
    }
}

/// Map an HTTP status and body to an outcome and its stored status string.
pub fn classify(code: u16, body: &str) -> (OutcomeKind, String) {
    match code {
        500..=u16::MAX => (OutcomeKind::ServerError, format!("http_{code}")),
        200..=299 => {
            if confirms_success(body) {
                (OutcomeKind::Success, "ok".to_string())
            } else {
                (
                    OutcomeKind::Ambiguous,
                    format!("resp:{}", truncate(body, STATUS_BODY_LIMIT)),
                )
            }
        }
        400..=499 => (OutcomeKind::Rejected, format!("http_{code}")),
        _ => (OutcomeKind::Unknown, format!("unknown_http_{code}")),
    }
}

/// True when the body is a JSON object whose `success` field is truthy.
pub fn confirms_success(body: &str) -> bool {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    map.get("success").is_some_and(is_truthy)
}

fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub(crate) fn transport_kind(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_body() {
        "body"
    } else if err.is_request() {
        "request"
    } else {
        "other"
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

pub(crate) fn build_http_client(config: &DeliveryConfig) -> Result<reqwest::Client, DeliveryError> {
    Ok(reqwest::Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .danger_accept_invalid_certs(!config.tls_verify)
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}
