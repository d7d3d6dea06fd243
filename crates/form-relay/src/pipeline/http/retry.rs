use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument};

use super::transport::{HttpResponse, HttpTransport, RequestSpec, TransportError};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Statuses treated as transient unless a policy overrides them.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Upper bound on any single backoff delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Bounded retry configuration for one call site.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub exponential: bool,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            exponential: true,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay to wait after the given (1-based) failed attempt, never above [`MAX_RETRY_DELAY`].
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay.min(MAX_RETRY_DELAY);
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.powi(exponent);
        let secs = self.base_delay.as_secs_f64() * factor;
        if secs.is_nan() || secs < 0.0 {
            return self.base_delay.min(MAX_RETRY_DELAY);
        }
        Duration::try_from_secs_f64(secs)
            .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
    }
}

/// Terminal outcome of a request after retries were exhausted or ruled out.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("request to {url} returned HTTP {status}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },
    /// The request could not be built, so it was never sent.
    #[error("request to {url} could not be built: {reason}")]
    Invalid { url: String, reason: String },
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, RequestError::Network { .. })
    }

    /// Messages suitable for showing to the person who filled in the form.
    ///
    /// Server-provided messages win and are passed through verbatim. Otherwise the status
    /// or transport failure picks a canned explanation.
    pub fn user_messages(&self) -> Vec<String> {
        match self {
            RequestError::Http { status, body, .. } => {
                let server = serde_json::from_str::<Value>(body)
                    .map(|value| server_messages(&value))
                    .unwrap_or_default();
                if server.is_empty() {
                    vec![status_message(*status)]
                } else {
                    server
                }
            }
            RequestError::Network {
                source: TransportError::Timeout(_),
                ..
            } => vec![
                "The request timed out. Please check your internet connection and try again."
                    .to_string(),
            ],
            RequestError::Network { .. } => vec![
                "A network error occurred. Please check your internet connection and try again."
                    .to_string(),
            ],
            RequestError::Invalid { .. } => {
                vec!["The request could not be sent. Please try again later.".to_string()]
            }
        }
    }
}

fn status_message(status: u16) -> String {
    match status {
        400 => "The request was invalid. Please check your form data and try again.".to_string(),
        401 => "You need to be logged in to perform this action.".to_string(),
        403 => "You do not have permission to perform this action.".to_string(),
        404 => "The requested resource could not be found.".to_string(),
        429 => "Too many requests. Please try again later.".to_string(),
        500 => "An internal server error occurred. Please try again later.".to_string(),
        other => format!("Server error ({other}). Please try again later."),
    }
}

/// Error strings carried in a response body under `errors`, `error`, `message` or `detail`.
pub(crate) fn server_messages(body: &Value) -> Vec<String> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        let messages: Vec<String> = errors
            .iter()
            .filter_map(|error| match error {
                Value::String(text) => Some(text.clone()),
                Value::Object(_) => error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .filter(|message| !message.trim().is_empty())
            .collect();
        if !messages.is_empty() {
            return messages;
        }
    }
    ["error", "message", "detail"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|message| !message.trim().is_empty())
        .map(|message| vec![message.to_string()])
        .unwrap_or_default()
}

/// Issues requests through a transport, retrying transient failures with backoff.
#[derive(Debug, Clone)]
pub struct RetryClient {
    transport: Arc<dyn HttpTransport>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RetryClient {
    pub fn new(transport: Arc<dyn HttpTransport>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            transport,
            telemetry,
        }
    }

    pub fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.telemetry
    }

    /// Send `request`, retrying network failures and retryable statuses until the policy's
    /// attempts run out. Returns the first 2xx response.
    #[instrument(skip(self, request, policy), fields(method = request.method.as_str(), url = %request.url))]
    pub async fn request_with_retry(
        &self,
        request: &RequestSpec,
        policy: &RetryPolicy,
    ) -> Result<HttpResponse, RequestError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (error, retryable) = match self.transport.send(request).await {
                Ok(response) if response.is_success() => {
                    debug!(attempt, status = response.status, "request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    let retryable = policy.is_retryable_status(response.status);
                    let error = RequestError::Http {
                        url: request.url.clone(),
                        status: response.status,
                        body: response.text(),
                    };
                    (error, retryable)
                }
                Err(TransportError::Build(reason)) => {
                    let error = RequestError::Invalid {
                        url: request.url.clone(),
                        reason,
                    };
                    (error, false)
                }
                Err(source) => {
                    let error = RequestError::Network {
                        url: request.url.clone(),
                        source,
                    };
                    (error, true)
                }
            };

            if !retryable || attempt >= max_attempts {
                debug!(attempt, %error, "giving up on request");
                return Err(error);
            }

            let delay = policy.delay_after(attempt);
            self.telemetry.track(&TelemetryEvent::ApiRetry {
                url: request.url.clone(),
                attempt,
                status: error.status(),
                delay,
            });
            tokio::time::sleep(delay).await;
        }
    }
}
