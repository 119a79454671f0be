//! Webhook alert delivery with rate limiting, retries, and failover
//!
//! The dispatcher is the fire-and-forget end of the pipeline: entries
//! flagged for alerting are formatted once and delivered on a spawned task,
//! so the emitting call site never waits on the network. Endpoints are
//! tried in priority order; each gets a bounded number of attempts governed
//! by the shared [`RateLimiter`]. A dispatch that exhausts every endpoint
//! is reported on the diagnostic channel, never back to the caller.

use crate::config::WebhookConfig;
use crate::core::{DiagnosticEvent, LogEntry};
use crate::formatting::{AlertFormatter, EntryFormatter};
use crate::ratelimit::{RateLimitObservation, RateLimiter};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Penalty assumed when a 429 response names no retry delay at all.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

/// Capacity of the diagnostic broadcast channel.
const DIAGNOSTIC_CHANNEL_SIZE: usize = 64;

/// Why delivery to a single endpoint was abandoned.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// A non-429 4xx response; client errors are not retryable.
    #[error("endpoint rejected the request with status {status}")]
    Rejected { status: StatusCode },
    /// The per-endpoint attempt budget ran out.
    #[error("gave up after {attempts} attempts")]
    AttemptsExhausted { attempts: u32 },
}

/// Why a dispatch failed as a whole.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("all {endpoints} endpoints failed, last error: {last}")]
    AllEndpointsFailed {
        endpoints: usize,
        last: EndpointError,
    },
}

struct Inner {
    client: reqwest::Client,
    config: WebhookConfig,
    limiter: Arc<RateLimiter>,
    formatter: Box<dyn EntryFormatter>,
    diagnostics: broadcast::Sender<DiagnosticEvent>,
}

/// Delivers flagged log entries to the configured webhook endpoints.
///
/// Cheap to clone; clones share the HTTP client, the rate limiter, and the
/// diagnostic channel.
#[derive(Clone)]
pub struct WebhookDispatcher {
    inner: Arc<Inner>,
}

impl WebhookDispatcher {
    /// Creates a dispatcher using the default [`AlertFormatter`].
    pub fn new(config: WebhookConfig, limiter: Arc<RateLimiter>) -> anyhow::Result<Self> {
        let formatter = Box::new(AlertFormatter::new(config.max_message_length));
        Self::with_formatter(config, limiter, formatter)
    }

    /// Creates a dispatcher with a caller-supplied formatter.
    pub fn with_formatter(
        config: WebhookConfig,
        limiter: Arc<RateLimiter>,
        formatter: Box<dyn EntryFormatter>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let (diagnostics, _) = broadcast::channel(DIAGNOSTIC_CHANNEL_SIZE);
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                limiter,
                formatter,
                diagnostics,
            }),
        })
    }

    /// Subscribes to the diagnostic events this dispatcher emits.
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.inner.diagnostics.subscribe()
    }

    /// Dispatches an entry to the configured endpoints, fire-and-forget.
    ///
    /// Entries without the alert flag are a no-op, as is every entry while
    /// delivery is disabled in the config. Flagged entries are
    /// delivered on a spawned task; the caller never observes delivery
    /// errors, only the diagnostic channel does.
    pub fn dispatch(&self, entry: LogEntry) {
        if !entry.notify || !self.inner.config.enabled {
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.deliver(&entry).await {
                error!(
                    entry_id = %entry.entry_id,
                    origin = %entry.origin,
                    error = %e,
                    "Alert dispatch failed on every endpoint"
                );
                metrics::counter!("loghook_dispatch_failures_total").increment(1);
                let _ = dispatcher.inner.diagnostics.send(DiagnosticEvent::DispatchFailed {
                    entry_id: entry.entry_id.clone(),
                    origin: entry.origin.clone(),
                    reason: e.to_string(),
                });
            }
        });
    }

    /// Formats the entry and walks the endpoint list until one delivery
    /// succeeds. The awaitable core behind [`dispatch`](Self::dispatch).
    #[instrument(skip_all, fields(entry_id = %entry.entry_id))]
    pub async fn deliver(&self, entry: &LogEntry) -> Result<(), DispatchError> {
        // Formatted exactly once; retries and failover reuse the message.
        let message = self.inner.formatter.format(entry);

        let mut last_error = EndpointError::AttemptsExhausted { attempts: 0 };
        for endpoint in &self.inner.config.endpoints {
            match self.attempt_endpoint(endpoint, &message).await {
                Ok(()) => {
                    info!(endpoint = %endpoint, "Alert delivered");
                    metrics::counter!("loghook_dispatch_success_total").increment(1);
                    return Ok(());
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Endpoint failed, trying next");
                    last_error = e;
                }
            }
        }
        Err(DispatchError::AllEndpointsFailed {
            endpoints: self.inner.config.endpoints.len(),
            last: last_error,
        })
    }

    /// Attempts delivery to one endpoint under its attempt budget.
    async fn attempt_endpoint(&self, endpoint: &str, message: &str) -> Result<(), EndpointError> {
        let limiter = &self.inner.limiter;
        let max_attempts = self.inner.config.max_retries;

        for attempt in 0..max_attempts {
            if limiter.is_limited(endpoint) {
                let wait = limiter.wait_time(endpoint);
                if !wait.is_zero() {
                    debug!(
                        endpoint = %endpoint,
                        wait_ms = wait.as_millis() as u64,
                        "Endpoint rate limited, waiting"
                    );
                    sleep(wait).await;
                }
            }

            let result = self
                .inner
                .client
                .post(endpoint)
                .json(&json!({ "content": message }))
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    limiter.record_success(endpoint, observation_from(response.headers()));
                    return Ok(());
                }
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = retry_after_from(response).await;
                    warn!(
                        endpoint = %endpoint,
                        retry_after_ms = retry_after.as_millis() as u64,
                        attempt,
                        "Endpoint rate limited the request"
                    );
                    limiter.record_rate_limited(endpoint, retry_after);
                    if attempt + 1 < max_attempts {
                        sleep(retry_after).await;
                    }
                }
                Ok(response) if response.status().is_client_error() => {
                    // Not retryable; the request itself is at fault.
                    return Err(EndpointError::Rejected {
                        status: response.status(),
                    });
                }
                Ok(response) => {
                    warn!(
                        endpoint = %endpoint,
                        status = %response.status(),
                        attempt,
                        "Server error from endpoint"
                    );
                    if attempt + 1 < max_attempts {
                        sleep(self.backoff(attempt)).await;
                    }
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, attempt, "Request failed");
                    if attempt + 1 < max_attempts {
                        sleep(self.backoff(attempt)).await;
                    }
                }
            }
        }

        Err(EndpointError::AttemptsExhausted {
            attempts: max_attempts,
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.inner.config.base_delay_ms.saturating_mul(factor))
    }
}

/// Decodes the quota headers an endpoint attaches to successful responses.
fn observation_from(headers: &HeaderMap) -> RateLimitObservation {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };
    RateLimitObservation {
        remaining: text("x-ratelimit-remaining").and_then(|v| v.parse().ok()),
        reset_after: text("x-ratelimit-reset-after").and_then(|v| v.parse().ok()),
    }
}

/// Extracts the retry delay from a 429 response: the `Retry-After` header
/// first, then a `retry_after` field in a JSON body, then the default.
async fn retry_after_from(response: Response) -> Duration {
    let from_header = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok());
    if let Some(delay) = from_header.and_then(duration_from_secs) {
        return delay;
    }

    if let Ok(body) = response.json::<Value>().await {
        let from_body = body.get("retry_after").and_then(Value::as_f64);
        if let Some(delay) = from_body.and_then(duration_from_secs) {
            return delay;
        }
    }

    DEFAULT_RETRY_AFTER
}

/// Converts a seconds value a remote endpoint reported into a `Duration`,
/// rejecting negative, non-finite, and overflowing inputs.
fn duration_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn quota_headers_are_decoded() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("7"));
        headers.insert("x-ratelimit-reset-after", HeaderValue::from_static("1.25"));

        let observed = observation_from(&headers);
        assert_eq!(observed.remaining, Some(7));
        assert_eq!(observed.reset_after, Some(1.25));
    }

    #[test]
    fn missing_quota_headers_decode_to_none() {
        let observed = observation_from(&HeaderMap::new());
        assert!(observed.remaining.is_none());
        assert!(observed.reset_after.is_none());
    }

    #[test]
    fn malformed_quota_headers_decode_to_none() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("lots"));
        let observed = observation_from(&headers);
        assert!(observed.remaining.is_none());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let limiter = Arc::new(RateLimiter::new());
        let config = WebhookConfig {
            base_delay_ms: 100,
            ..Default::default()
        };
        let dispatcher = WebhookDispatcher::new(config, limiter).unwrap();

        assert_eq!(dispatcher.backoff(0), Duration::from_millis(100));
        assert_eq!(dispatcher.backoff(1), Duration::from_millis(200));
        assert_eq!(dispatcher.backoff(3), Duration::from_millis(800));
        // Large attempt counts must not overflow.
        assert!(dispatcher.backoff(u32::MAX) >= dispatcher.backoff(16));
    }
}
