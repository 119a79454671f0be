//! Per-endpoint rate-limit accounting for webhook delivery
//!
//! Endpoints report their quota through response headers and 429 penalties.
//! This module tracks that state per endpoint so concurrent dispatches can
//! decide whether to wait before attempting a delivery. State is partitioned
//! by endpoint key; operations on one endpoint never touch another's state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Requests assumed available when a window resets without the endpoint
/// telling us otherwise.
pub const DEFAULT_WINDOW: u32 = 30;

/// Window length assumed when a success response carries no reset header.
pub const DEFAULT_RESET_AFTER: Duration = Duration::from_secs(2);

/// Quota information observed on a successful response, decoded from the
/// endpoint's rate-limit headers by the caller. Missing fields fall back to
/// defaults when recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitObservation {
    /// Requests left in the current window (`x-ratelimit-remaining`).
    pub remaining: Option<u32>,
    /// Seconds until the window resets (`x-ratelimit-reset-after`).
    pub reset_after: Option<f64>,
}

#[derive(Debug, Clone)]
struct EndpointState {
    remaining: u32,
    reset_at: Instant,
    limited: bool,
    retry_after: Duration,
}

impl EndpointState {
    fn fresh() -> Self {
        Self {
            remaining: DEFAULT_WINDOW,
            reset_at: Instant::now(),
            limited: false,
            retry_after: Duration::ZERO,
        }
    }
}

/// Tracks rate-limit state for every endpoint a dispatcher talks to.
///
/// An explicit instance injected into the dispatcher, so independent
/// loggers and tests do not share quota state. Penalties expire lazily:
/// nothing clears `limited` until someone asks after `reset_at` has passed.
#[derive(Debug, Default)]
pub struct RateLimiter {
    states: Mutex<HashMap<String, EndpointState>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while the endpoint is serving a 429 penalty or has no
    /// requests left in its window. Expires a completed penalty as a side
    /// effect, restoring the default window.
    pub fn is_limited(&self, endpoint: &str) -> bool {
        let mut states = self.states.lock().expect("rate limiter mutex poisoned");
        let Some(state) = states.get_mut(endpoint) else {
            return false;
        };
        if Instant::now() >= state.reset_at {
            state.remaining = DEFAULT_WINDOW;
            state.limited = false;
            return false;
        }
        state.limited || state.remaining == 0
    }

    /// How long a dispatch should wait before attempting this endpoint.
    /// Zero unless the endpoint is limited or exhausted. Never mutates.
    pub fn wait_time(&self, endpoint: &str) -> Duration {
        let states = self.states.lock().expect("rate limiter mutex poisoned");
        match states.get(endpoint) {
            Some(state) if state.limited || state.remaining == 0 => {
                state.reset_at.saturating_duration_since(Instant::now())
            }
            _ => Duration::ZERO,
        }
    }

    /// Records a successful delivery together with whatever quota headers
    /// the response carried.
    pub fn record_success(&self, endpoint: &str, observed: RateLimitObservation) {
        let remaining = observed.remaining.unwrap_or(DEFAULT_WINDOW - 1);
        // try_from rejects negative, non-finite, and overflowing values,
        // all of which a remote endpoint is free to send.
        let reset_after = observed
            .reset_after
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(DEFAULT_RESET_AFTER);

        let mut states = self.states.lock().expect("rate limiter mutex poisoned");
        let state = states
            .entry(endpoint.to_string())
            .or_insert_with(EndpointState::fresh);
        state.remaining = remaining;
        state.reset_at = Instant::now() + reset_after;
        state.limited = false;
    }

    /// Records a 429 penalty: the endpoint is off limits until
    /// `retry_after` has elapsed.
    pub fn record_rate_limited(&self, endpoint: &str, retry_after: Duration) {
        let mut states = self.states.lock().expect("rate limiter mutex poisoned");
        let state = states
            .entry(endpoint.to_string())
            .or_insert_with(EndpointState::fresh);
        state.remaining = 0;
        state.limited = true;
        state.retry_after = retry_after;
        state.reset_at = Instant::now() + retry_after;
    }

    /// Last penalty duration recorded for the endpoint, if any.
    pub fn last_retry_after(&self, endpoint: &str) -> Option<Duration> {
        let states = self.states.lock().expect("rate limiter mutex poisoned");
        states.get(endpoint).map(|state| state.retry_after)
    }

    /// Forgets one endpoint's state.
    pub fn reset(&self, endpoint: &str) {
        let mut states = self.states.lock().expect("rate limiter mutex poisoned");
        states.remove(endpoint);
    }

    /// Forgets all endpoint state.
    pub fn reset_all(&self) {
        let mut states = self.states.lock().expect("rate limiter mutex poisoned");
        states.clear();
    }
}
