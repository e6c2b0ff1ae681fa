//! Adaptive rate limiting with exponential quota backoff.
//!
//! One limiter instance is shared by everything a run sends over the wire,
//! so concurrently processed units cannot collectively overrun the request
//! budget. Capacity is enforced by delaying callers, never by dropping
//! requests.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, Instant};

use crate::collector::config::{
    QUOTA_BACKOFF_BASE_SECS, QUOTA_BACKOFF_CAP_SECS, QUOTA_BACKOFF_JITTER,
};

/// Compute the quota backoff for the `consecutive_hits`-th consecutive
/// quota signal: `base * 2^(hits-1)`, capped.
///
/// Pure and jitter-free so the growth schedule is directly testable;
/// [`RateLimiter::report_quota_exceeded`] layers jitter on top.
pub fn quota_backoff(consecutive_hits: u32, base: Duration, cap: Duration) -> Duration {
    if consecutive_hits == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(consecutive_hits.saturating_sub(1));
    base.saturating_mul(factor).min(cap)
}

/// Apply ±`QUOTA_BACKOFF_JITTER` jitter to a delay.
///
/// Entropy comes from the subsecond clock rather than a PRNG; the spread
/// only needs to desynchronize concurrent re-probes, not be unpredictable.
fn jittered(delay: Duration) -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let unit = f64::from(nanos) / 1e9; // [0, 1)
    let factor = 1.0 - QUOTA_BACKOFF_JITTER + unit * 2.0 * QUOTA_BACKOFF_JITTER;
    delay.mul_f64(factor)
}

/// Mutable limiter state, guarded by one mutex so `acquire` stays safe for
/// concurrent callers under the worker-pool extension.
#[derive(Debug)]
struct RateLimitState {
    window_start: Instant,
    requests_in_window: u32,
    backoff_until: Option<Instant>,
    consecutive_quota_hits: u32,
    total_requests: u64,
    total_quota_hits: u64,
    total_wait: Duration,
}

/// Snapshot of limiter state for progress display and the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    /// Requests recorded in the current rolling window
    pub requests_in_window: u32,
    /// Window capacity
    pub window_capacity: u32,
    /// Requests recorded over the limiter's lifetime
    pub total_requests: u64,
    /// Quota signals received over the limiter's lifetime
    pub total_quota_hits: u64,
    /// Cumulative time callers spent waiting in `acquire`
    pub total_wait: Duration,
    /// Whether a quota backoff window is currently active
    pub in_backoff: bool,
}

/// Rolling-window rate limiter, the single arbiter for outbound requests.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    /// Create a limiter allowing `capacity` requests per `window`.
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            state: Mutex::new(RateLimitState {
                window_start: Instant::now(),
                requests_in_window: 0,
                backoff_until: None,
                consecutive_quota_hits: 0,
                total_requests: 0,
                total_quota_hits: 0,
                total_wait: Duration::ZERO,
            }),
        }
    }

    /// Wait until a request is safe to send, then record it.
    ///
    /// Returns the total time this caller waited. The wait honors, in
    /// order, any active quota backoff window and then the rolling-window
    /// budget. Sleeping happens outside the state lock.
    pub async fn acquire(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let pending = {
                let mut state = self.state.lock().expect("rate limiter lock poisoned");
                match self.required_wait(&mut state) {
                    Some(wait) => wait,
                    None => {
                        state.requests_in_window += 1;
                        state.total_requests += 1;
                        state.total_wait += waited;
                        return waited;
                    }
                }
            };
            sleep(pending).await;
            waited += pending;
        }
    }

    /// Delay still required before a request may be recorded, or `None`
    /// when one may go out now. Resets the rolling window as a side effect.
    fn required_wait(&self, state: &mut RateLimitState) -> Option<Duration> {
        let now = Instant::now();

        if let Some(until) = state.backoff_until {
            if until > now {
                return Some(until - now);
            }
            state.backoff_until = None;
        }

        if now.duration_since(state.window_start) >= self.window {
            state.window_start = now;
            state.requests_in_window = 0;
        }

        if state.requests_in_window < self.capacity {
            None
        } else {
            Some(self.window - now.duration_since(state.window_start))
        }
    }

    /// Record a quota signal and start (or extend) the backoff window.
    ///
    /// Consecutive signals double the delay up to the configured cap, with
    /// ±20 % jitter. Returns the imposed delay for logging.
    pub fn report_quota_exceeded(&self) -> Duration {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        state.consecutive_quota_hits += 1;
        state.total_quota_hits += 1;
        let delay = jittered(quota_backoff(
            state.consecutive_quota_hits,
            Duration::from_secs(QUOTA_BACKOFF_BASE_SECS),
            Duration::from_secs(QUOTA_BACKOFF_CAP_SECS),
        ));
        state.backoff_until = Some(Instant::now() + delay);
        delay
    }

    /// Record a successful request, ending the consecutive-hit streak.
    pub fn report_success(&self) {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        state.consecutive_quota_hits = 0;
    }

    /// Snapshot current usage and lifetime statistics.
    pub fn stats(&self) -> RateLimitStats {
        let state = self.state.lock().expect("rate limiter lock poisoned");
        RateLimitStats {
            requests_in_window: state.requests_in_window,
            window_capacity: self.capacity,
            total_requests: state.total_requests,
            total_quota_hits: state.total_quota_hits,
            total_wait: state.total_wait,
            in_backoff: state
                .backoff_until
                .map(|until| until > Instant::now())
                .unwrap_or(false),
        }
    }
}
