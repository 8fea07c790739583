//! Global token-bucket rate limiting.
//!
//! One bucket for the whole process, not one per client: a burst from a
//! single caller can starve everyone else. Put a per-IP limiter in the proxy
//! if that matters.

use std::time::Instant;

use http::StatusCode;
use parking_lot::Mutex;
use tracing::warn;

use crate::envelope::respond_error;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

/// Holds up to `burst` tokens, refilled continuously at `rate` per second.
/// Starts full.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<State>,
}

struct State {
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self::starting_at(rate, burst, Instant::now())
    }

    fn starting_at(rate: f64, burst: u32, now: Instant) -> Self {
        let burst = f64::from(burst);
        Self {
            rate: rate.max(0.0),
            burst,
            state: Mutex::new(State { tokens: burst, last: now }),
        }
    }

    /// Takes one token if available. Never blocks on anything but the
    /// bucket's own mutex.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Rejects requests with `429 Too Many Requests` once the bucket is empty.
pub struct RateLimit {
    bucket: TokenBucket,
}

impl RateLimit {
    pub fn new(per_second: f64, burst: u32) -> Self {
        Self { bucket: TokenBucket::new(per_second, burst) }
    }
}

impl Middleware for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn before(&self, req: &mut Request) -> Option<Response> {
        if self.bucket.allow() {
            return None;
        }
        warn!(route = req.context().route(), path = req.path(), "rate limit exceeded");
        Some(respond_error(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
    }
}
