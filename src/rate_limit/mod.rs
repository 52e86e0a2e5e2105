//! Fixed-window attempt limiting for sensitive operations.
//!
//! Keys are caller-chosen strings (e.g. `2fa-verify:alice@example.com`), so
//! independent operations get independent windows. The bundled limiter is
//! process-local; a shared deployment can swap in a distributed one behind
//! the same trait.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_WINDOW_SECONDS: u64 = 300;

/// Outcome of a rate-limit check. The attempt is counted as a side effect of
/// the check itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

impl RateLimitDecision {
    #[must_use]
    pub fn is_limited(self) -> bool {
        matches!(self, Self::Limited)
    }
}

/// Attempt-limiting seam consulted before each guarded operation.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str) -> RateLimitDecision;

    /// Clear the window for a key, e.g. after a successful verification.
    async fn reset(&self, key: &str);
}

/// Limiter that never limits. Useful in tests and single-user tooling.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check(&self, _key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    async fn reset(&self, _key: &str) {}
}

struct Window {
    started_at: Instant,
    attempts: u32,
}

/// Process-local fixed-window limiter.
///
/// The first attempt for a key opens a window; attempts beyond the maximum
/// within that window are limited. When the window elapses the next attempt
/// opens a fresh one. Exhausting the limit never extends the window, so
/// there is no lockout escalation.
pub struct FixedWindowRateLimiter {
    max_attempts: u32,
    window: Duration,
    state: Mutex<HashMap<String, Window>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECONDS),
            state: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let Ok(mut state) = self.state.lock() else {
            // Poisoned lock: fail closed for guarded operations.
            return RateLimitDecision::Limited;
        };

        // Drop elapsed windows so abandoned keys do not accumulate.
        let window = self.window;
        state.retain(|_, entry| now.duration_since(entry.started_at) < window);

        match state.get_mut(key) {
            Some(entry) => {
                if entry.attempts >= self.max_attempts {
                    return RateLimitDecision::Limited;
                }
                entry.attempts += 1;
                RateLimitDecision::Allowed
            }
            None => {
                state.insert(
                    key.to_owned(),
                    Window {
                        started_at: now,
                        attempts: 1,
                    },
                );
                RateLimitDecision::Allowed
            }
        }
    }

    fn reset_sync(&self, key: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.remove(key);
        }
    }
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for FixedWindowRateLimiter {
    async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    async fn reset(&self, key: &str) {
        self.reset_sync(key);
    }
}

impl std::fmt::Debug for FixedWindowRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowRateLimiter")
            .field("max_attempts", &self.max_attempts)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixth_attempt_in_window_is_limited() {
        let limiter = FixedWindowRateLimiter::new();
        let now = Instant::now();

        for _ in 0..5 {
            assert_eq!(limiter.check_at("k", now), RateLimitDecision::Allowed);
        }
        assert_eq!(limiter.check_at("k", now), RateLimitDecision::Limited);
        assert_eq!(
            limiter.check_at("k", now + Duration::from_secs(299)),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn window_expiry_allows_again() {
        let limiter = FixedWindowRateLimiter::new();
        let now = Instant::now();

        for _ in 0..6 {
            let _ = limiter.check_at("k", now);
        }
        assert_eq!(
            limiter.check_at("k", now + Duration::from_secs(300)),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn keys_are_independent() {
        let limiter = FixedWindowRateLimiter::new().with_max_attempts(1);
        let now = Instant::now();

        assert_eq!(limiter.check_at("a", now), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_at("a", now), RateLimitDecision::Limited);
        assert_eq!(limiter.check_at("b", now), RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let limiter = FixedWindowRateLimiter::new().with_max_attempts(1);
        assert_eq!(limiter.check("k").await, RateLimitDecision::Allowed);
        assert_eq!(limiter.check("k").await, RateLimitDecision::Limited);
        limiter.reset("k").await;
        assert_eq!(limiter.check("k").await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn noop_never_limits() {
        let limiter = NoopRateLimiter;
        for _ in 0..100 {
            assert_eq!(limiter.check("k").await, RateLimitDecision::Allowed);
        }
    }
}
