//! Sliding-window admission control keyed by caller identity.
//!
//! Each identity keeps the timestamps of its admitted requests. Every check
//! prunes timestamps older than the window across all identities and drops
//! identities left with none, so the map only holds callers active within
//! the trailing window.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use super::errors::RateLimitExceeded;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Per-identity sliding-window rate limiter.
///
/// Local to one process: concurrent instances enforce their limits
/// independently.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Allow `limit` requests per identity within each trailing `window`.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request from `identity`.
    pub fn admit(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.lock();

        // `checked_sub` fails only when the clock is younger than the
        // window, in which case nothing can have expired yet.
        if let Some(cutoff) = now.checked_sub(self.window) {
            windows.retain(|_, stamps| {
                while stamps.front().is_some_and(|ts| *ts <= cutoff) {
                    stamps.pop_front();
                }
                !stamps.is_empty()
            });
        }

        let stamps = windows.entry(identity.to_string()).or_default();
        if stamps.len() >= self.limit as usize {
            tracing::warn!(
                identity,
                limit = self.limit,
                window_secs = self.window.as_secs(),
                "rate limit exceeded"
            );
            // An identity rejected on first sight still has no admissions.
            if stamps.is_empty() {
                windows.remove(identity);
            }
            return false;
        }

        stamps.push_back(now);
        true
    }

    /// [`admit`](Self::admit) as a `Result`, for callers that propagate with `?`.
    pub fn check(&self, identity: &str) -> Result<(), RateLimitExceeded> {
        if self.admit(identity) {
            Ok(())
        } else {
            Err(RateLimitExceeded {
                identity: identity.to_string(),
                limit: self.limit,
                window: self.window,
            })
        }
    }

    /// Number of identities with admissions inside the current window.
    pub fn tracked_identities(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(3, DEFAULT_WINDOW);
        for _ in 0..3 {
            assert!(limiter.admit("10.0.0.1"));
        }
        assert!(!limiter.admit("10.0.0.1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admission_never_exceeds_limit() {
        let limiter = Arc::new(RateLimiter::new(5, DEFAULT_WINDOW));
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.admit("10.0.0.1") })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
        assert!(!limiter.admit("10.0.0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identities_are_independent() {
        let limiter = RateLimiter::new(1, DEFAULT_WINDOW);
        assert!(limiter.admit("a"));
        assert!(limiter.admit("b"));
        assert!(!limiter.admit("a"));
        assert_eq!(limiter.tracked_identities(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_resumes_after_window() {
        let limiter = RateLimiter::new(2, DEFAULT_WINDOW);
        assert!(limiter.admit("a"));
        assert!(limiter.admit("a"));
        assert!(!limiter.admit("a"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.admit("a"));
        assert!(limiter.admit("a"));
        assert!(!limiter.admit("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_per_timestamp() {
        let limiter = RateLimiter::new(2, DEFAULT_WINDOW);
        assert!(limiter.admit("a"));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.admit("a"));

        // The first admission expires, the second is still inside the window.
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(limiter.admit("a"));
        assert!(!limiter.admit("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_are_not_recorded() {
        let limiter = RateLimiter::new(1, DEFAULT_WINDOW);
        assert!(limiter.admit("a"));
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(!limiter.admit("a"));

        // Only the admitted request counts toward the window.
        tokio::time::advance(Duration::from_secs(16)).await;
        assert!(limiter.admit("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_identities_are_evicted() {
        let limiter = RateLimiter::new(5, DEFAULT_WINDOW);
        limiter.admit("a");
        limiter.admit("b");
        assert_eq!(limiter.tracked_identities(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.admit("c");
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_rejects_without_tracking() {
        let limiter = RateLimiter::new(0, DEFAULT_WINDOW);
        assert!(!limiter.admit("a"));
        assert_eq!(limiter.tracked_identities(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_reports_limit() {
        let limiter = RateLimiter::new(1, DEFAULT_WINDOW);
        assert!(limiter.check("a").is_ok());
        let err = limiter.check("a").unwrap_err();
        assert_eq!(err.identity, "a");
        assert_eq!(err.limit, 1);
        assert!(err.to_string().contains("60s"));
    }
}
