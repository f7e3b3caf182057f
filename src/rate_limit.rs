//! Fixed-window rate limiting for settlement entry points.
//!
//! Counters are keyed per (caller, action) so one noisy caller or action
//! class cannot starve the others. Counters are in-process and ephemeral:
//! losing them weakens throttling but never correctness.
//!
//! The guard fails OPEN. Availability of the settlement path takes priority
//! over throttling precision, so any internal failure (poisoned lock, clock
//! error) allows the call instead of locking out legitimate use.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    /// A limiter allowing `limit` calls per `window` for each key.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limit,
            window,
        }
    }

    /// Convenience constructor matching the per-minute configuration knob.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Check and count one call for `key`. Returns `true` when the call is
    /// allowed. Returns `true` on any internal failure (fail-open).
    pub fn check(&self, key: &str) -> bool {
        let Ok(mut windows) = self.windows.lock() else {
            tracing::warn!("rate limiter lock poisoned, failing open");
            return true;
        };

        let now = Instant::now();

        // Drop expired windows so the map does not grow without bound with
        // caller churn; an evicted key simply starts a fresh window.
        windows.retain(|_, w| now.duration_since(w.started) < self.window);

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if window.count >= self.limit {
            return false;
        }

        window.count += 1;
        true
    }

    /// Compose the counter key for a caller/action pair.
    pub fn key(caller: &str, action: &str) -> String {
        format!("{}:{}", caller, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("c1:create_session"));
        assert!(limiter.check("c1:create_session"));
        assert!(limiter.check("c1:create_session"));
        assert!(!limiter.check("c1:create_session"));
    }

    #[test]
    fn test_keys_are_isolated() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("c1:create_session"));
        assert!(!limiter.check("c1:create_session"));
        // Different caller and different action are unaffected
        assert!(limiter.check("c2:create_session"));
        assert!(limiter.check("c1:verify_session"));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.check("c1:verify_session"));
        assert!(!limiter.check("c1:verify_session"));
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("c1:verify_session"));
    }

    #[test]
    fn test_expired_windows_are_evicted() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.check("c1:create_session"));
        assert!(limiter.check("c2:create_session"));
        std::thread::sleep(Duration::from_millis(15));

        // Any later check sweeps out the stale entries.
        assert!(limiter.check("c3:create_session"));
        assert_eq!(limiter.windows.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_fails_open_on_poisoned_lock() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let poisoner = Arc::clone(&limiter);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.windows.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        // Counter store is unusable: allow rather than lock out
        assert!(limiter.check("c1:create_session"));
        assert!(limiter.check("c1:create_session"));
    }
}
