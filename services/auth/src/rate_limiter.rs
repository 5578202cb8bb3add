//! Login attempt limiter keyed by email
//!
//! Only failed attempts count. Once `max_attempts` failures land inside the
//! window the key is locked out for `ban_duration`; a successful login clears
//! the record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failures allowed inside one window
    pub max_attempts: u32,
    pub window: Duration,
    pub ban_duration: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(300),
            ban_duration: Duration::from_secs(900),
        }
    }
}

#[derive(Debug)]
struct Failures {
    count: u32,
    window_started: Instant,
    banned_until: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, Failures>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `key` may attempt a login right now
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let banned_until = entries.get(key).and_then(|entry| entry.banned_until);

        match banned_until {
            Some(until) if now < until => false,
            Some(_) => {
                entries.remove(key);
                true
            }
            None => true,
        }
    }

    /// Count a failed attempt, banning the key once the limit is reached
    pub async fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert(Failures {
            count: 0,
            window_started: now,
            banned_until: None,
        });

        if now.duration_since(entry.window_started) >= self.config.window {
            entry.count = 0;
            entry.window_started = now;
        }

        entry.count += 1;
        if entry.count >= self.config.max_attempts {
            entry.banned_until = Some(now + self.config.ban_duration);
            warn!(
                "Locked out {} for {} seconds after {} failed logins",
                key,
                self.config.ban_duration.as_secs(),
                entry.count
            );
        }
    }

    /// Forget the failures recorded for `key`
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window: Duration, ban: Duration) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_attempts: 3,
            window,
            ban_duration: ban,
        })
    }

    #[tokio::test]
    async fn bans_after_max_failures() {
        let limiter = limiter(Duration::from_secs(60), Duration::from_secs(60));

        for _ in 0..2 {
            limiter.record_failure("a@example.com").await;
            assert!(limiter.is_allowed("a@example.com").await);
        }
        limiter.record_failure("a@example.com").await;
        assert!(!limiter.is_allowed("a@example.com").await);

        // other keys are unaffected
        assert!(limiter.is_allowed("b@example.com").await);
    }

    #[tokio::test]
    async fn success_clears_failures() {
        let limiter = limiter(Duration::from_secs(60), Duration::from_secs(60));

        limiter.record_failure("a@example.com").await;
        limiter.record_failure("a@example.com").await;
        limiter.reset("a@example.com").await;
        limiter.record_failure("a@example.com").await;

        assert!(limiter.is_allowed("a@example.com").await);
    }

    #[tokio::test]
    async fn ban_expires() {
        let limiter = limiter(Duration::from_secs(60), Duration::from_millis(20));

        for _ in 0..3 {
            limiter.record_failure("a@example.com").await;
        }
        assert!(!limiter.is_allowed("a@example.com").await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.is_allowed("a@example.com").await);
    }

    #[tokio::test]
    async fn failures_outside_the_window_do_not_accumulate() {
        let limiter = limiter(Duration::from_millis(20), Duration::from_secs(60));

        limiter.record_failure("a@example.com").await;
        limiter.record_failure("a@example.com").await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        limiter.record_failure("a@example.com").await;

        assert!(limiter.is_allowed("a@example.com").await);
    }
}
