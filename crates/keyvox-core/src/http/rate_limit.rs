//! Rate limiting implementation using a fixed-window token bucket
//!
//! Each resource key (vendor id) gets `capacity` tokens per window. Refill is
//! lazy and happens only in whole-window jumps: burst availability appears
//! exactly at window boundaries rather than as a smooth rate. The refill
//! instant advances by whole windows, never to "now", so window alignment is
//! preserved across idle periods.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Limit applied to a single resource key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    /// Tokens available at the start of each window
    pub capacity: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl WindowLimit {
    /// Create a new window limit
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Limit for keys without an explicit entry
    pub default_limit: WindowLimit,
    /// Custom limits per resource key
    pub provider_limits: HashMap<String, WindowLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: WindowLimit::new(60, Duration::from_secs(60)),
            provider_limits: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Create a configuration with a single default limit
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            default_limit: WindowLimit::new(capacity, window),
            provider_limits: HashMap::new(),
        }
    }

    /// Add a key-specific limit
    pub fn with_provider_limit(mut self, provider: impl Into<String>, limit: WindowLimit) -> Self {
        self.provider_limits.insert(provider.into(), limit);
        self
    }

    /// Limit that applies to `key`
    pub fn limit_for(&self, key: &str) -> WindowLimit {
        self.provider_limits
            .get(key)
            .copied()
            .unwrap_or(self.default_limit)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let check = |name: &str, limit: &WindowLimit| {
            if limit.capacity == 0 {
                return Err(format!("{} capacity cannot be zero", name));
            }
            if limit.window_ms == 0 {
                return Err(format!("{} window cannot be zero", name));
            }
            Ok(())
        };

        check("default", &self.default_limit)?;
        for (provider, limit) in &self.provider_limits {
            check(&format!("Provider {}", provider), limit)?;
        }
        Ok(())
    }
}

/// Fixed-window token bucket
#[derive(Debug)]
struct TokenBucket {
    capacity: u32,
    available: u32,
    window: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket whose first window starts now
    fn new(limit: WindowLimit, now: Instant) -> Self {
        Self {
            capacity: limit.capacity,
            available: limit.capacity,
            // An unvalidated zero window would otherwise refill on every call
            window: limit.window().max(MIN_WINDOW),
            last_refill: now,
        }
    }

    /// Apply every whole window that has elapsed since the last refill
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let window_nanos = self.window.as_nanos().max(1);
        let windows = u64::try_from(elapsed.as_nanos() / window_nanos).unwrap_or(u64::MAX);
        if windows == 0 {
            return;
        }

        let granted = (windows as u128) * (self.capacity as u128);
        self.available = (self.available as u128 + granted).min(self.capacity as u128) as u32;

        let advance = u32::try_from(windows)
            .ok()
            .and_then(|w| self.window.checked_mul(w));
        self.last_refill = match advance {
            Some(step) => self.last_refill + step,
            // Idle for longer than u32 windows; realign to the current window
            None => now - Duration::from_nanos((elapsed.as_nanos() % window_nanos) as u64),
        };
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.available > 0 {
            self.available -= 1;
            true
        } else {
            false
        }
    }

    fn next_reset(&self) -> Instant {
        self.last_refill + self.window
    }
}

/// Snapshot of a key's bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Tokens left in the current window
    pub remaining: u32,
    /// Tokens granted per window
    pub capacity: u32,
    /// Time until the next window starts
    pub reset_in: Duration,
    /// Wall-clock time of the next window start
    pub reset_at: DateTime<Utc>,
}

/// Per-key admission control
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Take one token for `key` if available.
    ///
    /// Check-and-decrement happens under a single lock, so concurrent callers
    /// sharing a key can never be over-admitted.
    pub fn try_consume(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.config.limit_for(key), now));

        let admitted = bucket.try_consume(now);
        if admitted {
            tracing::trace!(key, remaining = bucket.available, "Rate limit token consumed");
        } else {
            tracing::debug!(key, "Rate limit reached for current window");
        }
        admitted
    }

    /// Report the bucket state for `key` without consuming
    pub fn peek(&self, key: &str) -> RateLimitStatus {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        let (remaining, capacity, next_reset) = match buckets.get_mut(key) {
            Some(bucket) => {
                bucket.refill(now);
                (bucket.available, bucket.capacity, bucket.next_reset())
            }
            None => {
                let limit = self.config.limit_for(key);
                (limit.capacity, limit.capacity, now + limit.window())
            }
        };

        let reset_in = next_reset.saturating_duration_since(now);
        let reset_at = Utc::now()
            + chrono::Duration::from_std(reset_in).unwrap_or_else(|_| chrono::Duration::zero());

        RateLimitStatus {
            remaining,
            capacity,
            reset_in,
            reset_at,
        }
    }

    /// Time until `key` gets fresh tokens, or zero if a token is available now
    pub fn time_until_available(&self, key: &str) -> Duration {
        let status = self.peek(key);
        if status.remaining > 0 {
            Duration::ZERO
        } else {
            status.reset_in
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_config_default() {
        let config = RateLimitConfig::default();
        assert_eq!(config.default_limit.capacity, 60);
        assert_eq!(config.default_limit.window(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_config_validation() {
        let mut config = RateLimitConfig::default();
        config.default_limit.capacity = 0;
        assert!(config.validate().is_err());

        let config = RateLimitConfig::default()
            .with_provider_limit("openai", WindowLimit { capacity: 5, window_ms: 0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_specific_limit() {
        let config = RateLimitConfig::new(10, Duration::from_secs(60))
            .with_provider_limit("elevenlabs", WindowLimit::new(2, Duration::from_secs(1)));
        assert_eq!(config.limit_for("elevenlabs").capacity, 2);
        assert_eq!(config.limit_for("openai").capacity, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_admission() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(60)));

        assert!(limiter.try_consume("elevenlabs"));
        assert!(limiter.try_consume("elevenlabs"));
        assert!(!limiter.try_consume("elevenlabs"));

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(limiter.try_consume("elevenlabs"));
        assert_eq!(limiter.peek("elevenlabs").remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_partial_refill_within_window() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));

        assert!(limiter.try_consume("openai"));
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!limiter.try_consume("openai"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_consume("openai"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_alignment_preserved() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));

        assert!(limiter.try_consume("polly"));
        // 2.5 windows later: the refill instant advances by 2 whole windows
        tokio::time::advance(Duration::from_secs(150)).await;
        let status = limiter.peek("polly");
        assert_eq!(status.remaining, 1);
        assert_eq!(status.reset_in, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, Duration::from_secs(10)));

        assert!(limiter.try_consume("k"));
        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(limiter.peek("k").remaining, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));

        assert!(limiter.try_consume("provider1"));
        assert!(limiter.try_consume("provider2"));
        assert!(!limiter.try_consume("provider1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_does_not_consume() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(60)));

        let fresh = limiter.peek("openai");
        assert_eq!(fresh.remaining, 2);
        assert_eq!(fresh.capacity, 2);

        assert!(limiter.try_consume("openai"));
        let status = limiter.peek("openai");
        assert_eq!(status.remaining, 1);
        assert_eq!(limiter.peek("openai").remaining, 1);
        assert!(status.reset_in <= Duration::from_secs(60));
        assert!(status.reset_at > Utc::now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_available() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));
        assert_eq!(limiter.time_until_available("k"), Duration::ZERO);

        assert!(limiter.try_consume("k"));
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(limiter.time_until_available("k"), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_second_window() {
        let limit = WindowLimit::new(1, Duration::from_millis(500));
        assert_eq!(limit.window_ms, 500);
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_millis(500)));

        let mut admitted = 0;
        for _ in 0..10 {
            if limiter.try_consume("elevenlabs") {
                admitted += 1;
            }
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        assert_eq!(admitted, 1);

        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(limiter.try_consume("elevenlabs"));
        assert!(!limiter.try_consume("elevenlabs"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_idle_realigns_window() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_millis(1)));
        assert!(limiter.try_consume("k"));

        // More than u32::MAX whole windows
        tokio::time::advance(Duration::from_millis(u32::MAX as u64 + 10)).await;
        assert!(limiter.try_consume("k"));
        assert!(limiter.peek("k").reset_in <= Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_window_still_limits() {
        let config = RateLimitConfig::default()
            .with_provider_limit("openai", WindowLimit { capacity: 1, window_ms: 0 });
        let limiter = RateLimiter::new(config);

        assert!(limiter.try_consume("openai"));
        assert!(!limiter.try_consume("openai"));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.try_consume("openai"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumers_never_over_admit() {
        let limiter = RateLimiter::new(RateLimitConfig::new(25, Duration::from_secs(3600)));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.try_consume("shared") }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 25);
    }
}
