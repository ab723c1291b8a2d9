//! Token bucket rate limiting.
//!
//! One shared bucket paces all LLM spend process-wide; the web layer keeps
//! a bucket per API key. Buckets start full.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::errors::LogoError;

/// Token bucket rate limiter
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens held at once
    capacity: u32,
    /// Current available tokens
    tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// Last refill time
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    /// Try to consume a token, returns true if allowed
    pub fn try_acquire(&mut self) -> bool {
        // Refill tokens based on elapsed time
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let refill_amount = elapsed.as_secs_f64() * self.refill_rate;

        self.tokens = (self.tokens + refill_amount).min(self.capacity as f64);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Get time until a token will be available
    pub fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Duration::from_secs_f64(tokens_needed / self.refill_rate)
        }
    }
}

/// Strictly paced limiter shared by every LLM backend call.
///
/// Burst size is 1, so calls are admitted at most once per interval no
/// matter how many tasks are waiting.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(capacity, refill_rate)),
        }
    }

    pub fn per_minute(rate_per_minute: u32) -> Self {
        // A zero rate would never refill; floor it at one call per minute
        let rate = rate_per_minute.max(1);
        Self::new(1, f64::from(rate) / 60.0)
    }

    /// Block until a token is admitted or the caller is cancelled. Waiters
    /// re-contend after each sleep, so a token freed early goes to whoever
    /// wakes first.
    pub async fn wait(&self, cancellation_token: &CancellationToken) -> Result<(), LogoError> {
        loop {
            let wait_time = {
                let mut bucket = self.bucket.lock().unwrap();
                if bucket.try_acquire() {
                    return Ok(());
                }
                bucket.time_until_available()
            };

            tokio::select! {
                _ = tokio::time::sleep(wait_time) => {}
                _ = cancellation_token.cancelled() => {
                    return Err(LogoError::Cancelled);
                }
            }
        }
    }
}

/// One bucket per API key, created lazily on first use.
///
/// Used by the web layer to throttle callers independently; the map only
/// grows with the number of distinct configured keys.
#[derive(Debug)]
pub struct KeyedRateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    requests_per_second: f64,
    burst: u32,
}

impl KeyedRateLimiter {
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            requests_per_second,
            burst,
        }
    }

    /// Admit one request for the key, or report how long until the next
    /// token frees up.
    pub fn try_acquire(&self, key: &str) -> Result<(), Duration> {
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst, self.requests_per_second));

        if bucket.try_acquire() {
            Ok(())
        } else {
            Err(bucket.time_until_available())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_starts_full_and_drains() {
        let mut bucket = TokenBucket::new(2, 1.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        assert!(bucket.time_until_available() > Duration::ZERO);
    }

    #[test]
    fn bucket_refills_over_time() {
        let mut bucket = TokenBucket::new(1, 10.0);
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        // Simulate elapsed time instead of sleeping
        bucket.last_refill = Instant::now() - Duration::from_millis(150);
        assert!(bucket.try_acquire());
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let mut bucket = TokenBucket::new(1, 100.0);
        bucket.last_refill = Instant::now() - Duration::from_secs(60);
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test]
    async fn wait_paces_second_caller() {
        let limiter = RateLimiter::new(1, 20.0);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        limiter.wait(&cancel).await.unwrap();
        limiter.wait(&cancel).await.unwrap();
        // Second token needs a refill interval (50ms at 20/s)
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn keyed_limiter_tracks_keys_independently() {
        let limiter = KeyedRateLimiter::new(1.0, 1);
        assert!(limiter.try_acquire("alpha").is_ok());
        assert!(limiter.try_acquire("alpha").is_err());
        // A different key gets its own full bucket
        assert!(limiter.try_acquire("beta").is_ok());
    }

    #[test]
    fn keyed_limiter_reports_retry_delay() {
        let limiter = KeyedRateLimiter::new(2.0, 1);
        limiter.try_acquire("k").unwrap();
        let wait = limiter.try_acquire("k").unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn wait_is_cancellable() {
        let limiter = RateLimiter::per_minute(1);
        let cancel = CancellationToken::new();
        limiter.wait(&cancel).await.unwrap();

        let waiter = {
            let cancel = cancel.clone();
            async move { limiter.wait(&cancel).await }
        };
        cancel.cancel();

        let err = waiter.await.unwrap_err();
        assert!(matches!(err, LogoError::Cancelled));
    }
}
