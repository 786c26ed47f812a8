//! Token-bucket admission control for outbound requests.
//!
//! One [`RateLimiter`] is shared (behind an `Arc`) by every fetch task that
//! talks to the same remote API. Token accounting and the wait decision
//! happen under a single [`tokio::sync::Mutex`], so concurrent callers are
//! admitted one at a time in FIFO order.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::SyncError;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    updated_at: Instant,
}

/// Token bucket refilled continuously at `rate_per_minute / 60` tokens per
/// second and capped at `max_tokens`.
///
/// The bucket starts full.
#[derive(Debug)]
pub struct RateLimiter {
    rate_per_second: f64,
    max_tokens: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a limiter whose burst size equals its per-minute rate.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `rate_per_minute` is zero.
    pub fn per_minute(rate_per_minute: u32) -> Result<Self, SyncError> {
        Self::new(rate_per_minute, rate_per_minute)
    }

    /// Creates a limiter with an explicit burst size.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `rate_per_minute` or `max_tokens` is
    /// zero.
    pub fn new(rate_per_minute: u32, max_tokens: u32) -> Result<Self, SyncError> {
        if rate_per_minute == 0 {
            return Err(SyncError::Config(
                "rate limiter needs a positive rate".to_string(),
            ));
        }
        if max_tokens == 0 {
            return Err(SyncError::Config(
                "rate limiter needs at least one token".to_string(),
            ));
        }
        let max_tokens = f64::from(max_tokens);
        Ok(Self {
            rate_per_second: f64::from(rate_per_minute) / 60.0,
            max_tokens,
            bucket: Mutex::new(Bucket {
                tokens: max_tokens,
                updated_at: Instant::now(),
            }),
        })
    }

    /// Waits until a token is available, then consumes it.
    ///
    /// When the bucket is short, the caller sleeps for exactly the time the
    /// bucket needs to reach one token, still holding the lock, so queued
    /// callers are paced one after another.
    pub async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.updated_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_second).min(self.max_tokens);
        bucket.updated_at = now;

        if bucket.tokens < 1.0 {
            let wait = (1.0 - bucket.tokens) / self.rate_per_second;
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
            bucket.tokens = 0.0;
            bucket.updated_at = Instant::now();
        } else {
            bucket.tokens -= 1.0;
        }
    }

    /// Returns the token count as of the last acquisition.
    pub async fn tokens(&self) -> f64 {
        self.bucket.lock().await.tokens
    }

    /// Returns the configured burst size.
    #[must_use]
    pub const fn max_tokens(&self) -> f64 {
        self.max_tokens
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(rate: u32, max: u32) -> RateLimiter {
        let Ok(limiter) = RateLimiter::new(rate, max) else {
            panic!("valid limiter");
        };
        limiter
    }

    #[test]
    fn rejects_zero_rate_and_capacity() {
        assert!(RateLimiter::new(0, 10).is_err());
        assert!(RateLimiter::new(10, 0).is_err());
        assert!(RateLimiter::per_minute(290).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_then_paced() {
        let limiter = limiter(60, 10);
        let start = Instant::now();
        for _ in 0..15 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_stay_within_bounds() {
        let limiter = limiter(120, 3);
        for round in 0..20 {
            limiter.acquire().await;
            let tokens = limiter.tokens().await;
            assert!((0.0..=limiter.max_tokens()).contains(&tokens));
            if round % 4 == 0 {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn steady_state_rate_is_bounded() {
        let limiter = Arc::new(limiter(60, 1));
        limiter.acquire().await;

        let granted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let limiter = Arc::clone(&limiter);
            let granted = Arc::clone(&granted);
            tasks.push(tokio::spawn(async move {
                limiter.acquire().await;
                granted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }));
        }

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let count = granted.load(std::sync::atomic::Ordering::SeqCst);
        // 1 token/s over a 10.5 s window: at most ceil(10.5) + 1.
        assert!(count <= 12, "granted {count}");
        assert!(count >= 9, "granted {count}");

        for task in tasks {
            task.abort();
        }
    }
}
