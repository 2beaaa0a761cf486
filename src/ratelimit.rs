//! Token-bucket rate limiting for the API routes.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;

/// Global token bucket: `max_requests` tokens refilled evenly over
/// `window`. Cloning shares the bucket.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<RateState>>,
    capacity: f64,
    refill_per_sec: f64,
}

struct RateState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `None` when rate limiting is disabled (`max_requests = 0`).
    pub fn new(max_requests: u32, window: Duration) -> Option<Self> {
        if max_requests == 0 || window.is_zero() {
            return None;
        }
        let capacity = max_requests as f64;
        Some(Self {
            state: Arc::new(Mutex::new(RateState {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
            capacity,
            refill_per_sec: capacity / window.as_secs_f64(),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    /// Take one token. Returns `false` when the bucket is empty.
    pub async fn acquire(&self) -> bool {
        let mut guard = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(guard.last_refill).as_secs_f64();
        guard.last_refill = now;
        guard.tokens = (guard.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if guard.tokens >= 1.0 {
            guard.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exhausts_after_capacity() {
        let limiter = RateLimiter::new(3, Duration::from_secs(3600)).unwrap();
        assert!(limiter.acquire().await);
        assert!(limiter.acquire().await);
        assert!(limiter.acquire().await);
        assert!(!limiter.acquire().await);
    }

    #[tokio::test]
    async fn test_refills_over_time() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50)).unwrap();
        assert!(limiter.acquire().await);
        assert!(!limiter.acquire().await);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.acquire().await);
    }

    #[test]
    fn test_disabled() {
        assert!(RateLimiter::new(0, Duration::from_secs(60)).is_none());
        let config = RateLimitConfig {
            max_requests: 0,
            window_secs: 60,
        };
        assert!(RateLimiter::from_config(&config).is_none());
        assert!(RateLimiter::from_config(&RateLimitConfig::default()).is_some());
    }
}
