//! 按集成限流（令牌桶，突发 1）

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// 速率极低时令牌间隔的上限
const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

struct Entry {
    rate: f64,
    limiter: Arc<DefaultDirectRateLimiter>,
}

/// 每个集成一个限流器；配置的速率变化时重建
#[derive(Default)]
pub struct RateLimiters {
    inner: DashMap<i32, Entry>,
}

impl RateLimiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得（必要时创建）集成的限流器；rate <= 0 表示不限流
    pub fn limiter_for(&self, integration_id: i32, rate: f64) -> Option<Arc<DefaultDirectRateLimiter>> {
        if !rate.is_finite() || rate <= 0.0 {
            return None;
        }
        if let Some(entry) = self.inner.get(&integration_id)
            && entry.rate == rate
        {
            return Some(entry.limiter.clone());
        }

        let period = Duration::try_from_secs_f64(1.0 / rate)
            .map_or(MAX_PERIOD, |p| p.min(MAX_PERIOD));
        let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(quota));
        self.inner.insert(
            integration_id,
            Entry {
                rate,
                limiter: limiter.clone(),
            },
        );
        Some(limiter)
    }

    /// 等待一个令牌
    pub async fn acquire(&self, integration_id: i32, rate: f64) {
        if let Some(limiter) = self.limiter_for(integration_id, rate) {
            limiter.until_ready().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_disabled_rate() {
        let limiters = RateLimiters::new();
        assert!(limiters.limiter_for(1, 0.0).is_none());
        assert!(limiters.limiter_for(1, -2.0).is_none());
        assert!(limiters.is_empty());
    }

    #[test]
    fn test_limiter_rebuilt_on_rate_change() {
        let limiters = RateLimiters::new();
        let a = limiters.limiter_for(7, 2.0).unwrap();
        let b = limiters.limiter_for(7, 2.0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = limiters.limiter_for(7, 5.0).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(limiters.len(), 1);
    }

    #[test]
    fn test_tiny_rate_is_clamped() {
        let limiters = RateLimiters::new();
        let limiter = limiters.limiter_for(9, 1e-20).unwrap();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
        assert!(limiters.limiter_for(10, f64::MIN_POSITIVE).is_some());
    }

    #[tokio::test]
    async fn test_second_call_waits() {
        let limiters = RateLimiters::new();
        let start = Instant::now();
        limiters.acquire(3, 10.0).await;
        limiters.acquire(3, 10.0).await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
