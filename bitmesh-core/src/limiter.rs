//! Per-channel token bucket with a cooldown penalty for draining it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Bucket capacity in tokens.
    pub capacity: f64,
    /// Refill rate in tokens per second.
    pub refill_per_sec: f64,
    /// Penalty applied when a consume finds the bucket empty.
    pub cooldown: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 5.0,
            refill_per_sec: 1.0,
            cooldown: Duration::from_secs(3),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    cooldown_until: Option<Instant>,
}

/// Token buckets keyed by channel name.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: HashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: HashMap::new(),
        }
    }

    /// Attempts to consume one token from `channel` at `now`.
    ///
    /// A rejected call while the bucket is empty arms a cooldown; every call
    /// before it expires is rejected without touching the bucket.
    pub fn try_consume(&mut self, channel: &str, now: Instant) -> bool {
        let config = &self.config;
        let bucket = self
            .buckets
            .entry(channel.to_owned())
            .or_insert_with(|| Bucket {
                tokens: config.capacity,
                last_refill: now,
                cooldown_until: None,
            });

        if let Some(until) = bucket.cooldown_until {
            if now < until {
                return false;
            }
        }

        let elapsed = now
            .saturating_duration_since(bucket.last_refill)
            .as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * config.refill_per_sec).min(config.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            bucket.cooldown_until = None;
            true
        } else {
            bucket.cooldown_until = Some(now + config.cooldown);
            false
        }
    }

    pub fn channels(&self) -> usize {
        self.buckets.len()
    }
}
