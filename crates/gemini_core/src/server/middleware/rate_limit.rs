//! Per-IP token-bucket rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::response::Response;
use crate::server::middleware::{Decision, Middleware};

/// Idle buckets older than this are swept by the cleanup task, so a rate limiter that
/// runs for days doesn't accumulate one bucket per IP ever seen.
const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(600);
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        let now = Instant::now();
        TokenBucket {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
            last_used: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    pub fn consume(&mut self, amount: f64) -> bool {
        let now = Instant::now();
        self.refill(now);
        self.last_used = now;
        if self.tokens >= amount {
            self.tokens -= amount;
            true
        } else {
            false
        }
    }

    /// Seconds until at least one token is available, for a `Retry-After`-style hint.
    fn retry_after_secs(&self) -> u64 {
        if self.refill_rate <= 0.0 {
            return u64::MAX;
        }
        let deficit = (1.0 - self.tokens).max(0.0);
        (deficit / self.refill_rate).ceil() as u64
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_rate: f64,
    pub idle_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl RateLimitConfig {
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        RateLimitConfig {
            capacity,
            refill_rate,
            idle_ttl: DEFAULT_IDLE_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        RateLimiter {
            config,
            buckets: Mutex::new(HashMap::new()),
            cleanup_task: Mutex::new(None),
        }
    }

    fn check(&self, remote_addr: IpAddr) -> Decision {
        if self.config.capacity <= 0.0 {
            return Decision::Deny(Response::new(
                44,
                "Rate limit exceeded; retry after 1 seconds",
                None,
            ));
        }

        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry(remote_addr)
            .or_insert_with(|| TokenBucket::new(self.config.capacity, self.config.refill_rate));

        if bucket.consume(1.0) {
            Decision::Allow
        } else {
            let retry_after = bucket.retry_after_secs();
            Decision::Deny(Response::new(
                44,
                format!("Rate limit exceeded; retry after {retry_after} seconds"),
                None,
            ))
        }
    }

    /// Spawns a background sweep that evicts buckets idle past `idle_ttl`. Safe to call
    /// more than once; a prior task is stopped first.
    pub fn start(self: &std::sync::Arc<Self>) {
        let mut slot = self.cleanup_task.lock().expect("rate limiter mutex poisoned");
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let this = std::sync::Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.cleanup_interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let ttl = this.config.idle_ttl;
                this.buckets
                    .lock()
                    .expect("rate limiter mutex poisoned")
                    .retain(|_, bucket| now.duration_since(bucket.last_used) < ttl);
            }
        }));
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.cleanup_task.lock().expect("rate limiter mutex poisoned").take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl Middleware for RateLimiter {
    async fn process_request(
        &self,
        _uri: &str,
        remote_addr: IpAddr,
        _client_cert_fingerprint: Option<&str>,
    ) -> Decision {
        self.check(remote_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn bucket_consumes_up_to_capacity() {
        let mut bucket = TokenBucket::new(5.0, 1.0);
        for _ in 0..5 {
            assert!(bucket.consume(1.0));
        }
        assert!(!bucket.consume(1.0));
    }

    #[test]
    fn bucket_never_exceeds_capacity_on_refill() {
        let mut bucket = TokenBucket::new(3.0, 100.0);
        assert!(bucket.consume(1.0));
        std::thread::sleep(Duration::from_millis(100));
        assert!(bucket.consume(1.0));
        assert!(bucket.consume(1.0));
        assert!(bucket.consume(1.0));
        assert!(!bucket.consume(1.0));
    }

    #[tokio::test]
    async fn allows_requests_within_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3.0, 1.0));
        for _ in 0..3 {
            assert!(matches!(
                limiter.process_request("gemini://t/", ip("192.168.1.1"), None).await,
                Decision::Allow
            ));
        }
    }

    #[tokio::test]
    async fn blocks_once_over_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2.0, 1.0));
        for _ in 0..2 {
            limiter.process_request("gemini://t/", ip("192.168.1.1"), None).await;
        }
        match limiter.process_request("gemini://t/", ip("192.168.1.1"), None).await {
            Decision::Deny(resp) => {
                assert_eq!(resp.status(), 44);
                assert!(resp.meta().contains("Rate limit exceeded"));
            }
            Decision::Allow => panic!("expected deny"),
        }
    }

    #[tokio::test]
    async fn tracks_buckets_per_ip() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1.0, 1.0));
        assert!(matches!(
            limiter.process_request("gemini://t/", ip("192.168.1.1"), None).await,
            Decision::Allow
        ));
        assert!(matches!(
            limiter.process_request("gemini://t/", ip("192.168.1.2"), None).await,
            Decision::Allow
        ));
        assert!(matches!(
            limiter.process_request("gemini://t/", ip("192.168.1.1"), None).await,
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn cleanup_task_starts_and_stops() {
        let limiter = std::sync::Arc::new(RateLimiter::new(RateLimitConfig::new(10.0, 1.0)));
        limiter.start();
        limiter.process_request("gemini://t/", ip("192.168.1.1"), None).await;
        limiter.stop().await;
        assert!(limiter
            .cleanup_task
            .lock()
            .unwrap()
            .as_ref()
            .is_none_or(|h| h.is_finished()));
    }
}
