//! Per-source token buckets.
//!
//! Buckets are created lazily on first sight of a source and refill at
//! `requests_per_second` up to `burst`. A periodic GC drops buckets idle
//! past the window so the map tracks active peers only.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use dashmap::DashMap;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    rps: f64,
    burst: f64,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(enabled: bool, rps: f64, burst: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            rps,
            burst,
            enabled,
        }
    }

    /// Take one token for `source`; `false` means throttled.
    pub fn allow(&self, source: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut bucket = self.buckets.entry(source.to_string()).or_insert_with(|| Bucket {
            tokens: self.burst,
            last_refill: now,
            last_used: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rps).min(self.burst);
        bucket.last_refill = now;
        bucket.last_used = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle longer than `idle`. Returns how many were purged.
    pub fn gc(&self, idle: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.last_used.elapsed() < idle);
        before.saturating_sub(self.buckets.len())
    }

    pub fn tracked_sources(&self) -> usize {
        self.buckets.len()
    }
}

/// Source identity for throttling, in preference order: first hop of
/// `X-Forwarded-For`, then `X-Real-IP`, then the peer address.
pub fn client_source(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_burst_then_throttle() {
        let limiter = RateLimiter::new(true, 1.0, 3.0);
        assert!(limiter.allow("peer"));
        assert!(limiter.allow("peer"));
        assert!(limiter.allow("peer"));
        assert!(!limiter.allow("peer"));
    }

    #[test]
    fn test_sources_are_independent() {
        let limiter = RateLimiter::new(true, 1.0, 1.0);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert_eq!(limiter.tracked_sources(), 2);
    }

    #[test]
    fn test_refill_restores_tokens() {
        let limiter = RateLimiter::new(true, 100.0, 1.0);
        assert!(limiter.allow("peer"));
        assert!(!limiter.allow("peer"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.allow("peer"));
    }

    #[test]
    fn test_disabled_always_allows() {
        let limiter = RateLimiter::new(false, 0.1, 1.0);
        for _ in 0..100 {
            assert!(limiter.allow("peer"));
        }
        assert_eq!(limiter.tracked_sources(), 0);
    }

    #[test]
    fn test_gc_drops_idle_buckets() {
        let limiter = RateLimiter::new(true, 1.0, 1.0);
        limiter.allow("a");
        limiter.allow("b");
        std::thread::sleep(Duration::from_millis(20));
        limiter.allow("b"); // refresh b

        assert_eq!(limiter.gc(Duration::from_millis(15)), 1);
        assert_eq!(limiter.tracked_sources(), 1);
    }

    #[test]
    fn test_source_extraction_order() {
        let peer: SocketAddr = "192.0.2.9:1234".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_source(&headers, peer), "192.0.2.9");

        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.5"));
        assert_eq!(client_source(&headers, peer), "203.0.113.5");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.7, 10.0.0.1"),
        );
        assert_eq!(client_source(&headers, peer), "198.51.100.7");
    }
}
