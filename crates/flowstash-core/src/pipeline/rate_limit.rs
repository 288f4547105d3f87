//! Sliding-window admission control per client identity.
//!
//! [`RateLimiter`] is owned by whoever handles requests (the HTTP server keeps
//! one in its state) and is consulted once per inbound batch, before any fetch
//! work starts. State is in-memory only: it is lost on restart and is not
//! shared between processes, which makes it an abuse heuristic rather than a
//! guarantee.
//!
//! Timestamps come from `tokio::time::Instant`, so tests can pause and advance
//! the runtime clock instead of sleeping.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Identity used when no client address signal is available.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Per-identity sliding-window rate limiter.
///
/// Each identity maps to the ordered timestamps of its admitted requests.
/// Pruning, counting and recording happen while holding that identity's map
/// shard, so concurrent checks for one identity cannot both squeeze into the
/// last free slot.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    windows: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per identity per `window`.
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            windows: DashMap::new(),
        }
    }

    /// Create a limiter from configuration.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_secs(config.window_secs), config.max_requests)
    }

    /// Admit or reject one request from `identity` at the current time.
    ///
    /// Rejected attempts are not recorded, so a client that keeps hammering
    /// is readmitted as soon as its oldest admitted request leaves the window.
    pub fn admit(&self, identity: &str) -> bool {
        self.admit_at(identity, Instant::now())
    }

    /// Admit or reject one request from `identity` at `now`.
    pub fn admit_at(&self, identity: &str, now: Instant) -> bool {
        let mut timestamps = self.windows.entry(identity.to_string()).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            debug!(identity, count = timestamps.len(), "rate limit exceeded");
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Number of identities currently holding window state.
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    /// Drop identities whose windows have fully expired.
    pub fn purge_idle(&self) {
        let now = Instant::now();
        self.windows.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|&last| now.saturating_duration_since(last) < self.window)
        });
    }
}

/// Derive the client identity from the best available address signal.
///
/// Precedence: first entry of `X-Forwarded-For`, then `X-Real-IP`, then the
/// transport peer address, then [`UNKNOWN_IDENTITY`]. Both headers are client
/// controlled, so behind an untrusted proxy the identity can be spoofed.
pub fn client_identity(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer: Option<IpAddr>,
) -> String {
    let forwarded = forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    if let Some(ip) = real_ip.map(str::trim).filter(|v| !v.is_empty()) {
        return ip.to_string();
    }

    peer.map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_request_in_window_rejected() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 10);
        for _ in 0..10 {
            assert!(limiter.admit("203.0.113.7"));
        }
        assert!(!limiter.admit("203.0.113.7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admitted_again_after_window_elapses() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 10);
        for _ in 0..10 {
            assert!(limiter.admit("203.0.113.7"));
        }
        assert!(!limiter.admit("203.0.113.7"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.admit("203.0.113.7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_per_request() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        assert!(limiter.admit("a"));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.admit("a"));
        assert!(!limiter.admit("a"));

        // First request leaves the window, second is still inside it
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.admit("a"));
        assert!(!limiter.admit("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_are_not_recorded() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.admit("a"));
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(10)).await;
            assert!(!limiter.admit("a"));
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.admit("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identities_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.admit("a"));
        assert!(limiter.admit("b"));
        assert!(!limiter.admit("a"));
        assert_eq!(limiter.tracked_identities(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_idle_drops_expired_windows() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 5);
        limiter.admit("a");
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.admit("b");
        tokio::time::advance(Duration::from_secs(31)).await;
        limiter.purge_idle();
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn test_identity_prefers_forwarded_for() {
        let peer = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(
            client_identity(Some("198.51.100.4, 10.0.0.2"), Some("198.51.100.9"), peer),
            "198.51.100.4"
        );
        assert_eq!(
            client_identity(None, Some("198.51.100.9"), peer),
            "198.51.100.9"
        );
        assert_eq!(client_identity(Some(" "), None, peer), "10.0.0.1");
        assert_eq!(client_identity(None, None, None), UNKNOWN_IDENTITY);
    }
}
