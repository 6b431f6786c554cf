use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::constants::{
    INBOUND_TIER_1_LOCKOUT_SECS, INBOUND_TIER_1_REQUESTS, INBOUND_TIER_2_LOCKOUT_SECS,
    INBOUND_TIER_2_REQUESTS, INBOUND_TIER_3_LOCKOUT_SECS, INBOUND_TIER_3_REQUESTS,
    INBOUND_WINDOW_SECS,
};

/// Per-IP sliding-window limiter guarding the token-exchange endpoint.
///
/// Tracks request counts over a rolling one-hour window and escalates the
/// lockout with volume: more than 5 requests blocks for 5 minutes, more than
/// 10 for 15 minutes, more than 20 for 30 minutes. Requests made while
/// blocked still count, so sustained abuse escalates. Process-local by
/// design: this damps abuse, it does not enforce a strict cross-instance
/// quota.
///
/// Callers supply a monotonic `Instant` so the clock can be controlled in
/// tests.
pub struct ExchangeRateLimiter {
    entries: Mutex<HashMap<IpAddr, IpWindow>>,
}

#[derive(Debug, Clone, Copy)]
struct IpWindow {
    window_start: Instant,
    count: u32,
    blocked_until: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Blocked { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

fn lockout_for(count: u32) -> Option<Duration> {
    if count > INBOUND_TIER_3_REQUESTS {
        Some(Duration::from_secs(INBOUND_TIER_3_LOCKOUT_SECS))
    } else if count > INBOUND_TIER_2_REQUESTS {
        Some(Duration::from_secs(INBOUND_TIER_2_LOCKOUT_SECS))
    } else if count > INBOUND_TIER_1_REQUESTS {
        Some(Duration::from_secs(INBOUND_TIER_1_LOCKOUT_SECS))
    } else {
        None
    }
}

impl ExchangeRateLimiter {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, ip: IpAddr, now: Instant) -> RateLimitDecision {
        let window = Duration::from_secs(INBOUND_WINDOW_SECS);
        let mut entries = self.entries.lock().unwrap();

        // On-access eviction of stale windows with no live lockout.
        entries.retain(|_, e| {
            now < e.window_start + window || e.blocked_until.map_or(false, |t| now < t)
        });

        let entry = entries.entry(ip).or_insert(IpWindow {
            window_start: now,
            count: 0,
            blocked_until: None,
        });

        if now >= entry.window_start + window {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count += 1;

        if let Some(lockout) = lockout_for(entry.count) {
            let until = now + lockout;
            let until = entry.blocked_until.map_or(until, |b| b.max(until));
            entry.blocked_until = Some(until);
            return RateLimitDecision::Blocked {
                retry_after: until - now,
            };
        }

        // A lockout triggered late in the previous window can outlive the
        // window reset; keep honoring it until it expires.
        if let Some(until) = entry.blocked_until {
            if now < until {
                return RateLimitDecision::Blocked {
                    retry_after: until - now,
                };
            }
            entry.blocked_until = None;
        }

        RateLimitDecision::Allowed
    }
}

impl Default for ExchangeRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "203.0.113.7".parse().unwrap()
    }

    #[test]
    fn first_five_requests_pass() {
        let limiter = ExchangeRateLimiter::new();
        let now = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check(ip(), now).is_allowed());
        }
    }

    #[test]
    fn sixth_request_blocks_for_five_minutes() {
        let limiter = ExchangeRateLimiter::new();
        let now = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check(ip(), now).is_allowed());
        }
        assert_eq!(
            limiter.check(ip(), now),
            RateLimitDecision::Blocked {
                retry_after: Duration::from_secs(5 * 60)
            }
        );
    }

    #[test]
    fn eleventh_request_blocks_for_fifteen_minutes() {
        let limiter = ExchangeRateLimiter::new();
        let now = Instant::now();
        for _ in 0..10 {
            limiter.check(ip(), now);
        }
        assert_eq!(
            limiter.check(ip(), now),
            RateLimitDecision::Blocked {
                retry_after: Duration::from_secs(15 * 60)
            }
        );
    }

    #[test]
    fn twenty_first_request_blocks_for_thirty_minutes() {
        let limiter = ExchangeRateLimiter::new();
        let now = Instant::now();
        for _ in 0..20 {
            limiter.check(ip(), now);
        }
        assert_eq!(
            limiter.check(ip(), now),
            RateLimitDecision::Blocked {
                retry_after: Duration::from_secs(30 * 60)
            }
        );
    }

    #[test]
    fn counter_resets_after_window_elapses() {
        let limiter = ExchangeRateLimiter::new();
        let now = Instant::now();
        for _ in 0..6 {
            limiter.check(ip(), now);
        }
        let later = now + Duration::from_secs(INBOUND_WINDOW_SECS + 1);
        for _ in 0..5 {
            assert!(limiter.check(ip(), later).is_allowed());
        }
    }

    #[test]
    fn independent_ips_do_not_interfere() {
        let limiter = ExchangeRateLimiter::new();
        let now = Instant::now();
        for _ in 0..6 {
            limiter.check(ip(), now);
        }
        let other: IpAddr = "198.51.100.9".parse().unwrap();
        assert!(limiter.check(other, now).is_allowed());
    }
}
