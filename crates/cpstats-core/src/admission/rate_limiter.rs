use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use crate::clock::deadline;

/// Tunables for [`AdaptiveRateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests admitted per window for a caller with zero suspicion.
    pub base_quota: u32,
    pub window: Duration,
    /// Quota never shrinks below this while the caller is not blocked.
    pub floor: u32,
    /// Quota removed per suspicion point.
    pub penalty_per_suspicion: u32,
    /// Burst detector: more than `burst_limit` requests inside
    /// `burst_window` counts as a burst.
    pub burst_limit: u32,
    pub burst_window: Duration,
    pub violation_suspicion: u32,
    pub burst_suspicion: u32,
    pub block_threshold: u32,
    pub block_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_quota: 60,
            window: Duration::from_secs(60),
            floor: 5,
            penalty_per_suspicion: 5,
            burst_limit: 10,
            burst_window: Duration::from_secs(1),
            violation_suspicion: 1,
            burst_suspicion: 3,
            block_threshold: 10,
            block_duration: Duration::from_secs(15 * 60),
        }
    }
}

/// Admission granted to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limit: u32,
    pub remaining: u32,
}

/// Structured rejection carrying enough detail for the caller to back off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRejection {
    pub ip: String,
    pub limit: u32,
    pub used: u32,
    pub retry_after: Duration,
    pub blocked: bool,
}

impl Display for RateLimitRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.blocked {
            write!(
                f,
                "caller {} is temporarily blocked; retry in {}ms",
                self.ip,
                self.retry_after.as_millis()
            )
        } else {
            write!(
                f,
                "rate limit exceeded for {}: {}/{} requests in window; retry in {}ms",
                self.ip,
                self.used,
                self.limit,
                self.retry_after.as_millis()
            )
        }
    }
}

#[derive(Debug)]
struct CallerState {
    window_start: Instant,
    last_seen: Instant,
    used: u32,
    suspicion: u32,
    blocked_until: Option<Instant>,
}

impl CallerState {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            last_seen: now,
            used: 0,
            suspicion: 0,
            blocked_until: None,
        }
    }
}

/// Per-caller fixed-window limiter whose quota shrinks with suspicion.
///
/// `quota = max(floor, base_quota - suspicion * penalty)`. Violations and
/// bursts raise suspicion; at `block_threshold` the caller is blocked with
/// zero quota until `block_duration` passes, after which its suspicion is
/// cleared.
pub struct AdaptiveRateLimiter {
    config: RateLimitConfig,
    callers: Mutex<HashMap<String, CallerState>>,
    bursts: DefaultKeyedRateLimiter<String>,
}

impl std::fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for AdaptiveRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let bursts = RateLimiter::keyed(quota_from_window(config.burst_window, config.burst_limit));
        Self {
            config,
            callers: Mutex::new(HashMap::new()),
            bursts,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn check(&self, ip: &str) -> Result<RateLimitDecision, RateLimitRejection> {
        let burst = self.bursts.check_key(&ip.to_owned()).is_err();
        let now = Instant::now();

        let mut callers = self
            .callers
            .lock()
            .expect("rate limiter lock is not poisoned");
        let state = callers
            .entry(ip.to_owned())
            .or_insert_with(|| CallerState::new(now));

        if let Some(until) = state.blocked_until {
            if now < until {
                return Err(self.blocked(ip, state, until - now));
            }
            debug!(ip, "caller unblocked");
            *state = CallerState::new(now);
        }

        if state.suspicion > 0 && now.duration_since(state.last_seen) >= self.quiet_period() {
            debug!(ip, suspicion = state.suspicion, "suspicion decayed after quiet period");
            state.suspicion = 0;
        }
        state.last_seen = now;

        if now.duration_since(state.window_start) >= self.config.window {
            state.window_start = now;
            state.used = 0;
        }

        if burst {
            state.suspicion = state.suspicion.saturating_add(self.config.burst_suspicion);
            debug!(ip, suspicion = state.suspicion, "request burst detected");
        }

        let limit = self.quota_for(state.suspicion);
        if state.used >= limit {
            state.suspicion = state
                .suspicion
                .saturating_add(self.config.violation_suspicion);
            if let Some(rejection) = self.maybe_block(ip, state, now) {
                return Err(rejection);
            }
            return Err(RateLimitRejection {
                ip: ip.to_owned(),
                limit: self.quota_for(state.suspicion),
                used: state.used,
                retry_after: deadline(state.window_start, self.config.window)
                    .saturating_duration_since(now),
                blocked: false,
            });
        }

        if let Some(rejection) = self.maybe_block(ip, state, now) {
            return Err(rejection);
        }

        state.used += 1;
        Ok(RateLimitDecision {
            limit,
            remaining: limit - state.used,
        })
    }

    /// Current quota for a suspicion level.
    pub fn quota_for(&self, suspicion: u32) -> u32 {
        let penalty = suspicion.saturating_mul(self.config.penalty_per_suspicion);
        self.config
            .base_quota
            .saturating_sub(penalty)
            .max(self.config.floor)
    }

    pub fn suspicion(&self, ip: &str) -> u32 {
        self.callers
            .lock()
            .expect("rate limiter lock is not poisoned")
            .get(ip)
            .map_or(0, |state| state.suspicion)
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        let now = Instant::now();
        self.callers
            .lock()
            .expect("rate limiter lock is not poisoned")
            .get(ip)
            .and_then(|state| state.blocked_until)
            .is_some_and(|until| now < until)
    }

    /// Drops callers whose window and block have lapsed. Suspicious callers
    /// are kept until they have been quiet for [`Self::quiet_period`].
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let window = self.config.window;
        let quiet = self.quiet_period();
        let mut callers = self
            .callers
            .lock()
            .expect("rate limiter lock is not poisoned");
        let before = callers.len();
        callers.retain(|_, state| match state.blocked_until {
            Some(until) => now < until,
            None => {
                now.duration_since(state.window_start) < window
                    || (state.suspicion > 0 && now.duration_since(state.last_seen) < quiet)
            }
        });
        let removed = before - callers.len();
        drop(callers);

        self.bursts.retain_recent();
        self.bursts.shrink_to_fit();
        removed
    }

    /// Idle time after which an unblocked caller's suspicion is forgotten.
    pub fn quiet_period(&self) -> Duration {
        self.config.window.max(self.config.block_duration)
    }

    fn maybe_block(
        &self,
        ip: &str,
        state: &mut CallerState,
        now: Instant,
    ) -> Option<RateLimitRejection> {
        if state.suspicion < self.config.block_threshold {
            return None;
        }

        let until = deadline(now, self.config.block_duration);
        state.blocked_until = Some(until);
        warn!(
            ip,
            suspicion = state.suspicion,
            block_secs = self.config.block_duration.as_secs(),
            "caller blocked"
        );
        Some(self.blocked(ip, state, self.config.block_duration))
    }

    fn blocked(&self, ip: &str, state: &CallerState, retry_after: Duration) -> RateLimitRejection {
        RateLimitRejection {
            ip: ip.to_owned(),
            limit: 0,
            used: state.used,
            retry_after,
            blocked: true,
        }
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let burst = NonZeroU32::new(limit.max(1)).unwrap_or(NonZeroU32::MIN);
    let seconds_per_cell = (window.as_secs_f64() / f64::from(burst.get())).max(0.001);

    Quota::with_period(Duration::from_secs_f64(seconds_per_cell))
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            base_quota: 10,
            window: Duration::from_secs(60),
            floor: 2,
            penalty_per_suspicion: 3,
            burst_limit: 1_000,
            burst_window: Duration::from_secs(1),
            violation_suspicion: 1,
            burst_suspicion: 3,
            block_threshold: 100,
            block_duration: Duration::from_secs(60),
        }
    }

    #[test]
    fn quota_shrinks_with_suspicion_down_to_floor() {
        let limiter = AdaptiveRateLimiter::new(config());

        assert_eq!(limiter.quota_for(0), 10);
        assert_eq!(limiter.quota_for(1), 7);
        assert_eq!(limiter.quota_for(2), 4);
        assert_eq!(limiter.quota_for(3), 2);
        assert_eq!(limiter.quota_for(50), 2);
    }

    #[test]
    fn rejects_after_quota_and_raises_suspicion() {
        let limiter = AdaptiveRateLimiter::new(config());

        for expected_remaining in (0..10).rev() {
            let decision = limiter.check("10.0.0.1").expect("within quota");
            assert_eq!(decision.remaining, expected_remaining);
        }

        let rejection = limiter.check("10.0.0.1").expect_err("quota spent");
        assert!(!rejection.blocked);
        assert_eq!(rejection.used, 10);
        assert_eq!(rejection.limit, 7);
        assert!(rejection.retry_after <= Duration::from_secs(60));
        assert_eq!(limiter.suspicion("10.0.0.1"), 1);

        assert!(limiter.check("10.0.0.2").is_ok(), "other callers unaffected");
    }

    #[test]
    fn bursts_raise_suspicion_faster_than_violations() {
        let limiter = AdaptiveRateLimiter::new(RateLimitConfig {
            base_quota: 100,
            burst_limit: 2,
            ..config()
        });

        limiter.check("10.0.0.9").expect("first");
        limiter.check("10.0.0.9").expect("second");
        limiter.check("10.0.0.9").expect("burst is admitted but noted");

        assert_eq!(limiter.suspicion("10.0.0.9"), 3);
    }

    #[test]
    fn crossing_the_threshold_blocks_the_caller() {
        let limiter = AdaptiveRateLimiter::new(RateLimitConfig {
            base_quota: 1,
            floor: 1,
            block_threshold: 2,
            ..config()
        });

        limiter.check("10.0.0.5").expect("first request");
        let first = limiter.check("10.0.0.5").expect_err("over quota");
        assert!(!first.blocked);

        let second = limiter.check("10.0.0.5").expect_err("blocked");
        assert!(second.blocked);
        assert_eq!(second.limit, 0);
        assert!(limiter.is_blocked("10.0.0.5"));

        let third = limiter.check("10.0.0.5").expect_err("still blocked");
        assert!(third.blocked);
        assert!(third.retry_after <= Duration::from_secs(60));
    }

    #[test]
    fn block_expires_and_clears_suspicion() {
        let limiter = AdaptiveRateLimiter::new(RateLimitConfig {
            base_quota: 1,
            floor: 1,
            block_threshold: 1,
            block_duration: Duration::from_millis(30),
            ..config()
        });

        limiter.check("10.0.0.7").expect("first request");
        assert!(limiter.check("10.0.0.7").expect_err("blocked").blocked);

        std::thread::sleep(Duration::from_millis(50));

        assert!(!limiter.is_blocked("10.0.0.7"));
        limiter.check("10.0.0.7").expect("unblocked with fresh window");
        assert_eq!(limiter.suspicion("10.0.0.7"), 0);
    }

    #[test]
    fn cleanup_keeps_suspicious_callers() {
        let limiter = AdaptiveRateLimiter::new(RateLimitConfig {
            window: Duration::from_millis(10),
            base_quota: 1,
            floor: 1,
            ..config()
        });

        limiter.check("clean").expect("admitted");
        limiter.check("noisy").expect("admitted");
        let _ = limiter.check("noisy");
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.suspicion("noisy"), 1);
    }

    #[test]
    fn suspicion_is_forgotten_after_a_quiet_period() {
        let limiter = AdaptiveRateLimiter::new(RateLimitConfig {
            window: Duration::from_millis(10),
            block_duration: Duration::from_millis(20),
            base_quota: 1,
            floor: 1,
            ..config()
        });

        limiter.check("noisy").expect("admitted");
        let _ = limiter.check("noisy");
        assert_eq!(limiter.suspicion("noisy"), 1);

        std::thread::sleep(Duration::from_millis(40));

        limiter.check("noisy").expect("fresh window");
        assert_eq!(limiter.suspicion("noisy"), 0);
    }

    #[test]
    fn cleanup_evicts_suspicious_callers_once_quiet() {
        let limiter = AdaptiveRateLimiter::new(RateLimitConfig {
            window: Duration::from_millis(10),
            block_duration: Duration::from_millis(20),
            base_quota: 1,
            floor: 1,
            ..config()
        });

        limiter.check("clean").expect("admitted");
        limiter.check("noisy").expect("admitted");
        let _ = limiter.check("noisy");

        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(limiter.cleanup(), 2);
        assert_eq!(limiter.suspicion("noisy"), 0);
    }

    #[test]
    fn unbounded_block_duration_does_not_overflow() {
        let limiter = AdaptiveRateLimiter::new(RateLimitConfig {
            base_quota: 1,
            floor: 1,
            block_threshold: 1,
            block_duration: Duration::from_secs(u64::MAX),
            ..config()
        });

        limiter.check("10.0.0.8").expect("first request");
        let rejection = limiter.check("10.0.0.8").expect_err("blocked");

        assert!(rejection.blocked);
        assert!(limiter.is_blocked("10.0.0.8"));
    }
}
