//! Per-resource requeue backoff with exponential growth and jitter.
//!
//! The controller never retries a failed operation in place. Instead the
//! error policy asks [`Backoff`] how long to wait before the resource is
//! reconciled again. Consecutive failures of the same resource grow the delay;
//! a successful reconcile resets it.

use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;

use crate::config::BackoffConfig;
use crate::error::ErrorClass;

/// Delay before retrying a reconcile that hit a version conflict
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Tracks consecutive failures per resource key
#[derive(Debug, Default)]
pub struct Backoff {
    config: BackoffConfig,
    failures: DashMap<String, u32>,
}

impl Backoff {
    /// Create a tracker with the given settings
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: DashMap::new(),
        }
    }

    /// Record a failure for `key` and return the delay before the next attempt
    ///
    /// Conflicts requeue after [`CONFLICT_REQUEUE`] without growing the
    /// backoff. Jittered delays never exceed `max_delay`; only a
    /// server-suggested `retry_after`, used as a floor, can go beyond it.
    pub fn next_delay(
        &self,
        key: &str,
        class: ErrorClass,
        retry_after: Option<Duration>,
    ) -> Duration {
        if class == ErrorClass::Conflict {
            return CONFLICT_REQUEUE;
        }

        let attempt = {
            let mut entry = self.failures.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };

        let base = match class {
            ErrorClass::Permanent | ErrorClass::Auth => self.config.permanent_delay,
            _ => self.config.initial_delay,
        };
        let delay = jittered(self.exponential(base, attempt)).min(self.config.max_delay);
        retry_after.map_or(delay, |floor| delay.max(floor))
    }

    /// Forget failures for `key` after a successful reconcile
    pub fn reset(&self, key: &str) {
        self.failures.remove(key);
    }

    /// Consecutive failures currently recorded for `key`
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).map(|v| *v).unwrap_or(0)
    }

    fn exponential(&self, base: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = base.as_secs_f64() * self.config.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.config.max_delay.as_secs_f64()))
    }
}

/// Scale a delay by a random factor in 0.5x..1.5x
fn jittered(delay: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::new(BackoffConfig {
            initial_delay: Duration::from_secs(4),
            permanent_delay: Duration::from_secs(40),
            max_delay: Duration::from_secs(100),
            multiplier: 2.0,
        })
    }

    fn within_jitter(actual: Duration, nominal: Duration) -> bool {
        let secs = actual.as_secs_f64();
        secs >= nominal.as_secs_f64() * 0.5 && secs <= nominal.as_secs_f64() * 1.5
    }

    /// Story: repeated transient failures grow the delay until the cap
    #[test]
    fn story_transient_failures_grow_then_cap() {
        let b = backoff();
        let first = b.next_delay("team-x", ErrorClass::Transient, None);
        assert!(within_jitter(first, Duration::from_secs(4)));

        let second = b.next_delay("team-x", ErrorClass::Transient, None);
        assert!(within_jitter(second, Duration::from_secs(8)));

        for _ in 0..10 {
            b.next_delay("team-x", ErrorClass::Transient, None);
        }
        let capped = b.next_delay("team-x", ErrorClass::Transient, None);
        assert!(within_jitter(capped, Duration::from_secs(100)));
        assert!(capped <= Duration::from_secs(100));
        assert_eq!(b.failures("team-x"), 13);
    }

    #[test]
    fn jitter_never_exceeds_max_delay() {
        let b = backoff();
        for _ in 0..200 {
            let delay = b.next_delay("team-x", ErrorClass::Transient, None);
            assert!(delay <= Duration::from_secs(100), "{delay:?} over cap");
        }
        for _ in 0..200 {
            let delay = b.next_delay("m", ErrorClass::Permanent, None);
            assert!(delay <= Duration::from_secs(100), "{delay:?} over cap");
        }
    }

    #[test]
    fn permanent_failures_start_from_longer_base() {
        let b = backoff();
        let delay = b.next_delay("m", ErrorClass::Permanent, None);
        assert!(within_jitter(delay, Duration::from_secs(40)));
        let delay = b.next_delay("a", ErrorClass::Auth, None);
        assert!(within_jitter(delay, Duration::from_secs(40)));
    }

    #[test]
    fn conflicts_requeue_quickly_without_growth() {
        let b = backoff();
        assert_eq!(
            b.next_delay("team-x", ErrorClass::Conflict, None),
            CONFLICT_REQUEUE
        );
        assert_eq!(b.failures("team-x"), 0);
    }

    #[test]
    fn retry_after_is_a_floor() {
        let b = backoff();
        let delay = b.next_delay(
            "team-x",
            ErrorClass::Transient,
            Some(Duration::from_secs(60)),
        );
        assert!(delay >= Duration::from_secs(60));
    }

    #[test]
    fn reset_forgets_failures() {
        let b = backoff();
        b.next_delay("team-x", ErrorClass::Transient, None);
        b.next_delay("other", ErrorClass::Transient, None);
        b.reset("team-x");
        assert_eq!(b.failures("team-x"), 0);
        assert_eq!(b.failures("other"), 1);
    }
}
