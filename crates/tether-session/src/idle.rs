//! Idle-timeout policy for lazy session eviction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Minutes in the rollover window used by [`IdleClock::MinuteRollover`].
const ROLLOVER_MINUTES: i64 = 60;

/// How elapsed idle time is compared against the timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdleClock {
    /// Expired once the time since the last action reaches the timeout.
    #[default]
    Monotonic,

    /// Legacy comparison: elapsed minutes are rounded to the nearest whole
    /// minute and taken modulo 60 before the comparison, so a session idle
    /// for an hour or more wraps back to looking fresh.
    MinuteRollover,
}

/// Decides whether a session is idle past its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    timeout_minutes: u32,
    clock: IdleClock,
}

impl IdlePolicy {
    pub fn new(timeout_minutes: u32, clock: IdleClock) -> Self {
        Self {
            timeout_minutes,
            clock,
        }
    }

    /// The configured timeout in minutes.
    pub fn timeout_minutes(&self) -> u32 {
        self.timeout_minutes
    }

    /// The configured timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.timeout_minutes))
    }

    /// The comparison mode.
    pub fn idle_clock(&self) -> IdleClock {
        self.clock
    }

    pub(crate) fn set_timeout_minutes(&mut self, minutes: u32) {
        self.timeout_minutes = minutes;
    }

    /// Whether any session can ever be found expired under this policy.
    ///
    /// Under the rollover comparison a timeout of 60 minutes or more never fires.
    pub fn can_expire(&self) -> bool {
        match self.clock {
            IdleClock::Monotonic => true,
            IdleClock::MinuteRollover => i64::from(self.timeout_minutes) < ROLLOVER_MINUTES,
        }
    }

    /// Check whether a session last active at `last_action_at` is expired at `now`.
    pub fn is_expired(&self, last_action_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(last_action_at);
        match self.clock {
            IdleClock::Monotonic => elapsed >= self.timeout(),
            IdleClock::MinuteRollover => {
                let minutes = (elapsed.num_milliseconds() as f64 / 60_000.0 + 0.5).floor() as i64;
                minutes % ROLLOVER_MINUTES >= i64::from(self.timeout_minutes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minutes: i64, seconds: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc::now();
        (start, start + Duration::minutes(minutes) + Duration::seconds(seconds))
    }

    #[test]
    fn test_monotonic_expires_at_threshold() {
        let policy = IdlePolicy::new(3, IdleClock::Monotonic);

        let (last, now) = at(2, 59);
        assert!(!policy.is_expired(last, now));

        let (last, now) = at(3, 0);
        assert!(policy.is_expired(last, now));

        let (last, now) = at(75, 0);
        assert!(policy.is_expired(last, now));
    }

    #[test]
    fn test_clock_going_backwards_is_not_expired() {
        let policy = IdlePolicy::new(1, IdleClock::Monotonic);
        let now = Utc::now();
        assert!(!policy.is_expired(now + Duration::minutes(5), now));
    }

    #[test]
    fn test_rollover_rounds_to_nearest_minute() {
        let policy = IdlePolicy::new(3, IdleClock::MinuteRollover);

        // 2m29s rounds down to 2
        let (last, now) = at(2, 29);
        assert!(!policy.is_expired(last, now));

        // 2m30s rounds up to 3
        let (last, now) = at(2, 30);
        assert!(policy.is_expired(last, now));
    }

    #[test]
    fn test_rollover_wraps_after_an_hour() {
        let policy = IdlePolicy::new(3, IdleClock::MinuteRollover);

        let (last, now) = at(59, 0);
        assert!(policy.is_expired(last, now));

        // 61 minutes wraps to 1
        let (last, now) = at(61, 0);
        assert!(!policy.is_expired(last, now));
    }

    #[test]
    fn test_can_expire() {
        assert!(IdlePolicy::new(90, IdleClock::Monotonic).can_expire());
        assert!(IdlePolicy::new(59, IdleClock::MinuteRollover).can_expire());
        assert!(!IdlePolicy::new(60, IdleClock::MinuteRollover).can_expire());
    }
}
