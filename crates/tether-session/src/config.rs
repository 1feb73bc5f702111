//! Configuration for the session registry.

use crate::idle::{IdleClock, IdlePolicy};

/// Default idle timeout in minutes.
pub const DEFAULT_IDLE_TIMEOUT_MINUTES: u32 = 3;

/// Configuration for the session registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Minutes without a data write after which a session may be evicted.
    pub idle_timeout_minutes: u32,

    /// How elapsed idle time is compared against the timeout.
    pub idle_clock: IdleClock,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: DEFAULT_IDLE_TIMEOUT_MINUTES,
            idle_clock: IdleClock::default(),
        }
    }
}

impl RegistryConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle timeout. Zero keeps the current value.
    pub fn with_idle_timeout_minutes(mut self, minutes: u32) -> Self {
        if minutes > 0 {
            self.idle_timeout_minutes = minutes;
        }
        self
    }

    /// Set the idle comparison mode.
    pub fn with_idle_clock(mut self, clock: IdleClock) -> Self {
        self.idle_clock = clock;
        self
    }

    pub(crate) fn idle_policy(&self) -> IdlePolicy {
        IdlePolicy::new(self.idle_timeout_minutes, self.idle_clock)
    }
}
