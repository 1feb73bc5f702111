//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [session]
//! idle_timeout_minutes = 3
//! idle_clock = "monotonic"   # or "minute-rollover"
//! ```
//!
//! A single file only needs to set the fields it cares about. Unset fields
//! fall through to lower layers and finally to the registry defaults.

use serde::{Deserialize, Serialize};
use tether_session::{
    DEFAULT_IDLE_TIMEOUT_MINUTES, IdleClock, RegistryConfig, SessionRegistry,
};

use crate::error::{ConfigError, Result};

const TIMEOUT_FIELD: &str = "session.idle_timeout_minutes";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Contents of one config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// Session registry settings.
    #[serde(skip_serializing_if = "SessionOverrides::is_empty")]
    pub session: SessionOverrides,
}

impl TetherConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string, rejecting values that are wrong on their own.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.session.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Lay `upper` over this config. Only fields `upper` sets are replaced.
    pub fn merge(&mut self, upper: &TetherConfig) {
        self.session.overlay(&upper.session);
    }

    /// Fill in defaults and check the combined settings.
    pub fn resolve(&self) -> Result<SessionConfig> {
        self.session.resolve()
    }

    /// Build a registry configured from this config.
    pub fn build_registry(&self) -> Result<SessionRegistry> {
        Ok(SessionRegistry::new(self.resolve()?.registry_config()))
    }
}

impl From<SessionConfig> for TetherConfig {
    fn from(session: SessionConfig) -> Self {
        Self {
            session: SessionOverrides {
                idle_timeout_minutes: Some(session.idle_timeout_minutes),
                idle_clock: Some(session.idle_clock),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Section
// ─────────────────────────────────────────────────────────────────────────────

/// The `[session]` section as written in a file; every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_clock: Option<IdleClock>,
}

impl SessionOverrides {
    pub fn is_empty(&self) -> bool {
        self.idle_timeout_minutes.is_none() && self.idle_clock.is_none()
    }

    /// Replace each field that `upper` sets.
    pub fn overlay(&mut self, upper: &SessionOverrides) {
        if let Some(minutes) = upper.idle_timeout_minutes {
            self.idle_timeout_minutes = Some(minutes);
        }
        if let Some(clock) = upper.idle_clock {
            self.idle_clock = Some(clock);
        }
    }

    /// Check what can be checked without the other layers.
    ///
    /// A zero timeout is always wrong. The rollover bound is only checked
    /// here when both fields are present; otherwise it waits for [`resolve`].
    ///
    /// [`resolve`]: Self::resolve
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_minutes == Some(0) {
            return Err(invalid_timeout("must be at least 1"));
        }
        if let (Some(minutes), Some(clock)) = (self.idle_timeout_minutes, self.idle_clock) {
            check_rollover_bound(minutes, clock)?;
        }
        Ok(())
    }

    /// Fill unset fields with registry defaults and validate the result.
    pub fn resolve(&self) -> Result<SessionConfig> {
        let config = SessionConfig {
            idle_timeout_minutes: self
                .idle_timeout_minutes
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_MINUTES),
            idle_clock: self.idle_clock.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session settings with every field decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Minutes without a data write before a session may be evicted (default: 3).
    pub idle_timeout_minutes: u32,
    /// How idle time is compared against the timeout.
    pub idle_clock: IdleClock,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: DEFAULT_IDLE_TIMEOUT_MINUTES,
            idle_clock: IdleClock::Monotonic,
        }
    }
}

impl SessionConfig {
    /// Reject values the registry cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_minutes == 0 {
            return Err(invalid_timeout("must be at least 1"));
        }
        check_rollover_bound(self.idle_timeout_minutes, self.idle_clock)
    }

    /// Convert into the registry's own configuration.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::new()
            .with_idle_timeout_minutes(self.idle_timeout_minutes)
            .with_idle_clock(self.idle_clock)
    }
}

/// Under minute rollover the elapsed minutes wrap at 60, so a larger
/// timeout would never fire.
fn check_rollover_bound(minutes: u32, clock: IdleClock) -> Result<()> {
    if clock == IdleClock::MinuteRollover && minutes >= 60 {
        return Err(invalid_timeout(
            "must be below 60 with the minute-rollover idle clock",
        ));
    }
    Ok(())
}

fn invalid_timeout(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: TIMEOUT_FIELD.to_string(),
        reason: reason.to_string(),
    }
}
