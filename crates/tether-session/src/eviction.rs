//! Eviction notifications.

use std::fmt;

use chrono::{DateTime, Utc};

/// Why a record left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictionReason {
    /// Removed by an explicit destroy.
    Destroyed,
    /// Found idle past the timeout during a lookup or sweep.
    IdleExpired,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destroyed => f.write_str("destroyed"),
            Self::IdleExpired => f.write_str("idle_expired"),
        }
    }
}

/// Receives notice of every record removal.
///
/// The registry invokes the hook after releasing its lock, so an
/// implementation may call back into the registry.
///
/// Any `Fn(&str, DateTime<Utc>)` closure is a hook:
///
/// ```rust,ignore
/// registry.set_eviction_hook(|identifier: &str, at: DateTime<Utc>| {
///     println!("{identifier} gone at {at}");
/// });
/// ```
pub trait EvictionHook: Send + Sync {
    /// Called with the removed identifier and the removal time.
    fn on_evict(&self, identifier: &str, at: DateTime<Utc>);
}

impl<F> EvictionHook for F
where
    F: Fn(&str, DateTime<Utc>) + Send + Sync,
{
    fn on_evict(&self, identifier: &str, at: DateTime<Utc>) {
        self(identifier, at)
    }
}

/// An identifier removed while the registry lock was held, waiting to be
/// reported once it is released.
#[derive(Debug, Clone)]
pub(crate) struct Eviction {
    pub identifier: String,
    pub reason: EvictionReason,
}

impl Eviction {
    pub fn new(identifier: impl Into<String>, reason: EvictionReason) -> Self {
        Self {
            identifier: identifier.into(),
            reason,
        }
    }
}
