//! In-process session registry with idle-timeout eviction.
//!
//! This crate provides a process-local table of named sessions with:
//! - A connection flag toggled by connect/disconnect
//! - A key/value data bag that writes merge into
//! - Lazy idle-timeout eviction, checked on lookup rather than on a timer
//! - An eviction hook fired on every removal
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_session::{RegistryConfig, SessionRegistry};
//! use serde_json::json;
//!
//! let registry = SessionRegistry::new(RegistryConfig::default().with_idle_timeout_minutes(5));
//!
//! let session = registry.create("session-xyz")?;
//! session.connect()?;
//! session.put(json!({ "cart": ["apple"] }))?;
//!
//! assert_eq!(session.get("cart")?, json!(["apple"]));
//! ```

mod clock;
mod config;
mod error;
mod eviction;
mod handle;
mod idle;
mod record;
mod registry;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use config::{DEFAULT_IDLE_TIMEOUT_MINUTES, RegistryConfig};
pub use error::{Error, Result};
pub use eviction::EvictionHook;
pub use handle::{Outcome, SessionHandle};
pub use idle::{IdleClock, IdlePolicy};
pub use record::{DataMap, SessionFields, SessionRecord};
pub use registry::{RegistryStats, SessionRegistry};
