//! Session registry with lazy idle-timeout eviction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::eviction::{Eviction, EvictionHook, EvictionReason};
use crate::handle::{Outcome, SessionHandle};
use crate::idle::IdlePolicy;
use crate::record::{SessionFields, SessionRecord};

type SharedHook = Arc<dyn EvictionHook>;

/// Inner state protected by RwLock.
struct RegistryInner {
    /// Records keyed by identifier.
    sessions: BTreeMap<String, SessionRecord>,

    /// Idle-timeout policy.
    idle: IdlePolicy,

    /// Callback fired on every removal.
    on_evict: Option<SharedHook>,
}

impl RegistryInner {
    /// Remove every record that is idle at `now`.
    fn drain_expired(&mut self, now: DateTime<Utc>) -> Vec<Eviction> {
        let idle = self.idle;
        let mut expired = Vec::new();
        self.sessions.retain(|identifier, record| {
            if idle.is_expired(record.last_action_at, now) {
                expired.push(Eviction::new(identifier.as_str(), EvictionReason::IdleExpired));
                false
            } else {
                true
            }
        });
        expired
    }
}

/// Process-local registry of session records.
///
/// The registry owns every record. Callers obtain a [`SessionHandle`] through
/// [`retrieve`](Self::retrieve) and operate on the stored record through it;
/// reads hand out copies, never references into the registry.
///
/// Idle sessions are evicted lazily: a record past the idle timeout is only
/// removed when [`retrieve`](Self::retrieve), [`list_online`](Self::list_online)
/// or [`sweep_expired`](Self::sweep_expired) looks at it.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    clock: Arc<dyn Clock>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl SessionRegistry {
    /// Create a registry reading the system clock.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    /// Create a registry with a custom time source.
    pub fn with_clock(config: RegistryConfig, clock: impl Clock + 'static) -> Self {
        let idle = config.idle_policy();
        if !idle.can_expire() {
            warn!(
                idle_timeout_minutes = idle.timeout_minutes(),
                "Idle timeout is outside the rollover window, sessions will never expire"
            );
        }

        let inner = RegistryInner {
            sessions: BTreeMap::new(),
            idle,
            on_evict: None,
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
            clock: Arc::new(clock),
        }
    }

    /// Set the idle timeout in minutes. Zero leaves the current value in place.
    pub fn configure_idle_timeout(&self, minutes: u32) {
        if minutes == 0 {
            trace!("Ignoring zero idle timeout");
            return;
        }

        let mut inner = self.inner.write();
        inner.idle.set_timeout_minutes(minutes);
        if !inner.idle.can_expire() {
            warn!(
                idle_timeout_minutes = minutes,
                "Idle timeout is outside the rollover window, sessions will never expire"
            );
        }
        debug!(idle_timeout_minutes = minutes, "Idle timeout configured");
    }

    /// Set the idle timeout and register the eviction hook in one call.
    pub fn configure_idle_timeout_with_hook<H>(&self, minutes: u32, on_evict: H)
    where
        H: EvictionHook + 'static,
    {
        self.configure_idle_timeout(minutes);
        self.set_eviction_hook(on_evict);
    }

    /// Register the eviction hook, replacing any previous one.
    pub fn set_eviction_hook<H>(&self, on_evict: H)
    where
        H: EvictionHook + 'static,
    {
        self.inner.write().on_evict = Some(Arc::new(on_evict));
    }

    /// Remove the eviction hook.
    pub fn clear_eviction_hook(&self) {
        self.inner.write().on_evict = None;
    }

    /// The current idle policy.
    pub fn idle_policy(&self) -> IdlePolicy {
        self.inner.read().idle
    }

    /// The current idle timeout in minutes.
    pub fn idle_timeout(&self) -> u32 {
        self.inner.read().idle.timeout_minutes()
    }

    /// Check if a record is present. Never evicts.
    pub fn exists(&self, identifier: &str) -> bool {
        self.inner.read().sessions.contains_key(identifier)
    }

    /// Check if a session is connected. Never evicts.
    pub fn is_connected(&self, identifier: &str) -> Result<bool> {
        self.inner
            .read()
            .sessions
            .get(identifier)
            .map(|record| record.connected)
            .ok_or_else(|| Error::SessionInvalid(identifier.to_string()))
    }

    /// Create a session and return a handle to it.
    ///
    /// The record starts disconnected with an empty data bag (unless the
    /// field set seeds one) and both timestamps at the current time.
    pub fn create(&self, fields: impl Into<SessionFields>) -> Result<SessionHandle> {
        let fields = fields.into();
        fields.validate()?;

        let now = self.clock.now();
        let mut inner = self.inner.write();
        self.insert_locked(&mut inner, fields, now)
    }

    /// Get a handle to a session.
    ///
    /// If the session has been idle past the timeout it is destroyed here
    /// and [`Error::SessionExpired`] is returned; later lookups then report
    /// [`Error::SessionInvalid`].
    pub fn retrieve(&self, identifier: &str) -> Result<SessionHandle> {
        check_identifier(identifier)?;

        let now = self.clock.now();
        let mut inner = self.inner.write();
        let result = self.resolve_locked(&mut inner, identifier, now);
        let hook = inner.on_evict.clone();
        drop(inner);

        Self::report_expiry(hook, &result, identifier, now);
        result
    }

    /// Ensure a session exists for the identifier.
    ///
    /// Retrieves first; only a missing session falls through to creation.
    /// Any other retrieval failure, including [`Error::SessionExpired`], is
    /// returned unchanged. Lookup and insert happen under one write lock, so
    /// concurrent callers for the same identifier see exactly one `Created`.
    pub fn create_or_retrieve(
        &self,
        fields: impl Into<SessionFields>,
    ) -> Result<(SessionHandle, Outcome)> {
        let fields = fields.into();
        check_identifier(fields.identifier())?;
        let identifier = fields.identifier().to_string();

        let now = self.clock.now();
        let mut inner = self.inner.write();
        let resolved = self.resolve_locked(&mut inner, &identifier, now);
        let result = match resolved {
            Ok(handle) => Ok((handle, Outcome::Retrieved)),
            Err(Error::SessionInvalid(_)) => fields
                .validate()
                .and_then(|()| self.insert_locked(&mut inner, fields, now))
                .map(|handle| (handle, Outcome::Created)),
            Err(e) => Err(e),
        };
        let hook = inner.on_evict.clone();
        drop(inner);

        Self::report_expiry(hook, &result, &identifier, now);
        result
    }

    /// Remove a session. Does nothing if it is absent.
    pub fn destroy(&self, identifier: &str) {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        if inner.sessions.remove(identifier).is_none() {
            return;
        }
        let hook = inner.on_evict.clone();
        drop(inner);

        let eviction = Eviction::new(identifier, EvictionReason::Destroyed);
        Self::notify(hook, std::slice::from_ref(&eviction), now);
    }

    /// Copy of every record, keyed by identifier.
    pub fn list_all(&self) -> BTreeMap<String, SessionRecord> {
        self.inner.read().sessions.clone()
    }

    /// Connected sessions, in identifier order.
    ///
    /// Idle sessions found during the scan are destroyed and skipped.
    pub fn list_online(&self) -> Vec<SessionRecord> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let expired = inner.drain_expired(now);
        let online = inner
            .sessions
            .values()
            .filter(|record| record.connected)
            .cloned()
            .collect();
        let hook = inner.on_evict.clone();
        drop(inner);

        Self::notify(hook, &expired, now);
        online
    }

    /// Destroy every idle session now and return how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let expired = inner.drain_expired(now);
        let hook = inner.on_evict.clone();
        drop(inner);

        if !expired.is_empty() {
            debug!(count = expired.len(), "Swept idle sessions");
        }
        Self::notify(hook, &expired, now);
        expired.len()
    }

    /// Number of records, including idle ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Check if the registry holds no records.
    pub fn is_empty(&self) -> bool {
        self.inner.read().sessions.is_empty()
    }

    /// Get registry statistics.
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.read();
        RegistryStats {
            total: inner.sessions.len(),
            online: inner.sessions.values().filter(|r| r.connected).count(),
            idle_timeout_minutes: inner.idle.timeout_minutes(),
        }
    }

    /// Insert a new record under the held lock and hand back its handle.
    fn insert_locked(
        &self,
        inner: &mut RegistryInner,
        fields: SessionFields,
        now: DateTime<Utc>,
    ) -> Result<SessionHandle> {
        let identifier = fields.identifier().to_string();
        if inner.sessions.contains_key(&identifier) {
            return Err(Error::SessionExists(identifier));
        }

        let record = SessionRecord::new(fields, now);
        let handle = SessionHandle::new(self.clone(), &record);
        inner.sessions.insert(identifier, record);

        debug!(
            identifier = %handle.identifier(),
            sessions = inner.sessions.len(),
            "Session created"
        );
        Ok(handle)
    }

    /// Look a record up under the held lock, removing it if idle.
    ///
    /// The caller reports a [`Error::SessionExpired`] eviction once the lock
    /// is released.
    fn resolve_locked(
        &self,
        inner: &mut RegistryInner,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionHandle> {
        let expired = match inner.sessions.get(identifier) {
            None => return Err(Error::SessionInvalid(identifier.to_string())),
            Some(record) => inner.idle.is_expired(record.last_action_at, now),
        };

        if expired {
            inner.sessions.remove(identifier);
            return Err(Error::SessionExpired(identifier.to_string()));
        }

        trace!(identifier = %identifier, "Session retrieved");
        inner
            .sessions
            .get(identifier)
            .map(|record| SessionHandle::new(self.clone(), record))
            .ok_or_else(|| Error::SessionInvalid(identifier.to_string()))
    }

    /// Fire the eviction hook if a lookup expired the session.
    fn report_expiry<T>(
        hook: Option<SharedHook>,
        result: &Result<T>,
        identifier: &str,
        now: DateTime<Utc>,
    ) {
        if let Err(Error::SessionExpired(_)) = result {
            let eviction = Eviction::new(identifier, EvictionReason::IdleExpired);
            Self::notify(hook, std::slice::from_ref(&eviction), now);
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `f` against the stored record under the read lock.
    pub(crate) fn with_record<F, R>(&self, identifier: &str, f: F) -> Result<R>
    where
        F: FnOnce(&SessionRecord) -> Result<R>,
    {
        let inner = self.inner.read();
        let record = inner
            .sessions
            .get(identifier)
            .ok_or_else(|| Error::SessionInvalid(identifier.to_string()))?;
        f(record)
    }

    /// Run `f` against the stored record under the write lock.
    pub(crate) fn with_record_mut<F, R>(&self, identifier: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut SessionRecord) -> Result<R>,
    {
        let mut inner = self.inner.write();
        let record = inner
            .sessions
            .get_mut(identifier)
            .ok_or_else(|| Error::SessionInvalid(identifier.to_string()))?;
        f(record)
    }

    /// Report removals. Must be called without the lock held.
    fn notify(hook: Option<SharedHook>, evictions: &[Eviction], at: DateTime<Utc>) {
        for eviction in evictions {
            debug!(
                identifier = %eviction.identifier,
                reason = %eviction.reason,
                "Session removed"
            );
            if let Some(hook) = &hook {
                hook.on_evict(&eviction.identifier, at);
            }
        }
    }
}

fn check_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(Error::InvalidInput(
            "session identifier must be a non-empty string".to_string(),
        ));
    }
    Ok(())
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SessionRegistry")
            .field("sessions", &inner.sessions.len())
            .field("idle", &inner.idle)
            .field("has_eviction_hook", &inner.on_evict.is_some())
            .finish()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Records currently held, including idle ones not yet evicted.
    pub total: usize,

    /// Records with the connected flag set.
    pub online: usize,

    /// Configured idle timeout in minutes.
    pub idle_timeout_minutes: u32,
}
