//! Handles bound to a single session.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::record::{DataMap, SessionRecord};
use crate::registry::SessionRegistry;

/// How [`SessionRegistry::create_or_retrieve`] satisfied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No session existed; a new one was created.
    Created,
    /// An existing session was returned.
    Retrieved,
}

/// A view of one session, bound to its identifier.
///
/// The handle holds no copy of the mutable state. Every operation looks the
/// record up again through the registry, so a handle to a session that has
/// since been destroyed or evicted reports [`Error::SessionInvalid`].
///
/// The identifier, creation time and caller-supplied fields never change and
/// are captured when the handle is made.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    registry: SessionRegistry,
    identifier: String,
    created_at: DateTime<Utc>,
    fields: DataMap,
}

impl SessionHandle {
    pub(crate) fn new(registry: SessionRegistry, record: &SessionRecord) -> Self {
        Self {
            registry,
            identifier: record.identifier.clone(),
            created_at: record.created_at,
            fields: record.extra.clone(),
        }
    }

    /// The session identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// A caller-supplied field from creation time.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// All caller-supplied fields from creation time.
    pub fn fields(&self) -> &DataMap {
        &self.fields
    }

    /// Mark the session connected.
    pub fn connect(&self) -> Result<()> {
        self.registry.with_record_mut(&self.identifier, |record| {
            if record.connected {
                return Err(Error::SessionConnected(record.identifier.clone()));
            }
            record.connected = true;
            Ok(())
        })?;
        debug!(identifier = %self.identifier, "Session connected");
        Ok(())
    }

    /// Mark the session disconnected.
    pub fn disconnect(&self) -> Result<()> {
        self.registry.with_record_mut(&self.identifier, |record| {
            if !record.connected {
                return Err(Error::SessionNotConnected(record.identifier.clone()));
            }
            record.connected = false;
            Ok(())
        })?;
        debug!(identifier = %self.identifier, "Session disconnected");
        Ok(())
    }

    /// Merge an object into the session data and reset the idle clock.
    ///
    /// Keys present in `data` overwrite existing values; other keys are kept.
    pub fn put(&self, data: impl Into<Value>) -> Result<()> {
        let Value::Object(patch) = data.into() else {
            return Err(Error::InvalidInput(
                "session data must be an object".to_string(),
            ));
        };

        let now = self.registry.now();
        let keys = patch.len();
        self.registry.with_record_mut(&self.identifier, |record| {
            if !record.connected {
                return Err(Error::SessionNotConnected(record.identifier.clone()));
            }
            record.merge_data(patch);
            record.touch(now);
            Ok(())
        })?;

        trace!(identifier = %self.identifier, keys, "Session data stored");
        Ok(())
    }

    /// Read a single data value.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.registry.with_record(&self.identifier, |record| {
            if !record.connected {
                return Err(Error::SessionNotConnected(record.identifier.clone()));
            }
            record
                .data
                .get(key)
                .cloned()
                .ok_or_else(|| Error::DataKeyInvalid {
                    identifier: record.identifier.clone(),
                    key: key.to_string(),
                })
        })
    }

    /// Copy of the whole data bag.
    pub fn get_all(&self) -> Result<DataMap> {
        self.registry.with_record(&self.identifier, |record| {
            if !record.connected {
                return Err(Error::SessionNotConnected(record.identifier.clone()));
            }
            Ok(record.data.clone())
        })
    }

    /// Whether the session is currently connected.
    pub fn is_online(&self) -> Result<bool> {
        self.registry
            .with_record(&self.identifier, |record| Ok(record.connected))
    }

    /// When data was last written to the session.
    pub fn last_action_at(&self) -> Result<DateTime<Utc>> {
        self.registry
            .with_record(&self.identifier, |record| Ok(record.last_action_at))
    }

    /// Copy of the full current record.
    pub fn snapshot(&self) -> Result<SessionRecord> {
        self.registry
            .with_record(&self.identifier, |record| Ok(record.clone()))
    }
}
