//! Session records and the field sets they are created from.
//!
//! A [`SessionRecord`] carries the built-in fields (identifier, timestamps,
//! connection flag, data bag) plus any extra fields the caller supplied at
//! creation. Extras are stored verbatim and serialized alongside the
//! built-in fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Key/value bag stored in a session.
pub type DataMap = Map<String, Value>;

/// Field names owned by the record itself. Extra fields may not shadow them.
const BUILT_IN_FIELDS: &[&str] = &[
    "identifier",
    "data",
    "connected",
    "createdAt",
    "created_at",
    "lastActionAt",
    "last_action_at",
];

/// One logical session as stored in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Unique key in the registry.
    pub identifier: String,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When data was last written; the idle clock.
    pub last_action_at: DateTime<Utc>,

    /// Whether the session is currently connected.
    pub connected: bool,

    /// Session data.
    pub data: DataMap,

    /// Caller-supplied fields from creation time.
    #[serde(flatten)]
    pub extra: DataMap,
}

impl SessionRecord {
    pub(crate) fn new(fields: SessionFields, now: DateTime<Utc>) -> Self {
        Self {
            identifier: fields.identifier,
            created_at: now,
            last_action_at: now,
            connected: false,
            data: fields.data,
            extra: fields.extra,
        }
    }

    /// Look up a caller-supplied field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// Merge `patch` into the data bag. Matching keys are overwritten.
    pub(crate) fn merge_data(&mut self, patch: DataMap) {
        self.data.extend(patch);
    }

    /// Record a data write. The idle clock never moves backward.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_action_at {
            self.last_action_at = now;
        }
    }
}

/// The field set a session is created from.
///
/// Built with [`SessionFields::new`] and the `with_*` methods, or parsed from
/// a JSON object with [`SessionFields::from_json`]:
///
/// ```rust,ignore
/// let fields = SessionFields::from_json(json!({
///     "identifier": "s1",
///     "user": "alice",
///     "data": { "cart": [] }
/// }))?;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFields {
    identifier: String,
    data: DataMap,
    extra: DataMap,
}

impl SessionFields {
    /// Start a field set for the given identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    /// Parse a field set from a JSON object.
    ///
    /// `identifier` must be a string. `data`, when present, must be an object
    /// and seeds the initial data bag. Every other key becomes an extra field.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::InvalidInput(
                "session fields must be an object".to_string(),
            ));
        };

        let identifier = match map.remove("identifier") {
            Some(Value::String(identifier)) => identifier,
            Some(_) => {
                return Err(Error::InvalidInput(
                    "identifier must be a string".to_string(),
                ));
            }
            None => return Err(Error::InvalidInput("identifier is required".to_string())),
        };

        let data = match map.remove("data") {
            None => DataMap::new(),
            Some(Value::Object(data)) => data,
            Some(_) => return Err(Error::InvalidInput("data must be an object".to_string())),
        };

        let fields = Self {
            identifier,
            data,
            extra: map,
        };
        fields.validate()?;
        Ok(fields)
    }

    /// Add an extra field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Seed the data bag.
    pub fn with_data(mut self, data: DataMap) -> Self {
        self.data = data;
        self
    }

    /// Seed a single data entry.
    pub fn with_data_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// The identifier the session will be created under.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Check the identifier is usable and no extra shadows a built-in field.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.identifier.is_empty() {
            return Err(Error::InvalidInput(
                "identifier must be a non-empty string".to_string(),
            ));
        }
        if let Some(name) = self
            .extra
            .keys()
            .find(|name| BUILT_IN_FIELDS.contains(&name.as_str()))
        {
            return Err(Error::InvalidInput(format!(
                "'{name}' is a reserved session field"
            )));
        }
        Ok(())
    }
}

impl From<&str> for SessionFields {
    fn from(identifier: &str) -> Self {
        Self::new(identifier)
    }
}

impl From<String> for SessionFields {
    fn from(identifier: String) -> Self {
        Self::new(identifier)
    }
}

impl TryFrom<Value> for SessionFields {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_splits_fields() {
        let fields = SessionFields::from_json(json!({
            "identifier": "s1",
            "user": "alice",
            "data": { "theme": "dark" }
        }))
        .unwrap();

        assert_eq!(fields.identifier(), "s1");
        assert_eq!(fields.data.get("theme"), Some(&json!("dark")));
        assert_eq!(fields.extra.get("user"), Some(&json!("alice")));
        assert!(!fields.extra.contains_key("data"));
    }

    #[test]
    fn test_from_json_rejects_bad_shapes() {
        let cases = [
            json!("s1"),
            json!(null),
            json!({ "user": "alice" }),
            json!({ "identifier": 7 }),
            json!({ "identifier": "" }),
            json!({ "identifier": "s1", "data": [1, 2] }),
            json!({ "identifier": "s1", "connected": true }),
            json!({ "identifier": "s1", "createdAt": 0 }),
        ];

        for case in cases {
            let result = SessionFields::from_json(case.clone());
            assert!(
                matches!(result, Err(Error::InvalidInput(_))),
                "expected InvalidInput for {case}"
            );
        }
    }

    #[test]
    fn test_builder_reserved_field_fails_validation() {
        let fields = SessionFields::new("s1").with_field("last_action_at", 0);
        assert!(matches!(fields.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_new_record_defaults() {
        let now = Utc::now();
        let record = SessionRecord::new(SessionFields::new("s1").with_field("user", "bob"), now);

        assert_eq!(record.identifier, "s1");
        assert_eq!(record.created_at, now);
        assert_eq!(record.last_action_at, now);
        assert!(!record.connected);
        assert!(record.data.is_empty());
        assert_eq!(record.field("user"), Some(&json!("bob")));
    }

    #[test]
    fn test_touch_never_moves_backward() {
        let now = Utc::now();
        let mut record = SessionRecord::new(SessionFields::new("s1"), now);

        record.touch(now - chrono::Duration::minutes(1));
        assert_eq!(record.last_action_at, now);

        let later = now + chrono::Duration::seconds(30);
        record.touch(later);
        assert_eq!(record.last_action_at, later);
    }

    #[test]
    fn test_merge_data_overwrites_and_preserves() {
        let mut record = SessionRecord::new(SessionFields::new("s1"), Utc::now());
        record.merge_data(json!({ "a": 1, "b": 2 }).as_object().cloned().unwrap());
        record.merge_data(json!({ "b": 3, "c": 4 }).as_object().cloned().unwrap());

        assert_eq!(Value::Object(record.data), json!({ "a": 1, "b": 3, "c": 4 }));
    }

    #[test]
    fn test_record_serializes_extras_alongside_built_ins() {
        let record = SessionRecord::new(
            SessionFields::new("s1").with_field("user", "carol"),
            Utc::now(),
        );
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["identifier"], json!("s1"));
        assert_eq!(value["connected"], json!(false));
        assert_eq!(value["user"], json!("carol"));
        assert!(value.get("lastActionAt").is_some());
    }
}
