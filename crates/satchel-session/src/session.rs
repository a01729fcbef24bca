//! The session record and its typed value accessors.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{self, Value};

/// One client's server-side state.
///
/// A `Session` handed out by the [`SessionManager`](crate::SessionManager)
/// is an owned snapshot. Mutations become visible to other requests once
/// the holder commits them with [`SessionManager::save`](crate::SessionManager::save).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: String,
    name: String,
    #[serde(default)]
    values: HashMap<String, serde_json::Value>,
    #[serde(skip)]
    is_new: bool,
    expires: DateTime<Utc>,
}

impl Session {
    /// Build a freshly created session.
    pub(crate) fn created(id: String, name: &str, expires: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.to_string(),
            values: HashMap::new(),
            is_new: true,
            expires,
        }
    }

    /// Rebuild a session from persisted parts.
    ///
    /// Used by store implementations; the result is never marked new.
    pub fn from_parts(
        id: impl Into<String>,
        name: impl Into<String>,
        values: HashMap<String, serde_json::Value>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            values,
            is_new: false,
            expires,
        }
    }

    /// Opaque session ID (also the cookie value).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cookie name this session is addressed under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this instance was returned by session creation.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Absolute expiry timestamp.
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// Whether the session has expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires < now
    }

    /// Raw value bag.
    pub fn values(&self) -> &HashMap<String, serde_json::Value> {
        &self.values
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the value bag is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the value stored under `key`, or the absent sentinel.
    pub fn get(&self, key: &str) -> Value {
        Value {
            key: key.to_string(),
            content: self.values.get(key).cloned(),
        }
    }

    /// Store `content` under `key`.
    ///
    /// Skipped when `key` is empty or `content` serializes to `null`.
    /// Not visible to other requests until the session is saved.
    pub fn set<T: Serialize>(&mut self, key: &str, content: T) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        if let Some(content) = value::encode(key, content)? {
            self.values.insert(key.to_string(), content);
        }
        Ok(())
    }

    /// Merge a [`Value`] into the bag. Absent values are skipped.
    pub fn set_value(&mut self, value: Value) {
        if value.key.is_empty() {
            return;
        }
        if let Some(content) = value.content {
            self.values.insert(value.key, content);
        }
    }

    /// Remove `key`, returning what was stored.
    pub fn remove(&mut self, key: &str) -> Value {
        Value {
            key: key.to_string(),
            content: self.values.remove(key),
        }
    }

    /// Decode the value under `key` into a new `T`.
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let content = self
            .values
            .get(key)
            .ok_or_else(|| Error::ValueAbsent(key.to_string()))?;
        value::decode_content(key, content)
    }

    /// Decode the value under `key` into `dest`.
    ///
    /// `dest` is left untouched on error.
    pub fn decode_into<T: DeserializeOwned>(&self, key: &str, dest: &mut T) -> Result<()> {
        *dest = self.decode(key)?;
        Ok(())
    }

    /// Decode the value under `key` into a shared destination.
    ///
    /// Fails with [`Error::DestinationNotWritable`] when other handles to
    /// the `Arc` exist, since its contents cannot be replaced in place.
    pub fn decode_into_shared<T: DeserializeOwned>(
        &self,
        key: &str,
        dest: &mut Arc<T>,
    ) -> Result<()> {
        let content = self
            .values
            .get(key)
            .ok_or_else(|| Error::ValueAbsent(key.to_string()))?;
        let slot =
            Arc::get_mut(dest).ok_or_else(|| Error::DestinationNotWritable(key.to_string()))?;
        *slot = value::decode_content(key, content)?;
        Ok(())
    }

    /// Push the expiry forward.
    pub(crate) fn touch(&mut self, expires: DateTime<Utc>) {
        self.expires = expires;
    }

    /// Copy suitable for the table or a store: never marked new.
    pub(crate) fn stored(&self) -> Self {
        let mut copy = self.clone();
        copy.is_new = false;
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        visits: u32,
    }

    #[derive(Debug, Default, PartialEq, Deserialize)]
    struct Billing {
        iban: String,
    }

    fn session() -> Session {
        Session::created("id-1".into(), "session", Utc::now() + Duration::minutes(5))
    }

    #[test]
    fn test_new_session_is_empty() {
        let s = session();
        assert!(s.is_new());
        assert!(s.is_empty());
        assert!(!s.stored().is_new());
    }

    #[test]
    fn test_get_unset_returns_sentinel() {
        let s = session();
        let v = s.get("nope");
        assert!(v.is_absent());
        assert_eq!(v.key, "nope");
    }

    #[test]
    fn test_set_skips_empty_key_and_null() {
        let mut s = session();
        s.set("", 1).unwrap();
        s.set("gone", None::<i32>).unwrap();
        assert!(s.is_empty());

        s.set_value(Value::absent("also-gone"));
        assert!(s.is_empty());
    }

    #[test]
    fn test_decode_into_scalar() {
        let mut s = session();
        s.set("counter", 41).unwrap();

        let mut counter = 0i64;
        s.decode_into("counter", &mut counter).unwrap();
        assert_eq!(counter, 41);
    }

    #[test]
    fn test_decode_into_absent() {
        let s = session();
        let mut counter = 7i64;
        let err = s.decode_into("counter", &mut counter).unwrap_err();
        assert!(matches!(err, Error::ValueAbsent(_)));
        assert_eq!(counter, 7);
    }

    #[test]
    fn test_decode_into_shape_mismatch() {
        let mut s = session();
        s.set("counter", "not a number").unwrap();

        let mut counter = 0i64;
        let err = s.decode_into("counter", &mut counter).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { ref key, .. } if key == "counter"));
    }

    #[test]
    fn test_decode_into_record_from_map() {
        let mut s = session();
        s.set(
            "profile",
            Profile {
                name: "ada".into(),
                visits: 3,
            },
        )
        .unwrap();

        // Round-trip through JSON text, as a store would.
        let restored: Session = serde_json::from_str(&serde_json::to_string(&s).unwrap()).unwrap();

        let mut profile = Profile::default();
        restored.decode_into("profile", &mut profile).unwrap();
        assert_eq!(profile.name, "ada");
        assert_eq!(profile.visits, 3);
    }

    #[test]
    fn test_decode_into_mismatched_record_is_rejected() {
        let mut s = session();
        s.set(
            "profile",
            Profile {
                name: "ada".into(),
                visits: 3,
            },
        )
        .unwrap();

        let mut billing = Billing {
            iban: "keep".into(),
        };
        let err = s.decode_into("profile", &mut billing).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert_eq!(billing.iban, "keep");
    }

    #[test]
    fn test_decode_into_shared() {
        let mut s = session();
        s.set("counter", 5).unwrap();

        let mut owned = Arc::new(0u32);
        s.decode_into_shared("counter", &mut owned).unwrap();
        assert_eq!(*owned, 5);

        let mut shared = Arc::new(0u32);
        let _other = Arc::clone(&shared);
        let err = s.decode_into_shared("counter", &mut shared).unwrap_err();
        assert!(matches!(err, Error::DestinationNotWritable(_)));
    }

    #[test]
    fn test_serde_drops_is_new() {
        let s = session();
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("is_new"));
        let back: Session = serde_json::from_str(&json).unwrap();
        assert!(!back.is_new());
        assert_eq!(back.id(), s.id());
    }
}
