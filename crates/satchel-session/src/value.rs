//! Named values stored in a session's value bag.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// A single named entry read from, or destined for, a session.
///
/// `content` is `None` when the key is not set. That is distinct from a
/// stored falsy payload such as `0`, `false` or `""`.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// Key inside the value bag.
    pub key: String,

    /// Stored payload, or `None` when absent.
    pub content: Option<serde_json::Value>,
}

impl Value {
    /// Encode `content` under `key`.
    ///
    /// Content that serializes to `null` (e.g. `None::<T>`) is treated as
    /// absent.
    pub fn new<T: Serialize>(key: impl Into<String>, content: T) -> Result<Self> {
        let key = key.into();
        let content = encode(&key, content)?;
        Ok(Self { key, content })
    }

    /// The "not set" sentinel for `key`.
    pub fn absent(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: None,
        }
    }

    /// Whether this is the "not set" sentinel.
    pub fn is_absent(&self) -> bool {
        self.content.is_none()
    }

    /// Decode the payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.content {
            None => Err(Error::ValueAbsent(self.key.clone())),
            Some(content) => decode_content(&self.key, content),
        }
    }
}

/// Serialize `content` for the value bag, mapping `null` to `None`.
pub(crate) fn encode<T: Serialize>(key: &str, content: T) -> Result<Option<serde_json::Value>> {
    let value = serde_json::to_value(content).map_err(|source| Error::ValueEncoding {
        key: key.to_string(),
        source,
    })?;
    Ok((!value.is_null()).then_some(value))
}

/// Deserialize stored content into the destination type.
///
/// Objects populate records field by field; a record whose fields don't
/// fit is rejected rather than partially written.
pub(crate) fn decode_content<T: DeserializeOwned>(
    key: &str,
    content: &serde_json::Value,
) -> Result<T> {
    T::deserialize(content).map_err(|source| Error::ShapeMismatch {
        key: key.to_string(),
        source,
    })
}
