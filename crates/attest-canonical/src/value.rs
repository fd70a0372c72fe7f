//! The open structured-value domain accepted by the canonical encoder.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::encode::{CanonicalOptions, to_stable};

/// A shared, interiorly mutable value node.
///
/// Sharing is what makes self-referential structures expressible: a node can
/// be stored inside its own subtree through a clone of the same handle. The
/// encoder tracks these nodes by pointer identity to detect cycles.
pub type SharedValue = Arc<RwLock<CanonicalValue>>;

/// A structured value that can be canonically encoded.
///
/// This is a closed sum over the primitive, sequence and mapping shapes plus
/// the "special" kinds the encoder knows how to tag (absent values,
/// non-finite numbers, big integers, bytes, timestamps, keyed maps, sets,
/// unrepresentable values and shared nodes).
#[derive(Debug, Clone, Default)]
pub enum CanonicalValue {
    /// The absent value, as distinct from a present `Null`.
    ///
    /// Encodes as `["__undefined__"]` and is never silently dropped from a
    /// sequence slot.
    Absent,
    /// A present null.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision number. `NaN` and infinities are representable and
    /// encode as tagged markers; `-0` normalizes to `0`.
    Number(f64),
    /// An arbitrary-precision integer, carried as its decimal string form.
    BigInt(String),
    /// A text string. Normalized before emission.
    String(String),
    /// A binary byte sequence. Encodes as a base64 tagged marker.
    Bytes(Vec<u8>),
    /// A point in time. Encodes as an ISO-8601 or unix-milliseconds tagged
    /// marker depending on the encoder's date mode.
    Timestamp(DateTime<Utc>),
    /// An ordered sequence. Element order is preserved.
    Sequence(Vec<CanonicalValue>),
    /// A string-keyed mapping. Iteration order is irrelevant: keys are
    /// normalized and sorted at encoding time.
    Mapping(Vec<(String, CanonicalValue)>),
    /// A keyed map whose keys may be arbitrary values. Entries are sorted by
    /// the encoded text of their key, so insertion order is irrelevant.
    Map(Vec<(CanonicalValue, CanonicalValue)>),
    /// A set of values, sorted by their encoded text form.
    Set(Vec<CanonicalValue>),
    /// A value with no serializable representation (a callable, a handle).
    /// Carries its runtime type name and encodes as a tagged marker.
    Unserializable(String),
    /// A shared (possibly self-referential) node.
    Shared(SharedValue),
}

impl CanonicalValue {
    /// Wrap a value in a fresh shared node and return both the variant and
    /// the handle, so the caller can link the node into its own subtree.
    #[must_use]
    pub fn shared(value: CanonicalValue) -> (Self, SharedValue) {
        let handle = Arc::new(RwLock::new(value));
        (Self::Shared(Arc::clone(&handle)), handle)
    }

    /// A byte-sequence value.
    #[must_use]
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }

    /// A big-integer value from its decimal string form.
    #[must_use]
    pub fn bigint(decimal: impl Into<String>) -> Self {
        Self::BigInt(decimal.into())
    }

    /// An unrepresentable value tagged with its runtime type name.
    #[must_use]
    pub fn unserializable(type_name: impl Into<String>) -> Self {
        Self::Unserializable(type_name.into())
    }
}

impl From<bool> for CanonicalValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for CanonicalValue {
    fn from(v: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        Self::Number(v as f64)
    }
}

impl From<i32> for CanonicalValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<f64> for CanonicalValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for CanonicalValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for CanonicalValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DateTime<Utc>> for CanonicalValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Vec<CanonicalValue>> for CanonicalValue {
    fn from(v: Vec<CanonicalValue>) -> Self {
        Self::Sequence(v)
    }
}

impl<V: Into<CanonicalValue>> From<Option<V>> for CanonicalValue {
    fn from(v: Option<V>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for CanonicalValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                // Integers outside the f64-exact range lose precision here,
                // matching the double-based number model of the wire format.
                #[allow(clippy::cast_precision_loss)]
                let f = n
                    .as_f64()
                    .or_else(|| n.as_i64().map(|i| i as f64))
                    .unwrap_or(f64::NAN);
                Self::Number(f)
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Sequence(items.into_iter().map(Self::from).collect())
            },
            serde_json::Value::Object(entries) => {
                Self::Mapping(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            },
        }
    }
}

/// Serializes as the canonical tagged JSON form under default options.
///
/// This is the representation persisted inside audit event lines. Canonical
/// encoding is idempotent on its own output, so a value parsed back from a
/// persisted line re-encodes to the exact text that was signed.
impl Serialize for CanonicalValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let stable = to_stable(self, &CanonicalOptions::default(), &mut Vec::new())
            .map_err(serde::ser::Error::custom)?;
        stable.serialize(serializer)
    }
}

/// Deserializes from plain JSON.
///
/// Tagged markers are intentionally left as the plain sequences they parse
/// into; re-encoding them reproduces the same marker text.
impl<'de> Deserialize<'de> for CanonicalValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_is_stable() {
        let raw: serde_json::Value =
            serde_json::from_str(r#"{"b":[1,2.5,null],"a":"x"}"#).unwrap();
        let value = CanonicalValue::from(raw);
        let rendered = serde_json::to_string(&value).unwrap();
        assert_eq!(rendered, r#"{"a":"x","b":[1,2.5,null]}"#);

        // Parsing the rendered form and rendering again changes nothing.
        let reparsed: CanonicalValue = serde_json::from_str(&rendered).unwrap();
        assert_eq!(serde_json::to_string(&reparsed).unwrap(), rendered);
    }

    #[test]
    fn shared_handle_links_into_own_subtree() {
        let (node, handle) = CanonicalValue::shared(CanonicalValue::Null);
        *handle.write().unwrap() = CanonicalValue::Mapping(vec![
            ("self".to_string(), node.clone()),
        ]);
        // Rendering uses the default marker policy, so this terminates.
        let rendered = serde_json::to_string(&node).unwrap();
        assert!(rendered.contains("__cycle__"));
    }
}
