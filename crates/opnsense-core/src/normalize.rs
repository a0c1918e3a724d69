//! Folding of inconsistent collection responses into one shape.
//!
//! Appliance endpoints return bare arrays, `{"rows": [...]}`, `{"data": [...]}`
//! or a capability-specific key such as `leases`. [`CollectionShape`] is the
//! tagged decode of those variants; [`normalize`] is the total function callers
//! use. Unknown shapes degrade to an empty list, never an error.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Keys probed, in order, when a response is an object.
pub const DEFAULT_COLLECTION_KEYS: &[&str] = &["rows", "data", "entries", "leases", "logs"];

/// Decoded form of a collection response.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionShape {
    /// The body itself is an array
    Bare(Vec<Value>),
    /// An object carrying the array under `key`
    Keyed {
        /// Key the records were found under
        key: String,
        /// The records
        records: Vec<Value>,
    },
    /// Anything else
    Unrecognized,
}

impl CollectionShape {
    /// Classify a response body, trying `keys` in order for object bodies.
    ///
    /// A key whose value is not an array is skipped.
    #[must_use]
    pub fn classify(body: Value, keys: &[&str]) -> Self {
        match body {
            Value::Array(records) => Self::Bare(records),
            Value::Object(mut map) => {
                for key in keys {
                    if matches!(map.get(*key), Some(Value::Array(_))) {
                        if let Some(Value::Array(records)) = map.remove(*key) {
                            return Self::Keyed {
                                key: (*key).to_string(),
                                records,
                            };
                        }
                    }
                }
                Self::Unrecognized
            }
            _ => Self::Unrecognized,
        }
    }

    /// Returns true unless the shape is [`CollectionShape::Unrecognized`].
    #[must_use]
    pub const fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }

    /// The records, or an empty list for unrecognized shapes.
    #[must_use]
    pub fn into_records(self) -> Vec<Value> {
        match self {
            Self::Bare(records) | Self::Keyed { records, .. } => records,
            Self::Unrecognized => Vec::new(),
        }
    }
}

/// Normalize a response using [`DEFAULT_COLLECTION_KEYS`].
#[must_use]
pub fn normalize(body: Value) -> Vec<Value> {
    normalize_with_keys(body, DEFAULT_COLLECTION_KEYS)
}

/// Normalize a response, probing `keys` in order for object bodies.
#[must_use]
pub fn normalize_with_keys(body: Value, keys: &[&str]) -> Vec<Value> {
    let summary = describe(&body);
    let shape = CollectionShape::classify(body, keys);
    if !shape.is_recognized() {
        warn!(shape = %summary, ?keys, "Unexpected collection response shape");
    }
    shape.into_records()
}

/// Normalize and decode each record as `T`.
///
/// Records that fail to decode are skipped and logged rather than failing the
/// whole collection.
#[must_use]
pub fn normalize_into<T>(body: Value, keys: &[&str]) -> Vec<T>
where
    T: DeserializeOwned,
{
    normalize_with_keys(body, keys)
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                debug!(index, error = %err, "Skipping undecodable record");
                None
            }
        })
        .collect()
}

fn describe(body: &Value) -> String {
    match body {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).take(8).collect();
            format!("object{{{}}}", keys.join(","))
        }
        Value::Array(_) => "array".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Null => "null".to_string(),
    }
}
