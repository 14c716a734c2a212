//! C1: the value model. `SnapshotValue` is a JSON-shaped sum type,
//! `StateSnapshot` a mapping of root-level field names to values,
//! `StatePatch` a single JSON-Patch operation, `StateUpdate` the per-player
//! delivery envelope (§3, §4.1).

mod patch;
mod snapshot;
mod update;

pub use patch::{escape_pointer_token, join_pointer, PatchOp, StatePatch};
pub use snapshot::StateSnapshot;
pub use update::StateUpdate;

use std::collections::BTreeMap;
use std::fmt;

use crate::ids::PlayerId;

/// A JSON-interchangeable value. Two values are equal iff structurally equal
/// (§3). Objects use a `BTreeMap` rather than the teacher's plain
/// `HashMap<String, String>` attrs bag (`core/context.rs`) because the diff
/// engine needs a stable key order to produce deterministic patch sequences.
#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<SnapshotValue>),
    Object(BTreeMap<String, SnapshotValue>),
}

/// Raised when a value's type cannot be mapped into `SnapshotValue`, or a
/// map key cannot be converted to a deterministic string (§4.1, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    UnsupportedValue(String),
    UnsupportedKey(String),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::UnsupportedValue(desc) => write!(f, "unsupported value: {desc}"),
            SchemaError::UnsupportedKey(desc) => write!(f, "unsupported key: {desc}"),
        }
    }
}

impl std::error::Error for SchemaError {}

impl SnapshotValue {
    pub fn is_object(&self) -> bool {
        matches!(self, SnapshotValue::Object(_))
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, SnapshotValue>> {
        match self {
            SnapshotValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[SnapshotValue]> {
        match self {
            SnapshotValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn object(fields: impl IntoIterator<Item = (String, SnapshotValue)>) -> Self {
        SnapshotValue::Object(fields.into_iter().collect())
    }
}

/// A deterministic string conversion for non-string map keys (§4.1): player
/// identifiers materialize as their raw string, integers as base-10.
pub trait KeyLike {
    fn as_key(&self) -> String;
}

impl KeyLike for PlayerId {
    fn as_key(&self) -> String {
        self.as_str().to_string()
    }
}

impl KeyLike for String {
    fn as_key(&self) -> String {
        self.clone()
    }
}

impl KeyLike for &str {
    fn as_key(&self) -> String {
        (*self).to_string()
    }
}

impl KeyLike for i64 {
    fn as_key(&self) -> String {
        self.to_string()
    }
}

impl KeyLike for u64 {
    fn as_key(&self) -> String {
        self.to_string()
    }
}

/// `SnapshotValue.fromAny` (§4.1): converts a language-level value to the
/// canonical form. Implemented for plain JSON-shaped data; state nodes
/// implement `crate::schema::StateNode` directly and go through
/// `snapshotFor`, not through this trait, since their projection depends on
/// the requesting player and policy table rather than a fixed shape.
pub trait IntoSnapshotValue {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError>;
}

impl IntoSnapshotValue for SnapshotValue {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        Ok(self)
    }
}

impl IntoSnapshotValue for () {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        Ok(SnapshotValue::Null)
    }
}

impl IntoSnapshotValue for bool {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        Ok(SnapshotValue::Bool(self))
    }
}

impl IntoSnapshotValue for i64 {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        Ok(SnapshotValue::Int(self))
    }
}

impl IntoSnapshotValue for i32 {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        Ok(SnapshotValue::Int(self as i64))
    }
}

impl IntoSnapshotValue for u32 {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        Ok(SnapshotValue::Int(self as i64))
    }
}

impl IntoSnapshotValue for f64 {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        Ok(SnapshotValue::Float(self))
    }
}

impl IntoSnapshotValue for String {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        Ok(SnapshotValue::String(self))
    }
}

impl IntoSnapshotValue for &str {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        Ok(SnapshotValue::String(self.to_string()))
    }
}

impl<T: IntoSnapshotValue> IntoSnapshotValue for Vec<T> {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        let items = self
            .into_iter()
            .map(IntoSnapshotValue::into_snapshot_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SnapshotValue::Array(items))
    }
}

impl<K: KeyLike, T: IntoSnapshotValue> IntoSnapshotValue for std::collections::HashMap<K, T> {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        let fields = self
            .into_iter()
            .map(|(k, v)| Ok((k.as_key(), v.into_snapshot_value()?)))
            .collect::<Result<BTreeMap<_, _>, SchemaError>>()?;
        Ok(SnapshotValue::Object(fields))
    }
}

impl<T: IntoSnapshotValue> IntoSnapshotValue for Option<T> {
    fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
        match self {
            Some(v) => v.into_snapshot_value(),
            None => Ok(SnapshotValue::Null),
        }
    }
}

/// Converts a `serde_json::Value` into `SnapshotValue`, preserving int64 vs
/// double distinction (§4.1, §3 — required for structural equality to not
/// conflate `1` and `1.0`).
impl TryFrom<serde_json::Value> for SnapshotValue {
    type Error = SchemaError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_json::Value::Null => SnapshotValue::Null,
            serde_json::Value::Bool(b) => SnapshotValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SnapshotValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    SnapshotValue::Float(f)
                } else {
                    return Err(SchemaError::UnsupportedValue(format!(
                        "number out of range: {n}"
                    )));
                }
            }
            serde_json::Value::String(s) => SnapshotValue::String(s),
            serde_json::Value::Array(items) => SnapshotValue::Array(
                items
                    .into_iter()
                    .map(SnapshotValue::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(map) => SnapshotValue::Object(
                map.into_iter()
                    .map(|(k, v)| Ok((k, SnapshotValue::try_from(v)?)))
                    .collect::<Result<_, SchemaError>>()?,
            ),
        })
    }
}

impl From<SnapshotValue> for serde_json::Value {
    fn from(value: SnapshotValue) -> Self {
        match value {
            SnapshotValue::Null => serde_json::Value::Null,
            SnapshotValue::Bool(b) => serde_json::Value::Bool(b),
            SnapshotValue::Int(i) => serde_json::Value::Number(i.into()),
            SnapshotValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SnapshotValue::String(s) => serde_json::Value::String(s),
            SnapshotValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            SnapshotValue::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl serde::Serialize for SnapshotValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_json::Value::from(self.clone()).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for SnapshotValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        SnapshotValue::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// A value shape that must be diffed as a whole rather than field-by-field
/// (§4.4 "atomic-value exception", §9 "open question — atomic-value shape
/// enumeration"). The spec recommends schema metadata over shape inference;
/// `AtomicShape` lets a state-node field declare this directly instead of
/// the diff engine guessing from `{x,y}`/`{x,y,z}` field names.
pub trait AtomicShape {
    fn is_atomic(fields: &BTreeMap<String, SnapshotValue>) -> bool;
}

/// Default atomic-shape recognizer: 2D/3D integer vectors and angle
/// wrappers, matching the small hard-coded set the original system uses.
/// Kept as a fallback for values that do not carry schema metadata; prefer
/// `SyncPolicy::atomic` on the field when the shape is known ahead of time.
pub struct KnownAtomicShapes;

impl AtomicShape for KnownAtomicShapes {
    fn is_atomic(fields: &BTreeMap<String, SnapshotValue>) -> bool {
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        matches!(
            keys.as_slice(),
            ["x", "y"] | ["x", "y", "z"] | ["angle"] | ["w", "x", "y", "z"]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_float_are_not_structurally_equal() {
        assert_ne!(SnapshotValue::Int(1), SnapshotValue::Float(1.0));
    }

    #[test]
    fn json_round_trip_preserves_int() {
        let original = SnapshotValue::Int(42);
        let json: serde_json::Value = original.clone().into();
        let back = SnapshotValue::try_from(json).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn json_round_trip_preserves_float() {
        let original = SnapshotValue::Float(42.5);
        let json: serde_json::Value = original.clone().into();
        let back = SnapshotValue::try_from(json).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn known_atomic_shapes_recognizes_vec2() {
        let mut fields = BTreeMap::new();
        fields.insert("x".to_string(), SnapshotValue::Int(1));
        fields.insert("y".to_string(), SnapshotValue::Int(2));
        assert!(KnownAtomicShapes::is_atomic(&fields));
    }

    #[test]
    fn known_atomic_shapes_rejects_arbitrary_object() {
        let mut fields = BTreeMap::new();
        fields.insert("hp".to_string(), SnapshotValue::Int(100));
        fields.insert("name".to_string(), SnapshotValue::String("a".into()));
        assert!(!KnownAtomicShapes::is_atomic(&fields));
    }
}
