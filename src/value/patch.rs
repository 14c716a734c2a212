use super::SnapshotValue;

/// `StatePatch` (§3, §4.1): `{path, op, value?}`. Wire encoding is RFC 6902
/// JSON Patch; paths are RFC 6901 JSON Pointers.
#[derive(Clone, Debug, PartialEq)]
pub struct StatePatch {
    pub path: String,
    pub op: PatchOp,
    pub value: Option<SnapshotValue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOp {
    Replace,
    Add,
    Remove,
}

impl StatePatch {
    pub fn replace(path: impl Into<String>, value: SnapshotValue) -> Self {
        Self {
            path: path.into(),
            op: PatchOp::Replace,
            value: Some(value),
        }
    }

    pub fn add(path: impl Into<String>, value: SnapshotValue) -> Self {
        Self {
            path: path.into(),
            op: PatchOp::Add,
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            op: PatchOp::Remove,
            value: None,
        }
    }
}

/// Escapes one JSON Pointer token: `~` → `~0`, `/` → `~1` (§4.1, §8
/// boundary behavior: `"a/b~c"` encodes to `/a~1b~0c`).
pub fn escape_pointer_token(raw: &str) -> String {
    raw.replace('~', "~0").replace('/', "~1")
}

/// Joins a root field name with escaped nested keys into a JSON Pointer.
pub fn join_pointer(segments: &[&str]) -> String {
    let mut path = String::new();
    for segment in segments {
        path.push('/');
        path.push_str(&escape_pointer_token(segment));
    }
    path
}

impl serde::Serialize for StatePatch {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let len = if self.value.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        let op = match self.op {
            PatchOp::Replace => "replace",
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
        };
        map.serialize_entry("op", op)?;
        map.serialize_entry("path", &self.path)?;
        if let Some(value) = &self.value {
            map.serialize_entry("value", value)?;
        }
        map.end()
    }
}

impl<'de> serde::Deserialize<'de> for StatePatch {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Raw {
            op: String,
            path: String,
            #[serde(default)]
            value: Option<SnapshotValue>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let op = match raw.op.as_str() {
            "replace" => PatchOp::Replace,
            "add" => PatchOp::Add,
            "remove" => PatchOp::Remove,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "unknown JSON Patch op: {other}"
                )));
            }
        };
        Ok(StatePatch {
            path: raw.path,
            op,
            value: raw.value,
        })
    }
}
