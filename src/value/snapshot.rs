use std::collections::BTreeMap;

use super::SnapshotValue;

/// `StateSnapshot` (§3): a mapping from root-level field name to value.
/// Merge semantics are key-wise overwrite (§4.1 `StateSnapshot.merge`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateSnapshot {
    fields: BTreeMap<String, SnapshotValue>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: impl IntoIterator<Item = (String, SnapshotValue)>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: SnapshotValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<SnapshotValue> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&SnapshotValue> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SnapshotValue)> {
        self.fields.iter()
    }

    pub fn fields(&self) -> &BTreeMap<String, SnapshotValue> {
        &self.fields
    }

    /// `StateSnapshot.merge(other, overwrite=true)` (§4.1): key-wise merge.
    /// `overwrite=false` keeps the receiver's value when both snapshots
    /// define the same key.
    pub fn merge(&mut self, other: &StateSnapshot, overwrite: bool) {
        for (k, v) in other.fields.iter() {
            if overwrite || !self.fields.contains_key(k) {
                self.fields.insert(k.clone(), v.clone());
            }
        }
    }

    /// Merge only the named fields from `other`, used by the diff engine
    /// when updating the cache under dirty-tracking mode (§4.4 step 3/4:
    /// "merge cur into the cache, only the dirty fields when in dirty
    /// mode").
    pub fn merge_fields(&mut self, other: &StateSnapshot, only: &std::collections::HashSet<String>) {
        for key in only {
            match other.get(key) {
                Some(value) => {
                    self.fields.insert(key.clone(), value.clone());
                }
                None => {
                    self.fields.remove(key);
                }
            }
        }
    }
}
