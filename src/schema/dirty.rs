use std::collections::HashSet;
use std::ops::{Deref, DerefMut};

/// The set of top-level field names mutated since the last `clear_dirty`
/// (§3, §4.2). Field setters mark dirty through this; direct mutation of a
/// nested container without going through a setter is a programmer error
/// the spec explicitly calls out as unchecked (§3 invariants).
#[derive(Clone, Debug, Default)]
pub struct DirtySet(HashSet<&'static str>);

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, field: &'static str) {
        self.0.insert(field);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn as_set(&self) -> HashSet<String> {
        self.0.iter().map(|s| s.to_string()).collect()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }
}

/// A mutable handle into a field's container value that marks the owning
/// node's dirty set when it is modified in place. This is the "thin wrapper
/// whose mutating operations mark the owning node's field dirty" the spec
/// recommends in lieu of reactive container primitives (§9).
///
/// `DirtyGuard` marks dirty unconditionally on drop rather than tracking
/// whether a `DerefMut` actually happened — callers that only need a shared
/// view should use the plain getter instead of `_mut`.
pub struct DirtyGuard<'a, T> {
    value: &'a mut T,
    dirty: &'a mut DirtySet,
    field: &'static str,
}

impl<'a, T> DirtyGuard<'a, T> {
    pub fn new(value: &'a mut T, dirty: &'a mut DirtySet, field: &'static str) -> Self {
        Self {
            value,
            dirty,
            field,
        }
    }
}

impl<T> Deref for DirtyGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T> DerefMut for DirtyGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

impl<T> Drop for DirtyGuard<'_, T> {
    fn drop(&mut self) {
        self.dirty.mark(self.field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_clear() {
        let mut dirty = DirtySet::new();
        assert!(dirty.is_empty());
        dirty.mark("hp");
        assert!(!dirty.is_empty());
        assert!(dirty.contains("hp"));
        dirty.clear();
        assert!(dirty.is_empty());
    }

    #[test]
    fn guard_marks_dirty_on_drop() {
        let mut value = vec![1, 2, 3];
        let mut dirty = DirtySet::new();
        {
            let mut guard = DirtyGuard::new(&mut value, &mut dirty, "items");
            guard.push(4);
        }
        assert!(dirty.contains("items"));
        assert_eq!(value, vec![1, 2, 3, 4]);
    }
}
