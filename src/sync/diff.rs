use std::collections::{BTreeMap, HashSet};

use crate::value::{escape_pointer_token, AtomicShape, PatchOp, SnapshotValue, StatePatch, StateSnapshot};

/// `diffSnapshots(old, new, onlyPaths?, dirtyFields?)` (§4.4). Pure,
/// side-effect free — cache updates are the caller's responsibility.
pub fn diff_snapshots<A: AtomicShape>(
    old: &StateSnapshot,
    new: &StateSnapshot,
    only_paths: Option<&HashSet<String>>,
    dirty_fields: Option<&HashSet<String>>,
) -> Vec<StatePatch> {
    let mut patches = Vec::new();
    let mut keys: Vec<&String> = old.keys().chain(new.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        if let Some(only) = only_paths
            && !path_touches(only, key)
        {
            continue;
        }
        if let Some(dirty) = dirty_fields
            && !dirty.contains(key.as_str())
        {
            // Crucial: a field absent from the dirty set is treated as
            // unchanged, even if it vanished from `new` — this prevents a
            // truncated snapshot from reading as a delete (§4.4, §9 open
            // question).
            continue;
        }

        let path = format!("/{}", escape_pointer_token(key));
        diff_values::<A>(old.get(key), new.get(key), &path, only_paths, &mut patches);
    }

    patches
}

fn path_touches(only_paths: &HashSet<String>, key: &str) -> bool {
    let root = format!("/{}", escape_pointer_token(key));
    path_intersects(only_paths, &root)
}

/// True if `path` is named by `only_paths` directly, is a descendant of a
/// named path, or is an ancestor of one (so recursion can still reach it).
fn path_intersects(only_paths: &HashSet<String>, path: &str) -> bool {
    only_paths.iter().any(|p| {
        p == path || p.starts_with(&format!("{path}/")) || path.starts_with(&format!("{p}/"))
    })
}

fn diff_values<A: AtomicShape>(
    old: Option<&SnapshotValue>,
    new: Option<&SnapshotValue>,
    path: &str,
    only_paths: Option<&HashSet<String>>,
    patches: &mut Vec<StatePatch>,
) {
    match (old, new) {
        (None, None) => {}
        (None, Some(new_value)) => patches.push(StatePatch::add(path, new_value.clone())),
        (Some(_), None) => patches.push(StatePatch::remove(path)),
        (Some(old_value), Some(new_value)) => {
            if old_value == new_value {
                return;
            }
            match (old_value, new_value) {
                (SnapshotValue::Object(old_map), SnapshotValue::Object(new_map))
                    if !A::is_atomic(old_map) && !A::is_atomic(new_map) =>
                {
                    diff_objects::<A>(old_map, new_map, path, only_paths, patches);
                }
                _ => patches.push(StatePatch::replace(path, new_value.clone())),
            }
        }
    }
}

fn diff_objects<A: AtomicShape>(
    old_map: &BTreeMap<String, SnapshotValue>,
    new_map: &BTreeMap<String, SnapshotValue>,
    path: &str,
    only_paths: Option<&HashSet<String>>,
    patches: &mut Vec<StatePatch>,
) {
    let mut keys: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let child_path = format!("{path}/{}", escape_pointer_token(key));
        if let Some(only) = only_paths
            && !path_intersects(only, &child_path)
        {
            continue;
        }
        diff_values::<A>(old_map.get(key), new_map.get(key), &child_path, only_paths, patches);
    }
}

/// The diff engine's own record of a single patch target, used by
/// `merge_patches_override` (§4.4 step 5).
pub fn merge_patches_override(base: &mut Vec<StatePatch>, overriding: Vec<StatePatch>) {
    for incoming in overriding {
        if let Some(existing) = base.iter_mut().find(|p| p.path == incoming.path) {
            *existing = incoming;
        } else {
            base.push(incoming);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::KnownAtomicShapes;

    fn snap(fields: &[(&str, SnapshotValue)]) -> StateSnapshot {
        StateSnapshot::from_fields(fields.iter().map(|(k, v)| (k.to_string(), v.clone())))
    }

    #[test]
    fn identical_snapshots_diff_to_nothing() {
        let s = snap(&[("hp", SnapshotValue::Int(100))]);
        assert!(diff_snapshots::<KnownAtomicShapes>(&s, &s, None, None).is_empty());
    }

    #[test]
    fn array_change_is_single_whole_replace() {
        let old = snap(&[("hand", SnapshotValue::Array(vec![SnapshotValue::Int(1)]))]);
        let new = snap(&[(
            "hand",
            SnapshotValue::Array(vec![SnapshotValue::Int(1), SnapshotValue::Int(2)]),
        )]);
        let patches = diff_snapshots::<KnownAtomicShapes>(&old, &new, None, None);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].op, PatchOp::Replace);
        assert_eq!(patches[0].path, "/hand");
    }

    #[test]
    fn object_change_diffs_field_by_field() {
        let old = snap(&[(
            "alice",
            SnapshotValue::object([("hp".to_string(), SnapshotValue::Int(100))]),
        )]);
        let new = snap(&[(
            "alice",
            SnapshotValue::object([("hp".to_string(), SnapshotValue::Int(80))]),
        )]);
        let patches = diff_snapshots::<KnownAtomicShapes>(&old, &new, None, None);
        assert_eq!(patches, vec![StatePatch::replace("/alice/hp", SnapshotValue::Int(80))]);
    }

    #[test]
    fn atomic_shape_replaces_whole_object() {
        let old = snap(&[(
            "pos",
            SnapshotValue::object([
                ("x".to_string(), SnapshotValue::Int(0)),
                ("y".to_string(), SnapshotValue::Int(0)),
            ]),
        )]);
        let new = snap(&[(
            "pos",
            SnapshotValue::object([
                ("x".to_string(), SnapshotValue::Int(1)),
                ("y".to_string(), SnapshotValue::Int(0)),
            ]),
        )]);
        let patches = diff_snapshots::<KnownAtomicShapes>(&old, &new, None, None);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].path, "/pos");
        assert!(patches[0].value.as_ref().unwrap().is_object());
    }

    #[test]
    fn removed_key_emits_remove_op() {
        let old = snap(&[("players", SnapshotValue::object([(
            "bob".to_string(),
            SnapshotValue::object([("hp".to_string(), SnapshotValue::Int(1))]),
        )]))]);
        let new = snap(&[("players", SnapshotValue::object([]))]);
        let patches = diff_snapshots::<KnownAtomicShapes>(&old, &new, None, None);
        assert_eq!(patches, vec![StatePatch::remove("/players/bob")]);
    }

    #[test]
    fn added_key_emits_add_op() {
        let old = snap(&[("players", SnapshotValue::object([]))]);
        let new = snap(&[("players", SnapshotValue::object([(
            "carol".to_string(),
            SnapshotValue::object([
                ("hp".to_string(), SnapshotValue::Int(100)),
                ("name".to_string(), SnapshotValue::String("Carol".into())),
            ]),
        )]))]);
        let patches = diff_snapshots::<KnownAtomicShapes>(&old, &new, None, None);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].op, PatchOp::Add);
        assert_eq!(patches[0].path, "/players/carol");
    }

    #[test]
    fn non_dirty_field_missing_in_new_is_not_a_delete() {
        let old = snap(&[
            ("hp", SnapshotValue::Int(100)),
            ("mana", SnapshotValue::Int(50)),
        ]);
        // `new` here models a truncated/dirty-only extraction that omits `mana`.
        let new = snap(&[("hp", SnapshotValue::Int(90))]);
        let dirty: HashSet<String> = ["hp".to_string()].into_iter().collect();
        let patches = diff_snapshots::<KnownAtomicShapes>(&old, &new, None, Some(&dirty));
        assert_eq!(patches, vec![StatePatch::replace("/hp", SnapshotValue::Int(90))]);
    }

    #[test]
    fn merge_override_replaces_same_path() {
        let mut base = vec![StatePatch::replace("/hp", SnapshotValue::Int(1))];
        merge_patches_override(&mut base, vec![StatePatch::replace("/hp", SnapshotValue::Int(2))]);
        assert_eq!(base, vec![StatePatch::replace("/hp", SnapshotValue::Int(2))]);
    }

    #[test]
    fn merge_override_with_empty_overriding_keeps_base() {
        let base = vec![StatePatch::replace("/hp", SnapshotValue::Int(1))];
        let mut merged = base.clone();
        merge_patches_override(&mut merged, Vec::new());
        assert_eq!(merged, base);
    }

    #[test]
    fn merge_override_onto_empty_base_yields_overriding() {
        let mut base = Vec::new();
        let overriding = vec![StatePatch::replace("/mana", SnapshotValue::Int(5))];
        merge_patches_override(&mut base, overriding.clone());
        assert_eq!(base, overriding);
    }

    /// (P4) Applying a diff's patches to the old snapshot reconstructs the
    /// new snapshot exactly.
    #[test]
    fn applying_patches_to_old_snapshot_reconstructs_new_snapshot() {
        let old = snap(&[
            ("hp", SnapshotValue::Int(100)),
            ("players", SnapshotValue::object([(
                "alice".to_string(),
                SnapshotValue::object([("hp".to_string(), SnapshotValue::Int(100))]),
            )])),
        ]);
        let new = snap(&[
            ("hp", SnapshotValue::Int(90)),
            ("players", SnapshotValue::object([(
                "alice".to_string(),
                SnapshotValue::object([("hp".to_string(), SnapshotValue::Int(80))]),
            )])),
        ]);
        let patches = diff_snapshots::<KnownAtomicShapes>(&old, &new, None, None);

        let mut reconstructed = old.clone();
        for patch in &patches {
            match patch.op {
                PatchOp::Replace | PatchOp::Add => {
                    let mut segments = patch.path.trim_start_matches('/').split('/');
                    let root = segments.next().unwrap();
                    match segments.next() {
                        None => reconstructed.insert(root, patch.value.clone().unwrap()),
                        Some(nested) => {
                            let mut map = reconstructed.get(root).unwrap().as_object().unwrap().clone();
                            map.insert(nested.to_string(), patch.value.clone().unwrap());
                            reconstructed.insert(root, SnapshotValue::Object(map));
                        }
                    }
                }
                PatchOp::Remove => {
                    let mut segments = patch.path.trim_start_matches('/').split('/');
                    let root = segments.next().unwrap();
                    if let Some(nested) = segments.next() {
                        let mut map = reconstructed.get(root).unwrap().as_object().unwrap().clone();
                        map.remove(nested);
                        reconstructed.insert(root, SnapshotValue::Object(map));
                    } else {
                        reconstructed.remove(root);
                    }
                }
            }
        }

        assert_eq!(reconstructed, new);
    }
}
