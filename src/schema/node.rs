use std::collections::HashSet;

use crate::ids::PlayerId;
use crate::schema::dirty::DirtySet;
use crate::schema::field::FieldSpec;
use crate::value::{SchemaError, SnapshotValue, StateSnapshot};

/// A state node: a record of sync-annotated fields plus a dirty set (§3,
/// §4.2). The root of a Land's state tree, and any nested struct reachable
/// from it through a `broadcast_node`/`per_player_slice_node` field, both
/// implement this trait.
///
/// `schema()` is a static table (built once, §9 "static schema" design
/// note) rather than runtime reflection — the hot sync path never inspects
/// field names or types dynamically.
pub trait StateNode: Send + Sync {
    fn schema() -> &'static [FieldSpec<Self>]
    where
        Self: Sized;

    fn dirty(&self) -> &DirtySet;
    fn dirty_mut(&mut self) -> &mut DirtySet;

    fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    fn dirty_fields(&self) -> HashSet<String> {
        self.dirty().as_set()
    }

    fn clear_dirty(&mut self) {
        self.dirty_mut().clear()
    }

    /// Only `broadcast`/`masked` fields (§4.3 "Broadcast snapshot").
    fn broadcast_only_snapshot(
        &self,
        dirty_filter: Option<&HashSet<String>>,
    ) -> Result<StateSnapshot, SchemaError>
    where
        Self: Sized,
    {
        let mut snapshot = StateSnapshot::new();
        for field in Self::schema() {
            if let Some(filter) = dirty_filter
                && !filter.contains(field.name)
            {
                continue;
            }
            if let Some(value) = field.emit_broadcast(self)? {
                snapshot.insert(field.name, value);
            }
        }
        Ok(snapshot)
    }

    /// Only `perPlayer`/`perPlayerSlice`/`custom` fields, admitted for `P`
    /// (§4.3 "Per-player snapshot for P").
    fn per_player_only_snapshot(
        &self,
        player: &PlayerId,
        dirty_filter: Option<&HashSet<String>>,
    ) -> Result<StateSnapshot, SchemaError>
    where
        Self: Sized,
    {
        let mut snapshot = StateSnapshot::new();
        for field in Self::schema() {
            if let Some(filter) = dirty_filter
                && !filter.contains(field.name)
            {
                continue;
            }
            if let Some(value) = field.emit_per_player(self, player)? {
                snapshot.insert(field.name, value);
            }
        }
        Ok(snapshot)
    }

    /// `snapshotFor(playerID?, dirtyFieldFilter?)` (§4.2): `playerID == nil`
    /// is broadcast-only; otherwise the union of broadcast and admitted
    /// per-player fields (§4.3: "full snapshot for P is broadcastSnapshot ∪
    /// perPlayerSnapshot(P)").
    fn snapshot_for(
        &self,
        player: Option<&PlayerId>,
        dirty_filter: Option<&HashSet<String>>,
    ) -> Result<StateSnapshot, SchemaError>
    where
        Self: Sized,
    {
        let mut snapshot = self.broadcast_only_snapshot(dirty_filter)?;
        if let Some(player) = player {
            let per_player = self.per_player_only_snapshot(player, dirty_filter)?;
            snapshot.merge(&per_player, true);
        }
        Ok(snapshot)
    }
}

impl From<StateSnapshot> for SnapshotValue {
    fn from(snapshot: StateSnapshot) -> Self {
        SnapshotValue::Object(snapshot.fields().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::FieldSpec;
    use crate::value::IntoSnapshotValue;
    use std::collections::HashMap;

    struct Player {
        hp: i64,
    }

    impl IntoSnapshotValue for Player {
        fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
            Ok(SnapshotValue::object([(
                "hp".to_string(),
                SnapshotValue::Int(self.hp),
            )]))
        }
    }

    impl Clone for Player {
        fn clone(&self) -> Self {
            Player { hp: self.hp }
        }
    }

    struct MatchState {
        players: HashMap<PlayerId, Player>,
        hidden_deck: Vec<i64>,
        hands: HashMap<PlayerId, Vec<i64>>,
        dirty: DirtySet,
    }

    impl StateNode for MatchState {
        fn schema() -> &'static [FieldSpec<Self>] {
            static SCHEMA: std::sync::OnceLock<Vec<FieldSpec<MatchState>>> =
                std::sync::OnceLock::new();
            SCHEMA.get_or_init(|| {
                vec![
                    FieldSpec::broadcast("players", |s: &MatchState| &s.players),
                    FieldSpec::server_only("hidden_deck"),
                    FieldSpec::per_player_slice("hands", |s: &MatchState| &s.hands),
                ]
            })
        }

        fn dirty(&self) -> &DirtySet {
            &self.dirty
        }

        fn dirty_mut(&mut self) -> &mut DirtySet {
            &mut self.dirty
        }
    }

    fn pid(raw: &str) -> PlayerId {
        PlayerId::new(raw)
    }

    #[test]
    fn broadcast_excludes_server_only_and_per_player() {
        let mut players = HashMap::new();
        players.insert(pid("alice"), Player { hp: 100 });
        let mut hands = HashMap::new();
        hands.insert(pid("alice"), vec![1, 2]);

        let state = MatchState {
            players,
            hidden_deck: vec![1, 2, 3],
            hands,
            dirty: DirtySet::new(),
        };

        let broadcast = state.broadcast_only_snapshot(None).unwrap();
        assert!(broadcast.contains_key("players"));
        assert!(!broadcast.contains_key("hidden_deck"));
        assert!(!broadcast.contains_key("hands"));
    }

    #[test]
    fn per_player_slice_selects_only_requesting_player() {
        let mut hands = HashMap::new();
        hands.insert(pid("alice"), vec![1, 2]);
        hands.insert(pid("bob"), vec![3]);

        let state = MatchState {
            players: HashMap::new(),
            hidden_deck: vec![],
            hands,
            dirty: DirtySet::new(),
        };

        let alice_view = state.per_player_only_snapshot(&pid("alice"), None).unwrap();
        let hands_value = alice_view.get("hands").unwrap();
        assert_eq!(
            hands_value,
            &SnapshotValue::object([(
                "alice".to_string(),
                SnapshotValue::Array(vec![SnapshotValue::Int(1), SnapshotValue::Int(2)]),
            )])
        );
    }

    #[test]
    fn full_snapshot_is_union_of_broadcast_and_per_player() {
        let mut players = HashMap::new();
        players.insert(pid("alice"), Player { hp: 100 });
        let mut hands = HashMap::new();
        hands.insert(pid("alice"), vec![1, 2]);

        let state = MatchState {
            players,
            hidden_deck: vec![9],
            hands,
            dirty: DirtySet::new(),
        };

        let full = state.snapshot_for(Some(&pid("alice")), None).unwrap();
        assert!(full.contains_key("players"));
        assert!(full.contains_key("hands"));
        assert!(!full.contains_key("hidden_deck"));
    }
}
