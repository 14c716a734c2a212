use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::RwLock;

use crate::ids::PlayerId;
use crate::schema::StateNode;
use crate::sync::diff::diff_snapshots;
use crate::sync::mode::SnapshotMode;
use crate::value::{AtomicShape, SchemaError, StatePatch, StateSnapshot, StateUpdate};

/// The diff engine (§4.4, C4): owns a broadcast cache, a per-player cache,
/// and the set of players who have received their `FirstSync`. One
/// `SyncEngine<N, A>` exists per Land, scoped to that Land's root state
/// node `N` and its atomic-shape recognizer `A`.
///
/// Caches are behind `RwLock` rather than requiring `&mut self`: the
/// dispatcher's fan-out (§4.6 `syncFanOut`) extracts the broadcast diff
/// once under the Land's serial boundary, then computes each player's diff
/// off that boundary, in parallel — those diffs still need to read and
/// update the per-player cache concurrently.
pub struct SyncEngine<N, A> {
    broadcast_cache: RwLock<Option<StateSnapshot>>,
    per_player_cache: RwLock<HashMap<PlayerId, StateSnapshot>>,
    first_sync_delivered: RwLock<HashSet<PlayerId>>,
    _node: PhantomData<fn() -> N>,
    _atomic: PhantomData<fn() -> A>,
}

impl<N, A> Default for SyncEngine<N, A> {
    fn default() -> Self {
        Self {
            broadcast_cache: RwLock::new(None),
            per_player_cache: RwLock::new(HashMap::new()),
            first_sync_delivered: RwLock::new(HashSet::new()),
            _node: PhantomData,
            _atomic: PhantomData,
        }
    }
}

impl<N, A> SyncEngine<N, A>
where
    N: StateNode,
    A: AtomicShape,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// `warmupBroadcast` (§4.4): primes the broadcast cache without
    /// producing any patches, so the first real diff has a baseline to
    /// compare against instead of treating every field as newly added.
    pub fn warmup_broadcast(&self, state: &N) -> Result<(), SchemaError> {
        let snapshot = state.broadcast_only_snapshot(None)?;
        *self.broadcast_cache.write().unwrap() = Some(snapshot);
        Ok(())
    }

    /// `extractBroadcast(state, mode)` (§4.3): `mode` restricts extraction
    /// to named fields (`include`/`dirtyTracking`), or `all` for the whole
    /// broadcast snapshot.
    pub fn extract_broadcast(
        &self,
        state: &N,
        mode: &SnapshotMode,
    ) -> Result<StateSnapshot, SchemaError> {
        state.broadcast_only_snapshot(mode.field_filter())
    }

    /// `extractPerPlayer(P, state, mode)` (§4.3).
    pub fn extract_per_player(
        &self,
        state: &N,
        player: &PlayerId,
        mode: &SnapshotMode,
    ) -> Result<StateSnapshot, SchemaError> {
        state.per_player_only_snapshot(player, mode.field_filter())
    }

    /// `generateDiff(state, P)` (§4.4): the full per-player sync step —
    /// broadcast diff, per-player diff, merged into one `StateUpdate`. The
    /// merge is computed the same way whether or not this is P's first
    /// call; a first call only differs in which `StateUpdate` variant wraps
    /// it (`FirstSync`, even when the merge is empty) and in marking `P` as
    /// delivered. A nil broadcast/per-player cache is populated from `cur`
    /// and contributes no patches of its own (step 3/4), so the warmed
    /// broadcast baseline from `warmupBroadcast` is never discarded.
    pub fn generate_diff(&self, state: &N, player: &PlayerId) -> Result<StateUpdate, SchemaError> {
        let is_first = !self.first_sync_delivered.read().unwrap().contains(player);

        let dirty = if state.is_dirty() {
            Some(state.dirty_fields())
        } else {
            None
        };

        let broadcast_cur = state.broadcast_only_snapshot(None)?;
        let broadcast_patches =
            self.diff_against_broadcast_cache(&broadcast_cur, dirty.as_ref());

        let per_player_cur = state.per_player_only_snapshot(player, None)?;
        let per_player_patches =
            self.diff_against_per_player_cache(player, &per_player_cur, dirty.as_ref());

        let mut patches = broadcast_patches;
        super::diff::merge_patches_override(&mut patches, per_player_patches);

        if is_first {
            self.first_sync_delivered.write().unwrap().insert(player.clone());
            return Ok(StateUpdate::FirstSync(patches));
        }

        if patches.is_empty() {
            Ok(StateUpdate::NoChange)
        } else {
            Ok(StateUpdate::Diff(patches))
        }
    }

    /// `generateDiffFromSnapshots(broadcastCur, perPlayerCur, dirtyFields?, P)`
    /// (§4.4): the fan-out variant — snapshots already extracted under the
    /// Land's serial boundary, diffed here without touching `state` again.
    /// Shares `diff_against_broadcast_cache`/`diff_against_per_player_cache`
    /// with `generate_diff` so the two paths produce bit-identical patches.
    pub fn generate_diff_from_snapshots(
        &self,
        broadcast_cur: &StateSnapshot,
        per_player_cur: &StateSnapshot,
        dirty_fields: Option<&HashSet<String>>,
        player: &PlayerId,
    ) -> StateUpdate {
        let is_first = !self.first_sync_delivered.read().unwrap().contains(player);

        let broadcast_patches = self.diff_against_broadcast_cache(broadcast_cur, dirty_fields);
        let per_player_patches =
            self.diff_against_per_player_cache(player, per_player_cur, dirty_fields);

        let mut patches = broadcast_patches;
        super::diff::merge_patches_override(&mut patches, per_player_patches);

        if is_first {
            self.first_sync_delivered.write().unwrap().insert(player.clone());
            return StateUpdate::FirstSync(patches);
        }

        if patches.is_empty() {
            StateUpdate::NoChange
        } else {
            StateUpdate::Diff(patches)
        }
    }

    /// `generateUpdateFromBroadcastDiff` (§4.6): reuses an already-computed
    /// broadcast diff (e.g. shared across every player in a tick) and adds
    /// only this player's per-player diff on top.
    pub fn generate_update_from_broadcast_diff(
        &self,
        broadcast_patches: &[StatePatch],
        per_player_cur: &StateSnapshot,
        dirty_fields: Option<&HashSet<String>>,
        player: &PlayerId,
    ) -> StateUpdate {
        let per_player_patches =
            self.diff_against_per_player_cache(player, per_player_cur, dirty_fields);

        let mut patches = broadcast_patches.to_vec();
        super::diff::merge_patches_override(&mut patches, per_player_patches);

        if patches.is_empty() {
            StateUpdate::NoChange
        } else {
            StateUpdate::Diff(patches)
        }
    }

    /// `clearCacheForDisconnectedPlayer(P)` (§4.4): drops per-player cache
    /// and first-sync membership so a rejoining player gets a fresh
    /// `FirstSync` rather than a diff against stale state.
    pub fn clear_cache_for_disconnected_player(&self, player: &PlayerId) {
        self.per_player_cache.write().unwrap().remove(player);
        self.first_sync_delivered.write().unwrap().remove(player);
    }

    /// `markFirstSyncReceived(P)`: lets a caller (e.g. a join handler that
    /// sends its own full snapshot out of band) mark `P` as already synced
    /// without going through `generateDiff`.
    pub fn mark_first_sync_received(&self, player: &PlayerId, broadcast: &StateSnapshot, per_player: &StateSnapshot) {
        self.commit_broadcast(broadcast.clone());
        self.commit_per_player(player.clone(), per_player.clone());
        self.first_sync_delivered.write().unwrap().insert(player.clone());
    }

    /// Step 3: if the broadcast cache is nil, populate it with `cur` and
    /// emit nothing — there is no baseline to diff against yet, and
    /// treating an absent cache as an empty snapshot would emit a spurious
    /// `add` for every present field.
    fn diff_against_broadcast_cache(
        &self,
        cur: &StateSnapshot,
        dirty_fields: Option<&HashSet<String>>,
    ) -> Vec<StatePatch> {
        let cache = self.broadcast_cache.read().unwrap();
        let patches = match cache.as_ref() {
            Some(prev) => diff_snapshots::<A>(prev, cur, None, dirty_fields),
            None => Vec::new(),
        };
        drop(cache);
        self.commit_broadcast(cur.clone());
        patches
    }

    /// Step 4, mirrored for the per-player cache.
    fn diff_against_per_player_cache(
        &self,
        player: &PlayerId,
        cur: &StateSnapshot,
        dirty_fields: Option<&HashSet<String>>,
    ) -> Vec<StatePatch> {
        let cache = self.per_player_cache.read().unwrap();
        let patches = match cache.get(player) {
            Some(prev) => diff_snapshots::<A>(prev, cur, None, dirty_fields),
            None => Vec::new(),
        };
        drop(cache);
        self.commit_per_player(player.clone(), cur.clone());
        patches
    }

    fn commit_broadcast(&self, snapshot: StateSnapshot) {
        *self.broadcast_cache.write().unwrap() = Some(snapshot);
    }

    fn commit_per_player(&self, player: PlayerId, snapshot: StateSnapshot) {
        self.per_player_cache.write().unwrap().insert(player, snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DirtySet, FieldSpec};
    use crate::value::{IntoSnapshotValue, KnownAtomicShapes, SnapshotValue};
    use std::collections::HashMap as StdHashMap;

    struct Player {
        hp: i64,
    }

    impl Clone for Player {
        fn clone(&self) -> Self {
            Player { hp: self.hp }
        }
    }

    impl IntoSnapshotValue for Player {
        fn into_snapshot_value(self) -> Result<SnapshotValue, SchemaError> {
            Ok(SnapshotValue::object([(
                "hp".to_string(),
                SnapshotValue::Int(self.hp),
            )]))
        }
    }

    struct MatchState {
        players: StdHashMap<PlayerId, Player>,
        hidden_deck: Vec<i64>,
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

    fn state(hp: i64) -> MatchState {
        let mut players = StdHashMap::new();
        players.insert(pid("alice"), Player { hp });
        MatchState {
            players,
            hidden_deck: vec![1, 2, 3],
            dirty: DirtySet::new(),
        }
    }

    /// An unwarmed engine has no baseline to diff against, so the first
    /// `FirstSync` populates both caches and carries no patches.
    #[test]
    fn first_sync_against_unwarmed_cache_emits_no_patches() {
        let engine: SyncEngine<MatchState, KnownAtomicShapes> = SyncEngine::new();
        let update = engine.generate_diff(&state(100), &pid("alice")).unwrap();
        assert_eq!(update, StateUpdate::FirstSync(Vec::new()));
    }

    /// (P6) After `warmupBroadcast` on a freshly initialized state and
    /// before any mutation, the first `generateDiff` still returns
    /// `firstSync([])` — the warmed baseline must not be discarded.
    #[test]
    fn first_sync_after_warmup_with_no_mutation_is_empty() {
        let engine: SyncEngine<MatchState, KnownAtomicShapes> = SyncEngine::new();
        let s = state(100);
        engine.warmup_broadcast(&s).unwrap();
        let update = engine.generate_diff(&s, &pid("alice")).unwrap();
        assert_eq!(update, StateUpdate::FirstSync(Vec::new()));
    }

    #[test]
    fn second_call_with_no_changes_yields_no_change() {
        let engine: SyncEngine<MatchState, KnownAtomicShapes> = SyncEngine::new();
        let s = state(100);
        engine.generate_diff(&s, &pid("alice")).unwrap();
        let update = engine.generate_diff(&s, &pid("alice")).unwrap();
        assert_eq!(update, StateUpdate::NoChange);
    }

    #[test]
    fn dirty_field_change_produces_diff() {
        let engine: SyncEngine<MatchState, KnownAtomicShapes> = SyncEngine::new();
        engine.generate_diff(&state(100), &pid("alice")).unwrap();

        let mut next = state(80);
        next.dirty_mut().mark("players");
        let update = engine.generate_diff(&next, &pid("alice")).unwrap();
        match update {
            StateUpdate::Diff(patches) => {
                assert_eq!(patches.len(), 1);
                assert_eq!(patches[0].path, "/players/alice/hp");
            }
            other => panic!("expected Diff, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_clears_cache_so_rejoin_gets_first_sync_again() {
        let engine: SyncEngine<MatchState, KnownAtomicShapes> = SyncEngine::new();
        engine.generate_diff(&state(100), &pid("alice")).unwrap();
        engine.clear_cache_for_disconnected_player(&pid("alice"));

        let update = engine.generate_diff(&state(100), &pid("alice")).unwrap();
        assert!(matches!(update, StateUpdate::FirstSync(_)));
    }

    /// (S4) A player who received their full snapshot out of band (e.g. a
    /// join reply) and is marked via `markFirstSyncReceived` never gets a
    /// `FirstSync` from `generateDiff`, only `NoChange`/`Diff`.
    #[test]
    fn marked_first_sync_received_skips_first_sync_on_next_diff() {
        let engine: SyncEngine<MatchState, KnownAtomicShapes> = SyncEngine::new();
        let s = state(100);
        let broadcast = engine.extract_broadcast(&s, &SnapshotMode::All).unwrap();
        let per_player = engine.extract_per_player(&s, &pid("charlie"), &SnapshotMode::All).unwrap();
        engine.mark_first_sync_received(&pid("charlie"), &broadcast, &per_player);

        let no_change = engine.generate_diff(&s, &pid("charlie")).unwrap();
        assert_eq!(no_change, StateUpdate::NoChange);

        let mut next = state(80);
        next.dirty_mut().mark("players");
        let update = engine.generate_diff(&next, &pid("charlie")).unwrap();
        assert!(matches!(update, StateUpdate::Diff(_)));
    }

    #[test]
    fn from_snapshots_path_matches_generate_diff_path() {
        let direct: SyncEngine<MatchState, KnownAtomicShapes> = SyncEngine::new();
        direct.generate_diff(&state(100), &pid("alice")).unwrap();
        let via_direct = direct.generate_diff(&state(80), &pid("alice")).unwrap();

        let fanout: SyncEngine<MatchState, KnownAtomicShapes> = SyncEngine::new();
        let s1 = state(100);
        fanout.generate_diff_from_snapshots(
            &fanout.extract_broadcast(&s1, &SnapshotMode::All).unwrap(),
            &fanout.extract_per_player(&s1, &pid("alice"), &SnapshotMode::All).unwrap(),
            None,
            &pid("alice"),
        );
        let s2 = state(80);
        let via_fanout = fanout.generate_diff_from_snapshots(
            &fanout.extract_broadcast(&s2, &SnapshotMode::All).unwrap(),
            &fanout.extract_per_player(&s2, &pid("alice"), &SnapshotMode::All).unwrap(),
            None,
            &pid("alice"),
        );

        assert_eq!(via_direct, via_fanout);
    }
}
