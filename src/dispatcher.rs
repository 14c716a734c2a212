//! C6: the Land manager / dispatcher (§4.6). One `LandManager` owns every
//! Land of a given state-node type `N` (and its `AtomicShape` recognizer
//! `A`), the way the teacher's `GameRuntimeHandle<R, H, S>` owns every room
//! of a given `GameHooks` impl behind a `RwLock<HashMap<String, R::Handle>>`
//! (`server/runtime.rs`). Rooms of different shapes get their own
//! `LandManager<N, A>` instance rather than one type-erased registry,
//! mirroring the teacher's per-game-type `GameRuntimeHandle`.

use std::collections::HashMap;
use std::error;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::ids::{LandId, PlayerId};
use crate::land::{self, Definition, LandHandle};
use crate::schema::StateNode;
use crate::transport::TransportHook;
use crate::value::{AtomicShape, StateSnapshot};

/// `DispatchError` (§7): `landkeeper::dispatcher::DispatchError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    LandNotFound,
    LandExists,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::LandNotFound => write!(f, "land not found"),
            DispatchError::LandExists => write!(f, "land already exists"),
        }
    }
}

impl error::Error for DispatchError {}

/// Called on `definition.lifetime.persist_interval` and at `onShutdown`
/// (§6 "(ADDED) Persistence hook"). The dispatcher owns the scheduling,
/// the Land itself never calls out to storage.
pub type PersistHook = Arc<dyn Fn(&LandId, &StateSnapshot) + Send + Sync>;

/// `getOrCreateLand`/`getLand`/`removeLand`/`listLands` (§4.6), holding
/// every live Land behind a single `RwLock<HashMap<...>>` the way the
/// teacher's `GameRuntimeHandle::handlers` does, so reads (the common case:
/// dispatching an action to an existing room) don't contend with each
/// other.
pub struct LandManager<N, A> {
    lands: RwLock<HashMap<LandId, LandHandle<N, A>>>,
    transport: Arc<dyn TransportHook>,
    persist_hook: Option<PersistHook>,
}

impl<N, A> LandManager<N, A>
where
    N: StateNode + Send + 'static,
    A: AtomicShape + Send + Sync + 'static,
{
    pub fn new(transport: Arc<dyn TransportHook>) -> Self {
        Self {
            lands: RwLock::new(HashMap::new()),
            transport,
            persist_hook: None,
        }
    }

    /// Installs the `(ADDED) Persistence hook` (§6). Pairs with each
    /// Land's `lifetime.persist_interval`; the dispatcher is responsible
    /// for invoking it, the Land never calls out to storage itself.
    pub fn with_persist_hook(mut self, hook: PersistHook) -> Self {
        self.persist_hook = Some(hook);
        self
    }

    /// `getOrCreateLand(landID, definition, initialState)` (§4.6): creates
    /// lazily. Returns `DispatchError::LandExists` rather than silently
    /// returning the existing handle, since `definition`/`initialState`
    /// for an existing Land would otherwise be discarded without the
    /// caller knowing.
    pub fn get_or_create_land(
        &self,
        land_id: LandId,
        definition: Definition<N>,
        initial_state: N,
    ) -> Result<LandHandle<N, A>, DispatchError> {
        let mut lands = self.lands.write().unwrap();
        if lands.contains_key(&land_id) {
            return Err(DispatchError::LandExists);
        }
        let handle = land::spawn_land(land_id.clone(), definition, initial_state, Arc::clone(&self.transport));
        lands.insert(land_id, handle.clone());
        Ok(handle)
    }

    /// `getLand(landID)` (§4.6).
    pub fn get_land(&self, land_id: &LandId) -> Option<LandHandle<N, A>> {
        self.lands.read().unwrap().get(land_id).cloned()
    }

    /// `removeLand(landID)` (§4.6). The dispatcher calls this once a
    /// Land's `onShutdown` has completed (`DestroyTimeout`/`Shutdown`
    /// commands already run it Land-side); this just drops the registry
    /// entry, which is what actually releases the Land's mailbox sender
    /// and lets its actor thread exit on the next `recv` failure.
    pub fn remove_land(&self, land_id: &LandId) -> Result<(), DispatchError> {
        let mut lands = self.lands.write().unwrap();
        match lands.remove(land_id) {
            Some(handle) => {
                handle.shutdown();
                Ok(())
            }
            None => Err(DispatchError::LandNotFound),
        }
    }

    /// `listLands()` (§4.6).
    pub fn list_lands(&self) -> Vec<LandId> {
        self.lands.read().unwrap().keys().cloned().collect()
    }

    /// `syncFanOut(Land, playerIDs)` (§4.6): delegates to the Land-runtime
    /// free function, which owns the `ExtractSnapshots` command shape.
    pub async fn sync_fan_out(&self, land_id: &LandId, player_ids: Vec<PlayerId>) -> Result<(), DispatchError> {
        let handle = self.get_land(land_id).ok_or(DispatchError::LandNotFound)?;
        land::sync_fan_out(&handle, player_ids, &self.transport).await;
        Ok(())
    }

    /// `tickAll()` (§4.6, optional): fans a manual tick out across every
    /// Land concurrently. Each Land still serializes its own commands, so
    /// this only adds *cross*-Land parallelism, never *within* one. Lands
    /// whose `definition` already configures `tick_interval` self-schedule
    /// via their own timer thread (`land::tick::spawn_tick_loop`); this
    /// method is for driving ticks on Lands that don't, or for forcing an
    /// extra tick out of band (e.g. a harness stepping simulation time).
    pub async fn tick_all(&self, tick_id: i64) {
        let handles: Vec<_> = self.lands.read().unwrap().values().cloned().collect();
        for handle in handles {
            handle.force_tick(tick_id);
        }
    }

    /// Runs the persist hook, if any, against every live Land's current
    /// broadcast snapshot (§6 "(ADDED) Persistence hook"). The dispatcher,
    /// not the Land, owns the interval scheduling; callers drive this from
    /// their own timer loop keyed to the shortest-configured
    /// `persist_interval` across Lands, or per-Land on that Land's own
    /// interval.
    pub async fn persist_land(&self, land_id: &LandId) -> Result<(), DispatchError> {
        let handle = self.get_land(land_id).ok_or(DispatchError::LandNotFound)?;
        let Some(hook) = &self.persist_hook else {
            return Ok(());
        };
        if let Some(extracted) = handle.extract_snapshots(Vec::new()).await {
            hook(land_id, &extracted.broadcast);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ClientId;
    use crate::schema::{DirtySet, FieldSpec};
    use crate::transport::NullTransport;
    use crate::value::{KnownAtomicShapes, SnapshotValue};

    struct Counter {
        value: i64,
        dirty: DirtySet,
    }

    impl StateNode for Counter {
        fn schema() -> &'static [FieldSpec<Self>] {
            static SCHEMA: std::sync::OnceLock<Vec<FieldSpec<Counter>>> = std::sync::OnceLock::new();
            SCHEMA.get_or_init(|| vec![FieldSpec::broadcast("value", |s: &Counter| &s.value)])
        }

        fn dirty(&self) -> &DirtySet {
            &self.dirty
        }

        fn dirty_mut(&mut self) -> &mut DirtySet {
            &mut self.dirty
        }
    }

    fn manager() -> LandManager<Counter, KnownAtomicShapes> {
        LandManager::new(Arc::new(NullTransport))
    }

    #[test]
    fn get_or_create_land_then_get_land_round_trips() {
        let manager = manager();
        let land_id = LandId::new("land-1");
        manager
            .get_or_create_land(land_id.clone(), Definition::builder().build(), Counter { value: 0, dirty: DirtySet::new() })
            .unwrap();
        assert!(manager.get_land(&land_id).is_some());
        assert_eq!(manager.list_lands(), vec![land_id]);
    }

    #[test]
    fn get_or_create_land_twice_is_rejected() {
        let manager = manager();
        let land_id = LandId::new("land-1");
        manager
            .get_or_create_land(land_id.clone(), Definition::builder().build(), Counter { value: 0, dirty: DirtySet::new() })
            .unwrap();
        let result = manager.get_or_create_land(land_id, Definition::builder().build(), Counter { value: 0, dirty: DirtySet::new() });
        assert!(matches!(result, Err(DispatchError::LandExists)));
    }

    #[test]
    fn get_land_for_unknown_id_is_none() {
        let manager = manager();
        assert!(manager.get_land(&LandId::new("nope")).is_none());
    }

    #[test]
    fn remove_land_for_unknown_id_errors() {
        let manager = manager();
        let result = manager.remove_land(&LandId::new("nope"));
        assert!(matches!(result, Err(DispatchError::LandNotFound)));
    }

    #[test]
    fn remove_land_drops_registry_entry() {
        let manager = manager();
        let land_id = LandId::new("land-1");
        manager
            .get_or_create_land(land_id.clone(), Definition::builder().build(), Counter { value: 0, dirty: DirtySet::new() })
            .unwrap();
        manager.remove_land(&land_id).unwrap();
        assert!(manager.get_land(&land_id).is_none());
    }

    #[tokio::test]
    async fn sync_fan_out_for_unknown_land_errors() {
        let manager = manager();
        let result = manager.sync_fan_out(&LandId::new("nope"), Vec::new()).await;
        assert!(matches!(result, Err(DispatchError::LandNotFound)));
    }

    #[tokio::test]
    async fn sync_fan_out_delivers_first_sync_to_joined_player() {
        let manager = manager();
        let land_id = LandId::new("land-1");
        let handle = manager
            .get_or_create_land(land_id.clone(), Definition::builder().build(), Counter { value: 7, dirty: DirtySet::new() })
            .unwrap();
        let player_id = handle
            .join(
                SnapshotValue::Null,
                ClientId::new("client-1"),
                crate::ids::SessionId::new("session-1"),
                None,
                false,
                crate::land::Services::new(),
            )
            .await
            .unwrap();

        manager.sync_fan_out(&land_id, vec![player_id]).await.unwrap();
    }

    #[tokio::test]
    async fn tick_all_with_no_lands_completes() {
        let manager = manager();
        manager.tick_all(0).await;
    }
}
