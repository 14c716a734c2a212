use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ids::{ClientId, LandId, PlayerId, PlayerSlot, SessionId};
use crate::land::player::Services;
use crate::transport::{Recipient, ServerEvent, TransportHook};
use crate::value::SnapshotValue;

/// `Context` (§4.7): carried into every handler invocation. `spawn` hands
/// work to the process-wide `tokio` runtime (already a teacher dependency,
/// feature `full`) so it runs off the Land's serial queue, matching
/// "fire-and-forget, not subject to the Land's serial queue".
pub struct Context {
    pub land_id: LandId,
    pub player_id: PlayerId,
    pub client_id: ClientId,
    pub session_id: SessionId,
    pub device_id: Option<String>,
    pub is_guest: bool,
    pub metadata: SnapshotValue,
    pub tick_id: i64,
    pub player_slot: Option<PlayerSlot>,
    transport: Arc<dyn TransportHook>,
    sync_requested: Arc<std::sync::atomic::AtomicBool>,
    resolved: RefCell<HashMap<String, SnapshotValue>>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        land_id: LandId,
        player_id: PlayerId,
        client_id: ClientId,
        session_id: SessionId,
        device_id: Option<String>,
        is_guest: bool,
        metadata: SnapshotValue,
        tick_id: i64,
        player_slot: Option<PlayerSlot>,
        transport: Arc<dyn TransportHook>,
        sync_requested: Arc<std::sync::atomic::AtomicBool>,
    ) -> Self {
        Self {
            land_id,
            player_id,
            client_id,
            session_id,
            device_id,
            is_guest,
            metadata,
            tick_id,
            player_slot,
            transport,
            sync_requested,
            resolved: RefCell::new(HashMap::new()),
        }
    }

    /// (ADDED) §4.5-bis: set by `Definition::run_resolvers` after every
    /// declared resolver completes, before the handler body that requested
    /// them runs.
    pub(crate) fn set_resolved(&self, results: HashMap<String, SnapshotValue>) {
        *self.resolved.borrow_mut() = results;
    }

    /// (ADDED) §4.5-bis: a named resolver's result, if one ran this call.
    pub fn resolved(&self, name: &str) -> Option<SnapshotValue> {
        self.resolved.borrow().get(name).cloned()
    }

    /// `sendEvent(event, target)` (§4.7): forwards to the transport hook.
    pub fn send_event(&self, event: ServerEvent, target: Recipient) {
        self.transport.send_event(target, &event);
    }

    /// `syncNow()` (§4.7): forces an immediate sync cycle rather than
    /// waiting for the next tick. The Land's run loop checks this flag
    /// after every handler invocation.
    pub fn sync_now(&self) {
        self.sync_requested.store(true, std::sync::atomic::Ordering::Release);
    }

    /// `spawn(body)` (§4.7, §5 "Suspension points"): fire-and-forget
    /// background work, off the Land's serial queue. Requires a live
    /// `tokio` runtime context (the dispatcher runs under one).
    pub fn spawn<F>(&self, body: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(body);
    }
}

/// Per-field access to injected services (§4.7 "services (typed service
/// registry)"), looked up against the player's `PlayerRecord::services` at
/// the call site rather than copied into every `Context`, since `Services`
/// holds `Box<dyn Any>` entries that are not `Clone`.
pub fn lookup_service<'a, T: std::any::Any + Send + Sync>(services: &'a Services) -> Option<&'a T> {
    services.get::<T>()
}
