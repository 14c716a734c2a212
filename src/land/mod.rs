//! C5: the Land runtime (§4.5). One `LandKeeper` actor runs per room, on a
//! dedicated OS thread fed by a `std::sync::mpsc` mailbox — the same shape
//! as the teacher's `SyncRuntime` (`server/runtime/sync.rs`), generalized
//! from a single `GameHooks` impl to the spec's `Definition<N>` DSL.

mod context;
mod definition;
pub mod error;
mod player;
mod tick;

pub use context::Context;
pub use definition::{AccessControl, Definition, DefinitionBuilder, JoinContext, JoinDecision, Lifetime};
pub use player::{PlayerRecord, Services};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::ids::{ClientId, LandId, PlayerId, PlayerSlot, SessionId};
use crate::land::error::{ActionError, JoinError};
use crate::schema::StateNode;
use crate::sync::{SnapshotMode, SyncEngine};
use crate::transport::{Recipient, TransportHook};
use crate::value::{AtomicShape, SnapshotValue, StateSnapshot};

pub(crate) enum Command {
    Join {
        session: SnapshotValue,
        client_id: ClientId,
        session_id: SessionId,
        device_id: Option<String>,
        is_guest: bool,
        services: Services,
        reply: oneshot::Sender<Result<PlayerId, JoinError>>,
    },
    Leave {
        player_id: PlayerId,
        client_id: ClientId,
    },
    Action {
        action_type: String,
        payload: SnapshotValue,
        player_id: PlayerId,
        client_id: ClientId,
        session_id: SessionId,
        reply: oneshot::Sender<Result<SnapshotValue, ActionError>>,
    },
    ClientEvent {
        event_type: String,
        payload: SnapshotValue,
        player_id: PlayerId,
        client_id: ClientId,
        session_id: SessionId,
    },
    Tick {
        tick_id: i64,
    },
    DestroyTimeout {
        generation: u64,
    },
    ExtractSnapshots {
        players: Vec<PlayerId>,
        reply: oneshot::Sender<ExtractedSnapshots>,
    },
    Shutdown,
}

/// Result of `ExtractSnapshots`: the pair `syncFanOut` (§4.6) needs,
/// captured under the Land's serial boundary then handed off so the diff
/// computation can run in parallel, off that boundary.
pub struct ExtractedSnapshots {
    pub broadcast: StateSnapshot,
    pub per_player: HashMap<PlayerId, StateSnapshot>,
    pub dirty_fields: Option<HashSet<String>>,
}

/// A cloneable front for a running Land (§4.5). Every method sends a
/// `Command` down the actor's mailbox and awaits the reply, so callers on
/// any thread observe the Land's total order without touching `state`
/// directly (§5 "State: owned exclusively by the Land").
pub struct LandHandle<N, A> {
    land_id: LandId,
    mailbox: std_mpsc::Sender<Command>,
    sync_engine: Arc<SyncEngine<N, A>>,
    sync_requested: Arc<std::sync::atomic::AtomicBool>,
}

impl<N, A> Clone for LandHandle<N, A> {
    fn clone(&self) -> Self {
        Self {
            land_id: self.land_id.clone(),
            mailbox: self.mailbox.clone(),
            sync_engine: Arc::clone(&self.sync_engine),
            sync_requested: Arc::clone(&self.sync_requested),
        }
    }
}

impl<N, A> LandHandle<N, A>
where
    N: StateNode + Send + 'static,
    A: AtomicShape + Send + Sync + 'static,
{
    pub fn land_id(&self) -> &LandId {
        &self.land_id
    }

    pub fn sync_engine(&self) -> &Arc<SyncEngine<N, A>> {
        &self.sync_engine
    }

    /// `join(session, clientID, sessionID, services)` (§4.5).
    pub async fn join(
        &self,
        session: SnapshotValue,
        client_id: ClientId,
        session_id: SessionId,
        device_id: Option<String>,
        is_guest: bool,
        services: Services,
    ) -> Result<PlayerId, JoinError> {
        let (reply, rx) = oneshot::channel();
        let sent = self.mailbox.send(Command::Join {
            session,
            client_id,
            session_id,
            device_id,
            is_guest,
            services,
            reply,
        });
        if sent.is_err() {
            return Err(JoinError::RoomNotFound);
        }
        rx.await.unwrap_or(Err(JoinError::RoomNotFound))
    }

    /// `leave(playerID, clientID)` (§4.5). Fire-and-forget: the spec gives
    /// it no return value.
    pub fn leave(&self, player_id: PlayerId, client_id: ClientId) {
        let _ = self.mailbox.send(Command::Leave { player_id, client_id });
    }

    /// `handleActionEnvelope` (§4.5).
    pub async fn handle_action(
        &self,
        action_type: impl Into<String>,
        payload: SnapshotValue,
        player_id: PlayerId,
        client_id: ClientId,
        session_id: SessionId,
    ) -> Result<SnapshotValue, ActionError> {
        let (reply, rx) = oneshot::channel();
        let sent = self.mailbox.send(Command::Action {
            action_type: action_type.into(),
            payload,
            player_id,
            client_id,
            session_id,
            reply,
        });
        if sent.is_err() {
            return Err(ActionError::NotRegistered);
        }
        rx.await.unwrap_or(Err(ActionError::NotRegistered))
    }

    /// `handleClientEvent` (§4.5). No reply by contract.
    pub fn handle_client_event(
        &self,
        event_type: impl Into<String>,
        payload: SnapshotValue,
        player_id: PlayerId,
        client_id: ClientId,
        session_id: SessionId,
    ) {
        let _ = self.mailbox.send(Command::ClientEvent {
            event_type: event_type.into(),
            payload,
            player_id,
            client_id,
            session_id,
        });
    }

    /// Extracts the snapshot pair `syncFanOut` diffs off-boundary (§4.6).
    pub async fn extract_snapshots(&self, players: Vec<PlayerId>) -> Option<ExtractedSnapshots> {
        let (reply, rx) = oneshot::channel();
        if self
            .mailbox
            .send(Command::ExtractSnapshots { players, reply })
            .is_err()
        {
            return None;
        }
        rx.await.ok()
    }

    pub fn shutdown(&self) {
        let _ = self.mailbox.send(Command::Shutdown);
    }

    /// Posts a tick out of band (§4.6 `tickAll`), bypassing this Land's own
    /// `tick_interval` schedule if it has one. The tick still runs on the
    /// Land's serial thread like any other command.
    pub fn force_tick(&self, tick_id: i64) {
        let _ = self.mailbox.send(Command::Tick { tick_id });
    }

    /// Consumes a pending `ctx.syncNow()` request (§4.7), if any. The
    /// dispatcher polls this between scheduled sync points to decide
    /// whether to run `sync_fan_out` early for this Land.
    pub fn take_sync_requested(&self) -> bool {
        self.sync_requested.swap(false, Ordering::AcqRel)
    }
}

/// Starts a Land's actor thread (§5 "dedicated OS thread per Land") and
/// returns the handle the dispatcher keeps. `initial_state` must already
/// be complete: the broadcast cache is warmed immediately, before the
/// thread accepts any command (§4.6 "warm up broadcast cache *after*
/// initialState is complete").
pub fn spawn_land<N, A>(
    land_id: LandId,
    definition: Definition<N>,
    initial_state: N,
    transport: Arc<dyn TransportHook>,
) -> LandHandle<N, A>
where
    N: StateNode + Send + 'static,
    A: AtomicShape + Send + Sync + 'static,
{
    let sync_engine: Arc<SyncEngine<N, A>> = Arc::new(SyncEngine::new());
    if let Err(err) = sync_engine.warmup_broadcast(&initial_state) {
        log::error!("land {land_id}: warmup_broadcast failed: {err}");
    }

    let (tx, rx) = std_mpsc::channel::<Command>();
    let sync_requested = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let handle = LandHandle {
        land_id: land_id.clone(),
        mailbox: tx.clone(),
        sync_engine: Arc::clone(&sync_engine),
        sync_requested: Arc::clone(&sync_requested),
    };

    let tick_interval = definition.lifetime.tick_interval;
    let has_tick_handler = definition.has_tick_handler();
    if let (Some(interval), true) = (tick_interval, has_tick_handler) {
        tick::spawn_tick_loop(tx.clone(), interval);
    }

    thread::spawn(move || {
        let mut actor = LandActor {
            land_id,
            state: initial_state,
            players: HashMap::new(),
            definition,
            sync_engine,
            transport,
            last_committed_tick_id: -1,
            next_player_slot: 0,
            destroy_generation: Arc::new(AtomicU64::new(0)),
            sync_requested,
            mailbox: tx,
        };
        actor.run(rx);
    });

    handle
}

const SYSTEM_PLAYER: &str = "__system__";

struct LandActor<N, A> {
    land_id: LandId,
    state: N,
    players: HashMap<PlayerId, PlayerRecord>,
    definition: Definition<N>,
    sync_engine: Arc<SyncEngine<N, A>>,
    transport: Arc<dyn TransportHook>,
    last_committed_tick_id: i64,
    next_player_slot: PlayerSlot,
    destroy_generation: Arc<AtomicU64>,
    sync_requested: Arc<std::sync::atomic::AtomicBool>,
    mailbox: std_mpsc::Sender<Command>,
}

impl<N, A> LandActor<N, A>
where
    N: StateNode,
    A: AtomicShape,
{
    fn run(&mut self, rx: std_mpsc::Receiver<Command>) {
        loop {
            match rx.recv_timeout(Duration::from_millis(250)) {
                Ok(command) => {
                    if self.handle(command) {
                        break;
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("land {} actor stopped", self.land_id);
    }

    /// Returns `true` if the actor should stop after this command.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Join {
                session,
                client_id,
                session_id,
                device_id,
                is_guest,
                services,
                reply,
            } => {
                let result = self.join(session, client_id, session_id, device_id, is_guest, services);
                let _ = reply.send(result);
                false
            }
            Command::Leave { player_id, client_id } => {
                self.leave(player_id, client_id);
                false
            }
            Command::Action {
                action_type,
                payload,
                player_id,
                client_id,
                session_id,
                reply,
            } => {
                let result = self.handle_action(&action_type, &payload, player_id, client_id, session_id);
                let _ = reply.send(result);
                false
            }
            Command::ClientEvent {
                event_type,
                payload,
                player_id,
                client_id,
                session_id,
            } => {
                self.handle_client_event(&event_type, &payload, player_id, client_id, session_id);
                false
            }
            Command::Tick { tick_id } => {
                self.run_tick(tick_id);
                false
            }
            Command::DestroyTimeout { generation } => {
                if self.destroy_generation.load(Ordering::Acquire) == generation {
                    log::debug!("land {} destroying after empty timeout", self.land_id);
                    self.definition.run_on_shutdown(&self.state);
                    return true;
                }
                false
            }
            Command::ExtractSnapshots { players, reply } => {
                let extracted = self.extract_snapshots(&players);
                let _ = reply.send(extracted);
                false
            }
            Command::Shutdown => {
                self.definition.run_on_shutdown(&self.state);
                true
            }
        }
    }

    fn system_context(&self, tick_id: i64) -> Context {
        Context::new(
            self.land_id.clone(),
            PlayerId::new(SYSTEM_PLAYER),
            ClientId::new(SYSTEM_PLAYER),
            SessionId::new(SYSTEM_PLAYER),
            None,
            false,
            SnapshotValue::Null,
            tick_id,
            None,
            Arc::clone(&self.transport),
            Arc::clone(&self.sync_requested),
        )
    }

    fn player_context(
        &self,
        player_id: PlayerId,
        client_id: ClientId,
        session_id: SessionId,
        tick_id: i64,
    ) -> Context {
        let slot = self.players.get(&player_id).map(|record| record.slot);
        Context::new(
            self.land_id.clone(),
            player_id,
            client_id,
            session_id,
            None,
            false,
            SnapshotValue::Null,
            tick_id,
            slot,
            Arc::clone(&self.transport),
            Arc::clone(&self.sync_requested),
        )
    }

    /// `join` (§4.5 steps 1-5).
    fn join(
        &mut self,
        session: SnapshotValue,
        client_id: ClientId,
        session_id: SessionId,
        device_id: Option<String>,
        is_guest: bool,
        services: Services,
    ) -> Result<PlayerId, JoinError> {
        if let Some(max) = self.definition.access_control.max_players
            && self.players.len() >= max
        {
            return Err(JoinError::RoomFull);
        }

        let join_ctx = JoinContext {
            land_id: self.land_id.clone(),
            client_id: client_id.clone(),
            session_id: session_id.clone(),
            device_id,
            is_guest,
        };

        let decision = self.definition.evaluate_can_join(&self.state, &session, &join_ctx);
        let player_id = match decision {
            JoinDecision::Allow(player_id) => player_id,
            JoinDecision::Deny(reason) => return Err(JoinError::Denied(reason)),
        };

        let is_first_client = !self.players.contains_key(&player_id);
        if is_first_client {
            let slot = self.next_player_slot;
            self.next_player_slot += 1;
            self.players.insert(
                player_id.clone(),
                PlayerRecord::new(client_id.clone(), session_id.clone(), services, slot),
            );
        } else if let Some(record) = self.players.get_mut(&player_id) {
            record.client_ids.insert(client_id.clone());
            record.last_session = Some(session_id.clone());
            record.services = services;
        }

        self.destroy_generation.fetch_add(1, Ordering::AcqRel);

        if is_first_client {
            let ctx = self.player_context(player_id.clone(), client_id, session_id, self.last_committed_tick_id);
            self.definition.run_on_join(&mut self.state, &ctx);
        }

        Ok(player_id)
    }

    /// `leave` (§4.5 steps 1-3).
    fn leave(&mut self, player_id: PlayerId, client_id: ClientId) {
        let Some(record) = self.players.get_mut(&player_id) else {
            return;
        };
        record.client_ids.remove(&client_id);
        if !record.client_ids.is_empty() {
            return;
        }

        let removed = self.players.remove(&player_id);
        let last_session = removed
            .and_then(|record| record.last_session)
            .unwrap_or_else(|| SessionId::new(SYSTEM_PLAYER));
        let ctx = self.player_context(player_id.clone(), client_id, last_session, self.last_committed_tick_id);
        self.definition.run_on_leave(&mut self.state, &ctx);
        self.sync_engine.clear_cache_for_disconnected_player(&player_id);

        if self.players.is_empty()
            && let Some(after) = self.definition.lifetime.destroy_when_empty_after
        {
            let generation = self.destroy_generation.fetch_add(1, Ordering::AcqRel) + 1;
            tick::spawn_destroy_timer(
                self.mailbox.clone(),
                Arc::clone(&self.destroy_generation),
                generation,
                after,
            );
        }
    }

    /// `handleActionEnvelope` (§4.5).
    fn handle_action(
        &mut self,
        action_type: &str,
        payload: &SnapshotValue,
        player_id: PlayerId,
        client_id: ClientId,
        session_id: SessionId,
    ) -> Result<SnapshotValue, ActionError> {
        let Some(handler) = self.definition.find_action_handler(action_type) else {
            return Err(ActionError::NotRegistered);
        };
        let ctx = self.player_context(player_id, client_id, session_id, self.last_committed_tick_id);
        self.definition.run_resolvers(&self.state, &ctx);
        handler(&mut self.state, payload, &ctx).map_err(ActionError::HandlerError)
    }

    /// `handleClientEvent` (§4.5).
    fn handle_client_event(
        &mut self,
        event_type: &str,
        payload: &SnapshotValue,
        player_id: PlayerId,
        client_id: ClientId,
        session_id: SessionId,
    ) {
        let allowed = &self.definition.allowed_client_event_identifiers;
        if !allowed.is_empty() && !allowed.contains(event_type) {
            log::warn!(
                "land {}: dropping client event {event_type} not in allowlist",
                self.land_id
            );
            return;
        }

        let ctx = self.player_context(player_id, client_id, session_id, self.last_committed_tick_id);
        self.definition.run_resolvers(&self.state, &ctx);
        let handlers: Vec<_> = self.definition.matching_event_handlers(event_type).collect();
        for handler in handlers {
            handler(&mut self.state, payload, &ctx);
        }
    }

    /// Tick loop (§4.5 "Tick loop"): `ctx.tickID == tid` while running,
    /// `lastCommittedTickID` set only after the handler returns.
    fn run_tick(&mut self, tick_id: i64) {
        let ctx = self.system_context(tick_id);
        self.definition.run_tick_handler(&mut self.state, &ctx);
        self.last_committed_tick_id = tick_id;
    }

    fn extract_snapshots(&self, players: &[PlayerId]) -> ExtractedSnapshots {
        let dirty_fields = if self.state.is_dirty() {
            Some(self.state.dirty_fields())
        } else {
            None
        };

        // §4.4 step 2: `dirtyTracking(fields)` when the state carries a
        // dirty set, `all` otherwise.
        let mode = match &dirty_fields {
            Some(fields) => SnapshotMode::DirtyTracking(fields.clone()),
            None => SnapshotMode::All,
        };

        let broadcast = match self.sync_engine.extract_broadcast(&self.state, &mode) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::error!("land {}: extract_broadcast failed: {err}", self.land_id);
                StateSnapshot::new()
            }
        };

        let per_player = players
            .iter()
            .filter_map(|player_id| {
                match self.sync_engine.extract_per_player(&self.state, player_id, &mode) {
                    Ok(snapshot) => Some((player_id.clone(), snapshot)),
                    Err(err) => {
                        log::error!(
                            "land {}: extract_per_player failed for {player_id}: {err}",
                            self.land_id
                        );
                        None
                    }
                }
            })
            .collect();

        ExtractedSnapshots {
            broadcast,
            per_player,
            dirty_fields,
        }
    }
}

/// `syncFanOut(Land, playerIDs)` (§4.6): extracts one broadcast snapshot
/// and one per-player snapshot per player under the Land's serial
/// boundary, releases it, then computes each player's diff in parallel and
/// delivers it through the transport hook. Lives alongside `LandHandle`
/// rather than in `dispatcher` because it needs `LandActor`'s private
/// `extract_snapshots`, exposed only through the `ExtractSnapshots`
/// command.
pub async fn sync_fan_out<N, A>(
    handle: &LandHandle<N, A>,
    player_ids: Vec<PlayerId>,
    transport: &Arc<dyn TransportHook>,
) where
    N: StateNode + Send + 'static,
    A: AtomicShape + Send + Sync + 'static,
{
    let Some(extracted) = handle.extract_snapshots(player_ids.clone()).await else {
        return;
    };

    let engine = Arc::clone(handle.sync_engine());
    let broadcast = Arc::new(extracted.broadcast);
    let dirty_fields = extracted.dirty_fields;
    let mut tasks = Vec::with_capacity(player_ids.len());

    for player_id in player_ids {
        let Some(per_player) = extracted.per_player.get(&player_id).cloned() else {
            continue;
        };
        let engine = Arc::clone(&engine);
        let broadcast = Arc::clone(&broadcast);
        let dirty_fields = dirty_fields.clone();
        tasks.push(async move {
            let update =
                engine.generate_diff_from_snapshots(&broadcast, &per_player, dirty_fields.as_ref(), &player_id);
            (player_id, update)
        });
    }

    let updates = futures::future::join_all(tasks).await;
    for (player_id, update) in updates {
        if update.is_no_change() {
            continue;
        }
        transport.send_update(Recipient::Player(player_id), &update);
    }
}
