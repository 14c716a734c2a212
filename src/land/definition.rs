use std::collections::HashSet;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};

use crate::ids::{ClientId, LandId, SessionId};
use crate::land::context::Context;
use crate::schema::StateNode;
use crate::value::SnapshotValue;

/// Result of `canJoin` (§4.5): `Allow` carries the `PlayerID` the session
/// binds to (new or rejoining); `Deny` carries a reason surfaced to the
/// transport layer as `JOIN_DENIED`.
pub enum JoinDecision {
    Allow(crate::ids::PlayerId),
    Deny(String),
}

/// Context available to `canJoin`, before a `PlayerID` has been bound to
/// the session — a narrower view than the post-join `Context` (§4.7),
/// since `player_id`/`player_slot`/`tick_id` don't exist yet.
pub struct JoinContext {
    pub land_id: LandId,
    pub client_id: ClientId,
    pub session_id: SessionId,
    pub device_id: Option<String>,
    pub is_guest: bool,
}

type CanJoin<N> = Box<dyn Fn(&N, &SnapshotValue, &JoinContext) -> JoinDecision + Send + Sync>;
type OnJoin<N> = Box<dyn Fn(&mut N, &Context) + Send + Sync>;
type OnLeave<N> = Box<dyn Fn(&mut N, &Context) + Send + Sync>;
type ActionHandler<N> =
    Box<dyn Fn(&mut N, &SnapshotValue, &Context) -> Result<SnapshotValue, String> + Send + Sync>;
type EventHandler<N> = Box<dyn Fn(&mut N, &SnapshotValue, &Context) + Send + Sync>;
type TickHandler<N> = Box<dyn Fn(&mut N, &Context) + Send + Sync>;
type OnShutdown<N> = Box<dyn Fn(&N) + Send + Sync>;
type ResolverFn<N> = Box<dyn Fn(&N, &Context) -> BoxFuture<'static, SnapshotValue> + Send + Sync>;

/// `accessControl` (§4.5).
#[derive(Clone, Debug, Default)]
pub struct AccessControl {
    pub allow_public: bool,
    pub max_players: Option<usize>,
}

/// `lifetime` (§4.5): tick/destroy/persist configuration.
#[derive(Default)]
pub struct Lifetime {
    pub tick_interval: Option<Duration>,
    pub destroy_when_empty_after: Option<Duration>,
    pub persist_interval: Option<Duration>,
}

struct ActionEntry<N> {
    action_type: &'static str,
    handler: ActionHandler<N>,
}

struct EventEntry<N> {
    event_type: &'static str,
    handler: EventHandler<N>,
}

struct ResolverEntry<N> {
    name: &'static str,
    resolver: ResolverFn<N>,
}

/// `Definition` (§4.5): immutable once built by `DefinitionBuilder`.
pub struct Definition<N> {
    pub access_control: AccessControl,
    pub allowed_client_event_identifiers: HashSet<String>,
    can_join: Option<CanJoin<N>>,
    on_join: Option<OnJoin<N>>,
    on_leave: Option<OnLeave<N>>,
    action_handlers: Vec<ActionEntry<N>>,
    event_handlers: Vec<EventEntry<N>>,
    resolvers: Vec<ResolverEntry<N>>,
    pub lifetime: Lifetime,
    tick_handler: Option<TickHandler<N>>,
    on_shutdown: Option<OnShutdown<N>>,
}

impl<N: StateNode> Definition<N> {
    pub fn builder() -> DefinitionBuilder<N> {
        DefinitionBuilder::new()
    }

    pub fn evaluate_can_join(
        &self,
        state: &N,
        session: &SnapshotValue,
        ctx: &JoinContext,
    ) -> JoinDecision {
        match &self.can_join {
            Some(f) => f(state, session, ctx),
            None => JoinDecision::Allow(crate::ids::PlayerId::new(ctx.client_id.as_str())),
        }
    }

    pub fn run_on_join(&self, state: &mut N, ctx: &Context) {
        if let Some(f) = &self.on_join {
            f(state, ctx);
        }
    }

    pub fn run_on_leave(&self, state: &mut N, ctx: &Context) {
        if let Some(f) = &self.on_leave {
            f(state, ctx);
        }
    }

    pub fn find_action_handler(&self, action_type: &str) -> Option<&ActionHandler<N>> {
        self.action_handlers
            .iter()
            .find(|entry| entry.action_type == action_type)
            .map(|entry| &entry.handler)
    }

    pub fn matching_event_handlers(&self, event_type: &str) -> impl Iterator<Item = &EventHandler<N>> {
        self.event_handlers
            .iter()
            .filter(move |entry| entry.event_type == event_type)
            .map(|entry| &entry.handler)
    }

    pub fn run_tick_handler(&self, state: &mut N, ctx: &Context) {
        if let Some(f) = &self.tick_handler {
            f(state, ctx);
        }
    }

    pub fn has_tick_handler(&self) -> bool {
        self.tick_handler.is_some()
    }

    pub fn run_on_shutdown(&self, state: &N) {
        if let Some(f) = &self.on_shutdown {
            f(state);
        }
    }

    /// (ADDED) §4.5-bis: runs every declared resolver concurrently via
    /// `join_all`, then collects the results into `ctx` before the handler
    /// body that requested them runs. The Land actor is a plain OS thread,
    /// not a tokio task, so the joined future is driven with
    /// `futures::executor::block_on` rather than `.await`ed.
    pub fn run_resolvers(&self, state: &N, ctx: &Context) {
        if self.resolvers.is_empty() {
            return;
        }
        let (names, futs): (Vec<_>, Vec<_>) = self
            .resolvers
            .iter()
            .map(|entry| (entry.name, (entry.resolver)(state, ctx)))
            .unzip();
        let results = futures::executor::block_on(join_all(futs));
        ctx.set_resolved(names.into_iter().map(str::to_string).zip(results).collect());
    }
}

/// The DSL collector that builds an immutable `Definition` (§4.5).
pub struct DefinitionBuilder<N> {
    access_control: AccessControl,
    allowed_client_event_identifiers: HashSet<String>,
    can_join: Option<CanJoin<N>>,
    on_join: Option<OnJoin<N>>,
    on_leave: Option<OnLeave<N>>,
    action_handlers: Vec<ActionEntry<N>>,
    event_handlers: Vec<EventEntry<N>>,
    resolvers: Vec<ResolverEntry<N>>,
    lifetime: Lifetime,
    tick_handler: Option<TickHandler<N>>,
    on_shutdown: Option<OnShutdown<N>>,
}

impl<N: StateNode> DefinitionBuilder<N> {
    pub fn new() -> Self {
        Self {
            access_control: AccessControl::default(),
            allowed_client_event_identifiers: HashSet::new(),
            can_join: None,
            on_join: None,
            on_leave: None,
            action_handlers: Vec::new(),
            event_handlers: Vec::new(),
            resolvers: Vec::new(),
            lifetime: Lifetime::default(),
            tick_handler: None,
            on_shutdown: None,
        }
    }

    pub fn access_control(mut self, access_control: AccessControl) -> Self {
        self.access_control = access_control;
        self
    }

    pub fn allow_client_event(mut self, identifier: impl Into<String>) -> Self {
        self.allowed_client_event_identifiers.insert(identifier.into());
        self
    }

    pub fn can_join<F>(mut self, f: F) -> Self
    where
        F: Fn(&N, &SnapshotValue, &JoinContext) -> JoinDecision + Send + Sync + 'static,
    {
        self.can_join = Some(Box::new(f));
        self
    }

    pub fn on_join<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut N, &Context) + Send + Sync + 'static,
    {
        self.on_join = Some(Box::new(f));
        self
    }

    pub fn on_leave<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut N, &Context) + Send + Sync + 'static,
    {
        self.on_leave = Some(Box::new(f));
        self
    }

    pub fn action<F>(mut self, action_type: &'static str, handler: F) -> Self
    where
        F: Fn(&mut N, &SnapshotValue, &Context) -> Result<SnapshotValue, String> + Send + Sync + 'static,
    {
        self.action_handlers.push(ActionEntry {
            action_type,
            handler: Box::new(handler),
        });
        self
    }

    pub fn event<F>(mut self, event_type: &'static str, handler: F) -> Self
    where
        F: Fn(&mut N, &SnapshotValue, &Context) + Send + Sync + 'static,
    {
        self.event_handlers.push(EventEntry {
            event_type,
            handler: Box::new(handler),
        });
        self
    }

    /// (ADDED) `resolver(name, f)` (§4.5-bis): registers a named resolver
    /// run concurrently with the others, all completing before the
    /// action/event handler body that declared them runs. `f` does its
    /// synchronous reads of `state`/`ctx` up front and returns an owned
    /// future, since the resolver is driven after this call returns.
    pub fn resolver<F, Fut>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(&N, &Context) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = SnapshotValue> + Send + 'static,
    {
        self.resolvers.push(ResolverEntry {
            name,
            resolver: Box::new(move |state, ctx| Box::pin(f(state, ctx))),
        });
        self
    }

    pub fn tick<F>(mut self, interval: Duration, handler: F) -> Self
    where
        F: Fn(&mut N, &Context) + Send + Sync + 'static,
    {
        self.lifetime.tick_interval = Some(interval);
        self.tick_handler = Some(Box::new(handler));
        self
    }

    pub fn destroy_when_empty_after(mut self, duration: Duration) -> Self {
        self.lifetime.destroy_when_empty_after = Some(duration);
        self
    }

    pub fn persist_interval(mut self, duration: Duration) -> Self {
        self.lifetime.persist_interval = Some(duration);
        self
    }

    pub fn on_shutdown<F>(mut self, f: F) -> Self
    where
        F: Fn(&N) + Send + Sync + 'static,
    {
        self.on_shutdown = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Definition<N> {
        Definition {
            access_control: self.access_control,
            allowed_client_event_identifiers: self.allowed_client_event_identifiers,
            can_join: self.can_join,
            on_join: self.on_join,
            on_leave: self.on_leave,
            action_handlers: self.action_handlers,
            event_handlers: self.event_handlers,
            resolvers: self.resolvers,
            lifetime: self.lifetime,
            tick_handler: self.tick_handler,
            on_shutdown: self.on_shutdown,
        }
    }
}

impl<N: StateNode> Default for DefinitionBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}
