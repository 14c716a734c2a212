use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};

use crate::ids::{ClientId, PlayerSlot, SessionId};

/// A typed, per-join injected service registry (§4.7 "services (typed
/// service registry)"). The teacher has no equivalent — its `PlayerContext`
/// carries only a bare `id` and a string attrs bag (`server/context.rs`) —
/// so this is a std-only type-map rather than an adaptation of teacher
/// code; no third-party crate fits a need this narrow.
#[derive(Default)]
pub struct Services {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.entries.get(&TypeId::of::<T>()).and_then(|v| v.downcast_ref())
    }
}

/// `players: mapping from PlayerID to { clientIDs, lastSession, services }`
/// (§4.5). `slot` is the stable transport-encoding slot allocated on first
/// join (§4.7 `playerSlot`).
pub struct PlayerRecord {
    pub client_ids: HashSet<ClientId>,
    pub last_session: Option<SessionId>,
    pub services: Services,
    pub slot: PlayerSlot,
}

impl PlayerRecord {
    pub fn new(client_id: ClientId, session_id: SessionId, services: Services, slot: PlayerSlot) -> Self {
        let mut client_ids = HashSet::new();
        client_ids.insert(client_id);
        Self {
            client_ids,
            last_session: Some(session_id),
            services,
            slot,
        }
    }
}
