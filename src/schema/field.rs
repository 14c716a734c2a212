use std::collections::HashMap;

use crate::ids::PlayerId;
use crate::schema::node::StateNode;
use crate::value::{IntoSnapshotValue, KeyLike, SchemaError, SnapshotValue};

/// Policy tag carried alongside each field descriptor for introspection
/// (§4.2 `fields() -> list of {name, policyKind}`). The emission behavior
/// itself lives in the closures built by `FieldSpec`'s constructors, not in
/// this enum — `PolicyKind` is metadata only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    Broadcast,
    ServerOnly,
    PerPlayer,
    PerPlayerSlice,
    Masked,
    Custom,
}

type BroadcastEmit<N> = Box<dyn Fn(&N) -> Result<Option<SnapshotValue>, SchemaError> + Send + Sync>;
type PerPlayerEmit<N> =
    Box<dyn Fn(&N, &PlayerId) -> Result<Option<SnapshotValue>, SchemaError> + Send + Sync>;

/// A single field's schema entry: its name, declared policy, and the
/// closures that project its value for the broadcast audience and for a
/// specific player (§4.2 "Declarative per-field sync policies").
pub struct FieldSpec<N: ?Sized> {
    pub name: &'static str,
    pub policy_kind: PolicyKind,
    emit_broadcast: Option<BroadcastEmit<N>>,
    emit_per_player: Option<PerPlayerEmit<N>>,
}

impl<N> FieldSpec<N> {
    pub fn emit_broadcast(&self, node: &N) -> Result<Option<SnapshotValue>, SchemaError> {
        match &self.emit_broadcast {
            Some(f) => f(node),
            None => Ok(None),
        }
    }

    pub fn emit_per_player(
        &self,
        node: &N,
        player: &PlayerId,
    ) -> Result<Option<SnapshotValue>, SchemaError> {
        match &self.emit_per_player {
            Some(f) => f(node, player),
            None => Ok(None),
        }
    }

    /// `broadcast`: same value sent to every player.
    pub fn broadcast<V>(name: &'static str, get: fn(&N) -> &V) -> Self
    where
        V: Clone + IntoSnapshotValue + 'static,
    {
        Self {
            name,
            policy_kind: PolicyKind::Broadcast,
            emit_broadcast: Some(Box::new(move |node| {
                Ok(Some(get(node).clone().into_snapshot_value()?))
            })),
            emit_per_player: None,
        }
    }

    /// `broadcast` over a nested state node: recursion re-applies the
    /// inner node's own broadcast-only policy (§4.3 recursive policy rule).
    /// The broadcast cache must stay player-independent, so the inner node
    /// always projects with `playerID == nil`.
    pub fn broadcast_node<V>(name: &'static str, get: fn(&N) -> &V) -> Self
    where
        V: StateNode + 'static,
    {
        Self {
            name,
            policy_kind: PolicyKind::Broadcast,
            emit_broadcast: Some(Box::new(move |node| {
                Ok(Some(get(node).broadcast_only_snapshot(None)?.into()))
            })),
            emit_per_player: None,
        }
    }

    /// `serverOnly`: never sent.
    pub fn server_only(name: &'static str) -> Self {
        Self {
            name,
            policy_kind: PolicyKind::ServerOnly,
            emit_broadcast: None,
            emit_per_player: None,
        }
    }

    /// `masked(transform)`: broadcast-like, value rewritten before emission.
    pub fn masked<V>(name: &'static str, get: fn(&N) -> &V, transform: fn(&V) -> SnapshotValue) -> Self
    where
        V: 'static,
    {
        Self {
            name,
            policy_kind: PolicyKind::Masked,
            emit_broadcast: Some(Box::new(move |node| Ok(Some(transform(get(node)))))),
            emit_per_player: None,
        }
    }

    /// `perPlayerSlice()`: shorthand for `perPlayer` selecting the entry
    /// for the requesting player out of a `mapping from PlayerID to V`. The
    /// emitted value is a single-entry map keyed by the player (§3
    /// "perPlayer ... typically a single-entry map containing only P's
    /// entry"), not the bare slice value — that keeps the field's shape
    /// stable across players so the diff lands at `/field/P`, not a
    /// whole-field replace.
    pub fn per_player_slice<V>(name: &'static str, get: fn(&N) -> &HashMap<PlayerId, V>) -> Self
    where
        V: Clone + IntoSnapshotValue + 'static,
    {
        Self {
            name,
            policy_kind: PolicyKind::PerPlayerSlice,
            emit_broadcast: None,
            emit_per_player: Some(Box::new(move |node, player| {
                match get(node).get(player) {
                    Some(value) => {
                        let entry = value.clone().into_snapshot_value()?;
                        Ok(Some(SnapshotValue::object([(player.as_key(), entry)])))
                    }
                    None => Ok(None),
                }
            })),
        }
    }

    /// `perPlayerSlice()` where the per-player entry is itself a state
    /// node: recursion re-applies the entry's own policies with the
    /// requesting player still bound, so its own per-player fields admit
    /// for its owner (§4.3 recursive policy rule).
    pub fn per_player_slice_node<V>(name: &'static str, get: fn(&N) -> &HashMap<PlayerId, V>) -> Self
    where
        V: StateNode + 'static,
    {
        Self {
            name,
            policy_kind: PolicyKind::PerPlayerSlice,
            emit_broadcast: None,
            emit_per_player: Some(Box::new(move |node, player| {
                match get(node).get(player) {
                    Some(entry) => Ok(Some(entry.snapshot_for(Some(player), None)?.into())),
                    None => Ok(None),
                }
            })),
        }
    }

    /// `perPlayer(filter)`: arbitrary per-player projection of the whole
    /// field value; `filter` returns `None` to suppress the field for `P`.
    pub fn per_player<V>(
        name: &'static str,
        get: fn(&N) -> &V,
        filter: fn(&V, &PlayerId) -> Option<SnapshotValue>,
    ) -> Self
    where
        V: 'static,
    {
        Self {
            name,
            policy_kind: PolicyKind::PerPlayer,
            emit_broadcast: None,
            emit_per_player: Some(Box::new(move |node, player| Ok(filter(get(node), player)))),
        }
    }

    /// `custom(P, V → V?)`: arbitrary per-player transform; `None`
    /// suppresses the field.
    pub fn custom<V>(
        name: &'static str,
        get: fn(&N) -> &V,
        transform: fn(&V, &PlayerId) -> Option<SnapshotValue>,
    ) -> Self
    where
        V: 'static,
    {
        Self {
            name,
            policy_kind: PolicyKind::Custom,
            emit_broadcast: None,
            emit_per_player: Some(Box::new(move |node, player| Ok(transform(get(node), player)))),
        }
    }
}
