use super::StatePatch;

/// `StateUpdate` (§3, §4.4): the unit delivered per player per sync cycle.
/// `FirstSync` is emitted once per `(Land, PlayerID)` pair. Invariant: once
/// emitted for a player, only `Diff`/`NoChange` follow until the player's
/// cache is cleared (disconnect).
#[derive(Clone, Debug, PartialEq)]
pub enum StateUpdate {
    NoChange,
    FirstSync(Vec<StatePatch>),
    Diff(Vec<StatePatch>),
}

impl StateUpdate {
    pub fn patches(&self) -> &[StatePatch] {
        match self {
            StateUpdate::NoChange => &[],
            StateUpdate::FirstSync(patches) | StateUpdate::Diff(patches) => patches,
        }
    }

    pub fn is_no_change(&self) -> bool {
        matches!(self, StateUpdate::NoChange)
    }
}
