//! `landkeeper`: an authoritative state-synchronization engine for
//! room-based multiplayer servers. A `Land` owns one room's state behind a
//! declarative per-field sync schema (`schema`); a `SyncEngine` (`sync`)
//! diffs it into JSON-Patch updates per player; a `LandManager`
//! (`dispatcher`) owns every live Land and fans syncs out across them. The
//! engine never touches transport bytes — see `transport::TransportHook`.

pub mod dispatcher;
pub mod ids;
pub mod land;
pub mod schema;
pub mod sync;
pub mod transport;
pub mod value;
