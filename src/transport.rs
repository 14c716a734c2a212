//! C7 (outward half): the boundary between the engine and byte transport.
//! Grounded on the teacher's `NetworkProtocol` trait (`server/protocol.rs`)
//! and `SessionManager::send`/`send_all`, which decouple `ThundersServer`
//! from any concrete `tokio-tungstenite` wiring. The engine never encodes
//! bytes itself; it calls `TransportHook` with a `Recipient` and the
//! already-serialized-shape `StateUpdate`/event payload.

use crate::ids::{ClientId, PlayerId, SessionId};
use crate::value::StateUpdate;

/// Delivery target for an outbound message (§4.7 `sendEvent(event, target)`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    All,
    Player(PlayerId),
    Client(ClientId),
    Session(SessionId),
    Players(Vec<PlayerId>),
}

/// A server-originated event (§4.7): a typed identifier plus a JSON-shaped
/// payload, distinct from a `StateUpdate`.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    pub identifier: String,
    pub payload: crate::value::SnapshotValue,
}

impl ServerEvent {
    pub fn new(identifier: impl Into<String>, payload: crate::value::SnapshotValue) -> Self {
        Self {
            identifier: identifier.into(),
            payload,
        }
    }
}

/// The hook a concrete transport implements and hands to `LandKeeper`/the
/// dispatcher at construction (§6, §9 design note "engine does not encode
/// bytes"), mirroring the teacher's `Arc<SessionManager>` constructor
/// argument (`server/runtime/sync.rs`'s `SyncRuntime::start`).
pub trait TransportHook: Send + Sync {
    fn send_update(&self, recipient: Recipient, update: &StateUpdate);
    fn send_event(&self, recipient: Recipient, event: &ServerEvent);
}

/// A `TransportHook` that drops everything, useful for Land unit tests that
/// don't exercise delivery (mirrors the teacher's tests constructing a bare
/// `SessionManager::default()` with no live sessions).
#[derive(Default)]
pub struct NullTransport;

impl TransportHook for NullTransport {
    fn send_update(&self, _recipient: Recipient, _update: &StateUpdate) {}
    fn send_event(&self, _recipient: Recipient, _event: &ServerEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingTransport {
        pub updates: Mutex<Vec<(Recipient, StateUpdate)>>,
    }

    impl TransportHook for RecordingTransport {
        fn send_update(&self, recipient: Recipient, update: &StateUpdate) {
            self.updates.lock().unwrap().push((recipient, update.clone()));
        }

        fn send_event(&self, _recipient: Recipient, _event: &ServerEvent) {}
    }

    #[test]
    fn null_transport_accepts_anything() {
        let transport = NullTransport;
        transport.send_update(Recipient::All, &StateUpdate::NoChange);
    }

    #[test]
    fn recording_transport_captures_updates() {
        let transport = RecordingTransport::default();
        transport.send_update(
            Recipient::Player(PlayerId::new("alice")),
            &StateUpdate::NoChange,
        );
        assert_eq!(transport.updates.lock().unwrap().len(), 1);
    }
}
