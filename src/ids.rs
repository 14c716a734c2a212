//! Opaque identifiers (§3): `PlayerId` identifies an account, `ClientId` a
//! device/instance, `SessionId` a single connection, `LandId` a room.

use std::fmt;
use std::sync::Arc;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(raw: impl Into<Arc<str>>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self::new(raw)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(PlayerId);
opaque_id!(ClientId);
opaque_id!(SessionId);
opaque_id!(LandId);

/// Stable per-join slot allocated for compact transport encoding (§4.7).
pub type PlayerSlot = i32;
