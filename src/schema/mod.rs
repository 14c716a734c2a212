//! C2: declarative per-field sync policies and field-granularity dirty
//! tracking (§4.2). `StateNode` is the trait a Land's root state struct (and
//! any nested struct reachable from it) implements; `FieldSpec` is the
//! static schema-table entry backing each field.

mod dirty;
mod field;
mod node;

pub use dirty::{DirtyGuard, DirtySet};
pub use field::{FieldSpec, PolicyKind};
pub use node::StateNode;
