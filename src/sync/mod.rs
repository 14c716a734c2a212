//! C3/C4: snapshot extraction modes and the diff engine (§4.3, §4.4).

mod diff;
mod engine;
mod mode;

pub use diff::{diff_snapshots, merge_patches_override};
pub use engine::SyncEngine;
pub use mode::SnapshotMode;
