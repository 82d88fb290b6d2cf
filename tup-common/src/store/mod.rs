//! Bundled run-state stores.
//!
//! [`MemoryStore`] serves tests and embedders; [`FileStore`] backs the
//! daemon with a JSON document guarded by a PID lock file.

mod file;
mod memory;

pub use file::{FileStore, StateDocument};
pub use memory::MemoryStore;
