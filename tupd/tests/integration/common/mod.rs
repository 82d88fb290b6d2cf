pub mod fixtures;
pub mod mocks;

pub use fixtures::{COMMIT, Harness, record, versions_of};
pub use mocks::{FlakyCatalog, RecordingReporter, ScriptedExecutor, UnavailableStore};
