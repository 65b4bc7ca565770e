// Managers Module
//
// Control-side owners of pipeline state:
// - StreamSetManager: stream set build/teardown, start/stop, reconfiguration

pub mod stream_set;

pub use stream_set::{StreamSetManager, StreamSetStatus, StreamState};
