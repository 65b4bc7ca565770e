//! Graph backends - where audio graphs come from and who drives their clock

use super::AudioGraph;
use crate::config::GraphConfig;
use crate::error::AudioError;

#[cfg(feature = "device_output")]
pub(crate) mod cpal;

#[cfg(feature = "device_output")]
pub use self::cpal::CpalBackend;

/// Factory for audio graphs
///
/// The stream set manager builds a fresh graph on every configure through
/// this trait, so tests can substitute a backend that fails or records.
pub trait GraphBackend: Send + Sync {
    /// Create a stopped, empty graph with `settings`
    fn create_graph(&self, settings: &GraphConfig) -> Result<AudioGraph, AudioError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Backend whose quanta are delivered by the caller
///
/// Nothing renders until the owner calls `AudioGraph::render_quantum` or
/// `QuantumRenderer::render`. Used by tests and the offline CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClockBackend;

impl GraphBackend for ManualClockBackend {
    fn create_graph(&self, settings: &GraphConfig) -> Result<AudioGraph, AudioError> {
        AudioGraph::new(settings.clone())
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}
