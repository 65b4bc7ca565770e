// Quantum Synth - pull-based frame synthesis for quantum-driven audio graphs
// Real-time rendering with lock-free frame pools and per-stream producers

// Module declarations
pub mod audio;
pub mod config;
pub mod error;
pub mod graph;
pub mod managers;
pub mod notify;

// Re-exports for convenience
pub use audio::{synthesize, AudioFrame, ChannelLayout, FrameProducer, SineVoice, ToneMode};
pub use config::AppConfig;
pub use error::{AudioError, ErrorCode, RenderError};
pub use graph::{AudioGraph, GraphBackend, ManualClockBackend, QuantumOutcome, QuantumRenderer};
pub use managers::{StreamSetManager, StreamState};
pub use notify::{Notification, NotificationHub, NotificationSink, NotifyType};

/// Install the process-wide tracing subscriber.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Records emitted through
/// the `log` facade are bridged into the subscriber. Calling this more than
/// once is harmless.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
