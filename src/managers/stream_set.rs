// StreamSetManager: owns N producer streams feeding one device output
//
// Single Responsibility: stream set build/teardown and start/stop lifecycle
// Every (re)configure builds a fresh graph through the GraphBackend

use std::sync::{Arc, Mutex, MutexGuard};

use rtrb::Consumer;
use serde::Serialize;

use crate::audio::producer::{DropReport, FrameProducer, StreamStats, StreamStatsSnapshot};
use crate::audio::synth::{ChannelLayout, SineVoice};
use crate::config::{AppConfig, GraphConfig, SynthesisConfig, MAX_CHANNELS};
use crate::error::{log_audio_error, AudioError, CreationTarget, ErrorCode};
use crate::graph::{
    AudioGraph, EncodingProperties, FrameInputNode, GraphBackend, OutputNode, QuantumHandler,
    QuantumRenderer,
};
use crate::notify::{LogSink, Notification, NotificationSink};

/// Externally visible state of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Stopped,
    Running,
}

/// Serializable overview of the stream set
#[derive(Debug, Clone, Serialize)]
pub struct StreamSetStatus {
    pub configured: bool,
    pub graph_running: bool,
    pub stream_count: usize,
    pub channel_count: u16,
    pub states: Vec<StreamState>,
    pub stats: Vec<StreamStatsSnapshot>,
}

/// Control-side handles for one stream
struct StreamHandle {
    node: FrameInputNode,
    stats: Arc<StreamStats>,
    reports: Consumer<DropReport>,
}

/// A built stream set: one graph, one output, N streams
struct ActiveSet {
    streams: Vec<StreamHandle>,
    _output: OutputNode,
    graph: AudioGraph,
    channel_count: u16,
    format: EncodingProperties,
}

impl ActiveSet {
    fn any_running(&self) -> bool {
        self.streams.iter().any(|stream| stream.node.is_running())
    }
}

struct ManagerState {
    /// Channel count used by the next `reconfigure`
    pending_channel_count: u16,
    active: Option<ActiveSet>,
}

/// Manages a set of sine-producing streams on a shared device output
///
/// This manager handles:
/// - Graph, device output, and frame input node creation
/// - Stream start/stop (idempotent, no-ops when unconfigured)
/// - Stream-count and channel-count reconfiguration
/// - Forwarding real-time drop reports to the notification sink
///
/// # Example
/// ```ignore
/// let manager = StreamSetManager::new(Box::new(ManualClockBackend), GraphConfig::default());
/// manager.configure(2, 2)?;
/// manager.start_all()?;
/// let renderer = manager.renderer().unwrap();
/// renderer.render(480, &mut out);
/// manager.stop_all()?;
/// ```
pub struct StreamSetManager {
    backend: Box<dyn GraphBackend>,
    settings: GraphConfig,
    synthesis: SynthesisConfig,
    layout: ChannelLayout,
    sink: Arc<dyn NotificationSink>,
    state: Mutex<ManagerState>,
    #[cfg(test)]
    handler_wrapper: Option<HandlerWrapper>,
}

/// Decorates each stream's handler before it is installed
#[cfg(test)]
pub(crate) type HandlerWrapper =
    Box<dyn Fn(usize, Box<dyn QuantumHandler>) -> Box<dyn QuantumHandler> + Send + Sync>;

impl StreamSetManager {
    /// Create an unconfigured manager
    pub fn new(backend: Box<dyn GraphBackend>, settings: GraphConfig) -> Self {
        let pending = settings.output_channels;
        Self {
            backend,
            settings,
            synthesis: SynthesisConfig::default(),
            layout: ChannelLayout::Interleaved,
            sink: Arc::new(LogSink),
            state: Mutex::new(ManagerState {
                pending_channel_count: pending,
                active: None,
            }),
            #[cfg(test)]
            handler_wrapper: None,
        }
    }

    /// Create an unconfigured manager from application config
    ///
    /// The stream section only seeds the pending channel count; call
    /// `configure` or `reconfigure` to build streams.
    pub fn from_config(backend: Box<dyn GraphBackend>, config: &AppConfig) -> Self {
        let manager = Self::new(backend, config.graph.clone())
            .with_synthesis(config.synthesis.clone())
            .with_layout(config.streams.layout);
        manager.state_recovered().pending_channel_count = config.streams.channel_count;
        manager
    }

    pub fn with_synthesis(mut self, synthesis: SynthesisConfig) -> Self {
        self.synthesis = synthesis;
        self
    }

    pub fn with_layout(mut self, layout: ChannelLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_handler_wrapper(mut self, wrapper: HandlerWrapper) -> Self {
        self.handler_wrapper = Some(wrapper);
        self
    }

    /// Build `stream_count` streams of `channel_count` channels each
    ///
    /// Any previous configuration is torn down first. Streams are created
    /// stopped; the graph is started once every stream is wired.
    ///
    /// # Errors
    /// - `InvalidConfiguration` - `stream_count` is 0, `channel_count` is
    ///   outside `1..=32`, or the synthesis settings are unusable
    /// - `ConfigurationConflict` - streams are running and `channel_count`
    ///   differs from the running one; nothing is torn down
    /// - `CreationFailed` - graph, output, or node creation failed; the
    ///   manager is left unconfigured
    pub fn configure(&self, stream_count: usize, channel_count: u16) -> Result<(), AudioError> {
        let span = tracing::info_span!("configure", stream_count, channel_count);
        let _enter = span.enter();

        self.validate(stream_count, channel_count)?;
        if let Err(err) = self.synthesis.validate() {
            log_audio_error(&err, "validate");
            return Err(err);
        }

        let mut state = self.lock_state()?;
        if let Some(active) = state.active.as_ref() {
            if active.any_running() && active.channel_count != channel_count {
                let err = AudioError::ConfigurationConflict {
                    running_channels: active.channel_count,
                    requested_channels: channel_count,
                };
                log_audio_error(&err, "configure");
                return Err(err);
            }
        }

        if let Some(mut previous) = state.active.take() {
            self.forward_reports(&mut previous);
            Self::teardown_set(previous);
        }
        state.pending_channel_count = channel_count;

        match self.build_set(stream_count, channel_count) {
            Ok(set) => {
                log::info!(
                    "[StreamSetManager] Configured {} stream(s) x {} channel(s) on {} backend",
                    stream_count,
                    channel_count,
                    self.backend.name()
                );
                state.active = Some(set);
                self.sink
                    .notify(Notification::status("device output node created"));
                Ok(())
            }
            Err(err) => {
                log_audio_error(&err, "configure");
                self.sink
                    .notify(Notification::error(err.message()).with_code(err.code()));
                Err(err)
            }
        }
    }

    /// Store the channel count used by the next [`reconfigure`](Self::reconfigure)
    ///
    /// Running streams keep their current channel count.
    pub fn set_channel_count(&self, channel_count: u16) -> Result<(), AudioError> {
        self.validate(1, channel_count)?;
        self.lock_state()?.pending_channel_count = channel_count;
        Ok(())
    }

    /// Rebuild with `stream_count` streams and the pending channel count
    pub fn reconfigure(&self, stream_count: usize) -> Result<(), AudioError> {
        let channel_count = self.lock_state()?.pending_channel_count;
        self.configure(stream_count, channel_count)
    }

    /// Start every stream; a no-op when unconfigured or already running
    pub fn start_all(&self) -> Result<(), AudioError> {
        let state = self.lock_state()?;
        match state.active.as_ref() {
            Some(active) => {
                for stream in &active.streams {
                    stream.node.start();
                }
                log::debug!("[StreamSetManager] Started {} stream(s)", active.streams.len());
            }
            None => log::debug!("[StreamSetManager] start_all ignored: not configured"),
        }
        Ok(())
    }

    /// Stop every stream; a no-op when unconfigured or already stopped
    ///
    /// The next quantum observes the stop at the latest.
    pub fn stop_all(&self) -> Result<(), AudioError> {
        let state = self.lock_state()?;
        if let Some(active) = state.active.as_ref() {
            for stream in &active.streams {
                stream.node.stop();
            }
            log::debug!("[StreamSetManager] Stopped {} stream(s)", active.streams.len());
        }
        Ok(())
    }

    /// Forward queued drop reports as `Error` notifications
    ///
    /// # Returns
    /// Number of reports forwarded
    pub fn drain_reports(&self) -> Result<usize, AudioError> {
        let mut state = self.lock_state()?;
        Ok(match state.active.as_mut() {
            Some(active) => self.forward_reports(active),
            None => 0,
        })
    }

    /// Stop and dismantle the current configuration, if any
    pub fn teardown(&self) -> Result<(), AudioError> {
        let span = tracing::info_span!("teardown");
        let _enter = span.enter();

        let previous = self.lock_state()?.active.take();
        if let Some(mut previous) = previous {
            self.forward_reports(&mut previous);
            Self::teardown_set(previous);
            log::info!("[StreamSetManager] Torn down");
        }
        Ok(())
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Configured streams; 0 when unconfigured
    pub fn stream_count(&self) -> usize {
        self.state_recovered()
            .active
            .as_ref()
            .map_or(0, |active| active.streams.len())
    }

    /// Channel count of the configured streams, or the pending one
    pub fn channel_count(&self) -> u16 {
        let state = self.state_recovered();
        state
            .active
            .as_ref()
            .map_or(state.pending_channel_count, |active| active.channel_count)
    }

    pub fn is_configured(&self) -> bool {
        self.state_recovered().active.is_some()
    }

    pub fn stream_states(&self) -> Vec<StreamState> {
        self.state_recovered()
            .active
            .as_ref()
            .map(|active| {
                active
                    .streams
                    .iter()
                    .map(|stream| {
                        if stream.node.is_running() {
                            StreamState::Running
                        } else {
                            StreamState::Stopped
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stream_stats(&self, index: usize) -> Option<StreamStatsSnapshot> {
        self.state_recovered()
            .active
            .as_ref()
            .and_then(|active| active.streams.get(index))
            .map(|stream| stream.stats.snapshot())
    }

    /// Format the streams produce
    pub fn encoding_properties(&self) -> Option<EncodingProperties> {
        self.state_recovered().active.as_ref().map(|active| active.format)
    }

    /// Audio-thread entry point of the current graph
    pub fn renderer(&self) -> Option<QuantumRenderer> {
        self.state_recovered()
            .active
            .as_ref()
            .map(|active| active.graph.renderer())
    }

    pub fn status(&self) -> StreamSetStatus {
        let states = self.stream_states();
        let state = self.state_recovered();
        match state.active.as_ref() {
            Some(active) => StreamSetStatus {
                configured: true,
                graph_running: active.graph.is_running(),
                stream_count: active.streams.len(),
                channel_count: active.channel_count,
                states,
                stats: active.streams.iter().map(|s| s.stats.snapshot()).collect(),
            },
            None => StreamSetStatus {
                configured: false,
                graph_running: false,
                stream_count: 0,
                channel_count: state.pending_channel_count,
                states,
                stats: Vec::new(),
            },
        }
    }

    // ========================================================================
    // PRIVATE HELPER METHODS
    // ========================================================================

    fn validate(&self, stream_count: usize, channel_count: u16) -> Result<(), AudioError> {
        let reason = if stream_count == 0 {
            Some("stream_count must be at least 1".to_string())
        } else if channel_count == 0 || channel_count > MAX_CHANNELS {
            Some(format!(
                "channel_count must be in 1..={} (got {})",
                MAX_CHANNELS, channel_count
            ))
        } else {
            None
        };

        match reason {
            Some(reason) => {
                let err = AudioError::InvalidConfiguration { reason };
                log_audio_error(&err, "validate");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn build_set(&self, stream_count: usize, channel_count: u16) -> Result<ActiveSet, AudioError> {
        let graph = self
            .backend
            .create_graph(&self.settings)
            .map_err(|err| match err {
                AudioError::CreationFailed { .. } => err,
                other => AudioError::creation(CreationTarget::Graph, other.message()),
            })?;

        let output = graph.create_device_output()?;

        let format = EncodingProperties {
            channel_count,
            layout: self.layout,
            ..graph.encoding_properties()
        };

        let mut streams = Vec::with_capacity(stream_count);
        for index in 0..stream_count {
            let node = graph.create_frame_input_node(format)?;
            node.add_outgoing_connection(&output)?;
            node.stop();

            let voice = SineVoice::new(self.synthesis.amplitude, self.synthesis.tone);
            let (producer, stats, reports) =
                FrameProducer::new(index, voice, self.settings.report_queue_capacity);
            node.set_quantum_handler(self.wrap_handler(index, Box::new(producer)))?;

            streams.push(StreamHandle {
                node,
                stats,
                reports,
            });
        }

        graph.start();

        Ok(ActiveSet {
            streams,
            _output: output,
            graph,
            channel_count,
            format,
        })
    }

    #[cfg(test)]
    fn wrap_handler(
        &self,
        index: usize,
        handler: Box<dyn QuantumHandler>,
    ) -> Box<dyn QuantumHandler> {
        match self.handler_wrapper.as_ref() {
            Some(wrap) => wrap(index, handler),
            None => handler,
        }
    }

    #[cfg(not(test))]
    fn wrap_handler(
        &self,
        _index: usize,
        handler: Box<dyn QuantumHandler>,
    ) -> Box<dyn QuantumHandler> {
        handler
    }

    fn teardown_set(set: ActiveSet) {
        for stream in &set.streams {
            stream.node.stop();
        }
        set.graph.stop();
        if let Err(err) = set.graph.reset_all_nodes() {
            log_audio_error(&err, "teardown");
        }
    }

    fn forward_reports(&self, set: &mut ActiveSet) -> usize {
        let mut forwarded = 0;
        for stream in set.streams.iter_mut() {
            while let Ok(report) = stream.reports.pop() {
                log::warn!(
                    "[StreamSetManager] Stream {} dropped a {}-sample frame: {}",
                    report.stream,
                    report.required_samples,
                    report.error
                );
                self.sink.notify(
                    Notification::error(format!(
                        "stream {} dropped frame: {}",
                        report.stream,
                        report.error.message()
                    ))
                    .with_code(report.error.code()),
                );
                forwarded += 1;
            }
        }
        forwarded
    }

    /// Acquire the state lock for mutating operations
    fn lock_state(&self) -> Result<MutexGuard<'_, ManagerState>, AudioError> {
        self.state.lock().map_err(|_| {
            let err = AudioError::LockPoisoned {
                component: "stream_set".to_string(),
            };
            log_audio_error(&err, "lock_state");
            err
        })
    }

    /// Acquire the state lock for read-only accessors
    fn state_recovered(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for StreamSetManager {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = state.active.take() {
            Self::teardown_set(previous);
        }
    }
}
