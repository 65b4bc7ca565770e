//! In-process audio graph driven by quanta.
//!
//! The graph is the external collaborator of the synthesis core: it tells each
//! running frame input node "produce N samples now", hands it a writable frame
//! of known capacity, and mixes the frames the node submits into the device
//! output.
//!
//! # Real-time contract
//! [`QuantumRenderer::render`] is the only entry point called from the audio
//! thread. It takes the graph lock with `try_lock`; if a control operation
//! (node creation, reset) holds it, the quantum is skipped and rendered as
//! silence instead of waiting. Running flags are atomics so start/stop never
//! contends with rendering.
//!
//! ```text
//! clock ──> QuantumRenderer::render(required, out)
//!             └─> for each started + connected node
//!                   ├─> QuantumHandler::on_quantum_started(request, sink)
//!                   │     └─> sink.acquire_frame() / sink.add_frame()
//!                   └─> mix submitted frames into `out`, recycle to pool
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use serde::{Deserialize, Serialize};

use crate::audio::frame::AudioFrame;
use crate::audio::frame_pool::FramePool;
use crate::audio::synth::ChannelLayout;
use crate::config::{GraphConfig, MAX_CHANNELS};
use crate::error::{AudioError, CreationTarget, ErrorCode, RenderError};

pub mod backend;
mod node;

pub use backend::{GraphBackend, ManualClockBackend};
#[cfg(feature = "device_output")]
pub use backend::CpalBackend;
pub use node::{FrameInputNode, NodeId, OutputNode};

use node::{NodeShared, NodeSink, NodeSlot, OutputShared};

/// PCM format of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingProperties {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub layout: ChannelLayout,
}

/// Demand delivered to a node on each quantum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantumRequest {
    /// Sample-frames needed this quantum; zero means no data is needed
    pub required_samples: usize,
}

/// Buffer source and submission target for one quantum
pub trait FrameSink {
    /// Format frames must be produced in
    fn format(&self) -> EncodingProperties;

    /// Take a frame sized for `sample_count` sample-frames in this sink's format
    fn acquire_frame(&mut self, sample_count: usize) -> Result<AudioFrame, RenderError>;

    /// Submit a filled frame downstream; ownership moves to the graph
    fn add_frame(&mut self, frame: AudioFrame);

    /// Give back an acquired frame without submitting it
    fn discard_frame(&mut self, frame: AudioFrame);
}

/// Real-time callback registered on a frame input node
///
/// Called on the audio thread, serially per node. Implementations must not
/// block, allocate unboundedly, perform I/O, or panic.
pub trait QuantumHandler: Send {
    fn on_quantum_started(&mut self, request: QuantumRequest, sink: &mut dyn FrameSink);
}

/// Result of delivering one quantum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantumOutcome {
    /// Nodes were serviced and their frames mixed into the output
    Rendered {
        streams_serviced: usize,
        frames_mixed: usize,
    },
    /// Graph is stopped; output is silence
    Idle,
    /// Control thread held the graph; output is silence
    Skipped,
}

pub(crate) struct GraphInner {
    pub(crate) nodes: Vec<NodeSlot>,
    pub(crate) output: Option<Arc<OutputShared>>,
}

pub(crate) struct GraphCore {
    settings: GraphConfig,
    running: AtomicBool,
    next_node_id: AtomicUsize,
    quanta_rendered: AtomicU64,
    quanta_skipped: AtomicU64,
    inner: Mutex<GraphInner>,
}

impl GraphCore {
    pub(crate) fn lock_inner(&self) -> Result<MutexGuard<'_, GraphInner>, AudioError> {
        self.inner.lock().map_err(|_| AudioError::LockPoisoned {
            component: "audio_graph".to_string(),
        })
    }

    fn render(&self, required_samples: usize, out: &mut [f32]) -> QuantumOutcome {
        let out_channels = self.settings.output_channels as usize;
        let required = required_samples.min(out.len() / out_channels);
        let out = &mut out[..required * out_channels];
        out.fill(0.0);

        if !self.running.load(Ordering::Acquire) {
            return QuantumOutcome::Idle;
        }

        let mut inner = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.quanta_skipped.fetch_add(1, Ordering::Relaxed);
                return QuantumOutcome::Skipped;
            }
        };

        let mut streams_serviced = 0;
        let mut frames_mixed = 0;
        for slot in inner.nodes.iter_mut() {
            if !slot.is_live() {
                continue;
            }

            if let Some(handler) = slot.handler.as_mut() {
                let mut sink = NodeSink {
                    format: slot.shared.format,
                    submit: &mut slot.submit,
                    returned: &mut slot.returned,
                };
                handler.on_quantum_started(
                    QuantumRequest {
                        required_samples: required,
                    },
                    &mut sink,
                );
                streams_serviced += 1;
            }

            while let Ok(frame) = slot.mix.data_consumer.pop() {
                mix_frame(&frame, out, out_channels, required);
                frames_mixed += 1;
                if let Err(rtrb::PushError::Full(frame)) = slot.mix.pool_producer.push(frame) {
                    slot.returned.push(frame);
                }
            }
        }

        self.quanta_rendered.fetch_add(1, Ordering::Relaxed);
        QuantumOutcome::Rendered {
            streams_serviced,
            frames_mixed,
        }
    }
}

/// Sum `frame` into interleaved `out`; stream channel `c % frame_channels`
/// feeds output channel `c`
fn mix_frame(frame: &AudioFrame, out: &mut [f32], out_channels: usize, required: usize) {
    let Ok(samples) = frame.as_samples() else {
        return;
    };
    let channels = frame.channel_count() as usize;
    let sample_count = frame.sample_count();
    let layout = frame.layout();

    for i in 0..sample_count.min(required) {
        for c in 0..out_channels {
            let src = layout.index(i, c % channels, channels, sample_count);
            out[i * out_channels + c] += samples[src];
        }
    }
}

/// Cloneable entry point for the audio thread
#[derive(Clone)]
pub struct QuantumRenderer {
    core: Arc<GraphCore>,
}

impl QuantumRenderer {
    /// Deliver one quantum of `required_samples` sample-frames.
    ///
    /// `out` receives interleaved output-channel samples. If it is shorter
    /// than `required_samples × output_channels`, the quantum is shortened to
    /// the whole sample-frames that fit.
    pub fn render(&self, required_samples: usize, out: &mut [f32]) -> QuantumOutcome {
        self.core.render(required_samples, out)
    }

    pub fn output_channels(&self) -> u16 {
        self.core.settings.output_channels
    }

    pub fn max_quantum_samples(&self) -> usize {
        self.core.settings.max_quantum_samples
    }
}

/// A quantum-driven audio graph with one device output
pub struct AudioGraph {
    core: Arc<GraphCore>,
    #[cfg(feature = "device_output")]
    driver: Option<backend::cpal::DriverGuard>,
}

impl AudioGraph {
    /// Create an empty, stopped graph.
    ///
    /// # Errors
    /// `AudioError::CreationFailed` if `settings` are invalid
    pub fn new(settings: GraphConfig) -> Result<Self, AudioError> {
        settings
            .validate()
            .map_err(|err| AudioError::creation(CreationTarget::Graph, err.message()))?;

        Ok(Self {
            core: Arc::new(GraphCore {
                settings,
                running: AtomicBool::new(false),
                next_node_id: AtomicUsize::new(0),
                quanta_rendered: AtomicU64::new(0),
                quanta_skipped: AtomicU64::new(0),
                inner: Mutex::new(GraphInner {
                    nodes: Vec::new(),
                    output: None,
                }),
            }),
            #[cfg(feature = "device_output")]
            driver: None,
        })
    }

    #[cfg(feature = "device_output")]
    pub(crate) fn attach_driver(&mut self, driver: backend::cpal::DriverGuard) {
        self.driver = Some(driver);
    }

    pub fn settings(&self) -> &GraphConfig {
        &self.core.settings
    }

    /// Graph format with the output's channel count
    pub fn encoding_properties(&self) -> EncodingProperties {
        EncodingProperties {
            sample_rate: self.core.settings.sample_rate,
            channel_count: self.core.settings.output_channels,
            layout: ChannelLayout::Interleaved,
        }
    }

    /// Create the graph's device output node.
    ///
    /// # Errors
    /// `AudioError::CreationFailed` if the graph already has a device output
    pub fn create_device_output(&self) -> Result<OutputNode, AudioError> {
        let mut inner = self.core.lock_inner()?;
        if inner.output.is_some() {
            return Err(AudioError::creation(
                CreationTarget::DeviceOutput,
                "graph already has a device output",
            ));
        }

        let shared = Arc::new(OutputShared {
            channels: self.core.settings.output_channels,
            attached: AtomicBool::new(true),
        });
        inner.output = Some(Arc::clone(&shared));

        Ok(OutputNode {
            shared,
            core: Arc::clone(&self.core),
        })
    }

    /// Create a stopped, unconnected frame input node producing `format`.
    ///
    /// The node's frame pool is allocated here, sized for the graph's
    /// largest quantum.
    ///
    /// # Errors
    /// `AudioError::CreationFailed` if the channel count is out of range, the
    /// sample rate differs from the graph's, or the pool cannot be allocated
    pub fn create_frame_input_node(
        &self,
        format: EncodingProperties,
    ) -> Result<FrameInputNode, AudioError> {
        let settings = &self.core.settings;
        if format.channel_count == 0 || format.channel_count > MAX_CHANNELS {
            return Err(AudioError::creation(
                CreationTarget::FrameInputNode,
                format!(
                    "channel count must be in 1..={} (got {})",
                    MAX_CHANNELS, format.channel_count
                ),
            ));
        }
        if format.sample_rate != settings.sample_rate {
            return Err(AudioError::creation(
                CreationTarget::FrameInputNode,
                format!(
                    "sample rate {} does not match graph rate {}",
                    format.sample_rate, settings.sample_rate
                ),
            ));
        }

        let capacity = settings.max_quantum_samples * format.channel_count as usize;
        let channels = FramePool::new(settings.frame_pool_size, capacity)
            .map_err(|err| AudioError::creation(CreationTarget::FrameInputNode, err.message()))?;
        let (submit, mix) = channels.split_for_threads();

        let id = NodeId(self.core.next_node_id.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(NodeShared::new(id, format));
        let slot = NodeSlot::new(Arc::clone(&shared), submit, mix, settings.frame_pool_size);

        self.core.lock_inner()?.nodes.push(slot);

        Ok(FrameInputNode {
            shared,
            core: Arc::clone(&self.core),
        })
    }

    /// Begin delivering quanta
    pub fn start(&self) {
        self.core.running.store(true, Ordering::Release);
    }

    /// Stop delivering quanta; an in-flight quantum finishes
    pub fn stop(&self) {
        self.core.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    /// Disconnect and remove every node.
    ///
    /// Blocks until an in-flight quantum finishes. Handlers and frame pools
    /// are dropped here, on the calling thread.
    pub fn reset_all_nodes(&self) -> Result<(), AudioError> {
        let (nodes, output) = {
            let mut inner = self.core.lock_inner()?;
            for slot in &inner.nodes {
                slot.shared.detach();
            }
            if let Some(output) = inner.output.as_ref() {
                output.attached.store(false, Ordering::Release);
            }
            (std::mem::take(&mut inner.nodes), inner.output.take())
        };
        drop(nodes);
        drop(output);
        Ok(())
    }

    /// Frame input nodes currently in the graph
    pub fn node_count(&self) -> usize {
        self.core.lock_inner().map(|inner| inner.nodes.len()).unwrap_or(0)
    }

    pub fn has_device_output(&self) -> bool {
        self.core
            .lock_inner()
            .map(|inner| inner.output.is_some())
            .unwrap_or(false)
    }

    /// Handle for the audio thread
    pub fn renderer(&self) -> QuantumRenderer {
        QuantumRenderer {
            core: Arc::clone(&self.core),
        }
    }

    /// Deliver one quantum from the calling thread
    pub fn render_quantum(&self, required_samples: usize, out: &mut [f32]) -> QuantumOutcome {
        self.core.render(required_samples, out)
    }

    pub fn quanta_rendered(&self) -> u64 {
        self.core.quanta_rendered.load(Ordering::Relaxed)
    }

    pub fn quanta_skipped(&self) -> u64 {
        self.core.quanta_skipped.load(Ordering::Relaxed)
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        self.stop();
        if let Err(err) = self.reset_all_nodes() {
            log::warn!("[AudioGraph] Reset on drop failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests;
