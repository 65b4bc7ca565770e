//! Graph nodes: device output and frame input handles.
//!
//! A node has two halves. The handle (`FrameInputNode`, `OutputNode`) is held
//! by control code and only flips atomics or takes the graph lock. The slot
//! (`NodeSlot`) lives inside the graph behind that lock and owns the quantum
//! handler and the frame pool queues that the render path touches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{EncodingProperties, FrameSink, GraphCore, QuantumHandler};
use crate::audio::frame::AudioFrame;
use crate::audio::frame_pool::{MixChannels, SubmitChannels};
use crate::error::{AudioError, RenderError};

/// Identity of a node within its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// State shared between a frame input handle and its slot
pub(crate) struct NodeShared {
    pub(crate) id: NodeId,
    pub(crate) format: EncodingProperties,
    pub(crate) running: AtomicBool,
    pub(crate) connected: AtomicBool,
    pub(crate) attached: AtomicBool,
}

impl NodeShared {
    pub(crate) fn new(id: NodeId, format: EncodingProperties) -> Self {
        Self {
            id,
            format,
            running: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            attached: AtomicBool::new(true),
        }
    }

    /// Mark the node as removed from its graph
    pub(crate) fn detach(&self) {
        self.running.store(false, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        self.attached.store(false, Ordering::Release);
    }
}

/// Render-side state of a frame input node
pub(crate) struct NodeSlot {
    pub(crate) shared: Arc<NodeShared>,
    pub(crate) handler: Option<Box<dyn QuantumHandler>>,
    pub(crate) submit: SubmitChannels,
    pub(crate) mix: MixChannels,
    /// Frames a handler acquired but did not submit; reused before the pool
    pub(crate) returned: Vec<AudioFrame>,
}

impl NodeSlot {
    pub(crate) fn new(
        shared: Arc<NodeShared>,
        submit: SubmitChannels,
        mix: MixChannels,
        pool_size: usize,
    ) -> Self {
        Self {
            shared,
            handler: None,
            submit,
            mix,
            returned: Vec::with_capacity(pool_size),
        }
    }

    /// Whether the render path should deliver the next quantum
    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.shared.running.load(Ordering::Acquire) && self.shared.connected.load(Ordering::Acquire)
    }
}

/// `FrameSink` handed to a quantum handler for a single quantum
pub(crate) struct NodeSink<'a> {
    pub(crate) format: EncodingProperties,
    pub(crate) submit: &'a mut SubmitChannels,
    pub(crate) returned: &'a mut Vec<AudioFrame>,
}

impl FrameSink for NodeSink<'_> {
    fn format(&self) -> EncodingProperties {
        self.format
    }

    fn acquire_frame(&mut self, sample_count: usize) -> Result<AudioFrame, RenderError> {
        let mut frame = match self.returned.pop() {
            Some(frame) => frame,
            None => self
                .submit
                .pool_consumer
                .pop()
                .map_err(|_| RenderError::AllocationFailed {
                    requested_bytes: sample_count
                        .saturating_mul(self.format.channel_count as usize)
                        .saturating_mul(std::mem::size_of::<f32>()),
                })?,
        };

        if let Err(err) =
            frame.resize_within_capacity(sample_count, self.format.channel_count, self.format.layout)
        {
            self.returned.push(frame);
            return Err(err);
        }
        Ok(frame)
    }

    fn add_frame(&mut self, frame: AudioFrame) {
        // The data queue has room for every pooled frame
        if let Err(rtrb::PushError::Full(frame)) = self.submit.data_producer.push(frame) {
            self.returned.push(frame);
        }
    }

    fn discard_frame(&mut self, frame: AudioFrame) {
        self.returned.push(frame);
    }
}

/// Handle to a frame input node (one producer stream)
///
/// Nodes are created stopped and unconnected. A node only receives quanta
/// while it is started, connected, and its graph is running.
pub struct FrameInputNode {
    pub(crate) shared: Arc<NodeShared>,
    pub(crate) core: Arc<GraphCore>,
}

impl FrameInputNode {
    pub fn id(&self) -> NodeId {
        self.shared.id
    }

    pub fn format(&self) -> EncodingProperties {
        self.shared.format
    }

    /// Begin receiving quanta; a no-op if already started
    pub fn start(&self) {
        if self.shared.attached.load(Ordering::Acquire) {
            self.shared.running.store(true, Ordering::Release);
        }
    }

    /// Stop receiving quanta; an in-flight quantum is allowed to finish
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Whether the node is still part of its graph
    pub fn is_attached(&self) -> bool {
        self.shared.attached.load(Ordering::Acquire)
    }

    /// Route this node's frames into `output`.
    ///
    /// # Errors
    /// * `AudioError::NodeRemoved` - either node was removed by a reset
    /// * `AudioError::InvalidConfiguration` - `output` belongs to another graph
    pub fn add_outgoing_connection(&self, output: &OutputNode) -> Result<(), AudioError> {
        if !self.is_attached() || !output.is_attached() {
            return Err(AudioError::NodeRemoved);
        }
        if !Arc::ptr_eq(&self.core, &output.core) {
            return Err(AudioError::InvalidConfiguration {
                reason: "output node belongs to a different graph".to_string(),
            });
        }
        self.shared.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Register the handler that services this node's quanta.
    ///
    /// A node has one handler. It can be replaced while the node is stopped;
    /// a running node rejects replacement.
    ///
    /// # Errors
    /// * `AudioError::HandlerBusy` - node is running
    /// * `AudioError::NodeRemoved` - node was removed by a reset
    /// * `AudioError::LockPoisoned` - graph lock poisoned
    pub fn set_quantum_handler(&self, handler: Box<dyn QuantumHandler>) -> Result<(), AudioError> {
        if self.is_running() {
            return Err(AudioError::HandlerBusy);
        }

        let mut inner = self.core.lock_inner()?;
        let slot = inner
            .nodes
            .iter_mut()
            .find(|slot| slot.shared.id == self.shared.id)
            .ok_or(AudioError::NodeRemoved)?;
        slot.handler = Some(handler);
        Ok(())
    }
}

impl std::fmt::Debug for FrameInputNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameInputNode")
            .field("id", &self.shared.id)
            .field("format", &self.shared.format)
            .field("running", &self.is_running())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// State shared between an output handle and the graph
pub(crate) struct OutputShared {
    pub(crate) channels: u16,
    pub(crate) attached: AtomicBool,
}

/// Handle to the graph's device output node
pub struct OutputNode {
    pub(crate) shared: Arc<OutputShared>,
    pub(crate) core: Arc<GraphCore>,
}

impl OutputNode {
    pub fn channel_count(&self) -> u16 {
        self.shared.channels
    }

    pub fn is_attached(&self) -> bool {
        self.shared.attached.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for OutputNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputNode")
            .field("channels", &self.shared.channels)
            .field("attached", &self.is_attached())
            .finish()
    }
}
