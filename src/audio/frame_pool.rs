// FramePool - lock-free frame pool with dual SPSC queues
//
// Every stream owns one pool of pre-allocated frames so the quantum handler
// never calls the allocator. Two lock-free SPSC ring buffers move frames
// between the producing side (quantum handler) and the consuming side (output
// mixer).
//
// Architecture:
// - DATA_QUEUE: producer pushes filled frames, mixer consumes
// - POOL_QUEUE: mixer returns drained frames, producer recycles
//
// Frame flow:
// 1. Producer pops an empty frame from POOL_QUEUE and sizes it for the quantum
// 2. Producer fills the frame with synthesized samples
// 3. Producer pushes the filled frame to DATA_QUEUE (ownership moves downstream)
// 4. Mixer pops the frame from DATA_QUEUE and sums it into the output
// 5. Mixer pushes the frame back to POOL_QUEUE

use rtrb::{Consumer, Producer};

use super::frame::AudioFrame;
use crate::error::RenderError;

/// Frames per stream when no configuration overrides it
pub const DEFAULT_FRAME_COUNT: usize = 4;

/// All four queue ends of a freshly created pool
pub struct FramePoolChannels {
    /// Producer for handing filled frames downstream
    pub data_producer: Producer<AudioFrame>,
    /// Consumer for receiving filled frames in the mixer
    pub data_consumer: Consumer<AudioFrame>,
    /// Producer for returning drained frames from the mixer
    pub pool_producer: Producer<AudioFrame>,
    /// Consumer for retrieving empty frames on the producing side
    pub pool_consumer: Consumer<AudioFrame>,
}

/// Queue ends used by the quantum handler side
pub struct SubmitChannels {
    pub pool_consumer: Consumer<AudioFrame>,
    pub data_producer: Producer<AudioFrame>,
}

/// Queue ends used by the output mixer side
pub struct MixChannels {
    pub data_consumer: Consumer<AudioFrame>,
    pub pool_producer: Producer<AudioFrame>,
}

impl FramePoolChannels {
    /// Split into the producing and mixing halves
    pub fn split_for_threads(self) -> (SubmitChannels, MixChannels) {
        (
            SubmitChannels {
                pool_consumer: self.pool_consumer,
                data_producer: self.data_producer,
            },
            MixChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

/// Lock-free frame pool using dual SPSC ring buffers
///
/// Pre-allocates a fixed number of frames and manages them through two
/// lock-free queues. Safe for real-time threads because all heap
/// allocations happen during initialization.
///
/// # Example
/// ```ignore
/// let channels = FramePool::new(4, 9600)?;
/// let (mut submit, mut mix) = channels.split_for_threads();
///
/// // Quantum handler:
/// if let Ok(mut frame) = submit.pool_consumer.pop() {
///     frame.resize_within_capacity(480, 2, ChannelLayout::Interleaved)?;
///     submit.data_producer.push(frame).ok();
/// }
///
/// // Mixer:
/// if let Ok(frame) = mix.data_consumer.pop() {
///     mix.pool_producer.push(frame).ok();
/// }
/// ```
pub struct FramePool;

impl FramePool {
    /// Create a pool of `frame_count` frames, each holding up to
    /// `capacity_samples` f32 values
    ///
    /// # Panics
    /// Panics if frame_count is 0 or capacity_samples is 0
    ///
    /// # Errors
    /// `RenderError::AllocationFailed` if a frame region cannot be allocated
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        frame_count: usize,
        capacity_samples: usize,
    ) -> Result<FramePoolChannels, RenderError> {
        assert!(frame_count > 0, "frame_count must be greater than 0");
        assert!(capacity_samples > 0, "capacity_samples must be greater than 0");

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(frame_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(frame_count);

        // The only place frame memory is allocated
        for _ in 0..frame_count {
            let frame = AudioFrame::with_capacity(capacity_samples)?;
            if pool_producer.push(frame).is_err() {
                unreachable!("pool queue sized for every frame");
            }
        }

        Ok(FramePoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        })
    }
}
