//! Frame buffer access - typed views over raw frame memory
//!
//! An [`AudioFrame`] owns a fixed-capacity raw byte region sized in
//! sample-frames (`sample_count × channel_count × 4` bytes of f32 PCM). The
//! region is only reachable through checked `bytemuck` casts, so callers see a
//! float slice whose length always equals `sample_count × channel_count`.
//!
//! This is the only module in the crate that touches raw memory.
//!
//! # Locking
//! Writing goes through [`AudioFrame::lock_buffer`], which returns a
//! [`FrameLock`] guard borrowing the frame mutably. The borrow is the lock:
//! the frame cannot be submitted, resized, or locked again until the guard is
//! dropped, and the guard is dropped on every exit path.

use std::alloc::{self, Layout};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use super::synth::ChannelLayout;
use crate::error::RenderError;

const SAMPLE_BYTES: usize = mem::size_of::<f32>();

/// Raw byte region aligned for f32 access
struct FrameRegion {
    ptr: NonNull<u8>,
    capacity_bytes: usize,
}

// SAFETY: the region is uniquely owned; no aliasing pointers escape it.
unsafe impl Send for FrameRegion {}

impl FrameRegion {
    fn allocate(capacity_bytes: usize) -> Result<Self, RenderError> {
        if capacity_bytes == 0 {
            return Ok(Self {
                ptr: NonNull::<f32>::dangling().cast(),
                capacity_bytes: 0,
            });
        }

        let layout = Self::layout(capacity_bytes)?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(RenderError::AllocationFailed {
            requested_bytes: capacity_bytes,
        })?;

        Ok(Self {
            ptr,
            capacity_bytes,
        })
    }

    fn layout(capacity_bytes: usize) -> Result<Layout, RenderError> {
        Layout::from_size_align(capacity_bytes, mem::align_of::<f32>()).map_err(|_| {
            RenderError::AllocationFailed {
                requested_bytes: capacity_bytes,
            }
        })
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: ptr is valid for capacity_bytes (or dangling with length 0)
        // and was zero-initialised on allocation.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.capacity_bytes) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `bytes`, and `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity_bytes) }
    }
}

impl Drop for FrameRegion {
    fn drop(&mut self) {
        if self.capacity_bytes == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.capacity_bytes) {
            // SAFETY: allocated in `allocate` with this exact layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

/// One quantum of PCM data for a single stream
///
/// Submitting a frame moves it; the producer cannot keep or mutate a frame
/// it has handed downstream.
pub struct AudioFrame {
    region: FrameRegion,
    sample_count: usize,
    channel_count: u16,
    layout: ChannelLayout,
}

impl AudioFrame {
    /// Allocate a frame of exactly `sample_count × channel_count` samples.
    ///
    /// # Errors
    /// `RenderError::AllocationFailed` if the region cannot be sized (zero
    /// channels, byte-size overflow) or the allocator refuses it.
    pub fn new(
        sample_count: usize,
        channel_count: u16,
        layout: ChannelLayout,
    ) -> Result<Self, RenderError> {
        let bytes = Self::byte_size(sample_count, channel_count)?;
        Ok(Self {
            region: FrameRegion::allocate(bytes)?,
            sample_count,
            channel_count,
            layout,
        })
    }

    /// Allocate an empty frame able to hold `capacity_samples` f32 values.
    ///
    /// Used by the frame pool; the frame is sized for a quantum later with
    /// [`AudioFrame::resize_within_capacity`].
    pub fn with_capacity(capacity_samples: usize) -> Result<Self, RenderError> {
        let bytes = capacity_samples
            .checked_mul(SAMPLE_BYTES)
            .ok_or(RenderError::AllocationFailed {
                requested_bytes: usize::MAX,
            })?;
        Ok(Self {
            region: FrameRegion::allocate(bytes)?,
            sample_count: 0,
            channel_count: 1,
            layout: ChannelLayout::Interleaved,
        })
    }

    fn byte_size(sample_count: usize, channel_count: u16) -> Result<usize, RenderError> {
        if channel_count == 0 {
            return Err(RenderError::AllocationFailed { requested_bytes: 0 });
        }
        sample_count
            .checked_mul(channel_count as usize)
            .and_then(|n| n.checked_mul(SAMPLE_BYTES))
            .ok_or(RenderError::AllocationFailed {
                requested_bytes: usize::MAX,
            })
    }

    /// Re-size the frame for a new quantum without reallocating.
    ///
    /// # Errors
    /// `RenderError::AllocationFailed` if the new size does not fit the
    /// region's capacity; the frame keeps its previous size in that case.
    pub fn resize_within_capacity(
        &mut self,
        sample_count: usize,
        channel_count: u16,
        layout: ChannelLayout,
    ) -> Result<(), RenderError> {
        let bytes = Self::byte_size(sample_count, channel_count)?;
        if bytes > self.region.capacity_bytes {
            return Err(RenderError::AllocationFailed {
                requested_bytes: bytes,
            });
        }
        self.sample_count = sample_count;
        self.channel_count = channel_count;
        self.layout = layout;
        Ok(())
    }

    /// Sample-frames in this frame
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Total f32 values (`sample_count × channel_count`)
    pub fn len(&self) -> usize {
        self.sample_count * self.channel_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes covered by the current size
    pub fn byte_len(&self) -> usize {
        self.len() * SAMPLE_BYTES
    }

    /// Bytes reserved by the underlying region
    pub fn capacity_bytes(&self) -> usize {
        self.region.capacity_bytes
    }

    /// Lock the frame for writing.
    ///
    /// # Errors
    /// `RenderError::AllocationFailed` if the region cannot be viewed as
    /// f32 (misaligned or truncated); this indicates a corrupted frame.
    pub fn lock_buffer(&mut self) -> Result<FrameLock<'_>, RenderError> {
        let byte_len = self.byte_len();
        let bytes = &mut self.region.bytes_mut()[..byte_len];
        let samples = bytemuck::try_cast_slice_mut::<u8, f32>(bytes).map_err(|_| {
            RenderError::AllocationFailed {
                requested_bytes: byte_len,
            }
        })?;
        Ok(FrameLock { samples })
    }

    /// Read-only view of the frame's samples
    pub fn as_samples(&self) -> Result<&[f32], RenderError> {
        let byte_len = self.byte_len();
        bytemuck::try_cast_slice::<u8, f32>(&self.region.bytes()[..byte_len]).map_err(|_| {
            RenderError::AllocationFailed {
                requested_bytes: byte_len,
            }
        })
    }
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("sample_count", &self.sample_count)
            .field("channel_count", &self.channel_count)
            .field("layout", &self.layout)
            .field("capacity_bytes", &self.region.capacity_bytes)
            .finish()
    }
}

/// Write access to a locked frame; unlocks on drop
pub struct FrameLock<'a> {
    samples: &'a mut [f32],
}

impl FrameLock<'_> {
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.samples
    }
}

impl Deref for FrameLock<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        self.samples
    }
}

impl DerefMut for FrameLock<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        self.samples
    }
}
