//! Sample synthesizer - sine generation into caller-provided buffers
//!
//! The reference tone locks its frequency to the requested block size: one full
//! cycle spans exactly `sample_count` sample-frames and the phase restarts at
//! zero on every block. The pitch therefore follows the quantum size. This is
//! reproduced as [`ToneMode::BlockLocked`]. [`ToneMode::Continuous`] keeps a
//! phase accumulator instead, so consecutive blocks join without a seam.
//!
//! Everything here is allocation-free and safe to call from the audio thread.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::error::RenderError;

/// Peak amplitude of the reference tone
pub const DEFAULT_AMPLITUDE: f32 = 0.3;

/// Sample ordering inside a multi-channel buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    /// `buf[frame * channels + channel]`
    #[default]
    Interleaved,
    /// `buf[channel * sample_count + frame]`
    Planar,
}

impl ChannelLayout {
    /// Index of `(frame, channel)` in a buffer of `channels × sample_count` values
    #[inline]
    pub fn index(self, frame: usize, channel: usize, channels: usize, sample_count: usize) -> usize {
        match self {
            ChannelLayout::Interleaved => frame * channels + channel,
            ChannelLayout::Planar => channel * sample_count + frame,
        }
    }
}

/// Frequency policy for generated frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ToneMode {
    /// Frequency equals the block size; phase restarts every block
    #[default]
    BlockLocked,
    /// Fixed frequency with phase carried across blocks
    Continuous { frequency_hz: f64 },
}

/// Fill `buffer` with one block-locked sine cycle at the reference amplitude.
///
/// `sample[i] = 0.3 × sin(i × 2π / sample_count)`, copied to every channel of
/// sample-frame `i`.
///
/// # Returns
/// Number of values written (`sample_count × channel_count`)
///
/// # Errors
/// * `RenderError::InvalidFormat` - `channel_count` or `sample_rate` is zero
/// * `RenderError::BufferTooSmall` - `buffer` holds fewer than
///   `sample_count × channel_count` floats
pub fn synthesize(
    channel_count: u16,
    sample_count: usize,
    sample_rate: u32,
    layout: ChannelLayout,
    buffer: &mut [f32],
) -> Result<usize, RenderError> {
    SineVoice::default().render(channel_count, sample_count, sample_rate, layout, buffer)
}

fn check_capacity(
    channel_count: u16,
    sample_count: usize,
    sample_rate: u32,
    capacity: usize,
) -> Result<usize, RenderError> {
    if channel_count == 0 || sample_rate == 0 {
        return Err(RenderError::InvalidFormat);
    }
    let required = sample_count
        .checked_mul(channel_count as usize)
        .ok_or(RenderError::BufferTooSmall {
            required: usize::MAX,
            capacity,
        })?;
    if capacity < required {
        return Err(RenderError::BufferTooSmall { required, capacity });
    }
    Ok(required)
}

#[inline]
fn write_all_channels(
    buffer: &mut [f32],
    layout: ChannelLayout,
    channels: usize,
    sample_count: usize,
    frame: usize,
    value: f32,
) {
    for ch in 0..channels {
        buffer[layout.index(frame, ch, channels, sample_count)] = value;
    }
}

/// Per-stream sine generator
///
/// Holds the amplitude, the frequency policy, and (for continuous tones) the
/// running phase. One voice belongs to exactly one stream.
#[derive(Debug, Clone)]
pub struct SineVoice {
    amplitude: f32,
    mode: ToneMode,
    phase: f64,
}

impl SineVoice {
    pub fn new(amplitude: f32, mode: ToneMode) -> Self {
        Self {
            amplitude,
            mode,
            phase: 0.0,
        }
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn mode(&self) -> ToneMode {
        self.mode
    }

    /// Current phase in radians, always within `[0, 2π)`
    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Render `sample_count` sample-frames into `buffer`.
    ///
    /// Same contract as [`synthesize`], with this voice's amplitude and mode.
    pub fn render(
        &mut self,
        channel_count: u16,
        sample_count: usize,
        sample_rate: u32,
        layout: ChannelLayout,
        buffer: &mut [f32],
    ) -> Result<usize, RenderError> {
        let required = check_capacity(channel_count, sample_count, sample_rate, buffer.len())?;
        if sample_count == 0 {
            return Ok(0);
        }

        let channels = channel_count as usize;
        let amplitude = self.amplitude as f64;
        match self.mode {
            ToneMode::BlockLocked => {
                let increment = TAU / sample_count as f64;
                for i in 0..sample_count {
                    let value = (amplitude * (i as f64 * increment).sin()) as f32;
                    write_all_channels(buffer, layout, channels, sample_count, i, value);
                }
            }
            ToneMode::Continuous { frequency_hz } => {
                let increment = TAU * frequency_hz / sample_rate as f64;
                let mut phase = self.phase;
                for i in 0..sample_count {
                    let value = (amplitude * phase.sin()) as f32;
                    write_all_channels(buffer, layout, channels, sample_count, i, value);
                    phase = (phase + increment).rem_euclid(TAU);
                }
                self.phase = phase;
            }
        }

        Ok(required)
    }
}

impl Default for SineVoice {
    fn default() -> Self {
        Self::new(DEFAULT_AMPLITUDE, ToneMode::BlockLocked)
    }
}
