//! Configuration management for the synthesis pipeline
//!
//! This module provides runtime configuration loading from JSON files so graph
//! timing, stream layout, and tone parameters can be adjusted without
//! recompiling. Missing or malformed files fall back to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::frame_pool::DEFAULT_FRAME_COUNT;
use crate::audio::synth::{ChannelLayout, ToneMode, DEFAULT_AMPLITUDE};
use crate::error::AudioError;

/// Upper bound on channels per stream and on output channels
pub const MAX_CHANNELS: u16 = 32;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub streams: StreamSetConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
}

/// Settings used when creating an audio graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Graph sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the device output node
    pub output_channels: u16,
    /// Largest quantum the graph will ever request, in sample-frames
    pub max_quantum_samples: usize,
    /// Pre-allocated frames per stream
    pub frame_pool_size: usize,
    /// Capacity of each stream's drop-report queue
    pub report_queue_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            output_channels: 2,
            // 100ms at 48kHz; platform quanta are typically 10ms
            max_quantum_samples: 4800,
            frame_pool_size: DEFAULT_FRAME_COUNT,
            report_queue_capacity: 64,
        }
    }
}

impl GraphConfig {
    /// Reject settings the graph cannot be built with
    pub fn validate(&self) -> Result<(), AudioError> {
        let reason = if self.sample_rate == 0 {
            Some("sample_rate must be greater than 0".to_string())
        } else if self.output_channels == 0 || self.output_channels > MAX_CHANNELS {
            Some(format!(
                "output_channels must be in 1..={} (got {})",
                MAX_CHANNELS, self.output_channels
            ))
        } else if self.max_quantum_samples == 0 {
            Some("max_quantum_samples must be greater than 0".to_string())
        } else if self.frame_pool_size == 0 {
            Some("frame_pool_size must be greater than 0".to_string())
        } else if self.report_queue_capacity == 0 {
            Some("report_queue_capacity must be greater than 0".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => Err(AudioError::InvalidConfiguration { reason }),
            None => Ok(()),
        }
    }
}

/// Stream set layout applied on configure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSetConfig {
    /// Number of independent producer streams
    pub stream_count: usize,
    /// Channels per stream
    pub channel_count: u16,
    /// Sample ordering inside produced frames
    #[serde(default)]
    pub layout: ChannelLayout,
}

impl Default for StreamSetConfig {
    fn default() -> Self {
        Self {
            stream_count: 1,
            channel_count: 2,
            layout: ChannelLayout::Interleaved,
        }
    }
}

/// Tone generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Peak amplitude of the generated sine
    pub amplitude: f32,
    /// Frequency policy
    #[serde(default)]
    pub tone: ToneMode,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            amplitude: DEFAULT_AMPLITUDE,
            tone: ToneMode::BlockLocked,
        }
    }
}

impl SynthesisConfig {
    /// Reject tone parameters that would put non-finite samples on the output
    pub fn validate(&self) -> Result<(), AudioError> {
        let reason = if !self.amplitude.is_finite() {
            Some(format!("amplitude must be finite (got {})", self.amplitude))
        } else {
            match self.tone {
                ToneMode::Continuous { frequency_hz }
                    if !frequency_hz.is_finite() || frequency_hz <= 0.0 =>
                {
                    Some(format!(
                        "frequency_hz must be finite and greater than 0 (got {})",
                        frequency_hz
                    ))
                }
                _ => None,
            }
        };

        match reason {
            Some(reason) => Err(AudioError::InvalidConfiguration { reason }),
            None => Ok(()),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults if the file doesn't exist
    /// or the JSON is invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/quantum_synth.json")
    }
}
