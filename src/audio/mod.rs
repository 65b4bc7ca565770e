// Audio module - frame synthesis and real-time buffer management

pub mod frame;
pub mod frame_pool;
pub mod producer;
pub mod synth;

// Re-export commonly used types for convenience
pub use frame::{AudioFrame, FrameLock};
pub use frame_pool::{FramePool, FramePoolChannels, MixChannels, SubmitChannels, DEFAULT_FRAME_COUNT};
pub use producer::{DropReport, FrameProducer, StreamStats, StreamStatsSnapshot};
pub use synth::{synthesize, ChannelLayout, SineVoice, ToneMode, DEFAULT_AMPLITUDE};
