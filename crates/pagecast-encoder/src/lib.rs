//! ffmpeg capture/encode pipeline for pagecast.
//!
//! This crate grabs the virtual display and the audio sink's monitor source,
//! crops away browser chrome, scales back to the frame size, encodes with
//! low-latency H.264/AAC settings and pushes FLV to the destination.
//! Lifecycle changes are reported as [`PipelineNotice`]s on a channel.

mod args;
mod error;
mod pipeline;

pub use args::{describe, ffmpeg_args, EncoderSpec};
pub use error::EncoderError;
pub use pipeline::FfmpegPipeline;

pub use pagecast_ipc::PipelineNotice;

use std::time::Duration;

use async_trait::async_trait;

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Encoder binary.
pub const FFMPEG_BIN: &str = "ffmpeg";

/// x264 speed preset.
pub const X264_PRESET: &str = "veryfast";

/// Keyframe interval in seconds.
pub const KEYFRAME_INTERVAL_SECS: u32 = 2;

/// Audio channel count.
pub const AUDIO_CHANNELS: u32 = 2;

/// How long `stop` waits for the encoder to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running encode pipeline.
#[async_trait]
pub trait EncodePipeline: Send {
    /// Generation number of this instance.
    fn generation(&self) -> u64;

    /// Ask the encoder to stop and wait briefly for it to exit. No lifecycle
    /// notices are sent for this instance afterwards.
    async fn stop(&mut self) -> EncoderResult<()>;
}
