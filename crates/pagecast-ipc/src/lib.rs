//! Typed lifecycle messages and shared handles for pagecast.
//!
//! This crate defines the types passed between the supervisor and the
//! subsystems it drives: the validated stream configuration, the handles
//! produced by bootstrap, the encoder lifecycle notices and the supervisor
//! state machine.

mod events;
mod handles;
mod readiness;
mod state;
mod types;

pub use events::{PipelineEvent, PipelineNotice};
pub use handles::{AudioSinkHandle, DisplayHandle};
pub use readiness::{wait_until_ready, ReadinessTimeout};
pub use state::{StartupPhase, SupervisorState};
pub use types::{
    ComposedDestination, CropGeometry, CropInsets, EncoderTuning, RestartSettings, StreamConfig,
};

use tokio::sync::mpsc::{Receiver, Sender};

/// Channel capacity for pipeline notices (encoder -> supervisor).
pub const PIPELINE_CHANNEL_CAPACITY: usize = 16;

/// Creates a bounded pipeline notice channel.
pub fn pipeline_channel() -> (Sender<PipelineNotice>, Receiver<PipelineNotice>) {
    tokio::sync::mpsc::channel(PIPELINE_CHANNEL_CAPACITY)
}
