//! Supervisor state machine types.

use serde::{Deserialize, Serialize};

/// The current state of the supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupervisorState {
    /// Bringing up subsystems in order.
    #[default]
    Bootstrapping,

    /// Steady state: the encoder is running and being watched.
    Streaming {
        /// Generation of the active encode pipeline.
        generation: u64,
    },

    /// Replacing a pipeline that stopped producing output.
    Restarting {
        /// Generation of the pipeline that stopped.
        generation: u64,

        /// Failures counted inside the current restart window.
        failures: u32,
    },

    /// Tearing down after a stop signal.
    Stopping,

    /// Terminal: the process must exit non-zero and be relaunched externally.
    FailedFatal {
        /// Why recovery was abandoned.
        reason: String,
    },
}

impl SupervisorState {
    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bootstrapping => "Bootstrapping",
            Self::Streaming { .. } => "Streaming",
            Self::Restarting { .. } => "Restarting",
            Self::Stopping => "Stopping",
            Self::FailedFatal { .. } => "FailedFatal",
        }
    }
}

/// Startup phases, in order. Audio must be the default sink before the
/// browser starts, so it comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Starting the audio daemon and virtual sink.
    StartAudio,

    /// Starting the virtual display server.
    StartDisplay,

    /// Launching the browser and preparing the page.
    LaunchRender,

    /// Launching the encoder.
    StartPipeline,
}

impl StartupPhase {
    /// The first phase.
    pub const FIRST: Self = Self::StartAudio;

    /// The last phase. Teardown walks back from here.
    pub const LAST: Self = Self::StartPipeline;

    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::StartAudio => Some(Self::StartDisplay),
            Self::StartDisplay => Some(Self::LaunchRender),
            Self::LaunchRender => Some(Self::StartPipeline),
            Self::StartPipeline => None,
        }
    }

    /// Returns the previous phase, if any (for teardown).
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::StartAudio => None,
            Self::StartDisplay => Some(Self::StartAudio),
            Self::LaunchRender => Some(Self::StartDisplay),
            Self::StartPipeline => Some(Self::LaunchRender),
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::StartAudio => "Starting audio",
            Self::StartDisplay => "Starting display",
            Self::LaunchRender => "Launching browser",
            Self::StartPipeline => "Starting encoder",
        }
    }
}
