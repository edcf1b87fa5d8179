//! Lifecycle notices sent from the encode pipeline to the supervisor.

use serde::{Deserialize, Serialize};

/// Lifecycle events reported by an encode pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// The encoder process was launched.
    Started {
        /// Redacted command line of the invocation.
        descriptor: String,
    },

    /// The encoder reported an error or exited unsuccessfully.
    Failed {
        /// Human readable cause.
        cause: String,
    },

    /// The encoder exited on its own without error.
    Ended,
}

impl PipelineEvent {
    /// Returns true if the pipeline is no longer producing output.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Ended)
    }

    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Failed { .. } => "failed",
            Self::Ended => "ended",
        }
    }
}

/// A pipeline event tagged with the generation of the pipeline that sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineNotice {
    /// Generation of the emitting pipeline instance.
    pub generation: u64,

    /// The event itself.
    pub event: PipelineEvent,
}

impl PipelineNotice {
    /// Create a notice for the given generation.
    pub fn new(generation: u64, event: PipelineEvent) -> Self {
        Self { generation, event }
    }
}
