//! Error types for the audio module.

use thiserror::Error;

use pagecast_ipc::ReadinessTimeout;

/// Errors that can occur during audio setup.
#[derive(Debug, Error)]
pub enum AudioError {
    /// A helper binary could not be launched.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A helper command exited unsuccessfully.
    #[error("`{command}` failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// The daemon never answered.
    #[error(transparent)]
    NotReady(#[from] ReadinessTimeout),
}
