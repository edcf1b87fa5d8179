//! Error types for the display module.

use thiserror::Error;

use pagecast_ipc::ReadinessTimeout;

/// Errors that can occur while managing the virtual display.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// The display server binary could not be launched.
    #[error("Failed to launch display server: {0}")]
    Spawn(#[source] std::io::Error),

    /// The display server exited before becoming ready.
    #[error("Display server exited early with {0}")]
    ExitedEarly(std::process::ExitStatus),

    /// The display server never became reachable.
    #[error(transparent)]
    NotReady(#[from] ReadinessTimeout),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
