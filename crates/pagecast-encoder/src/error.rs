//! Error types for the encoder module.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while running the encode pipeline.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// The encoder binary could not be launched.
    #[error("Failed to launch encoder: {0}")]
    Spawn(#[source] std::io::Error),

    /// Crop insets leave nothing to encode.
    #[error("Invalid crop geometry for a {width}x{height} frame")]
    InvalidGeometry { width: u32, height: u32 },

    /// The encoder did not exit after being asked to stop.
    #[error("Encoder did not stop within {0:?}")]
    StopTimeout(Duration),

    /// The monitor task panicked or was cancelled.
    #[error("Encoder monitor task failed: {0}")]
    Monitor(String),
}
