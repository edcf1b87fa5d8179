//! Error types for the engine.

use thiserror::Error;

use pagecast_display::DisplayError;
use pagecast_encoder::EncoderError;
use pagecast_render::RenderError;

/// Errors that reach the supervisor.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The virtual display could not be brought up.
    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    /// The browser could not be launched or the page could not be loaded.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// The encoder could not be started.
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    /// A later phase ran before the resource it depends on existed.
    #[error("{0} is not available")]
    MissingResource(&'static str),
}
