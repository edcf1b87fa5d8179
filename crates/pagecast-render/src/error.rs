//! Error types for the render module.

use chromiumoxide::error::CdpError;
use thiserror::Error;

/// Errors that can occur while driving the browser.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Browser configuration was rejected.
    #[error("Invalid browser configuration: {0}")]
    Config(String),

    /// CDP protocol or launch error.
    #[error("Browser error: {0}")]
    Cdp(#[from] CdpError),

    /// The browser connection is gone.
    #[error("Browser disconnected")]
    Disconnected,
}
