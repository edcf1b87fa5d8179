//! Xvfb virtual display server management.
//!
//! The display is started once per process and lives until shutdown. The
//! browser renders into it and the encoder grabs frames from it.

mod error;
mod xvfb;

pub use error::DisplayError;
pub use xvfb::{xvfb_args, DisplaySpec, XvfbServer};

use std::time::Duration;

use async_trait::async_trait;
use pagecast_ipc::DisplayHandle;

/// Result type for display operations.
pub type DisplayResult<T> = Result<T, DisplayError>;

/// Color depth requested from the display server.
pub const COLOR_DEPTH: u8 = 24;

/// How long to wait for the X socket to appear.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between readiness probes.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A running virtual display.
#[async_trait]
pub trait DisplayServer: Send {
    /// Handle consumers attach to.
    fn handle(&self) -> &DisplayHandle;

    /// Terminate the display server.
    async fn stop(&mut self) -> DisplayResult<()>;
}
