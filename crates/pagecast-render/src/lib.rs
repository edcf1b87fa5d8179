//! Chromium render session driven over CDP.
//!
//! Launches a full-screen browser on the virtual display, loads the source
//! page, runs the post-load adjustments (cache off, user agent pinned,
//! synthetic click for autoplay, scrollbar/margin suppression, scroll
//! offset), and reports whether the browser connection is still alive.

mod error;
mod page;
mod session;

pub use error::RenderError;
pub use page::{click_point, launch_args, scroll_script, STYLE_SCRIPT};
pub use session::{ChromeSession, RenderSpec};

use async_trait::async_trait;

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Desktop user agent. Steers players toward broadly supported formats
/// instead of mobile variants.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// A live browser session rendering the source page.
#[async_trait]
pub trait RenderSession: Send {
    /// Whether the browser connection is still up.
    fn is_connected(&self) -> bool;

    /// Close the browser.
    async fn close(&mut self) -> RenderResult<()>;
}
