//! Chromium session lifecycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetCacheDisabledParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::layout::Point;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::RenderError;
use crate::page::{click_point, launch_args, scroll_script, STYLE_SCRIPT};
use crate::{RenderResult, RenderSession, DESKTOP_USER_AGENT};

/// Everything needed to open the source page.
#[derive(Debug, Clone)]
pub struct RenderSpec {
    /// Page to load.
    pub url: String,

    /// Display the browser attaches to.
    pub display_id: String,

    /// Viewport width.
    pub width: u32,

    /// Viewport height.
    pub height: u32,

    /// Wait after load before the synthetic click.
    pub media_settle: Duration,

    /// Vertical scroll applied last.
    pub scroll_offset: u32,

    /// Explicit browser executable.
    pub chrome_path: Option<PathBuf>,
}

/// A Chromium instance driven over CDP.
pub struct ChromeSession {
    browser: Option<Browser>,
    page: Option<Page>,
    connected: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
}

impl ChromeSession {
    /// Launch the browser, load the page and run the post-load adjustments.
    ///
    /// Launch and navigation failures are returned. Adjustment failures are
    /// logged and skipped.
    #[instrument(name = "render_launch", skip(spec), fields(url = %spec.url))]
    pub async fn launch(spec: &RenderSpec) -> RenderResult<Self> {
        info!("Launching browser");

        let mut builder = BrowserConfig::builder()
            .with_head()
            .no_sandbox()
            .window_size(spec.width, spec.height)
            .viewport(None)
            .args(launch_args(&spec.display_id, spec.width, spec.height));
        if let Some(path) = &spec.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(RenderError::Config)?;

        let (browser, mut handler) = Browser::launch(config).await?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&connected);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
            flag.store(false, Ordering::SeqCst);
            warn!("Browser connection closed");
        });

        let mut session = Self {
            browser: Some(browser),
            page: None,
            connected,
            handler_task,
        };

        let page = match session.open(spec).await {
            Ok(page) => page,
            Err(e) => {
                let _ = session.close().await;
                return Err(e);
            }
        };
        info!("Page loaded");

        prepare_page(&page, spec).await;
        session.page = Some(page);

        info!("Render session ready");
        Ok(session)
    }

    async fn open(&self, spec: &RenderSpec) -> RenderResult<Page> {
        let browser = self.browser.as_ref().ok_or(RenderError::Disconnected)?;
        let page = browser.new_page(spec.url.as_str()).await?;
        page.wait_for_navigation().await?;
        Ok(page)
    }
}

#[async_trait]
impl RenderSession for ChromeSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    #[instrument(name = "render_close", skip(self))]
    async fn close(&mut self) -> RenderResult<()> {
        self.page = None;

        let result = match self.browser.take() {
            Some(mut browser) => {
                info!("Closing browser");
                browser.close().await.map(|_| ())
            }
            None => Ok(()),
        };

        self.handler_task.abort();
        self.connected.store(false, Ordering::SeqCst);
        result.map_err(RenderError::from)
    }
}

/// Post-load adjustments, in order. Each step is best-effort.
async fn prepare_page(page: &Page, spec: &RenderSpec) {
    step(
        "disable cache",
        page.execute(SetCacheDisabledParams::new(true)).await,
    );
    step(
        "pin user agent",
        page.execute(SetUserAgentOverrideParams::new(DESKTOP_USER_AGENT))
            .await,
    );

    debug!(settle_ms = spec.media_settle.as_millis() as u64, "Waiting for media to initialize");
    tokio::time::sleep(spec.media_settle).await;

    let (x, y) = click_point(spec.width, spec.height);
    step("synthetic click", page.click(Point::new(x, y)).await);
    step("inject styles", page.evaluate(STYLE_SCRIPT).await);

    if spec.scroll_offset > 0 {
        step(
            "apply scroll offset",
            page.evaluate(scroll_script(spec.scroll_offset)).await,
        );
    }
}

fn step<T>(name: &str, result: Result<T, CdpError>) {
    match result {
        Ok(_) => debug!(step = name, "Page adjustment applied"),
        Err(e) => warn!(step = name, "Page adjustment failed: {}", e),
    }
}
