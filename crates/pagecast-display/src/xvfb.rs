//! Xvfb process lifecycle.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, instrument, warn};

use pagecast_ipc::{wait_until_ready, DisplayHandle};

use crate::error::DisplayError;
use crate::{DisplayResult, DisplayServer, COLOR_DEPTH, READY_POLL_INTERVAL, READY_TIMEOUT};

/// What to ask the display server for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySpec {
    /// Display identifier, e.g. `:99`.
    pub id: String,

    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,
}

impl DisplaySpec {
    fn number(&self) -> &str {
        self.id.trim_start_matches(':')
    }

    /// Unix socket the server listens on once ready.
    pub fn socket_path(&self) -> PathBuf {
        PathBuf::from(format!("/tmp/.X11-unix/X{}", self.number()))
    }

    /// Lock file left behind by a server that was killed.
    pub fn lock_path(&self) -> PathBuf {
        PathBuf::from(format!("/tmp/.X{}-lock", self.number()))
    }
}

/// Command line arguments for Xvfb.
pub fn xvfb_args(spec: &DisplaySpec) -> Vec<String> {
    vec![
        spec.id.clone(),
        "-screen".to_string(),
        "0".to_string(),
        format!("{}x{}x{}", spec.width, spec.height, COLOR_DEPTH),
        "-ac".to_string(),
        "-nolisten".to_string(),
        "tcp".to_string(),
    ]
}

/// A running Xvfb instance.
pub struct XvfbServer {
    handle: DisplayHandle,
    child: Option<Child>,
}

impl XvfbServer {
    /// Start Xvfb and wait until its socket accepts clients.
    ///
    /// Consumers are pointed at the display explicitly (`--display` for the
    /// browser, the grab input for the encoder); the process environment is
    /// left untouched.
    #[instrument(name = "display_start", skip(spec), fields(display = %spec.id))]
    pub async fn start(spec: DisplaySpec) -> DisplayResult<Self> {
        let args = xvfb_args(&spec);
        Self::start_with("Xvfb", args, spec).await
    }

    async fn start_with(
        program: &str,
        args: Vec<String>,
        spec: DisplaySpec,
    ) -> DisplayResult<Self> {
        clear_stale_files(&spec).await;

        info!(
            width = spec.width,
            height = spec.height,
            depth = COLOR_DEPTH,
            "Starting virtual display"
        );

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DisplayError::Spawn)?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "pagecast_display::xvfb", "{}", line);
                }
            });
        }

        // Ready means the socket exists while the server is still running.
        let socket = spec.socket_path();
        tokio::select! {
            status = child.wait() => {
                return Err(DisplayError::ExitedEarly(status?));
            }
            ready = wait_until_ready("virtual display", READY_TIMEOUT, READY_POLL_INTERVAL, || {
                let socket = socket.clone();
                async move { tokio::fs::try_exists(&socket).await.unwrap_or(false) }
            }) => ready?,
        }

        info!("Virtual display ready");

        Ok(Self {
            handle: DisplayHandle {
                id: spec.id,
                width: spec.width,
                height: spec.height,
            },
            child: Some(child),
        })
    }
}

#[async_trait]
impl DisplayServer for XvfbServer {
    fn handle(&self) -> &DisplayHandle {
        &self.handle
    }

    #[instrument(name = "display_stop", skip(self), fields(display = %self.handle.id))]
    async fn stop(&mut self) -> DisplayResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        debug!("Killing Xvfb");
        if child.try_wait()?.is_none() {
            child.start_kill()?;
        }
        let status = child.wait().await?;
        debug!(?status, "Virtual display exited");
        Ok(())
    }
}

/// Remove the lock and socket of a previous server on the same display.
async fn clear_stale_files(spec: &DisplaySpec) {
    for path in [spec.lock_path(), spec.socket_path()] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => warn!(path = %path.display(), "Removed stale display file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "Could not remove stale display file: {}", e),
        }
    }
}
