//! Handles owned by the supervisor and their teardown.

use tracing::{debug, info, instrument, warn};

use pagecast_display::DisplayServer;
use pagecast_encoder::EncodePipeline;
use pagecast_ipc::{AudioSinkHandle, DisplayHandle, StartupPhase};
use pagecast_render::RenderSession;

use crate::error::EngineError;
use crate::EngineResult;

/// Resources that have been initialized during startup.
#[derive(Default)]
pub(crate) struct Resources {
    /// Virtual audio sink.
    pub audio: Option<AudioSinkHandle>,

    /// Virtual display server.
    pub display: Option<Box<dyn DisplayServer>>,

    /// Browser session.
    pub render: Option<Box<dyn RenderSession>>,

    /// Active encoder. At most one at a time.
    pub pipeline: Option<Box<dyn EncodePipeline>>,
}

impl Resources {
    pub fn display_handle(&self) -> EngineResult<DisplayHandle> {
        self.display
            .as_ref()
            .map(|display| display.handle().clone())
            .ok_or(EngineError::MissingResource("virtual display"))
    }

    pub fn audio_handle(&self) -> EngineResult<AudioSinkHandle> {
        self.audio
            .clone()
            .ok_or(EngineError::MissingResource("audio sink"))
    }

    /// Whether the browser is still connected. No session counts as dead.
    pub fn render_connected(&self) -> bool {
        self.render
            .as_ref()
            .is_some_and(|render| render.is_connected())
    }

    /// Generation of the active pipeline, if any.
    pub fn pipeline_generation(&self) -> Option<u64> {
        self.pipeline.as_ref().map(|pipeline| pipeline.generation())
    }

    /// Take the active pipeline and ask it to stop. Errors are ignored; the
    /// process may already be gone.
    pub async fn discard_pipeline(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            let generation = pipeline.generation();
            if let Err(e) = pipeline.stop().await {
                debug!(generation, "Ignoring encoder stop error: {}", e);
            }
        }
    }

    /// Tear everything down in reverse startup order. Each step is
    /// independent: a failure is logged and the next step still runs.
    #[instrument(name = "teardown_resources", skip(self))]
    pub async fn teardown(&mut self) {
        let mut phase = StartupPhase::LAST;
        loop {
            self.teardown_phase(phase).await;

            match phase.previous() {
                Some(prev) => phase = prev,
                None => break,
            }
        }
    }

    async fn teardown_phase(&mut self, phase: StartupPhase) {
        match phase {
            StartupPhase::StartPipeline => {
                if let Some(mut pipeline) = self.pipeline.take() {
                    info!(generation = pipeline.generation(), "Stopping encoder");
                    if let Err(e) = pipeline.stop().await {
                        warn!("Encoder stop failed: {}", e);
                    }
                }
            }
            StartupPhase::LaunchRender => {
                if let Some(mut render) = self.render.take() {
                    info!("Closing render session");
                    if let Err(e) = render.close().await {
                        warn!("Render session close failed: {}", e);
                    }
                }
            }
            StartupPhase::StartDisplay => {
                if let Some(mut display) = self.display.take() {
                    info!("Stopping virtual display");
                    if let Err(e) = display.stop().await {
                        warn!("Display stop failed: {}", e);
                    }
                }
            }
            StartupPhase::StartAudio => {
                // The audio daemon keeps no state worth tearing down.
                self.audio = None;
            }
        }
    }
}
