//! The seam between the supervisor and the external engines.

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use pagecast_audio::SinkSpec;
use pagecast_display::{DisplayServer, DisplaySpec, XvfbServer};
use pagecast_encoder::{EncodePipeline, EncoderError, EncoderSpec, FfmpegPipeline};
use pagecast_ipc::{AudioSinkHandle, DisplayHandle, PipelineNotice, StreamConfig};
use pagecast_render::{ChromeSession, RenderSession, RenderSpec};

use crate::EngineResult;

/// Starts the four external subsystems.
///
/// The supervisor owns what these return and decides when to tear it down.
#[async_trait]
pub trait Subsystems: Send {
    /// Restart the audio daemon and create the default sink. Never fails;
    /// problems are reported through [`AudioSinkHandle::healthy`].
    async fn start_audio(&mut self, config: &StreamConfig) -> AudioSinkHandle;

    /// Start the virtual display.
    async fn start_display(&mut self, config: &StreamConfig)
        -> EngineResult<Box<dyn DisplayServer>>;

    /// Launch the browser on the display and prepare the page.
    async fn launch_render(
        &mut self,
        config: &StreamConfig,
        display: &DisplayHandle,
    ) -> EngineResult<Box<dyn RenderSession>>;

    /// Launch an encoder reporting lifecycle notices on `events`.
    async fn start_pipeline(
        &mut self,
        config: &StreamConfig,
        display: &DisplayHandle,
        audio: &AudioSinkHandle,
        generation: u64,
        events: Sender<PipelineNotice>,
    ) -> EngineResult<Box<dyn EncodePipeline>>;
}

/// Production subsystems: PulseAudio, Xvfb, Chromium and ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct SystemSubsystems {
    sink: SinkSpec,
}

impl SystemSubsystems {
    /// Create subsystems using the given audio sink.
    pub fn new(sink: SinkSpec) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Subsystems for SystemSubsystems {
    async fn start_audio(&mut self, _config: &StreamConfig) -> AudioSinkHandle {
        pagecast_audio::bootstrap(&self.sink).await
    }

    async fn start_display(
        &mut self,
        config: &StreamConfig,
    ) -> EngineResult<Box<dyn DisplayServer>> {
        let spec = DisplaySpec {
            id: config.display_id.clone(),
            width: config.frame_width,
            height: config.frame_height,
        };
        Ok(Box::new(XvfbServer::start(spec).await?))
    }

    async fn launch_render(
        &mut self,
        config: &StreamConfig,
        display: &DisplayHandle,
    ) -> EngineResult<Box<dyn RenderSession>> {
        let spec = RenderSpec {
            url: config.source_url.clone(),
            display_id: display.id.clone(),
            width: display.width,
            height: display.height,
            media_settle: config.media_settle,
            scroll_offset: config.scroll_offset,
            chrome_path: config.chrome_path.as_ref().map(Into::into),
        };
        Ok(Box::new(ChromeSession::launch(&spec).await?))
    }

    async fn start_pipeline(
        &mut self,
        config: &StreamConfig,
        display: &DisplayHandle,
        audio: &AudioSinkHandle,
        generation: u64,
        events: Sender<PipelineNotice>,
    ) -> EngineResult<Box<dyn EncodePipeline>> {
        let crop = config
            .crop_geometry()
            .ok_or(EncoderError::InvalidGeometry {
                width: config.frame_width,
                height: config.frame_height,
            })?;
        let spec = EncoderSpec {
            display: display.clone(),
            audio: audio.clone(),
            crop,
            tuning: config.encoder,
            destination: config.destination.clone(),
        };
        Ok(Box::new(FfmpegPipeline::start(&spec, generation, events).await?))
    }
}
