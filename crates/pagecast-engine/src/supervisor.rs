//! Top-level state machine: startup sequencing and encoder recovery.

use std::future::Future;
use std::pin::Pin;
use std::process::ExitCode;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use pagecast_ipc::{
    pipeline_channel, PipelineEvent, PipelineNotice, StartupPhase, StreamConfig, SupervisorState,
};

use crate::policy::RestartPolicy;
use crate::resources::Resources;
use crate::subsystems::Subsystems;
use crate::EngineResult;

/// How a supervisor run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Stopped by a stop signal. Exit 0.
    Shutdown,

    /// Recovery abandoned. Exit non-zero so the process manager relaunches us.
    Fatal { reason: String },
}

impl Outcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Shutdown => ExitCode::SUCCESS,
            Self::Fatal { .. } => ExitCode::FAILURE,
        }
    }
}

/// Owns startup order, the encoder's lifecycle and the recovery decision.
pub struct Supervisor<S: Subsystems> {
    config: StreamConfig,
    subsystems: S,
    state: Arc<RwLock<SupervisorState>>,
    restarts: RestartPolicy,
    next_generation: u64,
    events_tx: Sender<PipelineNotice>,
    events_rx: Receiver<PipelineNotice>,
}

impl<S: Subsystems> Supervisor<S> {
    /// Create a supervisor. Nothing is started until [`Supervisor::run`].
    pub fn new(config: StreamConfig, subsystems: S) -> Self {
        let (events_tx, events_rx) = pipeline_channel();
        Self {
            restarts: RestartPolicy::new(config.restart),
            config,
            subsystems,
            state: Arc::new(RwLock::new(SupervisorState::Bootstrapping)),
            next_generation: 1,
            events_tx,
            events_rx,
        }
    }

    /// Shared view of the current state.
    pub fn state_handle(&self) -> Arc<RwLock<SupervisorState>> {
        Arc::clone(&self.state)
    }

    /// Bootstrap, then react to encoder events until `shutdown` resolves or
    /// recovery is abandoned.
    #[instrument(name = "supervisor_run", skip_all)]
    pub async fn run<F>(mut self, shutdown: F) -> Outcome
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let mut resources = Resources::default();

        info!(
            destination = %self.config.destination,
            source = %self.config.source_url,
            "Supervisor starting"
        );

        let bootstrap = tokio::select! {
            result = self.bootstrap(&mut resources) => Some(result),
            _ = shutdown.as_mut() => None,
        };

        match bootstrap {
            None => return self.shutdown(&mut resources).await,
            Some(Err(e)) => {
                error!("Bootstrap failed: {}", e);
                return self.fail(&mut resources, format!("bootstrap failed: {e}")).await;
            }
            Some(Ok(generation)) => {
                self.transition_to(SupervisorState::Streaming { generation });
                info!("Streaming");
            }
        }

        loop {
            let notice = tokio::select! {
                _ = shutdown.as_mut() => return self.shutdown(&mut resources).await,
                notice = self.events_rx.recv() => notice,
            };

            // We hold a sender, so the channel cannot close underneath us.
            let Some(notice) = notice else {
                return self
                    .fail(&mut resources, "pipeline event channel closed".to_string())
                    .await;
            };

            if resources.pipeline_generation() != Some(notice.generation) {
                debug!(
                    generation = notice.generation,
                    event = notice.event.name(),
                    "Ignoring event from a replaced encoder"
                );
                continue;
            }

            if !notice.event.is_terminal() {
                if let PipelineEvent::Started { descriptor } = &notice.event {
                    info!(generation = notice.generation, command = %descriptor, "Encoder started");
                }
                continue;
            }

            match &notice.event {
                PipelineEvent::Failed { cause } => {
                    warn!(generation = notice.generation, %cause, "Encoder failed");
                }
                _ => warn!(generation = notice.generation, "Encoder ended"),
            }

            if let Some(outcome) = self
                .recover(&mut resources, notice.generation, shutdown.as_mut())
                .await
            {
                return outcome;
            }
        }
    }

    /// Bring up every subsystem in order. Returns the first pipeline generation.
    async fn bootstrap(&mut self, resources: &mut Resources) -> EngineResult<u64> {
        let mut phase = StartupPhase::FIRST;

        loop {
            info!("{}", phase.name());
            self.init_phase(resources, phase).await?;

            match phase.next() {
                Some(next) => phase = next,
                None => break,
            }
        }

        resources
            .pipeline_generation()
            .ok_or(crate::EngineError::MissingResource("encoder"))
    }

    /// Initialize a single phase.
    async fn init_phase(
        &mut self,
        resources: &mut Resources,
        phase: StartupPhase,
    ) -> EngineResult<()> {
        match phase {
            StartupPhase::StartAudio => {
                let audio = self.subsystems.start_audio(&self.config).await;
                if !audio.healthy {
                    warn!(sink = %audio.sink_name, "Audio setup incomplete");
                }
                resources.audio = Some(audio);
            }
            StartupPhase::StartDisplay => {
                let display = self.subsystems.start_display(&self.config).await?;
                resources.display = Some(display);
            }
            StartupPhase::LaunchRender => {
                let display = resources.display_handle()?;
                let render = self
                    .subsystems
                    .launch_render(&self.config, &display)
                    .await?;
                resources.render = Some(render);
            }
            StartupPhase::StartPipeline => {
                self.start_pipeline(resources).await?;
            }
        }
        Ok(())
    }

    /// Start a new encoder. The previous one must already be discarded.
    async fn start_pipeline(&mut self, resources: &mut Resources) -> EngineResult<u64> {
        debug_assert!(resources.pipeline.is_none());

        let display = resources.display_handle()?;
        let audio = resources.audio_handle()?;
        let generation = self.next_generation;
        self.next_generation += 1;

        let pipeline = self
            .subsystems
            .start_pipeline(
                &self.config,
                &display,
                &audio,
                generation,
                self.events_tx.clone(),
            )
            .await?;
        resources.pipeline = Some(pipeline);
        Ok(generation)
    }

    /// Handle an encoder that stopped producing output.
    ///
    /// Returns `None` once a replacement is streaming, or the outcome if the
    /// process must exit.
    async fn recover<F>(
        &mut self,
        resources: &mut Resources,
        mut generation: u64,
        mut shutdown: Pin<&mut F>,
    ) -> Option<Outcome>
    where
        F: Future<Output = ()>,
    {
        loop {
            let failures = self.restarts.record_failure(Instant::now());
            self.transition_to(SupervisorState::Restarting {
                generation,
                failures,
            });

            resources.discard_pipeline().await;

            if !resources.render_connected() {
                error!("Render session disconnected, full restart required");
                return Some(
                    self.fail(resources, "render session disconnected".to_string())
                        .await,
                );
            }

            if !self.restarts.should_retry(failures) {
                let window = self.restarts.settings().window;
                error!(failures, ?window, "Encoder keeps failing, giving up");
                return Some(
                    self.fail(
                        resources,
                        format!("encoder failed {failures} times within {window:?}"),
                    )
                    .await,
                );
            }

            let delay = self.restarts.delay_for_attempt(failures);
            info!(
                delay_ms = delay.as_millis() as u64,
                failures, "Restarting encoder"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.as_mut() => return Some(self.shutdown(resources).await),
            }

            match self.start_pipeline(resources).await {
                Ok(next) => {
                    self.transition_to(SupervisorState::Streaming { generation: next });
                    info!(generation = next, "Encoder restarted");
                    return None;
                }
                Err(e) => {
                    warn!("Encoder restart failed: {}", e);
                    generation = self.next_generation - 1;
                }
            }
        }
    }

    /// Graceful shutdown: tear down in reverse order and report success
    /// whatever the individual steps did.
    async fn shutdown(&mut self, resources: &mut Resources) -> Outcome {
        info!("Stop signal received, shutting down");
        self.transition_to(SupervisorState::Stopping);
        resources.teardown().await;
        info!("Shutdown complete");
        Outcome::Shutdown
    }

    /// Abandon recovery. Resources are released best-effort before exiting.
    async fn fail(&mut self, resources: &mut Resources, reason: String) -> Outcome {
        self.transition_to(SupervisorState::FailedFatal {
            reason: reason.clone(),
        });
        resources.teardown().await;
        error!(%reason, "Exiting for a full restart");
        Outcome::Fatal { reason }
    }

    fn transition_to(&self, new_state: SupervisorState) {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, new_state.clone())
        };

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use pagecast_display::{DisplayError, DisplayResult, DisplayServer};
    use pagecast_encoder::{EncodePipeline, EncoderError, EncoderResult};
    use pagecast_ipc::{
        AudioSinkHandle, ComposedDestination, CropInsets, DisplayHandle, EncoderTuning,
        RestartSettings,
    };
    use pagecast_render::{RenderError, RenderResult, RenderSession};

    use crate::EngineError;

    /// What a fake encoder does when started.
    enum Script {
        /// Spawn, report `Started`, then these notices. `Some(n)` overrides
        /// the generation the notice is tagged with.
        Run(Vec<(Option<u64>, PipelineEvent)>),
        /// Fail to spawn.
        FailToStart,
    }

    /// Shared call log for the fakes.
    #[derive(Clone, Default)]
    struct CallLog {
        log: Arc<Mutex<Vec<String>>>,
        starts: Arc<Mutex<Vec<Instant>>>,
    }

    impl CallLog {
        fn push(&self, entry: impl Into<String>) {
            self.log.lock().push(entry.into());
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.log
                .lock()
                .iter()
                .filter(|entry| entry.starts_with(prefix))
                .count()
        }

        fn start_gaps(&self) -> Vec<Duration> {
            let starts = self.starts.lock();
            starts.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    struct FakeDisplay {
        handle: DisplayHandle,
        calls: CallLog,
        fail_stop: bool,
    }

    #[async_trait]
    impl DisplayServer for FakeDisplay {
        fn handle(&self) -> &DisplayHandle {
            &self.handle
        }

        async fn stop(&mut self) -> DisplayResult<()> {
            self.calls.push("stop_display");
            if self.fail_stop {
                return Err(DisplayError::Io(std::io::Error::other("stuck")));
            }
            Ok(())
        }
    }

    struct FakeRender {
        connected: Arc<AtomicBool>,
        calls: CallLog,
        fail_close: bool,
    }

    #[async_trait]
    impl RenderSession for FakeRender {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn close(&mut self) -> RenderResult<()> {
            self.calls.push("close_render");
            if self.fail_close {
                return Err(RenderError::Disconnected);
            }
            Ok(())
        }
    }

    struct FakePipeline {
        generation: u64,
        calls: CallLog,
        fail_stop: bool,
    }

    #[async_trait]
    impl EncodePipeline for FakePipeline {
        fn generation(&self) -> u64 {
            self.generation
        }

        async fn stop(&mut self) -> EncoderResult<()> {
            self.calls.push(format!("stop_pipeline:{}", self.generation));
            if self.fail_stop {
                return Err(EncoderError::StopTimeout(Duration::from_secs(5)));
            }
            Ok(())
        }
    }

    struct FakeSubsystems {
        calls: CallLog,
        connected: Arc<AtomicBool>,
        scripts: VecDeque<Script>,
        fail_display: bool,
        fail_teardown: bool,
        /// Drop the browser connection when this generation starts.
        disconnect_at: Option<u64>,
    }

    impl FakeSubsystems {
        fn new(calls: &CallLog, scripts: Vec<Script>) -> Self {
            Self {
                calls: calls.clone(),
                connected: Arc::new(AtomicBool::new(true)),
                scripts: scripts.into(),
                fail_display: false,
                fail_teardown: false,
                disconnect_at: None,
            }
        }
    }

    #[async_trait]
    impl Subsystems for FakeSubsystems {
        async fn start_audio(&mut self, _config: &StreamConfig) -> AudioSinkHandle {
            self.calls.push("start_audio");
            AudioSinkHandle {
                sink_name: "fake".into(),
                healthy: true,
            }
        }

        async fn start_display(
            &mut self,
            config: &StreamConfig,
        ) -> EngineResult<Box<dyn DisplayServer>> {
            self.calls.push("start_display");
            if self.fail_display {
                return Err(EngineError::Display(DisplayError::Spawn(
                    std::io::Error::other("no Xvfb"),
                )));
            }
            Ok(Box::new(FakeDisplay {
                handle: DisplayHandle {
                    id: config.display_id.clone(),
                    width: config.frame_width,
                    height: config.frame_height,
                },
                calls: self.calls.clone(),
                fail_stop: self.fail_teardown,
            }))
        }

        async fn launch_render(
            &mut self,
            _config: &StreamConfig,
            _display: &DisplayHandle,
        ) -> EngineResult<Box<dyn RenderSession>> {
            self.calls.push("launch_render");
            Ok(Box::new(FakeRender {
                connected: Arc::clone(&self.connected),
                calls: self.calls.clone(),
                fail_close: self.fail_teardown,
            }))
        }

        async fn start_pipeline(
            &mut self,
            _config: &StreamConfig,
            _display: &DisplayHandle,
            _audio: &AudioSinkHandle,
            generation: u64,
            events: Sender<PipelineNotice>,
        ) -> EngineResult<Box<dyn EncodePipeline>> {
            self.calls.push(format!("start_pipeline:{generation}"));
            self.calls.starts.lock().push(Instant::now());
            if self.disconnect_at == Some(generation) {
                self.connected.store(false, Ordering::SeqCst);
            }

            match self.scripts.pop_front().unwrap_or(Script::Run(vec![])) {
                Script::FailToStart => Err(EngineError::Encoder(EncoderError::Spawn(
                    std::io::Error::other("no ffmpeg"),
                ))),
                Script::Run(notices) => {
                    let started = PipelineEvent::Started {
                        descriptor: format!("fake #{generation}"),
                    };
                    events
                        .try_send(PipelineNotice::new(generation, started))
                        .unwrap();
                    for (tag, event) in notices {
                        events
                            .try_send(PipelineNotice::new(tag.unwrap_or(generation), event))
                            .unwrap();
                    }
                    Ok(Box::new(FakePipeline {
                        generation,
                        calls: self.calls.clone(),
                        fail_stop: self.fail_teardown,
                    }))
                }
            }
        }
    }

    fn config(max_failures: Option<u32>) -> StreamConfig {
        StreamConfig {
            destination: ComposedDestination::compose("rtmp://x/live", "abc"),
            source_url: "https://y/dash".into(),
            display_id: ":99".into(),
            frame_width: 1280,
            frame_height: 720,
            crop: CropInsets::default(),
            scroll_offset: 0,
            media_settle: Duration::from_secs(1),
            encoder: EncoderTuning::default(),
            restart: RestartSettings {
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(60),
                max_failures,
                window: Duration::from_secs(600),
            },
            chrome_path: None,
        }
    }

    fn failed() -> PipelineEvent {
        PipelineEvent::Failed {
            cause: "broken pipe".into(),
        }
    }

    /// Stop signal that fires once the paused clock reaches `secs`.
    fn stop_after(secs: u64) -> tokio::time::Sleep {
        tokio::time::sleep(Duration::from_secs(secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ended_while_connected_restarts_once() {
        let calls = CallLog::default();
        let fake = FakeSubsystems::new(
            &calls,
            vec![Script::Run(vec![(None, PipelineEvent::Ended)])],
        );

        let supervisor = Supervisor::new(config(Some(10)), fake);
        let state = supervisor.state_handle();
        let outcome = supervisor.run(stop_after(30)).await;

        assert_eq!(outcome, Outcome::Shutdown);
        assert_eq!(*state.read(), SupervisorState::Stopping);
        assert_eq!(
            calls.log(),
            vec![
                "start_audio",
                "start_display",
                "launch_render",
                "start_pipeline:1",
                "stop_pipeline:1",
                "start_pipeline:2",
                "stop_pipeline:2",
                "close_render",
                "stop_display",
            ]
        );
        assert_eq!(calls.start_gaps(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_while_disconnected_exits_fatally() {
        let calls = CallLog::default();
        let fake = FakeSubsystems::new(&calls, vec![Script::Run(vec![(None, failed())])]);
        fake.connected.store(false, Ordering::SeqCst);

        let supervisor = Supervisor::new(config(Some(10)), fake);
        let state = supervisor.state_handle();
        let outcome = supervisor.run(std::future::pending()).await;

        assert!(matches!(&outcome, Outcome::Fatal { reason } if reason.contains("render")));
        assert!(matches!(*state.read(), SupervisorState::FailedFatal { .. }));
        assert_eq!(calls.count("start_pipeline"), 1);
        assert_eq!(
            calls.log()[3..].to_vec(),
            vec!["start_pipeline:1", "stop_pipeline:1", "close_render", "stop_display"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_after_successful_restart_is_fatal() {
        let calls = CallLog::default();
        let mut fake = FakeSubsystems::new(
            &calls,
            vec![
                Script::Run(vec![(None, PipelineEvent::Ended)]),
                Script::Run(vec![(None, failed())]),
            ],
        );
        fake.disconnect_at = Some(2);

        let supervisor = Supervisor::new(config(None), fake);
        let state = supervisor.state_handle();
        let outcome = supervisor.run(std::future::pending()).await;

        assert!(matches!(&outcome, Outcome::Fatal { reason } if reason.contains("render")));
        assert!(matches!(*state.read(), SupervisorState::FailedFatal { .. }));
        assert_eq!(calls.count("start_pipeline"), 2);
        assert_eq!(
            calls.log()[3..].to_vec(),
            vec![
                "start_pipeline:1",
                "stop_pipeline:1",
                "start_pipeline:2",
                "stop_pipeline:2",
                "close_render",
                "stop_display",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_during_restart_delay() {
        let calls = CallLog::default();
        let fake = FakeSubsystems::new(
            &calls,
            vec![Script::Run(vec![(None, PipelineEvent::Ended)])],
        );

        let started = Instant::now();
        let supervisor = Supervisor::new(config(Some(10)), fake);
        let state = supervisor.state_handle();
        let outcome = supervisor.run(stop_after(3)).await;

        assert_eq!(outcome, Outcome::Shutdown);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(*state.read(), SupervisorState::Stopping);
        assert_eq!(
            calls.log(),
            vec![
                "start_audio",
                "start_display",
                "launch_render",
                "start_pipeline:1",
                "stop_pipeline:1",
                "close_render",
                "stop_display",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failures_trip_circuit_breaker() {
        let calls = CallLog::default();
        let fake = FakeSubsystems::new(
            &calls,
            vec![
                Script::Run(vec![(None, failed())]),
                Script::Run(vec![(None, failed())]),
                Script::Run(vec![(None, failed())]),
            ],
        );

        let outcome = Supervisor::new(config(Some(2)), fake)
            .run(std::future::pending())
            .await;

        match outcome {
            Outcome::Fatal { reason } => assert!(reason.contains("3 times"), "{reason}"),
            other => panic!("expected fatal outcome, got {other:?}"),
        }
        assert_eq!(calls.count("start_pipeline"), 3);
        assert_eq!(
            calls.start_gaps(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
        assert_eq!(calls.count("close_render"), 1);
        assert_eq!(calls.count("stop_display"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_during_restart_is_retried() {
        let calls = CallLog::default();
        let fake = FakeSubsystems::new(
            &calls,
            vec![
                Script::Run(vec![(None, PipelineEvent::Ended)]),
                Script::FailToStart,
            ],
        );

        let outcome = Supervisor::new(config(Some(10)), fake)
            .run(stop_after(60))
            .await;

        assert_eq!(outcome, Outcome::Shutdown);
        assert_eq!(calls.count("start_pipeline"), 3);
        assert_eq!(
            calls.start_gaps(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
        // Only the third encoder was running at shutdown.
        assert_eq!(calls.count("stop_pipeline:3"), 1);
        assert_eq!(calls.count("stop_pipeline:2"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_is_ignored() {
        let calls = CallLog::default();
        let fake = FakeSubsystems::new(
            &calls,
            vec![Script::Run(vec![
                (Some(99), failed()),
                (Some(0), PipelineEvent::Ended),
            ])],
        );

        let supervisor = Supervisor::new(config(Some(10)), fake);
        let state = supervisor.state_handle();
        let outcome = supervisor.run(stop_after(30)).await;

        assert_eq!(outcome, Outcome::Shutdown);
        assert_eq!(calls.count("start_pipeline"), 1);
        assert_eq!(*state.read(), SupervisorState::Stopping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_survives_failing_teardown() {
        let calls = CallLog::default();
        let mut fake = FakeSubsystems::new(&calls, vec![]);
        fake.fail_teardown = true;

        let outcome = Supervisor::new(config(Some(10)), fake)
            .run(stop_after(1))
            .await;

        assert_eq!(outcome, Outcome::Shutdown);
        assert_eq!(
            calls.log()[4..].to_vec(),
            vec!["stop_pipeline:1", "close_render", "stop_display"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_failure_is_fatal_before_render() {
        let calls = CallLog::default();
        let mut fake = FakeSubsystems::new(&calls, vec![]);
        fake.fail_display = true;

        let supervisor = Supervisor::new(config(Some(10)), fake);
        let state = supervisor.state_handle();
        let outcome = supervisor.run(std::future::pending()).await;

        assert!(matches!(outcome, Outcome::Fatal { .. }));
        assert!(matches!(*state.read(), SupervisorState::FailedFatal { .. }));
        assert_eq!(calls.log(), vec!["start_audio", "start_display"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_state_after_bootstrap() {
        let calls = CallLog::default();
        let fake = FakeSubsystems::new(&calls, vec![]);

        let supervisor = Supervisor::new(config(Some(10)), fake);
        let state = supervisor.state_handle();
        let run = supervisor.run(stop_after(10));
        tokio::pin!(run);

        let outcome = tokio::select! {
            outcome = &mut run => Some(outcome),
            _ = tokio::time::sleep(Duration::from_secs(5)) => None,
        };
        assert!(outcome.is_none());
        assert_eq!(*state.read(), SupervisorState::Streaming { generation: 1 });

        assert_eq!(run.await, Outcome::Shutdown);
    }
}
