//! Encoder process lifecycle and event reporting.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use pagecast_ipc::{ComposedDestination, PipelineEvent, PipelineNotice};

use crate::args::{describe, ffmpeg_args, EncoderSpec};
use crate::error::EncoderError;
use crate::{EncodePipeline, EncoderResult, FFMPEG_BIN, STOP_TIMEOUT};

/// A running ffmpeg invocation.
///
/// Dropping the handle stops the process.
pub struct FfmpegPipeline {
    generation: u64,
    stop_tx: Option<oneshot::Sender<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl FfmpegPipeline {
    /// Launch the encoder and start watching it.
    ///
    /// Sends `Started` once the process is spawned, then exactly one of
    /// `Failed` or `Ended` when it exits, unless [`EncodePipeline::stop`] was
    /// called first.
    #[instrument(name = "pipeline_start", skip(spec, events))]
    pub async fn start(
        spec: &EncoderSpec,
        generation: u64,
        events: Sender<PipelineNotice>,
    ) -> EncoderResult<Self> {
        Self::start_with(
            FFMPEG_BIN,
            ffmpeg_args(spec),
            describe(spec),
            spec.destination.clone(),
            generation,
            events,
        )
        .await
    }

    /// `destination` is only used to mask the stream key in diagnostics.
    async fn start_with(
        program: &str,
        args: Vec<String>,
        descriptor: String,
        destination: ComposedDestination,
        generation: u64,
        events: Sender<PipelineNotice>,
    ) -> EncoderResult<Self> {
        info!(generation, command = %descriptor, "Starting encoder");

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EncoderError::Spawn)?;

        send(
            &events,
            PipelineNotice::new(generation, PipelineEvent::Started { descriptor }),
        )
        .await;

        let (stop_tx, stop_rx) = oneshot::channel();
        let diagnostics = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_diagnostics(stderr, generation, destination)));
        let monitor = tokio::spawn(monitor(child, generation, stop_rx, diagnostics, events));

        Ok(Self {
            generation,
            stop_tx: Some(stop_tx),
            monitor: Some(monitor),
        })
    }
}

#[async_trait]
impl EncodePipeline for FfmpegPipeline {
    fn generation(&self) -> u64 {
        self.generation
    }

    #[instrument(name = "pipeline_stop", skip(self), fields(generation = self.generation))]
    async fn stop(&mut self) -> EncoderResult<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The monitor may already be gone if the process exited.
            let _ = stop_tx.send(());
        }

        let Some(monitor) = self.monitor.take() else {
            return Ok(());
        };

        match tokio::time::timeout(STOP_TIMEOUT, monitor).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EncoderError::Monitor(e.to_string())),
            Err(_) => Err(EncoderError::StopTimeout(STOP_TIMEOUT)),
        }
    }
}

impl Drop for FfmpegPipeline {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

/// Wait for the process to exit or for a stop request, whichever comes first.
async fn monitor(
    mut child: Child,
    generation: u64,
    mut stop_rx: oneshot::Receiver<()>,
    diagnostics: Option<JoinHandle<Option<String>>>,
    events: Sender<PipelineNotice>,
) {
    tokio::select! {
        _ = &mut stop_rx => {
            debug!(generation, "Stopping encoder on request");
            if let Err(e) = child.start_kill() {
                debug!(generation, "Encoder already gone: {}", e);
            }
            let _ = child.wait().await;
            info!(generation, "Encoder stopped");
        }
        status = child.wait() => {
            let last_line = match diagnostics {
                Some(handle) => handle.await.ok().flatten(),
                None => None,
            };
            let event = match status {
                Ok(status) if status.success() => {
                    warn!(generation, "Encoder ended");
                    PipelineEvent::Ended
                }
                Ok(status) => {
                    let cause = exit_cause(status, last_line.as_deref());
                    warn!(generation, %cause, "Encoder failed");
                    PipelineEvent::Failed { cause }
                }
                Err(e) => PipelineEvent::Failed {
                    cause: format!("could not wait on encoder: {e}"),
                },
            };
            send(&events, PipelineNotice::new(generation, event)).await;
        }
    }
}

/// Forward encoder stderr to the log, returning the last non-empty line.
///
/// ffmpeg echoes the output URL on connection errors, so every line has the
/// stream key masked before it is logged or kept.
async fn forward_diagnostics<R>(
    stderr: R,
    generation: u64,
    destination: ComposedDestination,
) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    let mut last = None;
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let line = destination.scrub(&line);
        debug!(target: "pagecast_encoder::ffmpeg", generation, "{}", line);
        last = Some(line);
    }
    last
}

fn exit_cause(status: ExitStatus, last_line: Option<&str>) -> String {
    match last_line {
        Some(line) => format!("encoder exited with {status}: {line}"),
        None => format!("encoder exited with {status}"),
    }
}

async fn send(events: &Sender<PipelineNotice>, notice: PipelineNotice) {
    if let Err(e) = events.send(notice).await {
        warn!("Failed to send pipeline event: {}", e);
    }
}
