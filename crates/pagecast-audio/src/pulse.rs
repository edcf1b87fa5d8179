//! PulseAudio control through the `pulseaudio` and `pactl` binaries.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use pagecast_ipc::{wait_until_ready, AudioSinkHandle};

use crate::error::AudioError;
use crate::{
    AudioResult, DEFAULT_SINK_LABEL, DEFAULT_SINK_NAME, READY_POLL_INTERVAL, READY_TIMEOUT,
};

/// The virtual sink to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    /// Sink name used in pactl commands.
    pub name: String,

    /// Description shown by audio tools.
    pub label: String,
}

impl Default for SinkSpec {
    fn default() -> Self {
        Self {
            name: DEFAULT_SINK_NAME.to_string(),
            label: DEFAULT_SINK_LABEL.to_string(),
        }
    }
}

/// Arguments for a daemon that never exits on idle and ignores exit requests.
pub fn daemon_args() -> Vec<String> {
    vec![
        "-D".to_string(),
        "--exit-idle-time=-1".to_string(),
        "--disallow-exit".to_string(),
    ]
}

/// The `pactl` invocations that create the sink and make it the audible default,
/// in order.
pub fn sink_commands(sink: &SinkSpec) -> Vec<Vec<String>> {
    vec![
        vec![
            "load-module".to_string(),
            "module-null-sink".to_string(),
            format!("sink_name={}", sink.name),
            format!("sink_properties=device.description={}", sink.label),
        ],
        vec!["set-default-sink".to_string(), sink.name.clone()],
        vec!["set-sink-mute".to_string(), sink.name.clone(), "0".to_string()],
        vec![
            "set-sink-volume".to_string(),
            sink.name.clone(),
            "100%".to_string(),
        ],
    ]
}

/// Restart the audio daemon and set up the virtual sink.
///
/// Every step is attempted even if an earlier one failed. The returned
/// handle is marked unhealthy if anything went wrong.
#[instrument(name = "audio_bootstrap", skip(sink), fields(sink = %sink.name))]
pub async fn bootstrap(sink: &SinkSpec) -> AudioSinkHandle {
    let mut healthy = true;

    // No daemon running is the normal case here.
    if let Err(e) = run("pulseaudio", &["--kill".to_string()]).await {
        debug!("No previous audio daemon to stop: {}", e);
    }

    match run("pulseaudio", &daemon_args()).await {
        Ok(_) => info!("Audio daemon started"),
        Err(e) => {
            warn!("Audio daemon failed to start: {}", e);
            healthy = false;
        }
    }

    if let Err(e) = wait_for_daemon().await {
        warn!("{}", e);
        healthy = false;
    }

    for args in sink_commands(sink) {
        if let Err(e) = run("pactl", &args).await {
            warn!("Audio sink setup step failed: {}", e);
            healthy = false;
        }
    }

    if healthy {
        info!(monitor = %format!("{}.monitor", sink.name), "Virtual audio sink ready");
    } else {
        warn!("Continuing with degraded audio; the stream may be silent");
    }

    AudioSinkHandle {
        sink_name: sink.name.clone(),
        healthy,
    }
}

async fn wait_for_daemon() -> AudioResult<()> {
    wait_until_ready("audio daemon", READY_TIMEOUT, READY_POLL_INTERVAL, || async {
        run("pactl", &["info".to_string()]).await.is_ok()
    })
    .await?;
    Ok(())
}

/// Run a command to completion, returning its stdout.
async fn run(program: &str, args: &[String]) -> AudioResult<String> {
    let command = format!("{} {}", program, args.join(" "));
    debug!(%command, "Running");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| AudioError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(AudioError::CommandFailed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
