//! Poll-with-timeout readiness checks for external processes.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

/// An external dependency did not become ready in time.
#[derive(Debug, Clone, Error)]
#[error("{what} not ready after {waited:?}")]
pub struct ReadinessTimeout {
    /// What was being waited on.
    pub what: String,

    /// How long we waited.
    pub waited: Duration,
}

/// Poll `probe` every `interval` until it returns true or `timeout` elapses.
///
/// The probe is always run at least once, so a zero timeout still gets one
/// check in.
pub async fn wait_until_ready<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<(), ReadinessTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if probe().await {
            debug!(what, attempts, elapsed_ms = started.elapsed().as_millis() as u64, "Ready");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ReadinessTimeout {
                what: what.to_string(),
                waited: now.duration_since(started),
            });
        }

        trace!(what, attempts, "Not ready yet");
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
