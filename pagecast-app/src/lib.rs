//! Pagecast application entry point.

use std::process::ExitCode;

use anyhow::Context;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagecast_engine::{Supervisor, SystemSubsystems};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "pagecast=info,pagecast_lib=info,pagecast_config=info,pagecast_engine=info,pagecast_audio=info,pagecast_display=info,pagecast_render=info,pagecast_encoder=info";

/// Initialize logging.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve configuration, run the supervisor until shutdown or a fatal
/// failure, and map the result to a process exit code.
pub async fn run() -> ExitCode {
    init_logging();
    info!("Pagecast starting");

    let config = match pagecast_config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let supervisor = Supervisor::new(config, SystemSubsystems::default());
    let outcome = supervisor.run(shutdown_signal()).await;

    info!(?outcome, "Pagecast exiting");
    outcome.exit_code()
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    if let Err(e) = wait_for_signal().await {
        // Without handlers the process can only be killed; keep streaming.
        error!("Signal handling unavailable: {:#}", e);
        std::future::pending::<()>().await;
    }
}

async fn wait_for_signal() -> anyhow::Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for SIGINT")?;
            info!("Received SIGINT");
        }
        _ = terminate.recv() => {
            info!("Received SIGTERM");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
