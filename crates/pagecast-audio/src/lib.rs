//! PulseAudio daemon and virtual sink setup.
//!
//! This crate restarts the audio daemon, creates a null sink, and makes it
//! the unmuted default so that anything the browser plays can be captured
//! from the sink's monitor source.
//!
//! Audio is best-effort: failures are logged as warnings and bootstrap still
//! returns a handle. A silent stream beats no stream.

mod error;
mod pulse;

pub use error::AudioError;
pub use pulse::{bootstrap, daemon_args, sink_commands, SinkSpec};

use std::time::Duration;

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Sink name used when none is configured.
pub const DEFAULT_SINK_NAME: &str = "pagecast";

/// Human readable sink label.
pub const DEFAULT_SINK_LABEL: &str = "Pagecast_Virtual_Sink";

/// How long to wait for the daemon to answer `pactl info`.
pub const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between readiness probes.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);
