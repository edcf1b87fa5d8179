//! Environment configuration resolver for pagecast.
//!
//! Reads the required destination and source settings plus optional tuning
//! values, and produces an immutable [`StreamConfig`]. Configuration errors
//! are fatal: nothing is retried.

mod error;
mod resolver;

pub use error::ConfigError;
pub use resolver::{from_env, resolve};

pub use pagecast_ipc::StreamConfig;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Required: base URL of the ingestion endpoint.
pub const DESTINATION_URL: &str = "DESTINATION_URL";

/// Required: secret stream key appended to the destination.
pub const STREAM_KEY: &str = "STREAM_KEY";

/// Required: page to render.
pub const SOURCE_URL: &str = "SOURCE_URL";

/// Display used when `DISPLAY_ID` is unset.
pub const DEFAULT_DISPLAY_ID: &str = ":99";
