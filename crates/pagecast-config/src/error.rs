//! Error types for configuration resolution.

use thiserror::Error;

/// Errors that can occur while resolving configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required settings are absent or empty.
    #[error("Missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// A setting is present but unusable.
    #[error("Invalid setting {name}: {reason}")]
    Invalid {
        name: &'static str,
        reason: String,
    },
}

impl ConfigError {
    /// Names of the missing required settings, if that is what went wrong.
    pub fn missing(&self) -> &[&'static str] {
        match self {
            Self::Missing(names) => names,
            Self::Invalid { .. } => &[],
        }
    }
}
