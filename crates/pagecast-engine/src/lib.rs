//! Supervisor and recovery loop for pagecast.
//!
//! This crate sequences startup (audio, display, browser, encoder), watches
//! encoder lifecycle notices, and decides between a scoped restart of the
//! encoder and a full process exit.

mod error;
mod policy;
mod resources;
mod subsystems;
mod supervisor;

pub use error::EngineError;
pub use policy::RestartPolicy;
pub use subsystems::{Subsystems, SystemSubsystems};
pub use supervisor::{Outcome, Supervisor};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
