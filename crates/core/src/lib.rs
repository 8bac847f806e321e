//! Shared foundation for the ingestion control plane: the error taxonomy,
//! structured-logging bootstrap, graceful-shutdown signal, and build info
//! that every other crate in the workspace depends on.

pub mod error;
pub mod signal;
pub mod telemetry;
pub mod version;

pub use error::{AppError, AppResult};
