//! Domain module - core types and business rules of the worker
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use errors::{DriverError, WorkerError};
pub use types::{JobStatus, OutcomeRecord, OutcomeStatus, PendingJob, WorkItem};
