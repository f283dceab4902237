//! Error taxonomy for the worker
//!
//! Job-fatal conditions live in [`WorkerError`]; driver transport and command
//! failures live in [`DriverError`]. Attempt-level submission errors are kept
//! next to the retry loop in the item processor, since only it knows which
//! role a candidate selector was playing.

use thiserror::Error;

/// Errors that terminate the current job (never the worker process).
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A required logical column could not be resolved in the work order.
    /// Fatal for the job, not retried.
    #[error("could not detect required columns: {missing}")]
    Schema { missing: String },

    /// The work order bytes could not be parsed as tabular data.
    #[error("could not decode work order file: {reason}")]
    Decode { reason: String },

    /// Re-encoding the ledger for upload failed.
    #[error("could not encode result file: {0}")]
    Encode(#[from] csv::Error),

    /// Neither confirmation channel fired within the ceiling.
    #[error("login not confirmed within {minutes} minutes")]
    LoginTimeout { minutes: u64 },

    /// Unattended mode found no logged-in session in the saved profile.
    #[error("saved profile is not logged in; run once interactively to refresh it")]
    LoginRejected,

    /// The job's source file could not be downloaded. Fatal for the job.
    #[error("could not download job file: {reason}")]
    Download { reason: String },

    /// Transport failure talking to the remote queue.
    #[error("queue request failed: {0}")]
    Queue(#[from] reqwest::Error),

    /// Browser session failure outside a single item's attempt loop.
    #[error("browser driver error: {0}")]
    Driver(#[from] DriverError),
}

impl WorkerError {
    pub fn schema(missing: impl Into<String>) -> Self {
        Self::Schema {
            missing: missing.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub fn download(reason: impl Into<String>) -> Self {
        Self::Download {
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by a browser driver implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver endpoint could not be reached or returned garbage.
    #[error("webdriver transport error: {0}")]
    Transport(String),

    /// The driver answered with a protocol-level error.
    #[error("webdriver command failed: {error}: {message}")]
    Command { error: String, message: String },

    /// The response was well-formed HTTP but not a valid protocol payload.
    #[error("unexpected webdriver response: {0}")]
    Protocol(String),
}

impl DriverError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }
}
