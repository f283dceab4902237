//! Application layer module
//!
//! Orchestration of one job: session establishment, per-item processing,
//! batch iteration and the outer worker loop.

pub mod batch;
pub mod processor;
pub mod session;
pub mod worker;
