//! porter runtime
//!
//! Runs the synthesized command as a single blocking child process without a
//! shell, captures its output line by line and samples wall time and peak
//! resident memory while it runs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod executor;
pub mod monitor;

// Re-exports
pub use executor::{execute, run_captured, Captured, ProcessResult};
pub use monitor::{MemorySampler, Monitoring, SAMPLE_INTERVAL};
