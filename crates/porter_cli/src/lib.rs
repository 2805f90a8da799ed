//! porter agent
//!
//! Loads a job document, fills its template placeholders, stages inputs
//! through connectors, runs the synthesized command and hands the outputs
//! back, producing one run report.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod load;
pub mod report;

// Re-exports
pub use agent::{command, inspect, run, RunOptions};
pub use load::{load_document, load_variables, parse_document};
pub use report::{Format, OutputFileReport, RunReport, RunState};
