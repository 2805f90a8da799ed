//! porter planner
//!
//! Turns a typed job document into a plan for one run: batch selection,
//! document checks, input completion, the synthesized command, and output
//! globs with `$(inputs...)` references resolved.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod inputs;
pub mod outputs;
pub mod plan;
pub mod reference;
pub mod validate;

// Re-exports
pub use command::{check_base_command, locate_executable, synthesize, CliArgument, Placement};
pub use inputs::{complete_inputs, complete_object, inputs_tree, split_extension};
pub use outputs::{resolve_outputs, Location, ResolvedOutput};
pub use plan::{JobPlan, OutputTarget, PlanOptions, StagedInput};
pub use reference::{PathStep, Reference};
pub use validate::{check_key_format, check_keys_declared, select_batch, Selection};
