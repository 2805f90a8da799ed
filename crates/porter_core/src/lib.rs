//! porter core types
//!
//! Pure types and logic with no I/O: the error taxonomy shared by every
//! crate, the typed job document, CWL type descriptors, and the delimiter
//! splitter used by both template placeholders and input references.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod job;
pub mod segment;
pub mod types;

// Re-exports
pub use error::{AgentError, AgentResult};
pub use job::{
    Batch, BaseCommand, CliDescription, CliInput, CliOutput, ConnectorDescriptor, DataObject,
    InputBinding, InputValue, JobDocument, ListingEntry, OutputBinding, OutputValue, Scalar,
};
pub use segment::{split_delimited, Nesting, Segment, SplitError};
pub use types::{DataClass, InputCategory, InputType, OutputType};
