//! porter connector staging
//!
//! Drives external connector executables through the staging lifecycle of a
//! run: directory preparation, validation, receive or mount, send and
//! unmount. Connectors are opaque subprocesses that announce a protocol
//! version through `cli-version`; each version maps to one
//! [`ConnectorProtocol`] implementation in the [`ProtocolRegistry`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod invoke;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod runner;
pub mod staging;

// Re-exports
pub use invoke::{execute_connector, resolve_cli_version};
pub use manager::ConnectorManager;
pub use protocol::{CliProtocolV01, ConnectorProtocol, Endpoint, ProtocolVersion, Role, Verb};
pub use registry::ProtocolRegistry;
pub use runner::{ConnectorState, InputConnector, InputFileReport, OutputConnector};
pub use staging::{check_listing, ensure_directory, file_size, make_read_only};
