//! Connector protocol versions and their capability interface.

use crate::invoke::execute_connector;
use porter_core::{AgentError, AgentResult, DataClass, ListingEntry};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Connector protocol version announced by `cli-version`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// Version `0.1`
    V0_1,
}

impl ProtocolVersion {
    /// Version string as printed by connectors
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V0_1 => "0.1",
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0.1" => Ok(Self::V0_1),
            other => Err(format!("unknown connector cli-version \"{}\"", other)),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connector subcommand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `receive-file`
    ReceiveFile,
    /// `receive-file-validate`
    ReceiveFileValidate,
    /// `receive-dir`
    ReceiveDir,
    /// `receive-dir-validate`
    ReceiveDirValidate,
    /// `mount-dir`
    MountDir,
    /// `mount-dir-validate`
    MountDirValidate,
    /// `umount-dir`
    UmountDir,
    /// `send-file`
    SendFile,
    /// `send-file-validate`
    SendFileValidate,
    /// `send-dir`
    SendDir,
    /// `send-dir-validate`
    SendDirValidate,
}

impl Verb {
    /// Subcommand as passed on the connector command line
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceiveFile => "receive-file",
            Self::ReceiveFileValidate => "receive-file-validate",
            Self::ReceiveDir => "receive-dir",
            Self::ReceiveDirValidate => "receive-dir-validate",
            Self::MountDir => "mount-dir",
            Self::MountDirValidate => "mount-dir-validate",
            Self::UmountDir => "umount-dir",
            Self::SendFile => "send-file",
            Self::SendFileValidate => "send-file-validate",
            Self::SendDir => "send-dir",
            Self::SendDirValidate => "send-dir-validate",
        }
    }

    /// What the verb does, for error messages
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::ReceiveFile => "receive file",
            Self::ReceiveFileValidate => "validate receive file",
            Self::ReceiveDir => "receive directory",
            Self::ReceiveDirValidate => "validate receive directory",
            Self::MountDir => "mount directory",
            Self::MountDirValidate => "validate mount directory",
            Self::UmountDir => "umount directory",
            Self::SendFile => "send file",
            Self::SendFileValidate => "validate send file",
            Self::SendDir => "send directory",
            Self::SendDirValidate => "validate send directory",
        }
    }

    /// Whether the verb hands over an access file
    #[must_use]
    pub fn takes_access(&self) -> bool {
        !matches!(self, Self::UmountDir)
    }

    /// Whether the verb hands over a local path
    #[must_use]
    pub fn takes_path(&self) -> bool {
        matches!(
            self,
            Self::ReceiveFile
                | Self::ReceiveDir
                | Self::MountDir
                | Self::UmountDir
                | Self::SendFile
                | Self::SendDir
        )
    }

    /// Whether the verb hands over a listing, if the data object has one
    #[must_use]
    pub fn takes_listing(&self) -> bool {
        matches!(
            self,
            Self::ReceiveDir | Self::ReceiveDirValidate | Self::SendDir | Self::SendDirValidate
        )
    }
}

/// Side of the job a connector serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Stages an input
    Input,
    /// Sends an output
    Output,
}

impl Role {
    /// Word used in messages
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// One data object as seen by its connector
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    /// Input or output key
    pub key: String,
    /// Input or output side
    pub role: Role,
    /// Connector executable
    pub command: String,
    /// File or directory
    pub class: DataClass,
    /// Opaque access descriptor
    pub access: Value,
    /// Expected directory contents
    pub listing: Option<Vec<ListingEntry>>,
}

impl Endpoint {
    /// Run `verb` for this endpoint and fail on a non-zero exit
    ///
    /// # Errors
    ///
    /// Returns `Connector` with the connector's standard error
    pub fn call(&self, verb: Verb, path: Option<&Path>) -> AgentResult<()> {
        info!(key = %self.key, command = %self.command, verb = verb.as_str(), "connector call");
        let access = verb.takes_access().then_some(&self.access);
        let path = if verb.takes_path() { path } else { None };
        let listing = if verb.takes_listing() {
            self.listing.as_deref()
        } else {
            None
        };

        let captured = execute_connector(&self.command, verb, access, path, listing)?;
        if captured.successful() {
            return Ok(());
        }
        Err(AgentError::Connector(format!(
            "Connector failed to {} for {} key \"{}\".\nFailed with the following message:\n{}",
            verb.action(),
            self.role.as_str(),
            self.key,
            captured.std_err_text()
        )))
    }
}

/// Capabilities every protocol version provides
pub trait ConnectorProtocol: Send + Sync {
    /// Version implemented
    fn version(&self) -> ProtocolVersion;

    /// Check the access descriptor of an input before anything is received
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the connector rejects the descriptor
    fn validate_receive(&self, endpoint: &Endpoint) -> AgentResult<()>;

    /// Copy an input to `path`
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the transfer fails
    fn receive(&self, endpoint: &Endpoint, path: &Path) -> AgentResult<()>;

    /// Check the access descriptor of a mounting input
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the connector rejects the descriptor
    fn validate_mount(&self, endpoint: &Endpoint) -> AgentResult<()>;

    /// Mount a directory input at `path`
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the mount fails
    fn mount(&self, endpoint: &Endpoint, path: &Path) -> AgentResult<()>;

    /// Unmount a directory previously mounted at `path`
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the unmount fails
    fn unmount(&self, endpoint: &Endpoint, path: &Path) -> AgentResult<()>;

    /// Check the access descriptor of an output before the job runs
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the connector rejects the descriptor
    fn validate_send(&self, endpoint: &Endpoint) -> AgentResult<()>;

    /// Send the output found at `path`
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the transfer fails
    fn send(&self, endpoint: &Endpoint, path: &Path) -> AgentResult<()>;
}

/// Protocol `0.1`: one subprocess call per verb
#[derive(Debug, Clone, Copy, Default)]
pub struct CliProtocolV01;

impl ConnectorProtocol for CliProtocolV01 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V0_1
    }

    fn validate_receive(&self, endpoint: &Endpoint) -> AgentResult<()> {
        let verb = match endpoint.class {
            DataClass::File => Verb::ReceiveFileValidate,
            DataClass::Directory => Verb::ReceiveDirValidate,
        };
        endpoint.call(verb, None)
    }

    fn receive(&self, endpoint: &Endpoint, path: &Path) -> AgentResult<()> {
        let verb = match endpoint.class {
            DataClass::File => Verb::ReceiveFile,
            DataClass::Directory => Verb::ReceiveDir,
        };
        endpoint.call(verb, Some(path))
    }

    fn validate_mount(&self, endpoint: &Endpoint) -> AgentResult<()> {
        endpoint.call(Verb::MountDirValidate, None)
    }

    fn mount(&self, endpoint: &Endpoint, path: &Path) -> AgentResult<()> {
        endpoint.call(Verb::MountDir, Some(path))
    }

    fn unmount(&self, endpoint: &Endpoint, path: &Path) -> AgentResult<()> {
        endpoint.call(Verb::UmountDir, Some(path))
    }

    fn validate_send(&self, endpoint: &Endpoint) -> AgentResult<()> {
        let verb = match endpoint.class {
            DataClass::File => Verb::SendFileValidate,
            DataClass::Directory => Verb::SendDirValidate,
        };
        endpoint.call(verb, None)
    }

    fn send(&self, endpoint: &Endpoint, path: &Path) -> AgentResult<()> {
        let verb = match endpoint.class {
            DataClass::File => Verb::SendFile,
            DataClass::Directory => Verb::SendDir,
        };
        endpoint.call(verb, Some(path))
    }
}
