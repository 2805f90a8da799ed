//! Per-connector runners and their lifecycle.

use crate::protocol::{ConnectorProtocol, Endpoint, Role};
use crate::registry::ProtocolRegistry;
use crate::staging::{check_listing, ensure_directory, file_size, make_read_only};
use porter_core::{AgentError, AgentResult, DataClass, DataObject};
use porter_plan::{OutputTarget, ResolvedOutput, StagedInput};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle state of a connector. A failed step leaves the state at the
/// last step that succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectorState {
    /// Imported from the job document
    Created,
    /// Target directory exists
    DirectoryPrepared,
    /// Access descriptor accepted
    Validated,
    /// Directory mounted
    Mounted,
    /// Data copied
    Received,
    /// Output sent
    Sent,
    /// Mount released
    Unmounted,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::DirectoryPrepared => "directory prepared",
            Self::Validated => "validated",
            Self::Mounted => "mounted",
            Self::Received => "received",
            Self::Sent => "sent",
            Self::Unmounted => "unmounted",
        };
        f.write_str(name)
    }
}

fn mount_check(key: &str, role: Role, class: DataClass, mount: bool) -> AgentResult<()> {
    if mount && class != DataClass::Directory {
        return Err(AgentError::Connector(format!(
            "Connector for {} key \"{}\" has mount flag set but class is \"{}\". \
             Unable to mount if class is different from \"Directory\"",
            role.as_str(),
            key,
            class
        )));
    }
    Ok(())
}

/// Staged input as listed in the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFileReport {
    /// Input key
    pub key: String,
    /// File or directory
    pub class: DataClass,
    /// Local path
    pub path: String,
    /// Staged through a mount
    pub mounted: bool,
    /// Size in bytes, files only
    pub size: Option<u64>,
}

/// Connector that stages one input
pub struct InputConnector {
    endpoint: Endpoint,
    mount: bool,
    path: PathBuf,
    protocol: Arc<dyn ConnectorProtocol>,
    state: ConnectorState,
    has_mounted: bool,
}

impl InputConnector {
    /// Create the runner for a completed input object
    ///
    /// # Errors
    ///
    /// Returns `Connector` if `mount` is set on a file, the object has no
    /// local path, or the connector's protocol version is unsupported
    pub fn new(staged: &StagedInput<'_>, registry: &mut ProtocolRegistry) -> AgentResult<Self> {
        let object: &DataObject = staged.object;
        mount_check(staged.key, Role::Input, object.class, staged.connector.mount)?;
        let path = object.path.as_deref().ok_or_else(|| {
            AgentError::Connector(format!("input key \"{}\" has no local path", staged.key))
        })?;
        let protocol = registry.resolve(&staged.connector.command)?;

        Ok(Self {
            endpoint: Endpoint {
                key: staged.key.to_string(),
                role: Role::Input,
                command: staged.connector.command.clone(),
                class: object.class,
                access: staged.connector.access.clone(),
                listing: object.listing.clone(),
            },
            mount: staged.connector.mount,
            path: PathBuf::from(path),
            protocol,
            state: ConnectorState::Created,
            has_mounted: false,
        })
    }

    /// Input key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.endpoint.key
    }

    /// Local path the data is staged at
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Staged through a mount
    #[must_use]
    pub fn is_mounting(&self) -> bool {
        self.mount
    }

    /// Mount succeeded and has not been released yet
    #[must_use]
    pub fn has_mounted(&self) -> bool {
        self.has_mounted
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectorState {
        self.state
    }

    fn step_error(&self, what: &str, err: impl fmt::Display) -> AgentError {
        AgentError::Connector(format!(
            "Could not {} for input key \"{}\" with path \"{}\":\n{}",
            what,
            self.endpoint.key,
            self.path.display(),
            err
        ))
    }

    /// Create the target directory. For a file that is its parent, and the
    /// file itself must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the directory cannot be created or the target
    /// is already occupied
    pub fn prepare_directory(&mut self) -> AgentResult<()> {
        match self.endpoint.class {
            DataClass::Directory => {
                ensure_directory(&self.path).map_err(|e| self.step_error("prepare directory", e))?;
            }
            DataClass::File => {
                if self.path.exists() {
                    return Err(self.step_error(
                        "prepare directory",
                        io::Error::new(io::ErrorKind::AlreadyExists, "file already exists"),
                    ));
                }
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent).map_err(|e| self.step_error("prepare directory", e))?;
                }
            }
        }
        self.state = ConnectorState::DirectoryPrepared;
        Ok(())
    }

    /// Let the connector check its access descriptor
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the connector rejects it
    pub fn validate(&mut self) -> AgentResult<()> {
        if self.mount {
            self.protocol.validate_mount(&self.endpoint)?;
        } else {
            self.protocol.validate_receive(&self.endpoint)?;
        }
        self.state = ConnectorState::Validated;
        Ok(())
    }

    /// Mount or copy the data, check a directory listing, then mark the
    /// staged files read-only.
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the transfer fails, the listing is not
    /// fulfilled, or copied files cannot be made read-only
    pub fn receive(&mut self) -> AgentResult<()> {
        if self.mount {
            self.protocol.mount(&self.endpoint, &self.path)?;
            self.has_mounted = true;
            self.state = ConnectorState::Mounted;
        } else {
            self.protocol.receive(&self.endpoint, &self.path)?;
            self.state = ConnectorState::Received;
        }

        if let (DataClass::Directory, Some(listing)) = (self.endpoint.class, &self.endpoint.listing) {
            check_listing(&self.path, listing).map_err(|e| {
                AgentError::Connector(format!(
                    "The listing of input directory \"{}\" is not fulfilled:\n{}",
                    self.endpoint.key, e
                ))
            })?;
        }

        match make_read_only(&self.path) {
            Ok(()) => {}
            Err(e) if self.mount => {
                warn!(key = %self.endpoint.key, error = %e, "could not mark mounted files read-only");
            }
            Err(e) => return Err(self.step_error("mark files read-only", e)),
        }
        debug!(key = %self.endpoint.key, state = %self.state, "input staged");
        Ok(())
    }

    /// Release the mount if one is held. Returns whether an unmount ran.
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the connector fails to unmount
    pub fn try_unmount(&mut self) -> AgentResult<bool> {
        if !self.has_mounted {
            return Ok(false);
        }
        self.has_mounted = false;
        self.protocol.unmount(&self.endpoint, &self.path)?;
        self.state = ConnectorState::Unmounted;
        Ok(true)
    }

    /// Report entry for this input
    #[must_use]
    pub fn report(&self) -> InputFileReport {
        InputFileReport {
            key: self.endpoint.key.clone(),
            class: self.endpoint.class,
            path: self.path.to_string_lossy().into_owned(),
            mounted: self.mount,
            size: match self.endpoint.class {
                DataClass::File => file_size(&self.path),
                DataClass::Directory => None,
            },
        }
    }
}

impl fmt::Debug for InputConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputConnector")
            .field("key", &self.endpoint.key)
            .field("command", &self.endpoint.command)
            .field("class", &self.endpoint.class)
            .field("mount", &self.mount)
            .field("path", &self.path)
            .field("version", &self.protocol.version())
            .field("state", &self.state)
            .field("has_mounted", &self.has_mounted)
            .finish()
    }
}

/// Connector that sends one output
pub struct OutputConnector {
    endpoint: Endpoint,
    output: ResolvedOutput,
    protocol: Arc<dyn ConnectorProtocol>,
    state: ConnectorState,
}

impl OutputConnector {
    /// Create the runner for an output destination
    ///
    /// # Errors
    ///
    /// Returns `Connector` if `mount` is set on a file or the protocol
    /// version is unsupported
    pub fn new(target: &OutputTarget<'_>, registry: &mut ProtocolRegistry) -> AgentResult<Self> {
        let connector = &target.value.connector;
        mount_check(&target.output.key, Role::Output, target.value.class, connector.mount)?;
        let protocol = registry.resolve(&connector.command)?;

        Ok(Self {
            endpoint: Endpoint {
                key: target.output.key.clone(),
                role: Role::Output,
                command: connector.command.clone(),
                class: target.value.class,
                access: connector.access.clone(),
                listing: target.value.listing.clone(),
            },
            output: target.output.clone(),
            protocol,
            state: ConnectorState::Created,
        })
    }

    /// Output key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.endpoint.key
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectorState {
        self.state
    }

    /// Let the connector check its access descriptor
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the connector rejects it
    pub fn validate(&mut self) -> AgentResult<()> {
        self.protocol.validate_send(&self.endpoint)?;
        self.state = ConnectorState::Validated;
        Ok(())
    }

    /// Locate the output in `working_dir` and send it
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the glob matches zero or several paths, or the
    /// transfer fails
    pub fn send(&mut self, working_dir: &Path) -> AgentResult<()> {
        let path = self.output.locate_one(working_dir)?;
        self.protocol.send(&self.endpoint, &path)?;
        self.state = ConnectorState::Sent;
        Ok(())
    }
}

impl fmt::Debug for OutputConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputConnector")
            .field("key", &self.endpoint.key)
            .field("command", &self.endpoint.command)
            .field("class", &self.endpoint.class)
            .field("glob", &self.output.glob)
            .field("version", &self.protocol.version())
            .field("state", &self.state)
            .finish()
    }
}
