//! Protocol registry.
//!
//! Maps protocol versions to their implementation and remembers which
//! version each connector command announced.

use crate::invoke::resolve_cli_version;
use crate::protocol::{CliProtocolV01, ConnectorProtocol, ProtocolVersion};
use indexmap::IndexMap;
use porter_core::{AgentError, AgentResult};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Version to implementation registry with a per-command version cache
pub struct ProtocolRegistry {
    protocols: IndexMap<ProtocolVersion, Arc<dyn ConnectorProtocol>>,
    announced: IndexMap<String, String>,
}

impl ProtocolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            protocols: IndexMap::new(),
            announced: IndexMap::new(),
        }
    }

    /// Registry with every protocol this agent speaks
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CliProtocolV01));
        registry
    }

    /// Register a protocol, replacing any implementation of the same version
    pub fn register(&mut self, protocol: Arc<dyn ConnectorProtocol>) {
        self.protocols.insert(protocol.version(), protocol);
    }

    /// Implementation of `version`, if registered
    #[must_use]
    pub fn get(&self, version: ProtocolVersion) -> Option<Arc<dyn ConnectorProtocol>> {
        self.protocols.get(&version).cloned()
    }

    /// Supported versions in registration order
    pub fn versions(&self) -> impl Iterator<Item = ProtocolVersion> + '_ {
        self.protocols.keys().copied()
    }

    /// Find the implementation for `command`, asking the connector for its
    /// version once per command
    ///
    /// # Errors
    ///
    /// Returns `Connector` if the version cannot be detected or is not
    /// supported
    pub fn resolve(&mut self, command: &str) -> AgentResult<Arc<dyn ConnectorProtocol>> {
        let announced = match self.announced.get(command) {
            Some(version) => version.clone(),
            None => {
                let version = resolve_cli_version(command)?;
                info!(command, version = %version, "resolved connector cli-version");
                self.announced.insert(command.to_string(), version.clone());
                version
            }
        };

        announced
            .parse::<ProtocolVersion>()
            .ok()
            .and_then(|version| self.get(version))
            .ok_or_else(|| {
                AgentError::Connector(format!(
                    "This agent does not support connector cli-version \"{}\", but needed by connector \"{}\"",
                    announced, command
                ))
            })
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("versions", &self.protocols.keys().collect::<Vec<_>>())
            .field("announced", &self.announced)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::tests::script;
    use std::fs;

    #[test]
    fn test_defaults() {
        let registry = ProtocolRegistry::with_defaults();
        assert_eq!(registry.versions().collect::<Vec<_>>(), vec![ProtocolVersion::V0_1]);
        assert!(ProtocolRegistry::new().get(ProtocolVersion::V0_1).is_none());
    }

    #[test]
    fn test_version_cached_per_command() {
        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls");
        let command = script(
            dir.path(),
            "conn",
            &format!("echo call >> {}\necho 0.1", calls.display()),
        );

        let mut registry = ProtocolRegistry::with_defaults();
        let first = registry.resolve(&command).unwrap();
        let second = registry.resolve(&command).unwrap();
        assert_eq!(first.version(), ProtocolVersion::V0_1);
        assert_eq!(second.version(), ProtocolVersion::V0_1);
        assert_eq!(fs::read_to_string(&calls).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let command = script(dir.path(), "conn", "echo 9.9");
        let err = ProtocolRegistry::with_defaults()
            .resolve(&command)
            .err()
            .expect("9.9 is not a supported version");
        assert_eq!(err.kind(), "ConnectorError");
        assert!(err.to_string().contains("\"9.9\""));
    }
}
