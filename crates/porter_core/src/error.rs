//! Error taxonomy shared by every porter crate.

use std::fmt;

/// Result type used throughout porter
pub type AgentResult<T> = Result<T, AgentError>;

/// Agent error
///
/// Each variant corresponds to one failure class of a job run. Messages are
/// meant for humans and end up in the `debugInfo` section of the run report,
/// after secret redaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// The CLI description and the job inputs do not fit together
    #[error("{0}")]
    JobSpecification(String),

    /// The base command cannot be located or executed
    #[error("{0}")]
    InvalidBaseCommand(String),

    /// A `$(inputs...)` expression is malformed or unresolvable
    #[error("{0}")]
    InvalidInputReference(String),

    /// A connector failed, or staged data did not match expectations
    #[error("{0}")]
    Connector(String),

    /// The job document has the wrong shape
    #[error("{0}")]
    RedValidation(String),

    /// The job document is well-formed but inconsistent
    #[error("{0}")]
    RedSpecification(String),

    /// A template placeholder is malformed
    #[error("{0}")]
    Template(String),

    /// Template placeholders are left without values
    #[error("{0}")]
    RedVariables(String),

    /// Agent arguments do not fit the job document
    #[error("{0}")]
    Argument(String),

    /// Document is neither JSON nor YAML
    #[error("{0}")]
    FileFormat(String),

    /// Document location uses an unsupported URL scheme
    #[error("{0}")]
    FileScheme(String),

    /// The job process failed or could not be started
    #[error("{0}")]
    Execution(String),

    /// Non-optional outputs were not produced
    #[error("{0}")]
    MissingOutputFiles(String),

    /// Filesystem or network I/O failed
    #[error("{0}")]
    Io(String),
}

impl AgentError {
    /// Name of the failure class, as shown in reports
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobSpecification(_) => "JobSpecificationError",
            Self::InvalidBaseCommand(_) => "InvalidBaseCommand",
            Self::InvalidInputReference(_) => "InvalidInputReference",
            Self::Connector(_) => "ConnectorError",
            Self::RedValidation(_) => "RedValidationError",
            Self::RedSpecification(_) => "RedSpecificationError",
            Self::Template(_) => "TemplateError",
            Self::RedVariables(_) => "RedVariablesError",
            Self::Argument(_) => "ArgumentError",
            Self::FileFormat(_) => "FileFormatError",
            Self::FileScheme(_) => "FileSchemeError",
            Self::Execution(_) => "ExecutionError",
            Self::MissingOutputFiles(_) => "MissingOutputFilesError",
            Self::Io(_) => "IoError",
        }
    }

    /// The bare message without the failure class
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::JobSpecification(m)
            | Self::InvalidBaseCommand(m)
            | Self::InvalidInputReference(m)
            | Self::Connector(m)
            | Self::RedValidation(m)
            | Self::RedSpecification(m)
            | Self::Template(m)
            | Self::RedVariables(m)
            | Self::Argument(m)
            | Self::FileFormat(m)
            | Self::FileScheme(m)
            | Self::Execution(m)
            | Self::MissingOutputFiles(m)
            | Self::Io(m) => m,
        }
    }

    /// Wrap an I/O error with the operation that caused it
    #[must_use]
    pub fn io(context: impl fmt::Display, err: &std::io::Error) -> Self {
        Self::Io(format!("{}: {}", context, err))
    }

    /// Render as `[<kind>]` followed by the message
    #[must_use]
    pub fn tagged(&self) -> String {
        format!("[{}]\n{}\n", self.kind(), self.message())
    }

    /// Fold a list of per-item failures into a single error.
    ///
    /// Returns `Ok(())` for no failures, the error unchanged for exactly one,
    /// and a `Connector` error enumerating every member otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if `errors` is non-empty
    pub fn fold(mut errors: Vec<AgentError>, what: &str) -> AgentResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            n => {
                let members: Vec<String> = errors.iter().map(AgentError::tagged).collect();
                Err(Self::Connector(format!(
                    "{} {} failed:\n{}",
                    n,
                    what,
                    members.join("\n")
                )))
            }
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::RedValidation(format!("job document does not match the expected shape: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::Connector("could not find connector".to_string());
        assert_eq!(format!("{}", err), "could not find connector");
        assert_eq!(err.kind(), "ConnectorError");
    }

    #[test]
    fn test_tagged() {
        let err = AgentError::JobSpecification("required argument \"a\" is missing".to_string());
        assert_eq!(
            err.tagged(),
            "[JobSpecificationError]\nrequired argument \"a\" is missing\n"
        );
    }

    #[test]
    fn test_fold_empty() {
        assert!(AgentError::fold(Vec::new(), "output connectors").is_ok());
    }

    #[test]
    fn test_fold_single_keeps_original() {
        let err = AgentError::Io("disk full".to_string());
        let folded = AgentError::fold(vec![err.clone()], "output connectors");
        assert_eq!(folded, Err(err));
    }

    #[test]
    fn test_fold_many_enumerates_members() {
        let errors = vec![
            AgentError::Connector("send failed for output key \"a\"".to_string()),
            AgentError::Connector("send failed for output key \"b\"".to_string()),
        ];
        let folded = AgentError::fold(errors, "output connectors").unwrap_err();
        assert_eq!(folded.kind(), "ConnectorError");
        let msg = folded.to_string();
        assert!(msg.starts_with("2 output connectors failed"));
        assert!(msg.contains("\"a\""));
        assert!(msg.contains("\"b\""));
        assert_eq!(msg.matches("[ConnectorError]").count(), 2);
    }

    #[test]
    fn test_io_context() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = AgentError::io("reading job.yml", &io);
        assert_eq!(err.to_string(), "reading job.yml: no such file");
    }
}
