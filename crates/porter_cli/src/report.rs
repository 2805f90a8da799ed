//! Run report.
//!
//! The report is rendered as JSON or YAML. Before it leaves the process,
//! every secret value is replaced in the rendered text, and the debug lines
//! of a failed run are scrubbed line by line.

use indexmap::IndexMap;
use porter_connector::InputFileReport;
use porter_core::{AgentError, AgentResult, DataClass};
use porter_runtime::ProcessResult;
use porter_template::SecretSet;
use serde::{Deserialize, Serialize};

/// Report rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl Format {
    /// Render any serializable value
    ///
    /// # Errors
    ///
    /// Returns `Io` if serialization fails
    pub fn render<T: Serialize + ?Sized>(&self, value: &T) -> AgentResult<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(value)
                .map_err(|e| AgentError::Io(format!("could not render JSON: {}", e))),
            Self::Yaml => serde_yaml::to_string(value)
                .map_err(|e| AgentError::Io(format!("could not render YAML: {}", e))),
        }
    }
}

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Every phase completed
    Succeeded,
    /// A phase failed, see `debugInfo`
    Failed,
}

/// One located output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputFileReport {
    /// Final location, `None` if not found or ambiguous
    pub path: Option<String>,
    /// Size in bytes, files only
    pub size: Option<u64>,
    /// Declared optional
    pub is_optional: bool,
    /// File or directory
    pub class: DataClass,
}

/// Result of one `porter run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Synthesized command
    pub command: Option<Vec<String>>,
    /// Staged inputs
    pub input_files: Option<Vec<InputFileReport>>,
    /// Job process outcome
    pub process: Option<ProcessResult>,
    /// Located outputs by key
    pub output_files: Option<IndexMap<String, OutputFileReport>>,
    /// Scrubbed error lines of a failed run
    pub debug_info: Option<Vec<String>>,
    /// Final state
    pub state: RunState,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            command: None,
            input_files: None,
            process: None,
            output_files: None,
            debug_info: None,
            state: RunState::Succeeded,
        }
    }
}

/// Debug lines for `errors`: each as `[<kind>]` plus its message lines,
/// quotes stripped and secrets redacted
#[must_use]
pub fn debug_lines(errors: &[AgentError], secrets: &SecretSet) -> Vec<String> {
    errors
        .iter()
        .flat_map(|e| {
            e.tagged()
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| secrets.scrub_line(line.trim_end()))
                .collect::<Vec<_>>()
        })
        .collect()
}

impl RunReport {
    /// Mark the run failed. `errors` holds the error that ended the run
    /// first, followed by any cleanup failures.
    pub fn fail(&mut self, errors: &[AgentError], secrets: &SecretSet) {
        self.state = RunState::Failed;
        self.debug_info = Some(debug_lines(errors, secrets));
    }

    /// Whether the run succeeded
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }

    /// Process exit code: 0 on success, 1 otherwise
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.succeeded() { 0 } else { 1 }
    }

    /// Render with every secret redacted
    ///
    /// # Errors
    ///
    /// Returns `Io` if serialization fails
    pub fn render(&self, format: Format, secrets: &SecretSet) -> AgentResult<String> {
        let text = format.render(self)?;
        Ok(secrets.redact(&text))
    }
}
