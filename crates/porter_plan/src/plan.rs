//! Job plan: the validated, completed view of one run.

use crate::command;
use crate::inputs::{complete_inputs, inputs_tree};
use crate::outputs::{resolve_outputs, ResolvedOutput};
use crate::validate::{check_key_format, check_keys_declared, select_batch};
use indexmap::IndexMap;
use porter_core::{
    AgentError, AgentResult, CliDescription, ConnectorDescriptor, DataObject, InputValue,
    JobDocument, OutputValue,
};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info};

/// Options that shape a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    /// Batch index, required when the document has batches
    pub batch: Option<usize>,
    /// Send outputs through their connectors
    pub use_outputs: bool,
    /// Root under which inputs without a location are staged
    pub inputs_dir: PathBuf,
}

impl PlanOptions {
    /// Create options staging inputs under `inputs_dir`
    #[must_use]
    pub fn new(inputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            batch: None,
            use_outputs: false,
            inputs_dir: inputs_dir.into(),
        }
    }

    /// Select a batch
    #[must_use]
    pub fn with_batch(mut self, batch: Option<usize>) -> Self {
        self.batch = batch;
        self
    }

    /// Enable the outputs section
    #[must_use]
    pub fn with_outputs(mut self, use_outputs: bool) -> Self {
        self.use_outputs = use_outputs;
        self
    }
}

/// An input data object that is staged by a connector
#[derive(Debug, Clone, Copy)]
pub struct StagedInput<'a> {
    /// Input key
    pub key: &'a str,
    /// Completed object
    pub object: &'a DataObject,
    /// Connector that stages it
    pub connector: &'a ConnectorDescriptor,
}

/// An output that is sent by a connector
#[derive(Debug, Clone)]
pub struct OutputTarget<'a> {
    /// Resolved CLI output
    pub output: ResolvedOutput,
    /// Destination
    pub value: &'a OutputValue,
}

/// Validated job with completed inputs
#[derive(Debug, Clone)]
pub struct JobPlan {
    /// CLI description
    pub cli: CliDescription,
    /// Completed input values of the active batch
    pub inputs: IndexMap<String, InputValue>,
    /// Output destinations, only when outputs are enabled
    pub outputs: Option<IndexMap<String, OutputValue>>,
    tree: Value,
}

impl JobPlan {
    /// Validate `document`, select the batch and complete the inputs.
    ///
    /// # Errors
    ///
    /// Returns `Argument` for batch or outputs flag misuse, and
    /// `RedValidation` or `RedSpecification` for inconsistent documents
    pub fn build(document: &JobDocument, options: &PlanOptions) -> AgentResult<Self> {
        check_key_format(&document.cli)?;

        let mut selection = select_batch(document, options.batch)?;
        if options.use_outputs {
            if selection.outputs.is_none() {
                return Err(AgentError::Argument(
                    "--outputs was given, but the job document has no outputs section".to_string(),
                ));
            }
        } else {
            selection.outputs = None;
        }
        check_keys_declared(&document.cli, &selection)?;

        if let Some(batch) = options.batch {
            if document.batches.is_some() {
                info!(batch, "selected batch");
            }
        }

        let mut inputs = selection.inputs;
        complete_inputs(&mut inputs, &options.inputs_dir);
        let tree = inputs_tree(&inputs)?;
        debug!(inputs = inputs.len(), "completed inputs");

        Ok(Self {
            cli: document.cli.clone(),
            inputs,
            outputs: selection.outputs,
            tree,
        })
    }

    /// Inputs as seen by `$(inputs...)` references
    #[must_use]
    pub fn inputs_tree(&self) -> &Value {
        &self.tree
    }

    /// Synthesize the command
    ///
    /// # Errors
    ///
    /// Returns `JobSpecification` or `InvalidBaseCommand`
    pub fn command(&self) -> AgentResult<Vec<String>> {
        command::synthesize(&self.cli, &self.inputs)
    }

    /// CLI outputs with globs resolved
    ///
    /// # Errors
    ///
    /// Returns `InvalidInputReference` naming the failing output key
    pub fn resolved_outputs(&self) -> AgentResult<Vec<ResolvedOutput>> {
        resolve_outputs(&self.cli.outputs, &self.tree)
    }

    /// Every input object that carries a connector, list elements included
    #[must_use]
    pub fn input_connectors(&self) -> Vec<StagedInput<'_>> {
        let mut staged = Vec::new();
        for (key, value) in &self.inputs {
            let objects: Vec<&DataObject> = match value {
                InputValue::Object(object) => vec![object],
                InputValue::List(items) => items
                    .iter()
                    .filter_map(|item| match item {
                        InputValue::Object(object) => Some(object),
                        _ => None,
                    })
                    .collect(),
                InputValue::Scalar(_) => Vec::new(),
            };
            for object in objects {
                if let Some(connector) = &object.connector {
                    staged.push(StagedInput {
                        key,
                        object,
                        connector,
                    });
                }
            }
        }
        staged
    }

    /// Outputs to send, paired with their resolved CLI output. Empty when
    /// outputs are disabled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInputReference` if an output glob cannot be resolved
    pub fn output_targets(&self) -> AgentResult<Vec<OutputTarget<'_>>> {
        let Some(outputs) = &self.outputs else {
            return Ok(Vec::new());
        };
        let resolved = self.resolved_outputs()?;
        Ok(resolved
            .into_iter()
            .filter_map(|output| {
                outputs
                    .get(&output.key)
                    .map(|value| OutputTarget { output, value })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> JobDocument {
        JobDocument::from_value(json!({
            "redVersion": "9",
            "cli": {
                "baseCommand": ["wc", "-l"],
                "inputs": {
                    "files": {"type": "File[]", "inputBinding": {"position": 0}},
                    "label": {"type": "string?", "inputBinding": {"prefix": "--label"}}
                },
                "outputs": {
                    "count": {"type": "File", "outputBinding": {"glob": "$(inputs.files[0].nameroot).count"}}
                }
            },
            "inputs": {
                "files": [
                    {"class": "File", "basename": "a.txt", "connector": {"command": "get", "access": {"url": "u1"}}},
                    {"class": "File", "basename": "b.txt", "connector": {"command": "get", "access": {"url": "u2"}}}
                ],
                "label": "x"
            },
            "outputs": {
                "count": {"class": "File", "connector": {"command": "put", "access": {"url": "u3"}}}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_build_and_command() {
        let plan = JobPlan::build(&document(), &PlanOptions::new("/tmp/in")).unwrap();
        let command = plan.command().unwrap();
        assert_eq!(&command[..4], &["wc", "-l", "--label", "x"]);
        assert!(command[4].ends_with("/a.txt"));
        assert!(command[5].ends_with("/b.txt"));
        assert!(plan.outputs.is_none());
    }

    #[test]
    fn test_input_connectors() {
        let plan = JobPlan::build(&document(), &PlanOptions::new("/tmp/in")).unwrap();
        let staged = plan.input_connectors();
        assert_eq!(staged.len(), 2);
        assert!(staged.iter().all(|s| s.key == "files"));
        assert_eq!(staged[1].connector.access, json!({"url": "u2"}));
    }

    #[test]
    fn test_output_targets() {
        let options = PlanOptions::new("/tmp/in").with_outputs(true);
        let plan = JobPlan::build(&document(), &options).unwrap();
        let targets = plan.output_targets().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].output.glob, "a.count");
        assert_eq!(targets[0].value.connector.command, "put");
    }

    #[test]
    fn test_outputs_disabled() {
        let plan = JobPlan::build(&document(), &PlanOptions::new("/tmp/in")).unwrap();
        assert!(plan.output_targets().unwrap().is_empty());
        assert_eq!(plan.resolved_outputs().unwrap()[0].glob, "a.count");
    }

    #[test]
    fn test_outputs_flag_without_section() {
        let mut doc = document();
        doc.outputs = None;
        let options = PlanOptions::new("/tmp/in").with_outputs(true);
        let err = JobPlan::build(&doc, &options).unwrap_err();
        assert_eq!(err.kind(), "ArgumentError");
    }
}
