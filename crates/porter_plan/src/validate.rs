//! Document checks that go beyond the typed shape, and batch selection.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use porter_core::{AgentError, AgentResult, CliDescription, InputValue, JobDocument, OutputValue};
use regex::Regex;

static KEY_PATTERN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$"));

fn key_pattern() -> AgentResult<&'static Regex> {
    KEY_PATTERN
        .as_ref()
        .map_err(|e| AgentError::RedValidation(format!("key pattern does not compile: {}", e)))
}

/// Inputs and outputs of the active batch
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Active input values
    pub inputs: IndexMap<String, InputValue>,
    /// Active output destinations
    pub outputs: Option<IndexMap<String, OutputValue>>,
}

/// Pick the active inputs and outputs.
///
/// Without batches the top-level sections are used and `batch` is ignored.
/// A batch without outputs keeps the top-level outputs.
///
/// # Errors
///
/// Returns `Argument` if the document has batches and `batch` is missing or
/// out of range
pub fn select_batch(document: &JobDocument, batch: Option<usize>) -> AgentResult<Selection> {
    let batches = match &document.batches {
        Some(batches) if !batches.is_empty() => batches,
        _ => {
            return Ok(Selection {
                inputs: document.inputs.clone(),
                outputs: document.outputs.clone(),
            });
        }
    };

    let index = batch.ok_or_else(|| {
        AgentError::Argument(
            "batches are specified in the job document, but --batch is missing".to_string(),
        )
    })?;
    let selected = batches.get(index).ok_or_else(|| {
        AgentError::Argument(format!(
            "invalid batch index {} provided by --batch, the job document has {} batches",
            index,
            batches.len()
        ))
    })?;

    Ok(Selection {
        inputs: selected.inputs.clone(),
        outputs: selected
            .outputs
            .clone()
            .filter(|o| !o.is_empty())
            .or_else(|| document.outputs.clone()),
    })
}

/// CLI input and output keys must be plain identifiers
///
/// # Errors
///
/// Returns `RedValidation` naming the first offending key
pub fn check_key_format(cli: &CliDescription) -> AgentResult<()> {
    let pattern = key_pattern()?;
    let keys = cli.inputs.keys().chain(cli.outputs.keys());
    for key in keys {
        if !pattern.is_match(key) {
            return Err(AgentError::RedValidation(format!(
                "key \"{}\" does not match {}",
                key,
                pattern.as_str()
            )));
        }
    }
    Ok(())
}

/// Every active input and output key must be declared in the CLI description
///
/// # Errors
///
/// Returns `RedSpecification` naming every undeclared key
pub fn check_keys_declared(cli: &CliDescription, selection: &Selection) -> AgentResult<()> {
    let mut undeclared: Vec<String> = selection
        .inputs
        .keys()
        .filter(|k| !cli.inputs.contains_key(*k))
        .map(|k| format!("inputs.{}", k))
        .collect();

    if let Some(outputs) = &selection.outputs {
        undeclared.extend(
            outputs
                .keys()
                .filter(|k| !cli.outputs.contains_key(*k))
                .map(|k| format!("outputs.{}", k)),
        );
    }

    if undeclared.is_empty() {
        Ok(())
    } else {
        Err(AgentError::RedSpecification(format!(
            "keys not declared in the CLI description: {}",
            undeclared.join(", ")
        )))
    }
}
