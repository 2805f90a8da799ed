//! Connector manager.
//!
//! Owns every runner of a run and drives them phase by phase. Receiving
//! mounts first and copies second. Sending attempts every output and folds
//! the failures. Unmounting is attempted for every held mount and never
//! replaces an earlier error.

use crate::registry::ProtocolRegistry;
use crate::runner::{InputConnector, InputFileReport, OutputConnector};
use porter_core::{AgentError, AgentResult};
use porter_plan::JobPlan;
use std::path::Path;
use tracing::{info, warn};

/// Runners of one job run
#[derive(Debug, Default)]
pub struct ConnectorManager {
    registry: ProtocolRegistry,
    inputs: Vec<InputConnector>,
    outputs: Vec<OutputConnector>,
}

impl ConnectorManager {
    /// Create a manager resolving protocols through `registry`
    #[must_use]
    pub fn new(registry: ProtocolRegistry) -> Self {
        Self {
            registry,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Create runners for every input connector and, when outputs are
    /// enabled, every output connector of `plan`
    ///
    /// # Errors
    ///
    /// Returns `Connector` if a connector cannot be set up, or
    /// `InvalidInputReference` if an output glob cannot be resolved
    pub fn import(&mut self, plan: &JobPlan) -> AgentResult<()> {
        for staged in plan.input_connectors() {
            let runner = InputConnector::new(&staged, &mut self.registry)?;
            self.inputs.push(runner);
        }
        for target in plan.output_targets()? {
            let runner = OutputConnector::new(&target, &mut self.registry)?;
            self.outputs.push(runner);
        }
        info!(
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            "imported connectors"
        );
        Ok(())
    }

    /// Input runners in import order
    #[must_use]
    pub fn inputs(&self) -> &[InputConnector] {
        &self.inputs
    }

    /// Output runners in import order
    #[must_use]
    pub fn outputs(&self) -> &[OutputConnector] {
        &self.outputs
    }

    /// Create the target directories of every input
    ///
    /// # Errors
    ///
    /// Returns the first `Connector` error
    pub fn prepare_directories(&mut self) -> AgentResult<()> {
        self.inputs
            .iter_mut()
            .try_for_each(InputConnector::prepare_directory)
    }

    /// Validate inputs, then outputs
    ///
    /// # Errors
    ///
    /// Returns the first `Connector` error
    pub fn validate(&mut self) -> AgentResult<()> {
        self.inputs.iter_mut().try_for_each(InputConnector::validate)?;
        self.outputs.iter_mut().try_for_each(OutputConnector::validate)
    }

    /// Receive every input, mounting inputs first
    ///
    /// # Errors
    ///
    /// Returns the first `Connector` error; later inputs are not received
    pub fn receive(&mut self) -> AgentResult<()> {
        let (mounting, copying): (Vec<_>, Vec<_>) =
            self.inputs.iter_mut().partition(|runner| runner.is_mounting());
        for runner in mounting.into_iter().chain(copying) {
            runner.receive()?;
        }
        info!(inputs = self.inputs.len(), "received inputs");
        Ok(())
    }

    /// Send every output found in `working_dir`, attempting all of them
    ///
    /// # Errors
    ///
    /// Returns the single failure unchanged, or one `Connector` error
    /// enumerating every failure
    pub fn send(&mut self, working_dir: &Path) -> AgentResult<()> {
        let mut errors = Vec::new();
        for runner in &mut self.outputs {
            if let Err(e) = runner.send(working_dir) {
                warn!(key = runner.key(), kind = e.kind(), "output connector failed");
                errors.push(e);
            }
        }
        AgentError::fold(errors, "output connectors")
    }

    /// Release every held mount. Failures are returned, not raised, so that
    /// they never mask the error that ended the run.
    pub fn unmount_all(&mut self) -> Vec<AgentError> {
        let mut errors = Vec::new();
        for runner in &mut self.inputs {
            if let Err(e) = runner.try_unmount() {
                warn!(key = runner.key(), "unmount failed");
                errors.push(e);
            }
        }
        errors
    }

    /// Report entries of every input
    #[must_use]
    pub fn input_files(&self) -> Vec<InputFileReport> {
        self.inputs.iter().map(InputConnector::report).collect()
    }
}
