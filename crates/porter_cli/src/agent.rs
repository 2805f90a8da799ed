//! Run pipeline.
//!
//! load → fill templates → type → plan → check base command → synthesize →
//! stage inputs → execute → locate and deliver outputs. Held mounts are
//! released whatever happened before.

use crate::load::{load_document, load_variables};
use crate::report::{OutputFileReport, RunReport};
use indexmap::IndexMap;
use porter_connector::{ensure_directory, file_size, ConnectorManager, ProtocolRegistry};
use porter_core::{AgentError, AgentResult, DataClass, JobDocument};
use porter_plan::{check_base_command, JobPlan, Location, PlanOptions, ResolvedOutput};
use porter_template::{inspect as inspect_template, resolve, SecretSet, TemplateKey, Variables};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Options of `porter run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Job document location
    pub job: String,
    /// Batch index
    pub batch: Option<usize>,
    /// Send outputs through their connectors
    pub outputs: bool,
    /// Template values location
    pub variables: Option<String>,
    /// Staging root for inputs, a temp dir if unset
    pub inputs_dir: Option<PathBuf>,
    /// Working directory of the job process, a temp dir if unset
    pub work_dir: Option<PathBuf>,
    /// Destination of located outputs when they are not sent, the current
    /// directory if unset
    pub outdir: Option<PathBuf>,
    /// Keep temp dirs after the run
    pub leave_directories: bool,
}

impl RunOptions {
    /// Options for the job at `job`
    #[must_use]
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            ..Self::default()
        }
    }
}

/// Staging directories of one run. Temp dirs are removed on drop unless
/// they were released with `leave_directories`.
#[derive(Debug)]
struct Workspace {
    inputs_dir: PathBuf,
    work_dir: PathBuf,
    _temp: Vec<TempDir>,
}

impl Workspace {
    fn create(options: &RunOptions) -> AgentResult<Self> {
        let mut temp = Vec::new();
        let inputs_dir = match &options.inputs_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .map_err(|e| AgentError::io(format!("could not create \"{}\"", dir.display()), &e))?;
                dir.clone()
            }
            None => temp_dir("porter-inputs-", options.leave_directories, &mut temp)?,
        };
        let work_dir = match &options.work_dir {
            Some(dir) => {
                ensure_directory(dir).map_err(|e| {
                    AgentError::io(format!("could not create working dir \"{}\"", dir.display()), &e)
                })?;
                dir.clone()
            }
            None => temp_dir("porter-work-", options.leave_directories, &mut temp)?,
        };
        info!(inputs_dir = %inputs_dir.display(), work_dir = %work_dir.display(), "staging directories");
        Ok(Self {
            inputs_dir,
            work_dir,
            _temp: temp,
        })
    }
}

fn temp_dir(prefix: &str, leave: bool, guards: &mut Vec<TempDir>) -> AgentResult<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(|e| AgentError::io("could not create temp dir", &e))?;
    if leave {
        return Ok(dir.into_path());
    }
    let path = dir.path().to_path_buf();
    guards.push(dir);
    Ok(path)
}

/// Load the document and fill its templates. Secrets are returned apart
/// from the typed document so that a typing error can still be redacted.
fn resolved_document(location: &str, variables: Option<&str>) -> AgentResult<(Value, SecretSet)> {
    let raw = load_document(location)?;
    let values = match variables {
        Some(location) => load_variables(location)?,
        None => Variables::new(),
    };
    let resolved = resolve(&raw, &values)?;
    Ok((resolved.document, resolved.secrets))
}

/// Absolute program path so that relative base commands survive the change
/// of working directory
fn program_argv(command: &[String], program: &Path) -> Vec<String> {
    let program = if program.is_absolute() {
        program.to_path_buf()
    } else {
        fs::canonicalize(program).unwrap_or_else(|_| program.to_path_buf())
    };
    let mut argv = command.to_vec();
    if let Some(first) = argv.first_mut() {
        *first = program.to_string_lossy().into_owned();
    }
    argv
}

fn output_report(output: &ResolvedOutput, location: &Location) -> OutputFileReport {
    let path = match location {
        Location::Found(path) => Some(path.clone()),
        _ => None,
    };
    OutputFileReport {
        size: match output.class {
            DataClass::File => path.as_deref().and_then(file_size),
            DataClass::Directory => None,
        },
        path: path.map(|p| p.to_string_lossy().into_owned()),
        is_optional: output.is_optional,
        class: output.class,
    }
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry.path().strip_prefix(from).map_err(io::Error::other)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Move `from` into `dir`, copying when a rename is not possible
fn move_into(from: &Path, dir: &Path) -> io::Result<PathBuf> {
    let name = from
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "output has no file name"))?;
    let target = dir.join(name);
    if fs::rename(from, &target).is_ok() {
        return Ok(target);
    }
    if from.is_dir() {
        copy_tree(from, &target)?;
        fs::remove_dir_all(from)?;
    } else {
        fs::copy(from, &target)?;
        fs::remove_file(from)?;
    }
    Ok(target)
}

/// Locate every output and record it. Without `--outputs` the located
/// outputs are moved to the outdir and required outputs must be present.
fn collect_outputs(
    plan: &JobPlan,
    options: &RunOptions,
    work_dir: &Path,
    report: &mut RunReport,
) -> AgentResult<()> {
    let outputs = plan.resolved_outputs()?;
    let mut files = IndexMap::new();
    let mut missing = Vec::new();
    let mut found = Vec::new();

    for output in &outputs {
        let location = output.locate(work_dir)?;
        match &location {
            Location::Found(path) => found.push((output.key.clone(), path.clone())),
            Location::NotFound | Location::Ambiguous(_) if !output.is_optional => {
                missing.push(output.key.clone());
            }
            Location::Ambiguous(matches) => {
                warn!(key = %output.key, matches = matches.len(), "optional output is ambiguous, ignoring it");
            }
            Location::NotFound => {}
        }
        files.insert(output.key.clone(), output_report(output, &location));
    }
    report.output_files = Some(files);

    if options.outputs {
        return Ok(());
    }
    if !missing.is_empty() {
        return Err(AgentError::MissingOutputFiles(format!(
            "missing or ambiguous output files for keys: {}",
            missing.join(", ")
        )));
    }

    let outdir = match &options.outdir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(|e| AgentError::io("could not read current dir", &e))?,
    };
    fs::create_dir_all(&outdir)
        .map_err(|e| AgentError::io(format!("could not create \"{}\"", outdir.display()), &e))?;

    for (key, path) in found {
        let moved = move_into(&path, &outdir).map_err(|e| {
            AgentError::io(format!("could not move output \"{}\" to \"{}\"", key, outdir.display()), &e)
        })?;
        if let Some(entry) = report.output_files.as_mut().and_then(|files| files.get_mut(&key)) {
            entry.path = Some(moved.to_string_lossy().into_owned());
        }
    }
    Ok(())
}

fn run_job(
    options: &RunOptions,
    workspace: &Workspace,
    manager: &mut ConnectorManager,
    secrets: &mut SecretSet,
    report: &mut RunReport,
) -> AgentResult<()> {
    let (resolved, document_secrets) = resolved_document(&options.job, options.variables.as_deref())?;
    *secrets = document_secrets;
    let document = JobDocument::from_value(resolved)?;

    let plan_options = PlanOptions::new(&workspace.inputs_dir)
        .with_batch(options.batch)
        .with_outputs(options.outputs);
    let plan = JobPlan::build(&document, &plan_options)?;
    let program = check_base_command(&plan.cli)?;
    let command = plan.command()?;
    report.command = Some(command.clone());

    manager.import(&plan)?;
    manager.prepare_directories()?;
    manager.validate()?;
    manager.receive()?;
    report.input_files = Some(manager.input_files());

    let process = porter_runtime::execute(&program_argv(&command, &program), &workspace.work_dir)?;
    report.process = Some(process.clone());
    process.check(&command)?;

    collect_outputs(&plan, options, &workspace.work_dir, report)?;
    if options.outputs {
        manager.send(&workspace.work_dir)?;
        info!(outputs = manager.outputs().len(), "sent outputs");
    }
    Ok(())
}

/// Run one job and report the outcome. Never fails; failures end up in the
/// report. Also returns the secrets needed to render it.
#[must_use]
pub fn run(options: &RunOptions) -> (RunReport, SecretSet) {
    let mut report = RunReport::default();
    let mut secrets = SecretSet::new();

    let workspace = match Workspace::create(options) {
        Ok(workspace) => workspace,
        Err(e) => {
            report.fail(&[e], &secrets);
            return (report, secrets);
        }
    };

    let mut manager = ConnectorManager::new(ProtocolRegistry::with_defaults());
    let result = run_job(options, &workspace, &mut manager, &mut secrets, &mut report);
    let unmount_errors = manager.unmount_all();

    let mut errors = Vec::new();
    if let Err(e) = result {
        warn!(kind = e.kind(), "run failed");
        errors.push(e);
    }
    errors.extend(unmount_errors);
    if !errors.is_empty() {
        report.fail(&errors, &secrets);
    }
    drop(workspace);
    (report, secrets)
}

/// Template keys of a job document with their protection status
///
/// # Errors
///
/// Returns the loading and template errors
pub fn inspect(location: &str) -> AgentResult<Vec<TemplateKey>> {
    let document = load_document(location)?;
    Ok(inspect_template(&document)?.keys().collect())
}

/// Synthesize the command of a job without staging anything. The secrets
/// are returned on both paths so that either can be redacted.
///
/// # Errors
///
/// The first element carries the loading, template, validation and
/// synthesis errors
#[must_use]
pub fn command(
    location: &str,
    batch: Option<usize>,
    variables: Option<&str>,
) -> (AgentResult<Vec<String>>, SecretSet) {
    let (resolved, secrets) = match resolved_document(location, variables) {
        Ok(resolved) => resolved,
        Err(e) => return (Err(e), SecretSet::new()),
    };
    let inputs_dir = std::env::temp_dir().join("porter-inputs");
    let argv = JobDocument::from_value(resolved).and_then(|document| {
        JobPlan::build(&document, &PlanOptions::new(inputs_dir).with_batch(batch))?.command()
    });
    (argv, secrets)
}
