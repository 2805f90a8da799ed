//! Process executor.

use crate::monitor::{MemorySampler, Monitoring, SAMPLE_INTERVAL};
use porter_core::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Instant;
use tracing::{debug, info};

/// Exit code and output lines of a short helper process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    /// Exit code, `-1` if the process was killed by a signal
    pub return_code: i32,
    /// Standard output split into lines
    pub std_out: Vec<String>,
    /// Standard error split into lines
    pub std_err: Vec<String>,
}

impl Captured {
    fn from_output(output: &Output) -> Self {
        Self {
            return_code: output.status.code().unwrap_or(-1),
            std_out: split_lines(&output.stdout),
            std_err: split_lines(&output.stderr),
        }
    }

    /// Process exited with code 0
    #[must_use]
    pub fn successful(&self) -> bool {
        self.return_code == 0
    }

    /// Standard error joined back into one string
    #[must_use]
    pub fn std_err_text(&self) -> String {
        self.std_err.join("\n")
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes).lines().map(str::to_string).collect()
}

fn command(argv: &[String], work_dir: Option<&Path>) -> io::Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = work_dir {
        command.current_dir(dir);
    }
    Ok(command)
}

/// Run `argv` to completion and capture its output.
///
/// # Errors
///
/// Returns the spawn error, e.g. `NotFound` for a missing executable
pub fn run_captured(argv: &[String], work_dir: Option<&Path>) -> io::Result<Captured> {
    let output = command(argv, work_dir)?.output()?;
    Ok(Captured::from_output(&output))
}

/// Outcome of the job process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    /// Exit code, `-1` if the process was killed by a signal
    pub return_code: i32,
    /// Standard output lines
    pub std_out: Vec<String>,
    /// Standard error lines
    pub std_err: Vec<String>,
    /// Wall time and peak memory
    pub monitoring: Monitoring,
}

impl ProcessResult {
    /// Turn a non-zero exit into an error
    ///
    /// # Errors
    ///
    /// Returns `Execution` with the captured standard error
    pub fn check(&self, argv: &[String]) -> AgentResult<()> {
        if self.return_code == 0 {
            return Ok(());
        }
        Err(AgentError::Execution(format!(
            "Execution of command \"{}\" failed with the following message:\n{}",
            argv.join(" "),
            self.std_err.join("\n")
        )))
    }
}

/// Run the job command in `work_dir`, sampling its resource usage.
///
/// A non-zero exit is not an error here, see [`ProcessResult::check`].
///
/// # Errors
///
/// Returns `Execution` if the process cannot be started
pub fn execute(argv: &[String], work_dir: &Path) -> AgentResult<ProcessResult> {
    let spawn_error = |e: io::Error| {
        AgentError::Execution(format!(
            "Execution of command \"{}\" failed with the following message:\n{}",
            argv.join(" "),
            e
        ))
    };

    info!(program = argv.first().map(String::as_str).unwrap_or_default(), "starting job process");
    let started = Instant::now();
    let child = command(argv, Some(work_dir))
        .and_then(|mut c| c.spawn())
        .map_err(spawn_error)?;
    let sampler = MemorySampler::start(child.id(), SAMPLE_INTERVAL);
    let waited = child.wait_with_output();
    let peak = sampler.finish();
    let output = waited.map_err(spawn_error)?;
    let monitoring = Monitoring::new(peak, started.elapsed());

    let captured = Captured::from_output(&output);
    info!(
        return_code = captured.return_code,
        wall_time = monitoring.wall_time,
        "job process finished"
    );
    debug!(max_rss_memory = ?monitoring.max_rss_memory, "job process memory");

    Ok(ProcessResult {
        return_code: captured.return_code,
        std_out: captured.std_out,
        std_err: captured.std_err,
        monitoring,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_run_captured_lines() {
        let captured = run_captured(&argv(&["/bin/sh", "-c", "echo a; echo b; echo err >&2"]), None).unwrap();
        assert!(captured.successful());
        assert_eq!(captured.std_out, vec!["a", "b"]);
        assert_eq!(captured.std_err_text(), "err");
    }

    #[test]
    fn test_run_captured_missing_program() {
        let err = run_captured(&argv(&["porter-no-such-program"]), None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_execute_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = execute(&argv(&["/bin/sh", "-c", "pwd; touch out.txt"]), dir.path()).unwrap();
        assert_eq!(result.return_code, 0);
        assert!(dir.path().join("out.txt").exists());
        assert!(result.monitoring.wall_time >= 0.0);
        assert!(result.check(&argv(&["sh"])).is_ok());
    }

    #[test]
    fn test_execute_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let command = argv(&["/bin/sh", "-c", "echo broken >&2; exit 3"]);
        let result = execute(&command, dir.path()).unwrap();
        assert_eq!(result.return_code, 3);
        let err = result.check(&command).unwrap_err();
        assert_eq!(err.kind(), "ExecutionError");
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_execute_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute(&argv(&["porter-no-such-program"]), dir.path()).unwrap_err();
        assert_eq!(err.kind(), "ExecutionError");
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let result = execute(&argv(&["/bin/sh", "-c", "true"]), dir.path()).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["returnCode"], 0);
        assert!(value["monitoring"].get("wallTime").is_some());
    }
}
