//! Connector subprocess invocation.
//!
//! Access descriptors and listings are handed to the connector as JSON temp
//! files that exist only for the duration of one call.

use crate::protocol::Verb;
use porter_core::{AgentError, AgentResult, ListingEntry};
use porter_runtime::{run_captured, Captured};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

fn json_file<T: Serialize + ?Sized>(value: &T) -> AgentResult<NamedTempFile> {
    let write = || -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        serde_json::to_writer(&mut file, value).map_err(io::Error::other)?;
        file.flush()?;
        Ok(file)
    };
    write().map_err(|e| AgentError::io("could not write connector argument file", &e))
}

fn not_found(command: &str) -> AgentError {
    AgentError::Connector(format!("Could not find connector \"{}\"", command))
}

/// Run `<command> <verb> [access-file] [path] [--listing=listing-file]`.
///
/// The temp files are removed when the call returns, whatever its outcome.
/// A non-zero exit is not an error here; callers inspect the result.
///
/// # Errors
///
/// Returns `Connector` if the executable cannot be found or started, `Io` if
/// the argument files cannot be written
pub fn execute_connector(
    command: &str,
    verb: Verb,
    access: Option<&Value>,
    path: Option<&Path>,
    listing: Option<&[ListingEntry]>,
) -> AgentResult<Captured> {
    let access_file = access.map(json_file).transpose()?;
    let listing_file = listing.map(json_file).transpose()?;

    let mut argv = vec![command.to_string(), verb.as_str().to_string()];
    if let Some(file) = &access_file {
        argv.push(file.path().to_string_lossy().into_owned());
    }
    if let Some(path) = path {
        argv.push(path.to_string_lossy().into_owned());
    }
    if let Some(file) = &listing_file {
        argv.push(format!("--listing={}", file.path().display()));
    }

    debug!(command, verb = verb.as_str(), "invoking connector");
    let result = run_captured(&argv, None);
    drop(access_file);
    drop(listing_file);

    match result {
        Ok(captured) => Ok(captured),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found(command)),
        Err(e) => Err(AgentError::Connector(format!(
            "Could not start connector \"{}\": {}",
            command, e
        ))),
    }
}

/// Ask a connector for its protocol version.
///
/// # Errors
///
/// Returns `Connector` if the connector is missing, fails, or does not print
/// exactly one line
pub fn resolve_cli_version(command: &str) -> AgentResult<String> {
    let argv = [command.to_string(), "cli-version".to_string()];
    let captured = match run_captured(&argv, None) {
        Ok(captured) => captured,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found(command)),
        Err(e) => {
            return Err(AgentError::Connector(format!(
                "Could not start connector \"{}\": {}",
                command, e
            )));
        }
    };

    match captured.std_out.as_slice() {
        [line] if captured.successful() => Ok(line.trim().to_string()),
        _ => Err(AgentError::Connector(format!(
            "Could not detect cli version for connector \"{}\". Failed with following message:\n{}",
            command,
            captured.std_err_text()
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable `/bin/sh` script into `dir`
    pub(crate) fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_argument_order_and_file_lifetime() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        let body = format!(
            "echo \"$@\" > {log}\ncat \"$2\" >> {log}\necho >> {log}\ncat \"${{4#--listing=}}\" >> {log}",
            log = log.display()
        );
        let command = script(dir.path(), "conn", &body);
        let listing = vec![ListingEntry {
            class: porter_core::DataClass::File,
            basename: "a.txt".to_string(),
            listing: None,
        }];

        let captured = execute_connector(
            &command,
            Verb::ReceiveDir,
            Some(&json!({"url": "u"})),
            Some(Path::new("/data/in")),
            Some(&listing),
        )
        .unwrap();
        assert!(captured.successful());

        let logged = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = logged.lines().collect();
        let args: Vec<&str> = lines[0].split(' ').collect();
        assert_eq!(args[0], "receive-dir");
        assert_eq!(args[2], "/data/in");
        assert!(args[3].starts_with("--listing="));
        assert_eq!(lines[1], r#"{"url":"u"}"#);
        assert!(lines[2].contains("\"basename\":\"a.txt\""));

        assert!(!Path::new(args[1]).exists());
        assert!(!Path::new(args[3].trim_start_matches("--listing=")).exists());
    }

    #[test]
    fn test_path_only() {
        let dir = tempfile::tempdir().unwrap();
        let command = script(dir.path(), "conn", "echo \"$#:$1:$2\"");
        let captured =
            execute_connector(&command, Verb::UmountDir, None, Some(Path::new("/mnt/x")), None).unwrap();
        assert_eq!(captured.std_out, vec!["2:umount-dir:/mnt/x"]);
    }

    #[test]
    fn test_missing_connector() {
        let err = execute_connector("porter-no-such-connector", Verb::ReceiveFile, None, None, None)
            .unwrap_err();
        assert_eq!(err.kind(), "ConnectorError");
        assert!(err.to_string().contains("Could not find connector"));
    }

    #[test]
    fn test_cli_version() {
        let dir = tempfile::tempdir().unwrap();
        let good = script(dir.path(), "good", "echo 0.1");
        assert_eq!(resolve_cli_version(&good).unwrap(), "0.1");

        let chatty = script(dir.path(), "chatty", "echo 0.1; echo extra");
        let err = resolve_cli_version(&chatty).unwrap_err();
        assert!(err.to_string().contains("Could not detect cli version"));

        let failing = script(dir.path(), "failing", "echo 0.1; echo boom >&2; exit 1");
        let err = resolve_cli_version(&failing).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
