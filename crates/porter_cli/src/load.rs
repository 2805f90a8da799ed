//! Job document and variables loading.

use porter_core::{AgentError, AgentResult};
use porter_template::Variables;
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;
use std::fs;
use std::time::Duration;
use tracing::info;

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

fn fetch(url: &str) -> AgentResult<String> {
    let client = HttpClient::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| AgentError::Io(format!("could not create http client: {}", e)))?;
    let response = client
        .get(url)
        .send()
        .map_err(|e| AgentError::Io(format!("could not fetch \"{}\": {}", url, e)))?;
    let status = response.status();
    if !status.is_success() {
        return Err(AgentError::Io(format!(
            "could not fetch \"{}\": status {}",
            url,
            status.as_u16()
        )));
    }
    response
        .text()
        .map_err(|e| AgentError::Io(format!("could not read response of \"{}\": {}", url, e)))
}

fn read(location: &str) -> AgentResult<String> {
    if let Some((scheme, _)) = location.split_once("://") {
        return match scheme {
            "http" | "https" => fetch(location),
            other => Err(AgentError::FileScheme(format!(
                "unsupported scheme \"{}\" in \"{}\", use a local path or an http(s) URL",
                other, location
            ))),
        };
    }
    let path = location.strip_prefix("path:").unwrap_or(location);
    fs::read_to_string(path).map_err(|e| AgentError::io(format!("could not read \"{}\"", path), &e))
}

/// Parse JSON, falling back to YAML. The top level must be a mapping.
///
/// # Errors
///
/// Returns `FileFormat` naming `location` otherwise
pub fn parse_document(text: &str, location: &str) -> AgentResult<Value> {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => serde_yaml::from_str::<Value>(text).map_err(|e| {
            AgentError::FileFormat(format!(
                "\"{}\" is neither valid JSON nor valid YAML: {}",
                location, e
            ))
        })?,
    };
    if !value.is_object() {
        return Err(AgentError::FileFormat(format!(
            "\"{}\" does not contain a mapping at the top level",
            location
        )));
    }
    Ok(value)
}

/// Load a document from a local path, a `path:` location or an http(s) URL
///
/// # Errors
///
/// Returns `FileScheme`, `FileFormat` or `Io`
pub fn load_document(location: &str) -> AgentResult<Value> {
    let text = read(location)?;
    let value = parse_document(&text, location)?;
    info!(location, "loaded document");
    Ok(value)
}

/// Load template values. The document must map names to strings.
///
/// # Errors
///
/// Returns `RedValidation` for any non-string value, or the errors of
/// [`load_document`]
pub fn load_variables(location: &str) -> AgentResult<Variables> {
    let Value::Object(map) = load_document(location)? else {
        return Err(AgentError::RedValidation(format!(
            "variables file \"{}\" must be a mapping",
            location
        )));
    };

    let mut variables = Variables::new();
    for (name, value) in map {
        match value {
            Value::String(s) => {
                variables.insert(name, s);
            }
            other => {
                return Err(AgentError::RedValidation(format!(
                    "variable \"{}\" in \"{}\" must be a string, found {}",
                    name,
                    location,
                    kind(&other)
                )));
            }
        }
    }
    Ok(variables)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_then_yaml() {
        assert_eq!(parse_document(r#"{"a": 1}"#, "x").unwrap(), json!({"a": 1}));
        assert_eq!(
            parse_document("cli:\n  baseCommand: [wc, -l]\n", "x").unwrap(),
            json!({"cli": {"baseCommand": ["wc", "-l"]}})
        );
    }

    #[test]
    fn test_not_a_document() {
        let err = parse_document("{ unbalanced", "job.yml").unwrap_err();
        assert_eq!(err.kind(), "FileFormatError");
        assert!(err.to_string().contains("job.yml"));

        let err = parse_document("- a\n- b\n", "job.yml").unwrap_err();
        assert_eq!(err.kind(), "FileFormatError");
    }

    #[test]
    fn test_scheme() {
        let err = load_document("ftp://example.org/job.json").unwrap_err();
        assert_eq!(err.kind(), "FileSchemeError");
    }

    #[test]
    fn test_path_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("job.json");
        fs::write(&file, r#"{"cli": {}}"#).unwrap();
        let location = format!("path:{}", file.display());
        assert_eq!(load_document(&location).unwrap(), json!({"cli": {}}));

        let err = load_document(&dir.path().join("missing").to_string_lossy()).unwrap_err();
        assert_eq!(err.kind(), "IoError");
    }

    #[test]
    fn test_variables() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("vars.yml");
        fs::write(&good, "user: alice\npassword: hunter2\n").unwrap();
        let variables = load_variables(&good.to_string_lossy()).unwrap();
        assert_eq!(variables["password"], "hunter2");

        let bad = dir.path().join("bad.json");
        fs::write(&bad, r#"{"port": 8080}"#).unwrap();
        let err = load_variables(&bad.to_string_lossy()).unwrap_err();
        assert_eq!(err.kind(), "RedValidationError");
        assert!(err.to_string().contains("\"port\""));
    }
}
