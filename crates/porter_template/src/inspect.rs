//! Placeholder discovery.

use crate::{child_path, index_path, is_protected_slot, is_section_key};
use indexmap::IndexMap;
use porter_core::{split_delimited, AgentError, AgentResult, Nesting, Segment};
use serde::Serialize;
use serde_json::{Map, Value};

/// Opening placeholder delimiter
pub const OPEN: &str = "{{";
/// Closing placeholder delimiter
pub const CLOSE: &str = "}}";

/// A placeholder name and whether its value is a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateKey {
    /// Placeholder name
    pub name: String,
    /// Value must be redacted
    pub protected: bool,
}

/// Placeholders found in a document, in order of first appearance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inspection {
    keys: IndexMap<String, bool>,
}

impl Inspection {
    /// Create an empty inspection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an occurrence. Protection only ever goes from false to true.
    pub fn record(&mut self, name: &str, protected: bool) {
        let entry = self.keys.entry(name.to_string()).or_insert(false);
        *entry |= protected;
    }

    /// All keys
    pub fn keys(&self) -> impl Iterator<Item = TemplateKey> + '_ {
        self.keys.iter().map(|(name, protected)| TemplateKey {
            name: name.clone(),
            protected: *protected,
        })
    }

    /// Protection status of a key, `None` if the key does not occur
    #[must_use]
    pub fn is_protected(&self, name: &str) -> Option<bool> {
        self.keys.get(name).copied()
    }

    /// Keys for which `has_value` returns false
    #[must_use]
    pub fn missing<F: Fn(&str) -> bool>(&self, has_value: F) -> Vec<String> {
        self.keys
            .keys()
            .filter(|name| !has_value(name))
            .cloned()
            .collect()
    }

    /// Number of distinct keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// No placeholders at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Find every placeholder in `document`.
///
/// # Errors
///
/// Returns `RedValidation` for an empty placeholder or a malformed protected
/// section, and `Template` for unbalanced braces
pub fn inspect(document: &Value) -> AgentResult<Inspection> {
    let mut inspection = Inspection::new();
    walk(document, false, "", &mut inspection)?;
    Ok(inspection)
}

fn walk(value: &Value, section: bool, path: &str, out: &mut Inspection) -> AgentResult<()> {
    match value {
        Value::Object(map) => {
            if section {
                check_section(map, path)?;
            }
            for (key, child) in map {
                let sub_path = child_path(path, key);
                if section && is_protected_slot(key) {
                    // check_section guarantees a string here
                    if let Value::String(s) = child {
                        for name in placeholders(s, &sub_path)? {
                            out.record(&name, true);
                        }
                    }
                } else {
                    walk(child, section || is_section_key(key), &sub_path, out)?;
                }
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(child, section, &index_path(path, i), out)?;
            }
        }
        Value::String(s) => {
            for name in placeholders(s, path)? {
                out.record(&name, false);
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_section(map: &Map<String, Value>, path: &str) -> AgentResult<()> {
    for (key, value) in map {
        if let Some(stripped) = key.strip_prefix('_') {
            if stripped.is_empty() {
                return Err(AgentError::RedValidation(format!(
                    "dict key _ under \"{}\" is invalid",
                    path
                )));
            }
            if map.contains_key(stripped) {
                return Err(AgentError::RedValidation(format!(
                    "key {} and key {} under \"{}\" cannot be in one dict",
                    key, stripped, path
                )));
            }
            if !value.is_string() {
                return Err(AgentError::RedValidation(format!(
                    "protecting dict key {} under \"{}\" is only valid for string values",
                    key, path
                )));
            }
        } else if key == "password" && !value.is_string() {
            return Err(AgentError::RedValidation(format!(
                "dict key password under \"{}\" is only valid for string values",
                path
            )));
        }
    }
    Ok(())
}

/// Placeholder names in `s`, in order, duplicates kept.
///
/// Error messages name the document path only, never the string itself,
/// since the string may hold a secret.
pub(crate) fn placeholders(s: &str, path: &str) -> AgentResult<Vec<String>> {
    let segments = split_delimited(s, OPEN, CLOSE, Nesting::Flat).map_err(|e| {
        AgentError::Template(format!(
            "could not parse template string under \"{}\": {}",
            path, e
        ))
    })?;

    let mut names = Vec::new();
    for segment in segments {
        if let Segment::Marker(name) = segment {
            if name.is_empty() {
                return Err(AgentError::RedValidation(format!(
                    "template placeholder under \"{}\" must not be empty",
                    path
                )));
            }
            if name.contains('{') || name.contains('}') {
                return Err(AgentError::Template(format!(
                    "could not parse template string under \"{}\": too many brackets",
                    path
                )));
            }
            names.push(name);
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(name: &str, protected: bool) -> TemplateKey {
        TemplateKey {
            name: name.to_string(),
            protected,
        }
    }

    #[test]
    fn test_no_placeholders() {
        let inspection = inspect(&json!({"inputs": {"a": "plain", "n": 3}})).unwrap();
        assert!(inspection.is_empty());
    }

    #[test]
    fn test_protected_under_password() {
        let doc = json!({
            "inputs": {
                "a": {
                    "class": "File",
                    "connector": {
                        "command": "red-connector-ssh",
                        "access": {
                            "host": "{{host}}",
                            "auth": {"username": "{{user}}", "password": "{{pw}}"}
                        }
                    }
                }
            }
        });
        let keys: Vec<TemplateKey> = inspect(&doc).unwrap().keys().collect();
        assert_eq!(
            keys,
            vec![key("host", false), key("user", false), key("pw", true)]
        );
    }

    #[test]
    fn test_protection_is_global_per_key() {
        let doc = json!({
            "cli": {"doc": "{{secret}}"},
            "inputs": {"a": {"access": {"password": "{{secret}}"}}},
            "outputs": {"b": {"url": "{{secret}}"}}
        });
        let inspection = inspect(&doc).unwrap();
        assert_eq!(inspection.is_protected("secret"), Some(true));
        assert_eq!(inspection.len(), 1);
    }

    #[test]
    fn test_underscore_key_protects() {
        let doc = json!({"access": {"_token": "tok-{{token}}"}});
        let inspection = inspect(&doc).unwrap();
        assert_eq!(inspection.is_protected("token"), Some(true));
    }

    #[test]
    fn test_underscore_outside_section_is_plain() {
        let doc = json!({"_token": "{{token}}", "password": "{{pw}}"});
        let inspection = inspect(&doc).unwrap();
        assert_eq!(inspection.is_protected("token"), Some(false));
        assert_eq!(inspection.is_protected("pw"), Some(false));
    }

    #[test]
    fn test_empty_placeholder_rejected() {
        let err = inspect(&json!({"a": "{{}}"})).unwrap_err();
        assert_eq!(err.kind(), "RedValidationError");
        let err = inspect(&json!({"access": {"password": "{{}}"}})).unwrap_err();
        assert_eq!(err.kind(), "RedValidationError");
    }

    #[test]
    fn test_unbalanced_braces() {
        let err = inspect(&json!({"a": "{{host"})).unwrap_err();
        assert_eq!(err.kind(), "TemplateError");
        let err = inspect(&json!({"a": "{{a{{b}}"})).unwrap_err();
        assert_eq!(err.kind(), "TemplateError");
    }

    #[test]
    fn test_section_rules() {
        let err = inspect(&json!({"access": {"_": "x"}})).unwrap_err();
        assert_eq!(err.kind(), "RedValidationError");

        let err = inspect(&json!({"access": {"_user": "x", "user": "y"}})).unwrap_err();
        assert!(err.to_string().contains("cannot be in one dict"));

        let err = inspect(&json!({"auth": {"_port": 22}})).unwrap_err();
        assert_eq!(err.kind(), "RedValidationError");

        let err = inspect(&json!({"auth": {"password": ["a"]}})).unwrap_err();
        assert_eq!(err.kind(), "RedValidationError");
    }

    #[test]
    fn test_error_does_not_echo_value() {
        let err = inspect(&json!({"access": {"password": "hunter2{{"}})).unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
        assert!(err.to_string().contains("access.password"));
    }

    #[test]
    fn test_missing() {
        let inspection = inspect(&json!(["{{a}}", "{{b}}", "{{a}}"])).unwrap();
        let missing = inspection.missing(|name| name == "a");
        assert_eq!(missing, vec!["b".to_string()]);
    }
}
