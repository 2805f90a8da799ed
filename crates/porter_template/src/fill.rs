//! Placeholder substitution and secret collection.

use crate::inspect::{inspect, placeholders, CLOSE, OPEN};
use crate::redact::SecretSet;
use crate::{child_path, index_path, is_protected_slot, is_section_key};
use indexmap::IndexMap;
use porter_core::{split_delimited, AgentError, AgentResult, Nesting, Segment};
use serde_json::{Map, Value};
use tracing::debug;

/// Placeholder values keyed by placeholder name
pub type Variables = IndexMap<String, String>;

/// A fully substituted document and the secrets it contains
#[derive(Debug)]
pub struct Resolved {
    /// Document with every placeholder replaced
    pub document: Value,
    /// Values to scrub from any output
    pub secrets: SecretSet,
}

/// Substitute every placeholder in `document`.
///
/// Inside `access` and `auth` sections, `_`-prefixed keys lose their
/// underscore. Every resolved value of a protected slot and every value of a
/// protected placeholder is added to the secret set.
///
/// # Errors
///
/// Returns `RedVariables` naming every placeholder without a value, plus the
/// errors of [`inspect`]
pub fn resolve(document: &Value, values: &Variables) -> AgentResult<Resolved> {
    let inspection = inspect(document)?;

    let missing = inspection.missing(|name| values.contains_key(name));
    if !missing.is_empty() {
        return Err(AgentError::RedVariables(format!(
            "job document contains undeclared template variables: {}",
            missing.join(", ")
        )));
    }

    let mut secrets = SecretSet::new();
    let filled = fill(document, false, "", values, &mut secrets)?;

    for key in inspection.keys().filter(|k| k.protected) {
        if let Some(value) = values.get(&key.name) {
            secrets.insert(value.clone());
        }
    }

    debug!(
        keys = inspection.len(),
        secrets = secrets.len(),
        "resolved template placeholders"
    );

    Ok(Resolved {
        document: filled,
        secrets,
    })
}

/// Secrets of `document` once filled with `values`
///
/// # Errors
///
/// Returns the same errors as [`resolve`]
pub fn secret_values(document: &Value, values: &Variables) -> AgentResult<SecretSet> {
    Ok(resolve(document, values)?.secrets)
}

fn fill(
    value: &Value,
    section: bool,
    path: &str,
    values: &Variables,
    secrets: &mut SecretSet,
) -> AgentResult<Value> {
    let filled = match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                let sub_path = child_path(path, key);
                if section && is_protected_slot(key) {
                    let resolved = fill(child, section, &sub_path, values, secrets)?;
                    if let Value::String(s) = &resolved {
                        secrets.insert(s.clone());
                    }
                    let name = key.strip_prefix('_').unwrap_or(key);
                    out.insert(name.to_string(), resolved);
                } else {
                    let child_section = section || is_section_key(key);
                    out.insert(
                        key.clone(),
                        fill(child, child_section, &sub_path, values, secrets)?,
                    );
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, child) in items.iter().enumerate() {
                out.push(fill(child, section, &index_path(path, i), values, secrets)?);
            }
            Value::Array(out)
        }
        Value::String(s) => Value::String(fill_string(s, path, values)?),
        other => other.clone(),
    };
    Ok(filled)
}

fn fill_string(s: &str, path: &str, values: &Variables) -> AgentResult<String> {
    if placeholders(s, path)?.is_empty() {
        return Ok(s.to_string());
    }

    let segments = split_delimited(s, OPEN, CLOSE, Nesting::Flat)
        .map_err(|e| AgentError::Template(format!("under \"{}\": {}", path, e)))?;

    let mut out = String::with_capacity(s.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Marker(name) => {
                let value = values.get(&name).ok_or_else(|| {
                    AgentError::RedVariables(format!(
                        "template variable {} under \"{}\" has no value",
                        name, path
                    ))
                })?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn connector_doc() -> Value {
        json!({
            "inputs": {
                "a": {
                    "class": "File",
                    "connector": {
                        "command": "red-connector-http",
                        "access": {
                            "url": "https://{{host}}/data/a.csv",
                            "auth": {"username": "{{user}}", "password": "{{pw}}"},
                            "_token": "static-token"
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_resolve_substitutes_everywhere() {
        let values = vars(&[("host", "example.org"), ("user", "alice"), ("pw", "s3cr3t")]);
        let resolved = resolve(&connector_doc(), &values).unwrap();
        let access = &resolved.document["inputs"]["a"]["connector"]["access"];
        assert_eq!(access["url"], json!("https://example.org/data/a.csv"));
        assert_eq!(access["auth"]["username"], json!("alice"));
        assert_eq!(access["auth"]["password"], json!("s3cr3t"));
    }

    #[test]
    fn test_underscore_removed_in_section() {
        let values = vars(&[("host", "h"), ("user", "u"), ("pw", "p")]);
        let resolved = resolve(&connector_doc(), &values).unwrap();
        let access = &resolved.document["inputs"]["a"]["connector"]["access"];
        assert_eq!(access["token"], json!("static-token"));
        assert!(access.get("_token").is_none());
    }

    #[test]
    fn test_underscore_kept_outside_section() {
        let resolved = resolve(&json!({"_x": "1"}), &Variables::new()).unwrap();
        assert_eq!(resolved.document, json!({"_x": "1"}));
        assert!(resolved.secrets.is_empty());
    }

    #[test]
    fn test_secrets() {
        let values = vars(&[("host", "example.org"), ("user", "alice"), ("pw", "s3cr3t")]);
        let secrets = secret_values(&connector_doc(), &values).unwrap();
        assert!(secrets.contains("s3cr3t"));
        assert!(secrets.contains("static-token"));
        assert!(!secrets.contains("alice"));
        assert!(!secrets.contains("example.org"));
        assert_eq!(secrets.len(), 2);
    }

    #[test]
    fn test_protected_value_used_elsewhere_is_secret() {
        let doc = json!({
            "cli": {"doc": "{{pw}}"},
            "access": {"password": "{{pw}}"}
        });
        let resolved = resolve(&doc, &vars(&[("pw", "hunter2")])).unwrap();
        assert_eq!(resolved.document["cli"]["doc"], json!("hunter2"));
        assert!(resolved.secrets.contains("hunter2"));
    }

    #[test]
    fn test_all_missing_keys_reported() {
        let err = resolve(&connector_doc(), &vars(&[("user", "alice")])).unwrap_err();
        assert_eq!(err.kind(), "RedVariablesError");
        let msg = err.to_string();
        assert!(msg.contains("host"));
        assert!(msg.contains("pw"));
        assert!(!msg.contains("user"));
    }

    #[test]
    fn test_embedded_protected_slot_full_value_is_secret() {
        let doc = json!({"auth": {"_header": "Bearer {{token}}"}});
        let resolved = resolve(&doc, &vars(&[("token", "abc123")])).unwrap();
        assert_eq!(resolved.document, json!({"auth": {"header": "Bearer abc123"}}));
        assert!(resolved.secrets.contains("Bearer abc123"));
        assert!(resolved.secrets.contains("abc123"));
    }

    #[test]
    fn test_report_is_scrubbed() {
        let values = vars(&[("host", "example.org"), ("user", "alice"), ("pw", "s3cr3t")]);
        let resolved = resolve(&connector_doc(), &values).unwrap();
        let line = "connector said: login \"alice\":\"s3cr3t\" rejected, token 'static-token'";
        let scrubbed = resolved.secrets.scrub_line(line);
        assert!(!scrubbed.contains("s3cr3t"));
        assert!(!scrubbed.contains("static-token"));
        assert!(scrubbed.contains("alice"));
    }

    proptest::proptest! {
        #[test]
        fn prop_protected_values_are_secrets(
            pw in "[A-Za-z0-9]{1,16}",
            token in "[A-Za-z0-9]{1,16}",
        ) {
            let doc = json!({
                "outputs": {"b": {"connector": {"access": {
                    "password": "{{pw}}",
                    "_token": "{{token}}",
                    "plain": "{{pw}}"
                }}}}
            });
            let values = vars(&[("pw", &pw), ("token", &token)]);
            let resolved = resolve(&doc, &values).unwrap();
            proptest::prop_assert!(resolved.secrets.contains(&pw));
            proptest::prop_assert!(resolved.secrets.contains(&token));
            let report = format!("failed with {} and {}", pw, token);
            let scrubbed = resolved.secrets.scrub_line(&report);
            proptest::prop_assert!(!scrubbed.contains(&pw));
            proptest::prop_assert!(!scrubbed.contains(&token));
        }
    }
}
