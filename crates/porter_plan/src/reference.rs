//! `$(inputs...)` references.
//!
//! A reference names a leaf of the completed inputs tree, e.g.
//! `$(inputs.reads[0].nameroot)`. Keys may be written with a dot or in
//! brackets with either quote style, list indices in bare brackets.

use porter_core::{split_delimited, AgentError, AgentResult, Nesting, Segment, SplitError};
use serde_json::Value;
use std::fmt;

/// Opening reference delimiter
pub const OPEN: &str = "$(";
/// Closing reference delimiter
pub const CLOSE: &str = ")";

/// One step of a reference path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// Dict key
    Key(String),
    /// List index
    Index(usize),
}

/// A parsed reference, without the leading `inputs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Steps below the inputs root
    pub steps: Vec<PathStep>,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("inputs")?;
        for step in &self.steps {
            match step {
                PathStep::Key(k) => write!(f, ".{}", k)?,
                PathStep::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

/// Split `template` into literal runs and reference bodies
///
/// # Errors
///
/// Returns `InvalidInputReference` if a reference is unterminated or contains
/// another reference start
pub fn split(template: &str) -> AgentResult<Vec<Segment>> {
    split_delimited(template, OPEN, CLOSE, Nesting::Balanced).map_err(|e| {
        let detail = match e {
            SplitError::Unterminated { start } => {
                format!("reference starting at byte {} is not terminated", start)
            }
            SplitError::Nested { start, at } => format!(
                "reference starting at byte {} is not terminated before the next reference at byte {}",
                start, at
            ),
        };
        AgentError::InvalidInputReference(format!(
            "could not parse input reference \"{}\": {}",
            template, detail
        ))
    })
}

/// Parse the body of a reference (the text between `$(` and `)`)
///
/// # Errors
///
/// Returns `InvalidInputReference` if the body is not `inputs` followed by at
/// least one key or index
pub fn parse(body: &str) -> AgentResult<Reference> {
    let invalid = |reason: &str| {
        AgentError::InvalidInputReference(format!(
            "invalid input reference \"$({})\": {}",
            body, reason
        ))
    };

    let text = body.trim();
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;

    let root = read_ident(&chars, &mut pos);
    if root != "inputs" {
        return Err(invalid("reference must begin with \"inputs\""));
    }

    let mut steps = Vec::new();
    while pos < chars.len() {
        match chars[pos] {
            '.' => {
                pos += 1;
                let key = read_ident(&chars, &mut pos);
                if key.is_empty() {
                    return Err(invalid("empty key after \".\""));
                }
                steps.push(PathStep::Key(key));
            }
            '[' => {
                pos += 1;
                match chars.get(pos) {
                    Some(&quote @ ('"' | '\'')) => {
                        pos += 1;
                        let start = pos;
                        while pos < chars.len() && chars[pos] != quote {
                            pos += 1;
                        }
                        if pos >= chars.len() {
                            return Err(invalid("unterminated quoted key"));
                        }
                        let key: String = chars[start..pos].iter().collect();
                        pos += 1;
                        if chars.get(pos) != Some(&']') {
                            return Err(invalid("expected \"]\" after quoted key"));
                        }
                        pos += 1;
                        steps.push(PathStep::Key(key));
                    }
                    _ => {
                        let start = pos;
                        while pos < chars.len() && chars[pos] != ']' {
                            pos += 1;
                        }
                        if pos >= chars.len() {
                            return Err(invalid("unterminated index"));
                        }
                        let raw: String = chars[start..pos].iter().collect();
                        pos += 1;
                        let index = raw.trim().parse::<usize>().map_err(|_| {
                            invalid(&format!("index \"{}\" is not a non-negative integer", raw))
                        })?;
                        steps.push(PathStep::Index(index));
                    }
                }
            }
            c => return Err(invalid(&format!("unexpected character '{}'", c))),
        }
    }

    if steps.is_empty() {
        return Err(invalid("reference must contain at least \"inputs.<identifier>\""));
    }

    Ok(Reference { steps })
}

fn read_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && !matches!(chars[*pos], '.' | '[' | ']') {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

/// Walk `inputs` along `reference` and return the leaf it names
///
/// # Errors
///
/// Returns `InvalidInputReference` if a key is missing, an index is out of
/// bounds, a step does not fit the node type, or the path ends at a dict or
/// list
pub fn evaluate<'a>(reference: &Reference, inputs: &'a Value) -> AgentResult<&'a Value> {
    let fail = |detail: String| {
        AgentError::InvalidInputReference(format!(
            "could not resolve input reference \"$({})\": {}",
            reference, detail
        ))
    };

    let mut node = inputs;
    let mut handled = String::from("inputs");

    for step in &reference.steps {
        node = match (node, step) {
            (Value::Object(map), PathStep::Key(key)) => match map.get(key) {
                Some(Value::Null) | None => {
                    return Err(fail(format!("key \"{}\" not found in \"{}\"", key, handled)));
                }
                Some(child) => child,
            },
            (Value::Object(_), PathStep::Index(i)) => {
                return Err(fail(format!(
                    "\"{}\" is a dict and cannot be indexed with {}",
                    handled, i
                )));
            }
            (Value::Array(items), PathStep::Index(i)) => match items.get(*i) {
                Some(child) => child,
                None => {
                    return Err(fail(format!(
                        "index {} is out of bounds in \"{}\", which has length {}",
                        i,
                        handled,
                        items.len()
                    )));
                }
            },
            (Value::Array(_), PathStep::Key(key)) => {
                return Err(fail(format!(
                    "\"{}\" is a list and the index \"{}\" is not an integer",
                    handled, key
                )));
            }
            (_, PathStep::Key(key)) => {
                return Err(fail(format!(
                    "cannot resolve \"{}\" because \"{}\" is neither dict nor list",
                    key, handled
                )));
            }
            (_, PathStep::Index(i)) => {
                return Err(fail(format!(
                    "cannot resolve [{}] because \"{}\" is neither dict nor list",
                    i, handled
                )));
            }
        };
        match step {
            PathStep::Key(k) => {
                handled.push('.');
                handled.push_str(k);
            }
            PathStep::Index(i) => handled.push_str(&format!("[{}]", i)),
        }
    }

    match node {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            Err(fail(format!(
                "\"{}\" is a dict with keys [{}] and could not be resolved completely",
                handled,
                keys.join(", ")
            )))
        }
        Value::Array(items) => Err(fail(format!(
            "\"{}\" is a list of length {} and could not be resolved completely",
            handled,
            items.len()
        ))),
        leaf => Ok(leaf),
    }
}

/// String form of a leaf value
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every reference in `template` with the leaf it names. Literal
/// text is kept byte for byte.
///
/// # Errors
///
/// Returns `InvalidInputReference` if splitting, parsing or evaluation fails
pub fn resolve(template: &str, inputs: &Value) -> AgentResult<String> {
    let mut out = String::with_capacity(template.len());
    for segment in split(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Marker(body) => {
                let reference = parse(&body)?;
                out.push_str(&stringify(evaluate(&reference, inputs)?));
            }
        }
    }
    Ok(out)
}
