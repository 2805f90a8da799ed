//! Secret redaction for text that leaves the agent.

use secrecy::{ExposeSecret, SecretString};

/// Replacement for every secret occurrence
pub const REDACTED: &str = "********";

/// Set of secret values
///
/// Values are kept as [`SecretString`] and only exposed while scrubbing.
#[derive(Debug, Default)]
pub struct SecretSet {
    secrets: Vec<SecretString>,
}

impl SecretSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret. Empty strings and duplicates are ignored.
    pub fn insert(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() || self.contains(&value) {
            return;
        }
        self.secrets.push(SecretString::from(value));
    }

    /// Whether `value` is in the set
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.secrets.iter().any(|s| s.expose_secret() == value)
    }

    /// Number of secrets
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// No secrets
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Replace every occurrence of every secret, longest secrets first so a
    /// secret containing another is not split apart
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let mut ordered: Vec<&str> = self.secrets.iter().map(|s| s.expose_secret()).collect();
        ordered.sort_by_key(|s| std::cmp::Reverse(s.len()));

        let mut out = text.to_string();
        for secret in ordered {
            if out.contains(secret) {
                out = out.replace(secret, REDACTED);
            }
        }
        out
    }

    /// Prepare one line of free-text diagnostics for display: redact, strip
    /// quote characters, then redact again
    #[must_use]
    pub fn scrub_line(&self, line: &str) -> String {
        let first = self.redact(line);
        let stripped: String = first.chars().filter(|c| *c != '"' && *c != '\'').collect();
        self.redact(&stripped)
    }

    /// Scrub every line of `text`
    #[must_use]
    pub fn scrub_lines(&self, text: &str) -> Vec<String> {
        text.lines().map(|line| self.scrub_line(line)).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for SecretSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}
