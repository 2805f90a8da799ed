//! porter template resolution
//!
//! Job documents may carry `{{name}}` placeholders that are filled from a
//! variables file before the document is typed. Placeholders inside an
//! `access` or `auth` section that sit under a `_`-prefixed key or a
//! `password` key are protected: their values, together with literal values
//! in the same positions, form the secret set that is scrubbed from every
//! report and error message.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod fill;
pub mod inspect;
pub mod redact;

// Re-exports
pub use fill::{resolve, secret_values, Resolved, Variables};
pub use inspect::{inspect, Inspection, TemplateKey};
pub use redact::{SecretSet, REDACTED};

/// Dict keys that open a protected section
pub(crate) const SECTION_KEYS: [&str; 2] = ["access", "auth"];

/// Whether `key` opens a protected section
pub(crate) fn is_section_key(key: &str) -> bool {
    SECTION_KEYS.contains(&key)
}

/// Whether the value under `key` is a protected slot, given that the
/// enclosing dict is inside a protected section
pub(crate) fn is_protected_slot(key: &str) -> bool {
    key.starts_with('_') || key == "password"
}

/// Extend a document path with a dict key
pub(crate) fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Extend a document path with a list index
pub(crate) fn index_path(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}
