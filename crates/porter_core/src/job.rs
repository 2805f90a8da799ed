//! Typed job document.
//!
//! The document is deserialized after template resolution. Unknown sections
//! (container, execution engine settings and the like) are ignored, they are
//! consumed by whoever scheduled the job and have no meaning inside the agent.

use crate::error::{AgentError, AgentResult};
use crate::types::{DataClass, InputType, OutputType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A complete job document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    /// Format version, informational only
    #[serde(rename = "redVersion", alias = "version", default)]
    pub red_version: Option<String>,

    /// CLI binding description
    pub cli: CliDescription,

    /// Input values keyed by CLI input name
    #[serde(default)]
    pub inputs: IndexMap<String, InputValue>,

    /// Output destinations keyed by CLI output name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<IndexMap<String, OutputValue>>,

    /// Alternative input/output sets, one is selected per run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batches: Option<Vec<Batch>>,
}

impl JobDocument {
    /// Deserialize from a generic JSON tree
    ///
    /// # Errors
    ///
    /// Returns `RedValidation` if the tree does not have the document shape
    pub fn from_value(value: Value) -> AgentResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// One selectable variant of inputs and outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Input values of this batch
    pub inputs: IndexMap<String, InputValue>,

    /// Output destinations of this batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<IndexMap<String, OutputValue>>,
}

/// Description of the command line tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliDescription {
    /// Executable and leading fixed arguments
    pub base_command: BaseCommand,

    /// Input bindings
    #[serde(default)]
    pub inputs: IndexMap<String, CliInput>,

    /// Output bindings
    #[serde(default)]
    pub outputs: IndexMap<String, CliOutput>,
}

/// Base command, either one token or a list of tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BaseCommand {
    /// A single executable name
    Single(String),
    /// Executable followed by fixed arguments
    Multiple(Vec<String>),
}

impl BaseCommand {
    /// Whitespace-trimmed tokens, in order
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.trim().to_string()],
            Self::Multiple(v) => v.iter().map(|s| s.trim().to_string()).collect(),
        }
    }
}

/// A CLI input declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliInput {
    /// Declared type
    #[serde(rename = "type")]
    pub input_type: InputType,

    /// How the value is placed on the command line
    #[serde(default)]
    pub input_binding: InputBinding,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Placement of an input on the command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputBinding {
    /// Position among positional arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,

    /// Flag preceding the value, makes the argument named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Emit prefix and value as separate tokens
    #[serde(default = "default_separate")]
    pub separate: bool,

    /// Join array elements with this string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_separator: Option<String>,
}

fn default_separate() -> bool {
    true
}

impl Default for InputBinding {
    fn default() -> Self {
        Self {
            position: None,
            prefix: None,
            separate: true,
            item_separator: None,
        }
    }
}

/// A CLI output declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliOutput {
    /// Declared type
    #[serde(rename = "type")]
    pub output_type: OutputType,

    /// Where the tool leaves the output
    pub output_binding: OutputBinding,
}

/// Location of an output relative to the working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBinding {
    /// Glob pattern, may contain `$(inputs...)` references
    pub glob: String,
}

/// External program that transfers one file or directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDescriptor {
    /// Executable name or path
    pub command: String,

    /// Opaque access information, only interpreted by the connector
    #[serde(default)]
    pub access: Value,

    /// Mount instead of copy, directories only
    #[serde(default)]
    pub mount: bool,
}

/// Expected member of a directory tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// File or directory
    pub class: DataClass,

    /// Name inside the parent directory
    pub basename: String,

    /// Members of a sub directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing: Option<Vec<ListingEntry>>,
}

/// A `File` or `Directory` input value
///
/// The location fields are filled in before staging, see input completion in
/// `porter_plan`. The connector is never serialized back out so the access
/// information cannot end up in a derived inputs tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    /// File or directory
    pub class: DataClass,

    /// Connector that stages the object
    #[serde(default, skip_serializing)]
    pub connector: Option<ConnectorDescriptor>,

    /// Local file or directory name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basename: Option<String>,

    /// Local parent directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirname: Option<String>,

    /// Local path, `dirname/basename`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Basename without the last extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameroot: Option<String>,

    /// Last extension including the dot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameext: Option<String>,

    /// Expected directory content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing: Option<Vec<ListingEntry>>,

    /// Checksum as given by the document author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Size in bytes as given by the document author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl DataObject {
    /// Create an object with no connector and no location
    #[must_use]
    pub fn new(class: DataClass) -> Self {
        Self {
            class,
            connector: None,
            basename: None,
            dirname: None,
            path: None,
            nameroot: None,
            nameext: None,
            listing: None,
            checksum: None,
            size: None,
        }
    }

    /// Attach a connector
    #[must_use]
    pub fn with_connector(mut self, connector: ConnectorDescriptor) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the basename
    #[must_use]
    pub fn with_basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = Some(basename.into());
        self
    }

    /// Set the local path
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Primitive input value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// An input value: data object, primitive, or list of either
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    /// `File` or `Directory`
    Object(DataObject),
    /// Array value
    List(Vec<InputValue>),
    /// Primitive
    Scalar(Scalar),
}

impl InputValue {
    /// Shorthand for a string scalar
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(s.into()))
    }

    /// Shorthand for a boolean scalar
    #[must_use]
    pub fn boolean(b: bool) -> Self {
        Self::Scalar(Scalar::Bool(b))
    }

    /// Shorthand for an integer scalar
    #[must_use]
    pub fn int(i: i64) -> Self {
        Self::Scalar(Scalar::Int(i))
    }

    /// Short type description for error messages
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Object(o) => o.class.as_str(),
            Self::List(_) => "list",
            Self::Scalar(Scalar::Bool(_)) => "boolean",
            Self::Scalar(Scalar::Int(_)) => "int",
            Self::Scalar(Scalar::Float(_)) => "float",
            Self::Scalar(Scalar::String(_)) => "string",
        }
    }

    /// Generic JSON tree of this value, without connector information
    ///
    /// # Errors
    ///
    /// Returns `RedValidation` if a float is not finite
    pub fn to_tree(&self) -> AgentResult<Value> {
        serde_json::to_value(self).map_err(|e| {
            AgentError::RedValidation(format!("input value cannot be represented: {}", e))
        })
    }
}

/// Destination of a CLI output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    /// File or directory
    pub class: DataClass,

    /// Connector that sends the object
    pub connector: ConnectorDescriptor,

    /// Directory content to report to the connector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing: Option<Vec<ListingEntry>>,
}
