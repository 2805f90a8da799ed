//! CWL type descriptors for CLI inputs and outputs.
//!
//! A descriptor is written as a base type name, optionally followed by `[]`
//! for arrays and `?` for optional values, e.g. `File[]?`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Class of a staged data object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataClass {
    /// A single file
    File,
    /// A directory tree
    Directory,
}

impl DataClass {
    /// Name used in documents and connector verbs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Directory => "Directory",
        }
    }
}

impl fmt::Display for DataClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base category of a CLI input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputCategory {
    /// `File`
    File,
    /// `Directory`
    Directory,
    /// `string`
    String,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `boolean`
    Boolean,
}

impl InputCategory {
    /// Parse a bare type name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let category = match name {
            "File" => Self::File,
            "Directory" => Self::Directory,
            "string" => Self::String,
            "int" => Self::Int,
            "long" => Self::Long,
            "float" => Self::Float,
            "double" => Self::Double,
            "boolean" => Self::Boolean,
            _ => return None,
        };
        Some(category)
    }

    /// Type name as written in documents
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Directory => "Directory",
            Self::String => "string",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
        }
    }

    /// Data class for `File` and `Directory`, `None` for primitives
    #[must_use]
    pub fn data_class(&self) -> Option<DataClass> {
        match self {
            Self::File => Some(DataClass::File),
            Self::Directory => Some(DataClass::Directory),
            _ => None,
        }
    }

    /// Whether values of this category are integers
    #[must_use]
    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Int | Self::Long)
    }

    /// Whether values of this category are floating point numbers
    #[must_use]
    pub fn is_floating(&self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

/// Parsed type of a CLI input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputType {
    /// Base category
    pub category: InputCategory,
    /// Declared with `[]`
    pub is_array: bool,
    /// Declared with `?`
    pub is_optional: bool,
}

impl InputType {
    /// Create a required scalar type
    #[must_use]
    pub fn new(category: InputCategory) -> Self {
        Self {
            category,
            is_array: false,
            is_optional: false,
        }
    }

    /// Mark as array
    #[must_use]
    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Mark as optional
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }
}

impl FromStr for InputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rest = s.trim();
        let is_optional = rest.ends_with('?');
        if is_optional {
            rest = &rest[..rest.len() - 1];
        }
        let is_array = rest.ends_with("[]");
        if is_array {
            rest = &rest[..rest.len() - 2];
        }
        let category = InputCategory::from_name(rest)
            .ok_or_else(|| format!("unknown input type \"{}\"", s))?;
        Ok(Self {
            category,
            is_array,
            is_optional,
        })
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category.name())?;
        if self.is_array {
            f.write_str("[]")?;
        }
        if self.is_optional {
            f.write_str("?")?;
        }
        Ok(())
    }
}

impl Serialize for InputType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InputType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parsed type of a CLI output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputType {
    /// Class of the produced object
    pub class: DataClass,
    /// Declared with `?`
    pub is_optional: bool,
}

impl FromStr for OutputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (name, is_optional) = match trimmed.strip_suffix('?') {
            Some(name) => (name, true),
            None => (trimmed, false),
        };
        let class = match name {
            "File" => DataClass::File,
            "Directory" => DataClass::Directory,
            _ => return Err(format!("unknown output type \"{}\"", s)),
        };
        Ok(Self { class, is_optional })
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class.as_str())?;
        if self.is_optional {
            f.write_str("?")?;
        }
        Ok(())
    }
}

impl Serialize for OutputType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OutputType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
