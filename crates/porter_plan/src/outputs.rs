//! Output glob resolution and location.

use indexmap::IndexMap;
use porter_core::{AgentError, AgentResult, CliOutput, DataClass};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::reference;

/// A CLI output with its glob resolved against the inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutput {
    /// Output key
    pub key: String,
    /// Expected class of the match
    pub class: DataClass,
    /// Missing output is not an error
    pub is_optional: bool,
    /// Glob pattern relative to the working directory
    pub glob: String,
}

/// Result of matching an output glob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Exactly one match
    Found(PathBuf),
    /// No match
    NotFound,
    /// More than one match, sorted
    Ambiguous(Vec<PathBuf>),
}

impl ResolvedOutput {
    /// Match the glob against `working_dir`, considering only paths of the
    /// declared class
    ///
    /// # Errors
    ///
    /// Returns `RedSpecification` if the glob is not a valid pattern
    pub fn locate(&self, working_dir: &Path) -> AgentResult<Location> {
        let pattern = if Path::new(&self.glob).is_absolute() {
            self.glob.clone()
        } else {
            format!(
                "{}/{}",
                glob::Pattern::escape(&working_dir.to_string_lossy()),
                self.glob
            )
        };

        let paths = glob::glob(&pattern).map_err(|e| {
            AgentError::RedSpecification(format!(
                "invalid glob \"{}\" for output key \"{}\": {}",
                self.glob, self.key, e
            ))
        })?;

        let mut matches: Vec<PathBuf> = paths
            .filter_map(Result::ok)
            .filter(|p| match self.class {
                DataClass::File => p.is_file(),
                DataClass::Directory => p.is_dir(),
            })
            .collect();
        matches.sort();

        Ok(match matches.len() {
            0 => Location::NotFound,
            1 => Location::Found(matches.remove(0)),
            _ => Location::Ambiguous(matches),
        })
    }

    /// Like [`locate`](Self::locate) but requires exactly one match
    ///
    /// # Errors
    ///
    /// Returns `Connector` naming the key if nothing or several paths match
    pub fn locate_one(&self, working_dir: &Path) -> AgentResult<PathBuf> {
        match self.locate(working_dir)? {
            Location::Found(path) => Ok(path),
            Location::NotFound => Err(AgentError::Connector(format!(
                "could not find {} for output key \"{}\": glob \"{}\" matched nothing",
                self.class, self.key, self.glob
            ))),
            Location::Ambiguous(paths) => {
                let listed: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                Err(AgentError::Connector(format!(
                    "output key \"{}\" is ambiguous: glob \"{}\" matched {} paths: {}",
                    self.key,
                    self.glob,
                    paths.len(),
                    listed.join(", ")
                )))
            }
        }
    }
}

/// Resolve every output glob against the completed inputs tree
///
/// # Errors
///
/// Returns `InvalidInputReference` naming the output key whose glob failed
pub fn resolve_outputs(
    cli_outputs: &IndexMap<String, CliOutput>,
    inputs: &Value,
) -> AgentResult<Vec<ResolvedOutput>> {
    cli_outputs
        .iter()
        .map(|(key, output)| {
            let glob = reference::resolve(&output.output_binding.glob, inputs).map_err(|e| {
                AgentError::InvalidInputReference(format!(
                    "invalid input reference for output key \"{}\": {}",
                    key, e
                ))
            })?;
            Ok(ResolvedOutput {
                key: key.clone(),
                class: output.output_type.class,
                is_optional: output.output_type.is_optional,
                glob,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_core::OutputBinding;
    use serde_json::json;
    use std::fs;

    fn output(key: &str, class: DataClass, glob: &str) -> ResolvedOutput {
        ResolvedOutput {
            key: key.to_string(),
            class,
            is_optional: false,
            glob: glob.to_string(),
        }
    }

    #[test]
    fn test_resolve_outputs() {
        let mut cli_outputs = IndexMap::new();
        cli_outputs.insert(
            "report".to_string(),
            CliOutput {
                output_type: "File?".parse().unwrap(),
                output_binding: OutputBinding {
                    glob: "$(inputs.data.nameroot).html".to_string(),
                },
            },
        );
        let tree = json!({"data": {"nameroot": "sample"}});
        let resolved = resolve_outputs(&cli_outputs, &tree).unwrap();
        assert_eq!(resolved[0].glob, "sample.html");
        assert!(resolved[0].is_optional);
    }

    #[test]
    fn test_resolve_outputs_names_key() {
        let mut cli_outputs = IndexMap::new();
        cli_outputs.insert(
            "report".to_string(),
            CliOutput {
                output_type: "File".parse().unwrap(),
                output_binding: OutputBinding {
                    glob: "$(inputs.missing.basename)".to_string(),
                },
            },
        );
        let err = resolve_outputs(&cli_outputs, &json!({})).unwrap_err();
        assert_eq!(err.kind(), "InvalidInputReference");
        assert!(err.to_string().contains("\"report\""));
    }

    #[test]
    fn test_locate_single_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("out.txt"), "x").unwrap();
        let located = output("o", DataClass::File, "*.txt").locate_one(dir.path()).unwrap();
        assert_eq!(located, dir.path().join("out.txt"));
    }

    #[test]
    fn test_directory_zero_one_many() {
        let dir = tempfile::tempdir().unwrap();
        let out = output("results", DataClass::Directory, "res*");

        let err = out.locate_one(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "ConnectorError");
        assert!(err.to_string().contains("matched nothing"));

        fs::create_dir(dir.path().join("res1")).unwrap();
        assert_eq!(out.locate_one(dir.path()).unwrap(), dir.path().join("res1"));

        fs::create_dir(dir.path().join("res2")).unwrap();
        let err = out.locate_one(dir.path()).unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
        assert!(err.to_string().contains("\"results\""));
    }

    #[test]
    fn test_class_filter() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("out"), "x").unwrap();
        let out = output("o", DataClass::Directory, "out");
        assert_eq!(out.locate(dir.path()).unwrap(), Location::NotFound);
    }

    #[test]
    fn test_working_dir_with_glob_chars() {
        let dir = tempfile::tempdir().unwrap();
        let odd = dir.path().join("run[1]");
        fs::create_dir(&odd).unwrap();
        fs::write(odd.join("a.txt"), "x").unwrap();
        let out = output("o", DataClass::File, "a.txt");
        assert_eq!(out.locate_one(&odd).unwrap(), odd.join("a.txt"));
    }
}
