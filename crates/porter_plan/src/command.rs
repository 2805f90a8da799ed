//! Command synthesis from CLI bindings and completed input values.
//!
//! Arguments with a `prefix` are named, all others are positional. The
//! command is laid out as:
//!
//! ```text
//! base command | positionals before the first array positional | named | remaining positionals
//! ```
//!
//! so a tool taking leading flags and a trailing variadic file list keeps
//! working when array inputs are involved.

use indexmap::IndexMap;
use porter_core::{
    AgentError, AgentResult, CliDescription, CliInput, InputCategory, InputType, InputValue,
    Scalar,
};
use std::path::{Path, PathBuf};

/// Where an argument goes on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Ordered by position
    Positional(i64),
    /// Introduced by a prefix flag
    Named(String),
}

/// A CLI input binding in synthesis form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgument {
    /// Input key
    pub key: String,
    /// Declared type
    pub input_type: InputType,
    /// Positional or named
    pub placement: Placement,
    /// Prefix and value as separate tokens
    pub separate: bool,
    /// Joiner for array elements
    pub item_separator: Option<String>,
}

impl CliArgument {
    /// Build from a CLI input declaration. A missing position means 0.
    #[must_use]
    pub fn from_cli_input(key: &str, input: &CliInput) -> Self {
        let binding = &input.input_binding;
        let placement = match &binding.prefix {
            Some(prefix) if !prefix.is_empty() => Placement::Named(prefix.clone()),
            _ => Placement::Positional(binding.position.unwrap_or(0)),
        };
        Self {
            key: key.to_string(),
            input_type: input.input_type,
            placement,
            separate: binding.separate,
            item_separator: binding.item_separator.clone(),
        }
    }

    /// Declared position, `None` for named arguments
    #[must_use]
    pub fn position(&self) -> Option<i64> {
        match self.placement {
            Placement::Positional(p) => Some(p),
            Placement::Named(_) => None,
        }
    }

    fn prefix(&self) -> Option<&str> {
        match &self.placement {
            Placement::Named(p) => Some(p.as_str()),
            Placement::Positional(_) => None,
        }
    }

    /// Tokens for this argument given its value, empty if the argument is
    /// left out
    ///
    /// # Errors
    ///
    /// Returns `JobSpecification` if a required value is missing or the
    /// value does not match the declared type
    pub fn tokens(&self, value: Option<&InputValue>) -> AgentResult<Vec<String>> {
        let Some(value) = value else {
            if self.input_type.is_optional {
                return Ok(Vec::new());
            }
            return Err(AgentError::JobSpecification(format!(
                "required argument \"{}\" is missing",
                self.key
            )));
        };

        if self.input_type.is_array {
            let InputValue::List(items) = value else {
                return Err(AgentError::JobSpecification(format!(
                    "for input key \"{}\": description defines an array, but job is not given as list",
                    self.key
                )));
            };
            let elements = items
                .iter()
                .map(|item| self.element(item))
                .collect::<AgentResult<Vec<_>>>()?;
            if elements.is_empty() {
                return Ok(Vec::new());
            }
            return Ok(self.array_tokens(elements));
        }

        if let InputValue::List(_) = value {
            return Err(AgentError::JobSpecification(format!(
                "for input key \"{}\": description defines a single {}, but job is given as list",
                self.key,
                self.input_type.category.name()
            )));
        }

        if let (Some(prefix), InputValue::Scalar(Scalar::Bool(flag))) = (self.prefix(), value) {
            if self.input_type.category == InputCategory::Boolean {
                return Ok(if *flag { vec![prefix.to_string()] } else { Vec::new() });
            }
        }

        let token = self.element(value)?;
        Ok(match self.prefix() {
            None => vec![token],
            Some(prefix) if self.separate => vec![prefix.to_string(), token],
            Some(prefix) => vec![format!("{}{}", prefix, token)],
        })
    }

    fn array_tokens(&self, elements: Vec<String>) -> Vec<String> {
        match (&self.item_separator, self.prefix()) {
            (Some(sep), None) => vec![elements.join(sep.as_str())],
            (Some(sep), Some(prefix)) if self.separate => {
                vec![prefix.to_string(), elements.join(sep.as_str())]
            }
            (Some(sep), Some(prefix)) => vec![format!("{}{}", prefix, elements.join(sep.as_str()))],
            (None, None) => elements,
            (None, Some(prefix)) if self.separate => {
                let mut tokens = Vec::with_capacity(elements.len() + 1);
                tokens.push(prefix.to_string());
                tokens.extend(elements);
                tokens
            }
            (None, Some(prefix)) => elements
                .into_iter()
                .map(|e| format!("{}{}", prefix, e))
                .collect(),
        }
    }

    fn element(&self, value: &InputValue) -> AgentResult<String> {
        let category = self.input_type.category;
        let mismatch = || {
            AgentError::JobSpecification(format!(
                "for input key \"{}\": expected {} but got {}",
                self.key,
                category.name(),
                value.describe()
            ))
        };

        match (category, value) {
            (InputCategory::File | InputCategory::Directory, InputValue::Object(obj)) => {
                if Some(obj.class) != category.data_class() {
                    return Err(mismatch());
                }
                obj.path.clone().ok_or_else(|| {
                    AgentError::JobSpecification(format!(
                        "for input key \"{}\": {} has no local path",
                        self.key, obj.class
                    ))
                })
            }
            (InputCategory::String, InputValue::Scalar(Scalar::String(s))) => Ok(s.clone()),
            (InputCategory::Int | InputCategory::Long, InputValue::Scalar(s @ Scalar::Int(_)))
            | (
                InputCategory::Float | InputCategory::Double,
                InputValue::Scalar(s @ (Scalar::Int(_) | Scalar::Float(_))),
            )
            | (InputCategory::Boolean, InputValue::Scalar(s @ Scalar::Bool(_))) => Ok(s.to_string()),
            _ => Err(mismatch()),
        }
    }
}

/// All CLI arguments in declaration order
#[must_use]
pub fn cli_arguments(inputs: &IndexMap<String, CliInput>) -> Vec<CliArgument> {
    inputs
        .iter()
        .map(|(key, input)| CliArgument::from_cli_input(key, input))
        .collect()
}

/// Arrange arguments in command line order.
///
/// Positional arguments must occupy every position from 0 up to the largest
/// declared one, each position exactly once.
///
/// # Errors
///
/// Returns `JobSpecification` for negative, duplicate or missing positions
pub fn order_arguments(arguments: &[CliArgument]) -> AgentResult<Vec<&CliArgument>> {
    let mut positional: Vec<&CliArgument> = arguments
        .iter()
        .filter(|a| a.position().is_some())
        .collect();
    positional.sort_by_key(|a| a.position());

    if let Some(first) = positional.first() {
        let position = first.position().unwrap_or(0);
        if position < 0 {
            return Err(AgentError::JobSpecification(format!(
                "argument \"{}\" has negative position {}",
                first.key, position
            )));
        }
        if position > 0 {
            return Err(AgentError::JobSpecification(format!(
                "no argument at position 0 (first is \"{}\" at {})",
                first.key, position
            )));
        }
    }

    for pair in positional.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (pa, pb) = (a.position().unwrap_or(0), b.position().unwrap_or(0));
        if pa == pb {
            return Err(AgentError::JobSpecification(format!(
                "arguments \"{}\" and \"{}\" share position {}",
                a.key, b.key, pa
            )));
        }
        if pb != pa + 1 {
            return Err(AgentError::JobSpecification(format!(
                "no argument at position {} (between \"{}\" and \"{}\")",
                pa + 1,
                a.key,
                b.key
            )));
        }
    }

    let split = positional
        .iter()
        .position(|a| a.input_type.is_array)
        .unwrap_or(positional.len());

    let mut ordered = Vec::with_capacity(arguments.len());
    ordered.extend_from_slice(&positional[..split]);
    ordered.extend(arguments.iter().filter(|a| a.position().is_none()));
    ordered.extend_from_slice(&positional[split..]);
    Ok(ordered)
}

/// Build the command for `inputs` from the CLI description.
///
/// Inputs must already be completed, files and directories are represented
/// by their local `path`.
///
/// # Errors
///
/// Returns `JobSpecification` if arguments and inputs do not fit, and
/// `InvalidBaseCommand` for an empty base command
pub fn synthesize(cli: &CliDescription, inputs: &IndexMap<String, InputValue>) -> AgentResult<Vec<String>> {
    let mut command = base_command(cli)?;
    let arguments = cli_arguments(&cli.inputs);
    for argument in order_arguments(&arguments)? {
        command.extend(argument.tokens(inputs.get(&argument.key))?);
    }
    Ok(command)
}

/// Base command tokens
///
/// # Errors
///
/// Returns `InvalidBaseCommand` if there is no executable token
pub fn base_command(cli: &CliDescription) -> AgentResult<Vec<String>> {
    let tokens = cli.base_command.tokens();
    match tokens.first() {
        Some(first) if !first.is_empty() => Ok(tokens),
        _ => Err(AgentError::InvalidBaseCommand(
            "base command is empty".to_string(),
        )),
    }
}

/// Find `name` the way a shell would: as a path if it contains a slash,
/// otherwise in the directories of `PATH`.
///
/// # Errors
///
/// Returns `InvalidBaseCommand` if no executable file is found
pub fn locate_executable(name: &str) -> AgentResult<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        if is_executable(&path) {
            return Ok(path);
        }
        return Err(AgentError::InvalidBaseCommand(format!(
            "base command \"{}\" is not an executable file",
            name
        )));
    }

    let search = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&search)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| {
            AgentError::InvalidBaseCommand(format!(
                "base command \"{}\" could not be found in PATH",
                name
            ))
        })
}

/// Check that the first base command token can be executed
///
/// # Errors
///
/// Returns `InvalidBaseCommand` if the base command is empty or not found
pub fn check_base_command(cli: &CliDescription) -> AgentResult<PathBuf> {
    let tokens = base_command(cli)?;
    locate_executable(&tokens[0])
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_core::{BaseCommand, DataClass, DataObject, InputBinding};
    use proptest::prelude::*;

    fn input(ty: &str, binding: InputBinding) -> CliInput {
        CliInput {
            input_type: ty.parse().unwrap(),
            input_binding: binding,
            doc: None,
        }
    }

    fn at(position: i64) -> InputBinding {
        InputBinding {
            position: Some(position),
            ..InputBinding::default()
        }
    }

    fn named(prefix: &str) -> InputBinding {
        InputBinding {
            prefix: Some(prefix.to_string()),
            ..InputBinding::default()
        }
    }

    fn cli(base: &str, inputs: Vec<(&str, CliInput)>) -> CliDescription {
        CliDescription {
            base_command: BaseCommand::Single(base.to_string()),
            inputs: inputs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            outputs: IndexMap::new(),
        }
    }

    fn values(pairs: Vec<(&str, InputValue)>) -> IndexMap<String, InputValue> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn strings(items: &[&str]) -> InputValue {
        InputValue::List(items.iter().map(|s| InputValue::string(*s)).collect())
    }

    #[test]
    fn test_positional_order() {
        let cli = cli(
            "cp",
            vec![("dst", input("string", at(1))), ("src", input("string", at(0)))],
        );
        let inputs = values(vec![("src", InputValue::string("a")), ("dst", InputValue::string("b"))]);
        assert_eq!(synthesize(&cli, &inputs).unwrap(), vec!["cp", "a", "b"]);
    }

    #[test]
    fn test_gap_rejected() {
        let cli = cli(
            "cp",
            vec![("a", input("string", at(0))), ("b", input("string", at(2)))],
        );
        let inputs = values(vec![("a", InputValue::string("x")), ("b", InputValue::string("y"))]);
        let err = synthesize(&cli, &inputs).unwrap_err();
        assert_eq!(err.kind(), "JobSpecificationError");
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn test_positions_must_start_at_zero() {
        let shifted = cli(
            "echo",
            vec![("a", input("string", at(1))), ("b", input("string", at(2)))],
        );
        let inputs = values(vec![("a", InputValue::string("A")), ("b", InputValue::string("B"))]);
        let err = synthesize(&shifted, &inputs).unwrap_err();
        assert_eq!(err.kind(), "JobSpecificationError");
        assert!(err.to_string().contains("no argument at position 0"));

        let negative = cli("echo", vec![("a", input("string", at(-5)))]);
        let inputs = values(vec![("a", InputValue::string("A"))]);
        let err = synthesize(&negative, &inputs).unwrap_err();
        assert_eq!(err.kind(), "JobSpecificationError");
        assert!(err.to_string().contains("negative position -5"));
    }

    #[test]
    fn test_duplicate_position_rejected() {
        let cli = cli(
            "cp",
            vec![("a", input("string", at(0))), ("b", input("string", InputBinding::default()))],
        );
        let inputs = values(vec![("a", InputValue::string("x")), ("b", InputValue::string("y"))]);
        let err = synthesize(&cli, &inputs).unwrap_err();
        assert!(err.to_string().contains("share position 0"));
    }

    #[test]
    fn test_item_separator() {
        let binding = InputBinding {
            position: Some(0),
            item_separator: Some(",".to_string()),
            ..InputBinding::default()
        };
        let cli = cli("tool", vec![("xs", input("string[]", binding))]);
        let inputs = values(vec![("xs", strings(&["a", "b", "c"]))]);
        assert_eq!(synthesize(&cli, &inputs).unwrap(), vec!["tool", "a,b,c"]);
    }

    #[test]
    fn test_prefix_repeated_when_not_separate() {
        let binding = InputBinding {
            prefix: Some("-x".to_string()),
            separate: false,
            ..InputBinding::default()
        };
        let cli = cli("tool", vec![("xs", input("string[]", binding))]);
        let inputs = values(vec![("xs", strings(&["a", "b"]))]);
        assert_eq!(synthesize(&cli, &inputs).unwrap(), vec!["tool", "-xa", "-xb"]);
    }

    #[test]
    fn test_prefix_once_for_separate_array() {
        let cli = cli("tool", vec![("xs", input("int[]", named("--n")))]);
        let inputs = values(vec![(
            "xs",
            InputValue::List(vec![InputValue::int(1), InputValue::int(2)]),
        )]);
        assert_eq!(synthesize(&cli, &inputs).unwrap(), vec!["tool", "--n", "1", "2"]);
    }

    #[test]
    fn test_empty_array_contributes_nothing() {
        let cli = cli("tool", vec![("xs", input("string[]", named("-x")))]);
        let inputs = values(vec![("xs", InputValue::List(Vec::new()))]);
        assert_eq!(synthesize(&cli, &inputs).unwrap(), vec!["tool"]);
    }

    #[test]
    fn test_boolean_flag() {
        let cli = cli("tool", vec![("f", input("boolean", named("--flag")))]);
        let on = values(vec![("f", InputValue::boolean(true))]);
        let off = values(vec![("f", InputValue::boolean(false))]);
        assert_eq!(synthesize(&cli, &on).unwrap(), vec!["tool", "--flag"]);
        assert_eq!(synthesize(&cli, &off).unwrap(), vec!["tool"]);
    }

    #[test]
    fn test_prefix_not_separate_scalar() {
        let binding = InputBinding {
            prefix: Some("--out=".to_string()),
            separate: false,
            ..InputBinding::default()
        };
        let cli = cli("tool", vec![("o", input("string", binding))]);
        let inputs = values(vec![("o", InputValue::string("x.txt"))]);
        assert_eq!(synthesize(&cli, &inputs).unwrap(), vec!["tool", "--out=x.txt"]);
    }

    #[test]
    fn test_named_between_leading_positionals_and_array() {
        let cli = cli(
            "tool",
            vec![
                ("mode", input("string", at(0))),
                ("files", input("File[]", at(1))),
                ("last", input("string", at(2))),
                ("verbose", input("boolean", named("-v"))),
                ("level", input("int", named("-l"))),
            ],
        );
        let file = |p: &str| InputValue::Object(DataObject::new(DataClass::File).with_path(p));
        let inputs = values(vec![
            ("mode", InputValue::string("run")),
            ("files", InputValue::List(vec![file("/in/a"), file("/in/b")])),
            ("last", InputValue::string("end")),
            ("verbose", InputValue::boolean(true)),
            ("level", InputValue::int(3)),
        ]);
        assert_eq!(
            synthesize(&cli, &inputs).unwrap(),
            vec!["tool", "run", "-v", "-l", "3", "/in/a", "/in/b", "end"]
        );
    }

    #[test]
    fn test_missing_required() {
        let cli = cli("tool", vec![("a", input("File", at(0)))]);
        let err = synthesize(&cli, &IndexMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "required argument \"a\" is missing");
    }

    #[test]
    fn test_missing_optional() {
        let cli = cli("tool", vec![("a", input("File?", at(0)))]);
        assert_eq!(synthesize(&cli, &IndexMap::new()).unwrap(), vec!["tool"]);
    }

    #[test]
    fn test_array_scalar_mismatch() {
        let array_cli = cli("tool", vec![("a", input("string[]", at(0)))]);
        let err = synthesize(&array_cli, &values(vec![("a", InputValue::string("x"))])).unwrap_err();
        assert!(err.to_string().contains("not given as list"));

        let scalar_cli = cli("tool", vec![("a", input("string", at(0)))]);
        let err = synthesize(&scalar_cli, &values(vec![("a", strings(&["x"]))])).unwrap_err();
        assert!(err.to_string().contains("given as list"));
    }

    #[test]
    fn test_type_mismatch() {
        let cli = cli("tool", vec![("n", input("int", at(0)))]);
        let err = synthesize(&cli, &values(vec![("n", InputValue::string("3"))])).unwrap_err();
        assert_eq!(err.kind(), "JobSpecificationError");
    }

    #[test]
    fn test_float_accepts_int() {
        let cli = cli("tool", vec![("x", input("double", at(0)))]);
        let inputs = values(vec![("x", InputValue::Scalar(Scalar::Float(0.5)))]);
        assert_eq!(synthesize(&cli, &inputs).unwrap(), vec!["tool", "0.5"]);
        let inputs = values(vec![("x", InputValue::int(2))]);
        assert_eq!(synthesize(&cli, &inputs).unwrap(), vec!["tool", "2"]);
    }

    #[test]
    fn test_base_command_list() {
        let mut cli = cli("x", Vec::new());
        cli.base_command = BaseCommand::Multiple(vec!["python3".to_string(), "-u".to_string()]);
        assert_eq!(synthesize(&cli, &IndexMap::new()).unwrap(), vec!["python3", "-u"]);
    }

    #[test]
    fn test_empty_base_command() {
        let cli = cli("  ", Vec::new());
        assert_eq!(
            synthesize(&cli, &IndexMap::new()).unwrap_err().kind(),
            "InvalidBaseCommand"
        );
    }

    #[test]
    fn test_locate_executable() {
        assert!(locate_executable("sh").is_ok());
        assert!(locate_executable("/bin/sh").is_ok());
        let err = locate_executable("porter-no-such-binary").unwrap_err();
        assert_eq!(err.kind(), "InvalidBaseCommand");
    }

    #[test]
    fn test_locate_rejects_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(locate_executable(file.to_str().unwrap()).is_err());
    }

    proptest! {
        #[test]
        fn prop_positional_order_matches_positions(
            words in proptest::collection::vec("[a-z]{1,6}", 1..8),
            seed in any::<u64>(),
        ) {
            let n = words.len();
            // declare the bindings in a shuffled order
            let mut order: Vec<usize> = (0..n).collect();
            let mut state = seed;
            for i in (1..n).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                order.swap(i, (state >> 33) as usize % (i + 1));
            }
            let declared: Vec<(String, CliInput)> = order
                .iter()
                .map(|&i| (format!("k{}", i), input("string", at(i as i64))))
                .collect();
            let cli = CliDescription {
                base_command: BaseCommand::Single("tool".to_string()),
                inputs: declared.into_iter().collect(),
                outputs: IndexMap::new(),
            };
            let inputs: IndexMap<String, InputValue> = words
                .iter()
                .enumerate()
                .map(|(i, w)| (format!("k{}", i), InputValue::string(w.clone())))
                .collect();
            let command = synthesize(&cli, &inputs).unwrap();
            prop_assert_eq!(&command[1..], &words[..]);
        }

        #[test]
        fn prop_gap_is_rejected(n in 2usize..6, hole in 1usize..5) {
            prop_assume!(hole < n);
            let declared: Vec<(String, CliInput)> = (0..n)
                .map(|i| {
                    let position = if i >= hole { i as i64 + 1 } else { i as i64 };
                    (format!("k{}", i), input("string", at(position)))
                })
                .collect();
            let cli = CliDescription {
                base_command: BaseCommand::Single("tool".to_string()),
                inputs: declared.into_iter().collect(),
                outputs: IndexMap::new(),
            };
            let inputs: IndexMap<String, InputValue> = (0..n)
                .map(|i| (format!("k{}", i), InputValue::string("v")))
                .collect();
            prop_assert!(synthesize(&cli, &inputs).is_err());
        }

        #[test]
        fn prop_item_separator_joins(items in proptest::collection::vec("[a-z0-9]{1,5}", 1..6)) {
            let binding = InputBinding {
                position: Some(0),
                item_separator: Some(",".to_string()),
                ..InputBinding::default()
            };
            let cli = cli("tool", vec![("xs", input("string[]", binding))]);
            let refs: Vec<&str> = items.iter().map(String::as_str).collect();
            let inputs = values(vec![("xs", strings(&refs))]);
            let command = synthesize(&cli, &inputs).unwrap();
            prop_assert_eq!(command, vec!["tool".to_string(), items.join(",")]);
        }
    }
}
