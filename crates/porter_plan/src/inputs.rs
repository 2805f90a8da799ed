//! Input completion.
//!
//! Before staging, every `File` and `Directory` input is given its local
//! location: `basename`, `dirname` and `path`, plus `nameroot` and `nameext`
//! for files. The completed values are what the command is built from and
//! what output globs are resolved against.

use indexmap::IndexMap;
use porter_core::{AgentResult, DataClass, DataObject, InputValue};
use serde_json::{Map, Value};
use std::path::Path;
use uuid::Uuid;

/// Split a file name into root and last extension.
///
/// Leading dots belong to the root, so `.bashrc` has no extension.
///
/// ```
/// use porter_plan::split_extension;
/// assert_eq!(split_extension("a.tar.gz"), ("a.tar".to_string(), ".gz".to_string()));
/// ```
#[must_use]
pub fn split_extension(basename: &str) -> (String, String) {
    let rest = basename.trim_start_matches('.');
    let offset = basename.len() - rest.len();
    match rest.rfind('.') {
        Some(i) => {
            let at = offset + i;
            (basename[..at].to_string(), basename[at..].to_string())
        }
        None => (basename.to_string(), String::new()),
    }
}

fn fresh_dir(inputs_dir: &Path) -> String {
    inputs_dir
        .join(Uuid::new_v4().to_string())
        .to_string_lossy()
        .into_owned()
}

/// Fill in the location of one data object
pub fn complete_object(key: &str, object: &mut DataObject, inputs_dir: &Path) {
    let basename = object.basename.get_or_insert_with(|| key.to_string()).clone();

    match object.class {
        DataClass::File => {
            let dirname = object
                .dirname
                .get_or_insert_with(|| fresh_dir(inputs_dir))
                .clone();
            let (nameroot, nameext) = split_extension(&basename);
            object.nameroot = Some(nameroot);
            object.nameext = Some(nameext);
            object.path = Some(Path::new(&dirname).join(&basename).to_string_lossy().into_owned());
        }
        DataClass::Directory => {
            let dirname = fresh_dir(inputs_dir);
            object.path = Some(Path::new(&dirname).join(&basename).to_string_lossy().into_owned());
            object.dirname = Some(dirname);
        }
    }
}

/// Complete every data object in `inputs`, including list elements
pub fn complete_inputs(inputs: &mut IndexMap<String, InputValue>, inputs_dir: &Path) {
    for (key, value) in inputs.iter_mut() {
        match value {
            InputValue::Object(object) => complete_object(key, object, inputs_dir),
            InputValue::List(items) => {
                for item in items {
                    if let InputValue::Object(object) = item {
                        complete_object(key, object, inputs_dir);
                    }
                }
            }
            InputValue::Scalar(_) => {}
        }
    }
}

/// Generic tree of completed inputs, as seen by `$(inputs...)` references
///
/// # Errors
///
/// Returns `RedValidation` if a value cannot be represented
pub fn inputs_tree(inputs: &IndexMap<String, InputValue>) -> AgentResult<Value> {
    let mut map = Map::with_capacity(inputs.len());
    for (key, value) in inputs {
        map.insert(key.clone(), value.to_tree()?);
    }
    Ok(Value::Object(map))
}
