//! Deployment configuration model.
//!
//! A deployment file lists the stacks to compose, in order, together with the
//! variables each stack's blueprint receives and the parameter-store backend
//! that carries published values between them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::constants::{DEFAULT_STORE_FILE, VARIABLE_PATH_SEPARATOR};
use crate::error::{Result, StackwireError};
use crate::types::StackId;

/// Root of a deployment file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Namespace prefixed to generated physical ids.
    pub namespace: String,
    /// Parameter-store backend shared by all stacks.
    #[serde(default)]
    pub store: StoreConfig,
    /// Stacks in composition order.
    pub stacks: Vec<StackConfig>,
}

impl DeploymentConfig {
    /// Parses a deployment file from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or two stacks share a name.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(input)?;
        config.check_unique_stacks()?;
        Ok(config)
    }

    /// Reads and parses a deployment file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| StackwireError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Returns the configuration of the named stack.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&StackConfig> {
        self.stacks.iter().find(|s| s.name.as_str() == name)
    }

    fn check_unique_stacks(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for stack in &self.stacks {
            if !seen.insert(&stack.name) {
                return Err(StackwireError::Config {
                    message: format!("duplicate stack name: \"{}\"", stack.name),
                });
            }
        }
        Ok(())
    }
}

/// Which parameter-store backend to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-process store; values vanish when the process exits.
    Memory,
    /// JSON file on disk.
    File {
        /// Location of the store file.
        #[serde(default = "default_store_path")]
        path: PathBuf,
    },
}

impl StoreConfig {
    /// Returns the file path for file-backed configurations.
    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::Memory => None,
            Self::File { path } => Some(path),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_FILE)
}

/// Configuration of a single stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Stack identifier.
    pub name: StackId,
    /// Name of the blueprint that builds the stack.
    pub blueprint: String,
    /// Variables handed to the blueprint.
    #[serde(default)]
    pub variables: Variables,
}

/// String-keyed configuration mapping with nested lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, Value>);

impl Variables {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a top-level value, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts a value at a dotted path, creating intermediate mappings.
    pub fn insert_path(&mut self, path: &str, value: impl Into<Value>) {
        let mut segments = path.split(VARIABLE_PATH_SEPARATOR);
        let Some(first) = segments.next() else {
            return;
        };
        let rest: Vec<&str> = segments.collect();
        let Some((last, middle)) = rest.split_last() else {
            let _ = self.0.insert(first.to_string(), value.into());
            return;
        };
        let mut node = self
            .0
            .entry(first.to_string())
            .or_insert_with(|| Value::Mapping(serde_yaml::Mapping::new()));
        for segment in middle {
            node = ensure_mapping(node)
                .entry(Value::String((*segment).to_string()))
                .or_insert_with(|| Value::Mapping(serde_yaml::Mapping::new()));
        }
        let _ = ensure_mapping(node).insert(Value::String((*last).to_string()), value.into());
    }

    /// Looks up a value by dotted path (`env-dict.ApiName`).
    ///
    /// A top-level key containing the separator literally takes precedence
    /// over nested lookup.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(path) {
            return Some(value);
        }
        let mut segments = path.split(VARIABLE_PATH_SEPARATOR);
        let mut node = self.0.get(segments.next()?)?;
        for segment in segments {
            node = node.as_mapping()?.get(segment)?;
        }
        Some(node)
    }

    /// Returns the scalar at `path` rendered as a string.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::MissingVariable`] if the path is absent or
    /// null, and [`StackwireError::Config`] if it holds a list or mapping.
    pub fn require_str(&self, stack: &StackId, path: &str) -> Result<String> {
        let value = self.get(path).ok_or_else(|| missing(stack, path))?;
        scalar_to_string(value)
            .map_err(|()| StackwireError::Config {
                message: format!("stack {stack}: variable \"{path}\" is not a scalar"),
            })?
            .ok_or_else(|| missing(stack, path))
    }

    /// Checks that every path in `required` is present and non-null.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::MissingVariable`] naming the first absent key.
    pub fn validate_required(&self, stack: &StackId, required: &[&str]) -> Result<()> {
        for path in required {
            match self.get(path) {
                None | Some(Value::Null) => return Err(missing(stack, path)),
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn ensure_mapping(node: &mut Value) -> &mut serde_yaml::Mapping {
    if !node.is_mapping() {
        *node = Value::Mapping(serde_yaml::Mapping::new());
    }
    match node {
        Value::Mapping(map) => map,
        _ => unreachable!("node was just replaced with a mapping"),
    }
}

/// `Ok(None)` for null, `Err(())` for non-scalars.
fn scalar_to_string(value: &Value) -> std::result::Result<Option<String>, ()> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => Err(()),
    }
}

fn missing(stack: &StackId, path: &str) -> StackwireError {
    StackwireError::MissingVariable {
        stack: stack.clone(),
        key: path.to_string(),
    }
}
