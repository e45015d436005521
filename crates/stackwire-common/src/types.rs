//! Domain primitive types used across the stackwire workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::KEY_SEPARATOR;
use crate::error::{Result, StackwireError};

/// Identifier of a resource descriptor, unique within its stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Creates a logical id from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LogicalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of one independently deployable stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackId(String);

impl StackId {
    /// Creates a stack id from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a single composition run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Generates a random run id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated hierarchical parameter-store key such as `/stocks/api/id`.
///
/// Keys start with `/`, contain no empty segments, do not end with `/`, and
/// use only ASCII alphanumerics plus `-`, `_`, and `.` inside segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParameterKey(String);

impl ParameterKey {
    /// Parses and validates a key.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::InvalidKey`] if the key is not a well-formed
    /// slash-delimited path.
    pub fn parse(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let invalid = |reason| StackwireError::InvalidKey {
            key: key.clone(),
            reason,
        };
        let Some(rest) = key.strip_prefix(KEY_SEPARATOR) else {
            return Err(invalid("keys must start with '/'"));
        };
        if rest.is_empty() {
            return Err(invalid("key has no segments"));
        }
        for segment in rest.split(KEY_SEPARATOR) {
            if segment.is_empty() {
                return Err(invalid("empty path segment"));
            }
            if !segment.chars().all(is_key_char) {
                return Err(invalid("segments may only contain [A-Za-z0-9._-]"));
            }
        }
        Ok(Self(key))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the path segments without the leading separator.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split(KEY_SEPARATOR)
    }

    /// Returns `true` if this key equals `prefix` or lies beneath it.
    ///
    /// `/stocks` is a prefix of `/stocks/api/id` but not of `/stocksx`.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches(KEY_SEPARATOR);
        if prefix.is_empty() {
            return true;
        }
        self.0 == prefix
            || self
                .0
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(KEY_SEPARATOR))
    }
}

const fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParameterKey {
    type Err = StackwireError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ParameterKey {
    type Error = StackwireError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ParameterKey> for String {
    fn from(key: ParameterKey) -> Self {
        key.0
    }
}

/// Type a deferred reference's stored string must parse as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Any string.
    #[default]
    String,
    /// A signed 64-bit integer.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// Comma-separated list of strings.
    StringList,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Boolean => write!(f, "boolean"),
            Self::StringList => write!(f, "string list"),
        }
    }
}

/// Placeholder for a value that is read from the parameter store at render
/// time rather than at graph-construction time.
///
/// A deferred reference carries no ordering information: the producing stack
/// lives in a different deployment unit and may already be fully deployed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeferredReference {
    /// Hierarchical store key.
    pub key: ParameterKey,
    /// Type the stored value must parse as.
    #[serde(default)]
    pub expected_type: ValueType,
}

impl DeferredReference {
    /// Creates a deferred reference expecting a plain string.
    #[must_use]
    pub const fn string(key: ParameterKey) -> Self {
        Self {
            key,
            expected_type: ValueType::String,
        }
    }
}

impl fmt::Display for DeferredReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deferred({}: {})", self.key, self.expected_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_key_accepts_hierarchical_paths() {
        let key = ParameterKey::parse("/stocks/api/parent/resource/id").expect("valid key");
        assert_eq!(
            key.segments().collect::<Vec<_>>(),
            vec!["stocks", "api", "parent", "resource", "id"]
        );
    }

    #[test]
    fn parameter_key_rejects_relative_paths() {
        let err = ParameterKey::parse("stocks/api/id").unwrap_err();
        assert!(err.to_string().contains("must start with '/'"), "got: {err}");
    }

    #[test]
    fn parameter_key_rejects_empty_segments() {
        assert!(ParameterKey::parse("/stocks//id").is_err());
        assert!(ParameterKey::parse("/stocks/id/").is_err());
        assert!(ParameterKey::parse("/").is_err());
    }

    #[test]
    fn parameter_key_rejects_odd_characters() {
        assert!(ParameterKey::parse("/stocks/api id").is_err());
        assert!(ParameterKey::parse("/stocks/{{id}}").is_err());
    }

    #[test]
    fn parameter_key_prefix_matches_whole_segments() {
        let key = ParameterKey::parse("/stocks/api/id").expect("valid key");
        assert!(key.starts_with("/stocks"));
        assert!(key.starts_with("/stocks/"));
        assert!(key.starts_with("/stocks/api/id"));
        assert!(key.starts_with("/"));
        assert!(!key.starts_with("/stock"));
        assert!(!key.starts_with("/jobs"));
    }

    #[test]
    fn parameter_key_deserializes_with_validation() {
        let ok: ParameterKey = serde_json::from_str("\"/api/id\"").expect("valid");
        assert_eq!(ok.as_str(), "/api/id");
        assert!(serde_json::from_str::<ParameterKey>("\"api/id\"").is_err());
    }

    #[test]
    fn logical_ids_order_lexicographically() {
        let mut ids = vec![LogicalId::new("Z"), LogicalId::new("X"), LogicalId::new("Y")];
        ids.sort();
        assert_eq!(ids, vec![LogicalId::new("X"), LogicalId::new("Y"), LogicalId::new("Z")]);
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::generate(), RunId::generate());
    }
}
