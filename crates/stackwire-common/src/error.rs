//! Unified error types for the stackwire workspace.
//!
//! Every stage of a composition (configuration validation, graph building,
//! finalization, cross-stack resolution, publishing) reports through the
//! single [`StackwireError`] enum so callers can match on the failure kind
//! regardless of which crate raised it.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{LogicalId, StackId, ValueType};

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum StackwireError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required configuration variable was not supplied for a stack.
    #[error("stack {stack}: missing required variable \"{key}\"")]
    MissingVariable {
        /// Stack whose configuration is incomplete.
        stack: StackId,
        /// Dotted path of the missing variable.
        key: String,
    },

    /// A descriptor with the same logical id already exists in the stack.
    #[error("stack {stack}: duplicate logical id \"{id}\"")]
    DuplicateLogicalId {
        /// Stack being built.
        stack: StackId,
        /// Offending logical id.
        id: LogicalId,
    },

    /// A dependency, reference, or output names a descriptor that is not in the stack.
    #[error("stack {stack}: unknown resource \"{id}\"{}", referrer_suffix(.referrer.as_ref()))]
    UnknownResource {
        /// Stack being built.
        stack: StackId,
        /// Logical id that could not be found.
        id: LogicalId,
        /// Descriptor or output that referenced the missing id, if any.
        referrer: Option<String>,
    },

    /// A property references an input variable the stack never declared.
    #[error("stack {stack}: resource \"{referrer}\" references undeclared input \"{name}\"")]
    UnknownInput {
        /// Stack being built.
        stack: StackId,
        /// Name of the undeclared input.
        name: String,
        /// Descriptor holding the reference.
        referrer: LogicalId,
    },

    /// A typed handle was requested for a descriptor of a different kind.
    #[error("stack {stack}: resource \"{id}\" is a {found}, not a {expected}")]
    KindMismatch {
        /// Stack being built.
        stack: StackId,
        /// Descriptor looked up.
        id: LogicalId,
        /// Kind the caller asked for.
        expected: String,
        /// Kind actually registered.
        found: String,
    },

    /// The dependency graph contains a cycle.
    #[error("stack {stack}: dependency cycle {}", CyclePath(.cycle))]
    DependencyCycle {
        /// Stack being finalized.
        stack: StackId,
        /// Every descriptor on the cycle, exactly once, in traversal order.
        cycle: Vec<LogicalId>,
    },

    /// The parameter store holds no value for the key.
    #[error("parameter not found: {key}")]
    KeyNotFound {
        /// Key that was looked up.
        key: String,
    },

    /// A parameter key is not a well-formed hierarchical path.
    #[error("invalid parameter key \"{key}\": {reason}")]
    InvalidKey {
        /// Rejected key.
        key: String,
        /// Why the key was rejected.
        reason: &'static str,
    },

    /// A deferred reference could not be resolved at render time.
    #[error(
        "stack {stack}: unresolved cross-stack reference \"{key}\" at {resource}.{path}"
    )]
    UnresolvedCrossStackReference {
        /// Stack being resolved.
        stack: StackId,
        /// Parameter key of the deferred reference.
        key: String,
        /// Descriptor holding the reference.
        resource: LogicalId,
        /// Property path within the descriptor.
        path: String,
    },

    /// A resolved parameter value does not parse as the expected type.
    #[error(
        "stack {stack}: parameter \"{key}\" at {resource}.{path} expected {expected}, got \"{value}\""
    )]
    TypeMismatch {
        /// Stack being resolved.
        stack: StackId,
        /// Parameter key of the deferred reference.
        key: String,
        /// Type declared on the deferred reference.
        expected: ValueType,
        /// Raw value found in the store.
        value: String,
        /// Descriptor holding the reference.
        resource: LogicalId,
        /// Property path within the descriptor.
        path: String,
    },

    /// The parameter store backend could not be reached.
    #[error("parameter store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the backend failure.
        message: String,
    },

    /// The caller aborted the composition.
    #[error("stack {stack}: composition cancelled after {phase}")]
    Cancelled {
        /// Stack whose composition was aborted.
        stack: StackId,
        /// Last phase completed before the abort.
        phase: String,
    },

    /// An error raised while a blueprint section was running.
    #[error("stack {stack}, section \"{section}\": {source}")]
    Section {
        /// Stack being composed.
        stack: StackId,
        /// Name of the section that failed.
        section: String,
        /// Underlying error.
        source: Box<StackwireError>,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML deserialization failed.
    #[error("yaml error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl StackwireError {
    /// Returns `true` for failures a caller may retry unchanged.
    ///
    /// Only [`StackwireError::StoreUnavailable`] is transient; every other
    /// kind is a structural or configuration error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self.root(), Self::StoreUnavailable { .. })
    }

    /// Strips [`StackwireError::Section`] annotations and returns the
    /// underlying error.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Section { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the section that raised this error, if it was annotated.
    #[must_use]
    pub fn section(&self) -> Option<&str> {
        match self {
            Self::Section { section, .. } => Some(section),
            _ => None,
        }
    }
}

fn referrer_suffix(referrer: Option<&String>) -> String {
    referrer.map_or_else(String::new, |r| format!(" (referenced by {r})"))
}

struct CyclePath<'a>(&'a [LogicalId]);

impl fmt::Display for CyclePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.0 {
            write!(f, "{id} -> ")?;
        }
        match self.0.first() {
            Some(first) => write!(f, "{first}"),
            None => Ok(()),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StackwireError>;
