//! Storage trait implemented by every parameter-store backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackwire_common::error::Result;
use stackwire_common::types::{ParameterKey, StackId};

/// A value written to the store by a realized stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedParameter {
    /// Hierarchical key.
    pub key: ParameterKey,
    /// Stored string value.
    pub value: String,
    /// Stack that last wrote the key.
    pub producing_stack: StackId,
    /// When the value was written.
    pub written_at: DateTime<Utc>,
}

impl PublishedParameter {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(key: ParameterKey, value: impl Into<String>, producing_stack: StackId) -> Self {
        Self {
            key,
            value: value.into(),
            producing_stack,
            written_at: Utc::now(),
        }
    }
}

/// Shared key-value storage behind a [`ParameterStore`](crate::ParameterStore).
///
/// Implementations serialize concurrent access themselves: a `get` that
/// starts after a `put` returned observes that `put` or a later one.
/// Backend failures surface as
/// [`StackwireError::StoreUnavailable`](stackwire_common::error::StackwireError::StoreUnavailable).
pub trait ParameterBackend: Send + Sync {
    /// Stores `record`, replacing any previous record under the same key,
    /// and returns the replaced record.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend cannot be written.
    fn put(&self, record: PublishedParameter) -> Result<Option<PublishedParameter>>;

    /// Returns the record under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend cannot be read.
    fn get(&self, key: &ParameterKey) -> Result<Option<PublishedParameter>>;

    /// Deletes the record under `key` and returns it.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend cannot be written.
    fn remove(&self, key: &ParameterKey) -> Result<Option<PublishedParameter>>;

    /// Returns every record whose key equals `prefix` or lies beneath it,
    /// sorted by key.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend cannot be read.
    fn list(&self, prefix: &str) -> Result<Vec<PublishedParameter>>;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String;
}
