//! Process-local parameter storage.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use stackwire_common::error::{Result, StackwireError};
use stackwire_common::types::ParameterKey;

use crate::backend::{ParameterBackend, PublishedParameter};

/// In-memory backend guarded by a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<ParameterKey, PublishedParameter>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StackwireError {
    StackwireError::StoreUnavailable {
        message: "memory store lock poisoned".into(),
    }
}

impl ParameterBackend for MemoryBackend {
    fn put(&self, record: PublishedParameter) -> Result<Option<PublishedParameter>> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.insert(record.key.clone(), record))
    }

    fn get(&self, key: &ParameterKey) -> Result<Option<PublishedParameter>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn remove(&self, key: &ParameterKey) -> Result<Option<PublishedParameter>> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.remove(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<PublishedParameter>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .values()
            .filter(|p| p.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
