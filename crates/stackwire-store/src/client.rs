//! Parameter store client used by the composer and the CLI.
//!
//! Wraps a shared [`ParameterBackend`] with key validation, last-writer-wins
//! publishing, and render-time resolution of the deferred references in a
//! finalized stack graph.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use stackwire_common::config::StoreConfig;
use stackwire_common::error::{Result, StackwireError};
use stackwire_common::types::{DeferredReference, ParameterKey, StackId, ValueType};
use stackwire_graph::{PropertyValue, StackGraph};

use crate::backend::{ParameterBackend, PublishedParameter};
use crate::file::FileBackend;
use crate::memory::MemoryBackend;

/// Cheaply cloneable handle to a shared parameter store.
#[derive(Clone)]
pub struct ParameterStore {
    backend: Arc<dyn ParameterBackend>,
}

impl fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterStore")
            .field("backend", &self.backend.describe())
            .finish()
    }
}

impl ParameterStore {
    /// Wraps an arbitrary backend.
    #[must_use]
    pub fn new(backend: impl ParameterBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// A store backed by process memory.
    #[must_use]
    pub fn memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// A store backed by the JSON file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the file's directory cannot be created.
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(FileBackend::open(path)?))
    }

    /// Builds the store a deployment file asks for.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if a file store cannot be opened.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::Memory => Ok(Self::memory()),
            StoreConfig::File { path } => Self::open_file(path),
        }
    }

    /// Writes `value` under `key` on behalf of `producing_stack`.
    ///
    /// Last writer wins. Overwriting a key last written by a different stack
    /// is allowed but logged.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend cannot be written.
    pub fn put(
        &self,
        key: &ParameterKey,
        value: impl Into<String>,
        producing_stack: &StackId,
    ) -> Result<PublishedParameter> {
        let (record, _) = self.write(key, value, producing_stack)?;
        Ok(record)
    }

    /// Writes every `(key, value)` pair on behalf of `producing_stack`, or
    /// none of them.
    ///
    /// When a write fails, the keys this call already wrote are restored to
    /// their previous records, or removed if they had none, before the error
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns the `StoreUnavailable` error of the failed write.
    pub fn put_all(
        &self,
        entries: impl IntoIterator<Item = (ParameterKey, String)>,
        producing_stack: &StackId,
    ) -> Result<Vec<PublishedParameter>> {
        let mut written = Vec::new();
        let mut undo = Vec::new();
        for (key, value) in entries {
            match self.write(&key, value, producing_stack) {
                Ok((record, previous)) => {
                    written.push(record);
                    undo.push((key, previous));
                }
                Err(err) => {
                    self.roll_back(undo, producing_stack);
                    return Err(err);
                }
            }
        }
        Ok(written)
    }

    fn write(
        &self,
        key: &ParameterKey,
        value: impl Into<String>,
        producing_stack: &StackId,
    ) -> Result<(PublishedParameter, Option<PublishedParameter>)> {
        let record = PublishedParameter::new(key.clone(), value, producing_stack.clone());
        let previous = self.backend.put(record.clone())?;
        match &previous {
            Some(prev) if &prev.producing_stack != producing_stack => {
                tracing::warn!(
                    key = %key,
                    previous_stack = %prev.producing_stack,
                    stack = %producing_stack,
                    "parameter overwritten by a different stack"
                );
            }
            _ => tracing::debug!(key = %key, stack = %producing_stack, "parameter written"),
        }
        Ok((record, previous))
    }

    /// Undoes writes newest first, so a key written twice ends at its
    /// original record.
    fn roll_back(
        &self,
        undo: Vec<(ParameterKey, Option<PublishedParameter>)>,
        producing_stack: &StackId,
    ) {
        for (key, previous) in undo.into_iter().rev() {
            let restored = match previous {
                Some(record) => self.backend.put(record),
                None => self.backend.remove(&key),
            };
            match restored {
                Ok(_) => tracing::debug!(key = %key, stack = %producing_stack, "write rolled back"),
                Err(err) => tracing::warn!(
                    key = %key,
                    stack = %producing_stack,
                    error = %err,
                    "failed to roll back parameter"
                ),
            }
        }
    }

    /// Parses `key` and writes `value` under it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a malformed key, otherwise as [`Self::put`].
    pub fn put_str(
        &self,
        key: &str,
        value: impl Into<String>,
        producing_stack: &StackId,
    ) -> Result<PublishedParameter> {
        self.put(&ParameterKey::parse(key)?, value, producing_stack)
    }

    /// Returns the current record under `key`.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if nothing was written under `key`, or
    /// `StoreUnavailable` if the backend cannot be read.
    pub fn get(&self, key: &ParameterKey) -> Result<PublishedParameter> {
        self.backend
            .get(key)?
            .ok_or_else(|| StackwireError::KeyNotFound {
                key: key.to_string(),
            })
    }

    /// Returns the current value under `key`.
    ///
    /// # Errors
    ///
    /// As [`Self::get`].
    pub fn get_value(&self, key: &ParameterKey) -> Result<String> {
        self.get(key).map(|p| p.value)
    }

    /// Returns every record at or beneath `prefix`, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend cannot be read.
    pub fn list(&self, prefix: &str) -> Result<Vec<PublishedParameter>> {
        self.backend.list(prefix)
    }

    /// Builds a deferred reference to `key` without touching the store.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a malformed key.
    pub fn deferred_ref(key: &str, expected_type: ValueType) -> Result<DeferredReference> {
        Ok(DeferredReference {
            key: ParameterKey::parse(key)?,
            expected_type,
        })
    }

    /// Returns a copy of `graph` with every deferred reference replaced by
    /// the stored value, parsed as its expected type.
    ///
    /// Each key is read once per call, so every occurrence of a key within
    /// the graph resolves to the same value. `graph` is never modified.
    ///
    /// # Errors
    ///
    /// Fails on the first reference in realization order:
    /// - `UnresolvedCrossStackReference` if the key was never written;
    /// - `TypeMismatch` if the value does not parse as the expected type;
    /// - `StoreUnavailable` if the backend cannot be read.
    pub fn resolve_all(&self, graph: &StackGraph) -> Result<StackGraph> {
        let stack = graph.stack();
        let mut cache: HashMap<ParameterKey, String> = HashMap::new();
        let resolved = graph.try_map_properties(|descriptor, name, value| {
            value.replace_deferred(name, &mut |reference, path| {
                let raw = match cache.get(&reference.key) {
                    Some(raw) => raw.clone(),
                    None => {
                        let raw = match self.backend.get(&reference.key)? {
                            Some(record) => record.value,
                            None => {
                                return Err(StackwireError::UnresolvedCrossStackReference {
                                    stack: stack.clone(),
                                    key: reference.key.to_string(),
                                    resource: descriptor.logical_id().clone(),
                                    path: path.to_string(),
                                });
                            }
                        };
                        let _ = cache.insert(reference.key.clone(), raw.clone());
                        raw
                    }
                };
                typed_value(reference.expected_type, &raw).ok_or_else(|| {
                    StackwireError::TypeMismatch {
                        stack: stack.clone(),
                        key: reference.key.to_string(),
                        expected: reference.expected_type,
                        value: raw.clone(),
                        resource: descriptor.logical_id().clone(),
                        path: path.to_string(),
                    }
                })
            })
        })?;
        tracing::info!(stack = %stack, keys = cache.len(), "deferred references resolved");
        Ok(resolved)
    }

    /// Short description of the backend.
    #[must_use]
    pub fn describe(&self) -> String {
        self.backend.describe()
    }
}

/// Parses a stored string as `expected`, or `None` if it does not fit.
fn typed_value(expected: ValueType, raw: &str) -> Option<PropertyValue> {
    match expected {
        ValueType::String => Some(PropertyValue::from(raw)),
        ValueType::Integer => raw.trim().parse::<i64>().ok().map(PropertyValue::Integer),
        ValueType::Boolean => match raw.trim() {
            "true" => Some(PropertyValue::Boolean(true)),
            "false" => Some(PropertyValue::Boolean(false)),
            _ => None,
        },
        ValueType::StringList => Some(PropertyValue::list(
            raw.split(',').map(str::trim).filter(|s| !s.is_empty()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use stackwire_graph::kinds::{ApiDeployment, UsagePlan};
    use stackwire_graph::{GraphBuilder, ResourceDescriptor, ResourceKind};

    use super::*;

    /// Memory backend whose `fail_on`-th `put` (1-based) fails.
    #[derive(Debug)]
    struct FailingPut {
        inner: MemoryBackend,
        puts: AtomicUsize,
        fail_on: usize,
    }

    impl FailingPut {
        fn new(fail_on: usize) -> Self {
            Self {
                inner: MemoryBackend::new(),
                puts: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    impl ParameterBackend for FailingPut {
        fn put(&self, record: PublishedParameter) -> Result<Option<PublishedParameter>> {
            if self.puts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StackwireError::StoreUnavailable {
                    message: "down".into(),
                });
            }
            self.inner.put(record)
        }

        fn get(&self, key: &ParameterKey) -> Result<Option<PublishedParameter>> {
            self.inner.get(key)
        }

        fn remove(&self, key: &ParameterKey) -> Result<Option<PublishedParameter>> {
            self.inner.remove(key)
        }

        fn list(&self, prefix: &str) -> Result<Vec<PublishedParameter>> {
            self.inner.list(prefix)
        }

        fn describe(&self) -> String {
            "failing".into()
        }
    }

    fn stack(name: &str) -> StackId {
        StackId::new(name)
    }

    fn key(path: &str) -> ParameterKey {
        ParameterKey::parse(path).expect("key")
    }

    fn consumer(reference: DeferredReference) -> StackGraph {
        let mut b = GraphBuilder::new(stack("integrations"));
        let deployment = b
            .add::<ApiDeployment>(
                ResourceDescriptor::new("Deployment", ResourceKind::ApiDeployment)
                    .property("RestApiId", reference.clone()),
            )
            .expect("deployment");
        let _ = b
            .add::<UsagePlan>(
                ResourceDescriptor::new("Plan", ResourceKind::UsagePlan)
                    .property(
                        "ApiStages",
                        PropertyValue::list([PropertyValue::map([
                            ("ApiId", PropertyValue::from(reference)),
                            ("Stage", PropertyValue::from("api")),
                        ])]),
                    )
                    .depends_on(&deployment),
            )
            .expect("plan");
        b.finalize().expect("finalize")
    }

    #[test]
    fn get_missing_key_is_not_found() {
        let store = ParameterStore::memory();
        let err = store.get(&key("/nope")).unwrap_err();
        assert!(matches!(err, StackwireError::KeyNotFound { ref key } if key == "/nope"));
    }

    #[test]
    fn latest_put_wins() {
        let store = ParameterStore::memory();
        let _ = store.put(&key("/api/id"), "first", &stack("a")).expect("put");
        let _ = store.put(&key("/api/id"), "second", &stack("b")).expect("put");
        let record = store.get(&key("/api/id")).expect("get");
        assert_eq!(record.value, "second");
        assert_eq!(record.producing_stack.as_str(), "b");
    }

    #[test]
    fn put_all_writes_every_entry() {
        let store = ParameterStore::memory();
        let records = store
            .put_all(
                [(key("/a"), "1".to_string()), (key("/b"), "2".to_string())],
                &stack("api"),
            )
            .expect("put_all");
        assert_eq!(records.len(), 2);
        assert_eq!(store.get_value(&key("/b")).expect("get"), "2");
    }

    #[test]
    fn failed_put_all_restores_previous_values() {
        // Puts 1 and 2 seed the store; put 5 is the third write of put_all.
        let store = ParameterStore::new(FailingPut::new(5));
        let _ = store.put(&key("/a"), "old-a", &stack("earlier")).expect("seed");
        let _ = store.put(&key("/x"), "untouched", &stack("other")).expect("seed");

        let err = store
            .put_all(
                [
                    (key("/a"), "new-a".to_string()),
                    (key("/b"), "new-b".to_string()),
                    (key("/c"), "new-c".to_string()),
                ],
                &stack("api"),
            )
            .unwrap_err();
        assert!(err.is_transient(), "got: {err}");

        let a = store.get(&key("/a")).expect("restored");
        assert_eq!(a.value, "old-a");
        assert_eq!(a.producing_stack.as_str(), "earlier");
        assert!(store.get(&key("/b")).is_err());
        assert!(store.get(&key("/c")).is_err());
        let keys: Vec<_> = store
            .list("/")
            .expect("list")
            .into_iter()
            .map(|p| p.key.to_string())
            .collect();
        assert_eq!(keys, vec!["/a", "/x"]);
    }

    #[test]
    fn rollback_of_a_repeated_key_ends_at_the_original() {
        let store = ParameterStore::new(FailingPut::new(4));
        let _ = store.put(&key("/a"), "original", &stack("s")).expect("seed");
        let err = store.put_all(
            [
                (key("/a"), "first".to_string()),
                (key("/a"), "second".to_string()),
                (key("/b"), "never".to_string()),
            ],
            &stack("s"),
        );
        assert!(err.is_err());
        assert_eq!(store.get_value(&key("/a")).expect("get"), "original");
    }

    #[test]
    fn put_str_validates_key() {
        let store = ParameterStore::memory();
        assert!(matches!(
            store.put_str("api/id", "x", &stack("a")),
            Err(StackwireError::InvalidKey { .. })
        ));
    }

    #[test]
    fn deferred_ref_does_not_touch_store() {
        let reference = ParameterStore::deferred_ref("/api/id", ValueType::Integer).expect("ref");
        assert_eq!(reference.key.as_str(), "/api/id");
        assert_eq!(reference.expected_type, ValueType::Integer);
        assert!(ParameterStore::deferred_ref("relative", ValueType::String).is_err());
    }

    #[test]
    fn resolve_all_substitutes_every_occurrence() {
        let store = ParameterStore::memory();
        let _ = store.put(&key("/stocks/api/id"), "abc123", &stack("api")).expect("put");
        let graph = consumer(DeferredReference::string(key("/stocks/api/id")));

        let resolved = store.resolve_all(&graph).expect("resolve");
        assert!(resolved.is_resolved());
        assert_eq!(
            resolved.resource("Deployment").and_then(|d| d.get("RestApiId")),
            Some(&PropertyValue::from("abc123"))
        );
        assert_eq!(resolved.order(), graph.order());
        assert!(!graph.is_resolved());
    }

    #[test]
    fn resolve_all_reports_missing_key_with_location() {
        let store = ParameterStore::memory();
        let graph = consumer(DeferredReference::string(key("/stocks/api/id")));
        match store.resolve_all(&graph).unwrap_err() {
            StackwireError::UnresolvedCrossStackReference {
                key, resource, path, ..
            } => {
                assert_eq!(key, "/stocks/api/id");
                assert_eq!(resource.as_str(), "Deployment");
                assert_eq!(path, "RestApiId");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolve_all_type_checks_values() {
        let store = ParameterStore::memory();
        let _ = store.put(&key("/limits/burst"), "lots", &stack("a")).expect("put");
        let graph = consumer(DeferredReference {
            key: key("/limits/burst"),
            expected_type: ValueType::Integer,
        });
        match store.resolve_all(&graph).unwrap_err() {
            StackwireError::TypeMismatch {
                expected, value, ..
            } => {
                assert_eq!(expected, ValueType::Integer);
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn typed_values_parse() {
        assert_eq!(
            typed_value(ValueType::Integer, " 42 "),
            Some(PropertyValue::Integer(42))
        );
        assert_eq!(
            typed_value(ValueType::Boolean, "false"),
            Some(PropertyValue::Boolean(false))
        );
        assert_eq!(typed_value(ValueType::Boolean, "yes"), None);
        assert_eq!(
            typed_value(ValueType::StringList, "a, b,,c"),
            Some(PropertyValue::list(["a", "b", "c"]))
        );
    }
}
