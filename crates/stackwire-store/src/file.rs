//! Durable parameter storage in a single JSON document.
//!
//! Every write rewrites the whole document to a fresh temporary file in the
//! store's directory and renames it over the original, so readers see either
//! the old or the new document, never a partial one. Writers hold an
//! exclusive lock on a sibling `.lock` file for the whole read-modify-write,
//! which serializes them across handles and processes.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stackwire_common::error::{Result, StackwireError};
use stackwire_common::types::ParameterKey;
use tempfile::NamedTempFile;

use crate::backend::{ParameterBackend, PublishedParameter};

const DOCUMENT_VERSION: u32 = 1;

/// On-disk layout of the store file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    version: u32,
    parameters: Vec<PublishedParameter>,
}

/// JSON-file backend.
///
/// The file is read on every call, so values written by other handles or
/// processes are observed.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileBackend {
    /// Opens the store at `path`, creating parent directories as needed.
    /// The file itself is created on the first write.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| unavailable(parent, &e))?;
        }
        let mut lock_name = OsString::from(path.as_os_str());
        lock_name.push(".lock");
        tracing::info!(path = %path.display(), "opening parameter store");
        Ok(Self {
            path,
            lock_path: PathBuf::from(lock_name),
        })
    }

    /// Returns the store file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the lock file guarding writes.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Runs `change` on the current entries under the writer lock and saves
    /// the result.
    fn modify<T>(
        &self,
        change: impl FnOnce(&mut BTreeMap<ParameterKey, PublishedParameter>) -> T,
    ) -> Result<T> {
        let _lock = self.lock_exclusive()?;
        let mut entries = self.load()?;
        let result = change(&mut entries);
        self.save(entries)?;
        Ok(result)
    }

    /// The lock is released when the returned file is closed.
    fn lock_exclusive(&self) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| unavailable(&self.lock_path, &e))?;
        file.lock().map_err(|e| unavailable(&self.lock_path, &e))?;
        Ok(file)
    }

    fn load(&self) -> Result<BTreeMap<ParameterKey, PublishedParameter>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(unavailable(&self.path, &e)),
        };
        let document: Document =
            serde_json::from_str(&text).map_err(|e| StackwireError::StoreUnavailable {
                message: format!("corrupt store file {}: {e}", self.path.display()),
            })?;
        if document.version != DOCUMENT_VERSION {
            return Err(StackwireError::StoreUnavailable {
                message: format!(
                    "store file {} has unsupported version {}",
                    self.path.display(),
                    document.version
                ),
            });
        }
        Ok(document
            .parameters
            .into_iter()
            .map(|p| (p.key.clone(), p))
            .collect())
    }

    fn save(&self, entries: BTreeMap<ParameterKey, PublishedParameter>) -> Result<()> {
        let document = Document {
            version: DOCUMENT_VERSION,
            parameters: entries.into_values().collect(),
        };
        let text = serde_json::to_string_pretty(&document)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| unavailable(dir, &e))?;
        tmp.write_all(text.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| unavailable(tmp.path(), &e))?;
        let _ = tmp
            .persist(&self.path)
            .map_err(|e| unavailable(&self.path, &e.error))?;
        tracing::debug!(path = %self.path.display(), "store file written");
        Ok(())
    }
}

fn unavailable(path: &Path, err: &std::io::Error) -> StackwireError {
    StackwireError::StoreUnavailable {
        message: format!("{}: {err}", path.display()),
    }
}

impl ParameterBackend for FileBackend {
    fn put(&self, record: PublishedParameter) -> Result<Option<PublishedParameter>> {
        self.modify(|entries| entries.insert(record.key.clone(), record))
    }

    fn get(&self, key: &ParameterKey) -> Result<Option<PublishedParameter>> {
        Ok(self.load()?.remove(key))
    }

    fn remove(&self, key: &ParameterKey) -> Result<Option<PublishedParameter>> {
        self.modify(|entries| entries.remove(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<PublishedParameter>> {
        Ok(self
            .load()?
            .into_values()
            .filter(|p| p.key.starts_with(prefix))
            .collect())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
