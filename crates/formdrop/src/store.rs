//! JSON-backed store for collected records.
//!
//! The store is a single JSON object on disk mapping a local-time timestamp
//! string to a [`Record`]. Every update reads the whole file, inserts one
//! entry and rewrites the whole file. A missing or corrupt file reads as an
//! empty mapping; entries of an unexpected shape are kept on rewrite.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::record::Record;

/// Format of generated entry keys, e.g. `2024-01-15 10:30:45.123456`.
const KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Stored entries, keyed by timestamp string.
pub type Entries = BTreeMap<String, Record>;

/// Raw top-level object of the store file.
type Document = Map<String, Value>;

/// Single-writer store over one JSON file.
///
/// `merge_and_save` is the only mutation entry point for collected data and
/// holds an internal lock across its read-merge-write cycle.
#[derive(Debug)]
pub struct Store {
    /// Path to the JSON file.
    path: PathBuf,
    /// Serializes read-merge-write cycles.
    writer: Mutex<()>,
}

/// Summary of the store's current contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of stored entries.
    pub entries: usize,
    /// Size of the backing file in bytes.
    pub file_size: u64,
}

impl Store {
    /// Open the store at `path`, creating parent directories and an empty
    /// `{}` file if it doesn't exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or the initial file cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let store = Self::at(path);

        if !store.path.exists() {
            store.write(&Entries::new())?;
            info!("Created empty store at {}", store.path.display());
        } else {
            debug!("Using existing store at {}", store.path.display());
        }

        Ok(store)
    }

    /// Refer to the store at `path` without touching the file system.
    ///
    /// For read-only inspection; a missing file simply loads as empty.
    #[must_use]
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(()),
        }
    }

    /// Get the path to the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries from disk.
    ///
    /// A missing, unreadable or unparseable file reads as an empty mapping.
    /// Entries whose value is not a flat string object are left out of the
    /// result but stay in the file.
    #[must_use]
    pub fn load(&self) -> Entries {
        self.load_document()
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value(value) {
                Ok(record) => Some((key, record)),
                Err(e) => {
                    debug!("Skipping entry {key}, not a flat record: {e}");
                    None
                }
            })
            .collect()
    }

    /// Replace the file contents with `entries`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageIo`] if the file cannot be opened for writing
    /// or the write is rejected.
    pub fn write(&self, entries: &Entries) -> Result<()> {
        self.write_json(entries, entries.len())
    }

    /// Insert `record` under a freshly generated timestamp key and persist.
    ///
    /// Returns the key used. A key equal to an existing one overwrites that
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageIo`] if the file cannot be written; the update
    /// is lost.
    pub fn merge_and_save(&self, record: Record) -> Result<String> {
        let _guard = self.lock();
        let key = timestamp_key(Local::now());
        self.merge_locked(key.clone(), record)?;
        Ok(key)
    }

    /// Insert `record` under a caller-chosen key and persist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageIo`] if the file cannot be written.
    pub fn insert_at(&self, key: impl Into<String>, record: Record) -> Result<()> {
        let _guard = self.lock();
        self.merge_locked(key.into(), record)
    }

    /// Number of entries currently on disk.
    #[must_use]
    pub fn len(&self) -> usize {
        self.load().len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get store statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.len(),
            file_size: fs::metadata(&self.path).map_or(0, |m| m.len()),
        }
    }

    fn merge_locked(&self, key: String, record: Record) -> Result<()> {
        let mut document = self.load_document();
        if document
            .insert(key.clone(), serde_json::to_value(record)?)
            .is_some()
        {
            warn!("Entry key {key} already existed and was overwritten");
        }
        self.write_json(&document, document.len())
    }

    /// The whole top-level JSON object, including entries of any shape.
    fn load_document(&self) -> Document {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No store file at {}", self.path.display());
                return Document::new();
            }
            Err(e) => {
                warn!("Failed to read store {}: {e}", self.path.display());
                return Document::new();
            }
        };

        match serde_json::from_str(&data) {
            Ok(Value::Object(document)) => document,
            Ok(_) => {
                warn!(
                    "Store {} is not a JSON object, starting empty",
                    self.path.display()
                );
                Document::new()
            }
            Err(e) => {
                warn!(
                    "Store {} is not valid JSON, starting empty: {e}",
                    self.path.display()
                );
                Document::new()
            }
        }
    }

    fn write_json<T: Serialize>(&self, value: &T, count: usize) -> Result<()> {
        let json = serde_json::to_vec(value)?;

        let mut file = fs::File::create(&self.path).map_err(|source| self.io_error(source))?;
        file.write_all(&json)
            .and_then(|()| file.flush())
            .map_err(|source| self.io_error(source))?;

        debug!(
            "Wrote {count} entries ({} bytes) to {}",
            json.len(),
            self.path.display()
        );
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no broken state.
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn io_error(&self, source: std::io::Error) -> Error {
        Error::StorageIo {
            path: self.path.clone(),
            source,
        }
    }
}

/// Format an entry key for the given instant.
#[must_use]
pub fn timestamp_key(now: DateTime<Local>) -> String {
    now.format(KEY_FORMAT).to_string()
}
