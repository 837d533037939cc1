//! # Verse Table Loading and Resolution
//!
//! The verse table is a JSON object keyed by `"HH:MM"`:
//!
//! ```json
//! {
//!   "09:05": "John 3:16 – For God so loved the world...",
//!   "09:06": "Psalm 46:10 – Be still, and know that I am God"
//! }
//! ```
//!
//! It is re-read on every render cycle so edits on the device show up on the next
//! tick. Loading failures are never fatal: the cycle falls back to an empty table
//! and the lookup resolves to the "no verse" sentinel.

use crate::config::ContentConfig;
use crate::{ContentEntry, TimeKey};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

/// Raw verse table: `"HH:MM"` → `"<reference><delimiter><body>"`
pub type VerseTable = HashMap<String, String>;

/// Errors that can occur while loading the verse table.
///
/// Always recovered locally by [`resolve`]; they only reach the log.
#[derive(Error, Debug)]
pub enum ContentLoadError {
    /// The table file is missing or unreadable
    #[error("verse table IO: {0}")]
    Io(#[from] io::Error),

    /// The table file is not a JSON object of strings
    #[error("verse table parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of the verse table, consulted once per render cycle.
pub trait ContentStore {
    fn load(&self) -> Result<VerseTable, ContentLoadError>;
}

/// Verse table stored as a JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentStore for JsonFileStore {
    fn load(&self) -> Result<VerseTable, ContentLoadError> {
        let data = fs::read(&self.path)?;
        let table: VerseTable = serde_json::from_slice(&data)?;

        for key in table.keys().filter(|k| TimeKey::parse(k).is_none()) {
            debug!("Ignoring malformed verse key {:?} in {}", key, self.path.display());
        }

        Ok(table)
    }
}

/// In-memory verse table, mostly useful for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    table: VerseTable,
}

impl MemoryStore {
    pub fn new<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            table: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ContentStore for MemoryStore {
    fn load(&self) -> Result<VerseTable, ContentLoadError> {
        Ok(self.table.clone())
    }
}

impl<S: ContentStore + ?Sized> ContentStore for Box<S> {
    fn load(&self) -> Result<VerseTable, ContentLoadError> {
        (**self).load()
    }
}

/// How raw table values are turned into entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRules {
    /// Separator between reference and body
    pub delimiter: String,
    /// Raw value used when the key is absent
    pub missing_text: String,
}

impl Default for ResolveRules {
    fn default() -> Self {
        Self::from(&ContentConfig::default())
    }
}

impl From<&ContentConfig> for ResolveRules {
    fn from(config: &ContentConfig) -> Self {
        Self {
            delimiter: config.delimiter.clone(),
            missing_text: config.missing_text.clone(),
        }
    }
}

/// Look up the entry for `key`, reloading the table from `store`.
///
/// A table that cannot be loaded is treated as empty for this cycle, so the
/// result is always an entry: either the stored verse or the sentinel built from
/// `rules.missing_text`.
pub fn resolve<S: ContentStore + ?Sized>(
    store: &S,
    key: &TimeKey,
    rules: &ResolveRules,
) -> ContentEntry {
    let table = store.load().unwrap_or_else(|error| {
        warn!("Verse table unavailable, showing placeholder: {}", error);
        VerseTable::new()
    });

    let raw = table
        .get(&key.to_string())
        .map(String::as_str)
        .unwrap_or(&rules.missing_text);

    ContentEntry::parse(raw, &rules.delimiter)
}
