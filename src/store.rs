//! Persisted converters and the stores they are loaded from.
//!
//! A persisted converter is a single-byte code page saved as JSON under
//! `CharToByte<canonical>.json`:
//!
//! ```json
//! { "encoding": "Cp1252", "replacement": "?", "table": ["\u0000", "\u0001", null, ...] }
//! ```
//!
//! `table` holds 256 entries, `table[byte]` being the character that byte
//! represents or `null` when the byte is unassigned.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::codecs::{CharToByte, DEFAULT_REPLACEMENT, TableEncoder};
use crate::converter::Converter;
use crate::{Error, Result};

/// Read-only source of persisted converter resources.
pub trait ResourceStore: Send + Sync {
    /// Bytes of the resource at `path`, or `None` if there is none.
    fn open(&self, path: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Conventional resource path for the converter of `canonical`.
pub fn resource_path(canonical: &str) -> String {
    format!("CharToByte{canonical}.json")
}

/// A store with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyStore;

impl ResourceStore for EmptyStore {
    fn open(&self, _path: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Resources as files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Serve files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory resources are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceStore for DirectoryStore {
    fn open(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.root.join(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Resources held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes under `path`.
    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(path.into(), bytes.into());
    }

    /// Store `converter` under its conventional path.
    pub fn insert_converter(&mut self, converter: &PersistedConverter) -> Result<()> {
        let bytes = serde_json::to_vec(converter)
            .map_err(|e| Error::InvalidInput(format!("cannot serialize converter: {e}")))?;
        self.insert(resource_path(&converter.encoding), bytes);
        Ok(())
    }
}

impl ResourceStore for MemoryStore {
    fn open(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries.get(path).cloned())
    }
}

/// Stored form of a single-byte converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedConverter {
    /// Canonical name of the encoding.
    pub encoding: String,
    /// Substitute for unmappable characters; `None` reports them.
    #[serde(default = "default_replacement")]
    pub replacement: Option<char>,
    /// `table[byte]` is the character `byte` stands for.
    pub table: Vec<Option<char>>,
}

fn default_replacement() -> Option<char> {
    Some(DEFAULT_REPLACEMENT)
}

impl PersistedConverter {
    /// Describe a code page from its byte-to-character table.
    pub fn new(encoding: impl Into<String>, table: Vec<Option<char>>) -> Self {
        Self {
            encoding: encoding.into(),
            replacement: default_replacement(),
            table,
        }
    }

    /// Parse a stored converter.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidResource {
            path: String::new(),
            reason: e.to_string(),
        })
    }

    /// Build the live converter.
    pub fn instantiate(&self) -> Result<Box<dyn Converter>> {
        let encoder = TableEncoder::from_table(&self.table)?;
        Ok(Box::new(
            CharToByte::new(self.encoding.clone(), encoder).with_replacement(self.replacement),
        ))
    }
}

/// Load the persisted converter for `canonical` from `store`.
///
/// `Ok(None)` when the store has no such resource. A resource that cannot be
/// read or does not describe a converter for `canonical` is an error.
pub fn load(store: &dyn ResourceStore, canonical: &str) -> Result<Option<Box<dyn Converter>>> {
    let path = resource_path(canonical);
    let Some(bytes) = store.open(&path)? else {
        return Ok(None);
    };

    let invalid = |reason: String| Error::InvalidResource {
        path: path.clone(),
        reason,
    };
    let persisted: PersistedConverter =
        serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
    if persisted.encoding != canonical {
        return Err(invalid(format!(
            "describes {}, not {}",
            persisted.encoding, canonical
        )));
    }

    let converter = persisted
        .instantiate()
        .map_err(|e| invalid(e.to_string()))?;
    debug!("loaded persisted converter {}", path);
    Ok(Some(converter))
}
