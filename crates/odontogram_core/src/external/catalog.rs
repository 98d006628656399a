//! Diagnosis catalog reference store.
//!
//! The catalog maps a diagnosis key (e.g. `caries_icdas_3`) to display
//! metadata. Inactive entries behave as unknown keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Catalog lookup and registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    UnknownKey(String),
    InvalidEntry(String),
    DuplicateKey(String),
    Parse(String),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKey(key) => write!(f, "unknown catalog key `{key}`"),
            Self::InvalidEntry(message) => write!(f, "invalid catalog entry: {message}"),
            Self::DuplicateKey(key) => write!(f, "catalog key already registered: {key}"),
            Self::Parse(message) => write!(f, "failed to parse catalog: {message}"),
        }
    }
}

impl Error for CatalogError {}

/// Display metadata for one diagnosis type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub siglas: String,
    #[serde(default)]
    pub color: String,
    /// Clinical priority, 1 (lowest) to 5 (highest).
    pub priority: u8,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub applicable_areas: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl CatalogEntry {
    pub fn new(key: impl Into<String>, name: impl Into<String>, priority: u8) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            siglas: String::new(),
            color: String::new(),
            priority,
            category: String::new(),
            applicable_areas: Vec::new(),
            is_active: true,
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.key.trim().is_empty() {
            return Err(CatalogError::InvalidEntry("key must not be blank".to_string()));
        }
        if !(1..=5).contains(&self.priority) {
            return Err(CatalogError::InvalidEntry(format!(
                "priority {} of `{}` is outside 1..=5",
                self.priority, self.key
            )));
        }
        Ok(())
    }
}

/// Read-only catalog lookups.
pub trait CatalogStore: Send + Sync {
    /// Returns the active entry for `key`, or `None` when the key is unknown
    /// or retired.
    fn resolve(&self, key: &str) -> Option<CatalogEntry>;

    /// Like `resolve`, but reports a missing key as an error.
    fn require(&self, key: &str) -> Result<CatalogEntry, CatalogError> {
        self.resolve(key)
            .ok_or_else(|| CatalogError::UnknownKey(key.to_string()))
    }
}

/// Catalog held entirely in memory, keyed by trimmed catalog key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: CatalogEntry) -> Result<(), CatalogError> {
        entry.validate()?;
        let key = entry.key.trim().to_string();
        if self.entries.contains_key(&key) {
            return Err(CatalogError::DuplicateKey(key));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn with_entry(mut self, entry: CatalogEntry) -> Result<Self, CatalogError> {
        self.insert(entry)?;
        Ok(self)
    }

    /// Builds a catalog from a JSON array of entries.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(raw).map_err(|err| CatalogError::Parse(err.to_string()))?;
        let mut catalog = Self::new();
        for entry in entries {
            catalog.insert(entry)?;
        }
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CatalogStore for InMemoryCatalog {
    fn resolve(&self, key: &str) -> Option<CatalogEntry> {
        self.entries
            .get(key.trim())
            .filter(|entry| entry.is_active)
            .cloned()
    }
}
