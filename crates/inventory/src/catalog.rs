//! Class catalog loaded from JSON.
//!
//! File layout (keys are class codes):
//!
//! ```json
//! {
//!   "chair_norja": { "name": "Norja Chair", "value": 10.0 },
//!   "poster": {
//!     "name": "Poster",
//!     "variants": { "15": { "name": "Rose Poster", "value": 2.5 } }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use stackview_core::{Item, Value};
use thiserror::Error;

use crate::enrichment::{DefaultEnricher, Enricher, Enrichment};
use crate::group::GroupKey;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Catalog data for one class.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub value: f64,
    /// Per-props overrides (wall item variants).
    #[serde(default)]
    pub variants: BTreeMap<String, CatalogVariant>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            variants: BTreeMap::new(),
        }
    }

    pub fn with_variant(mut self, props: impl Into<String>, variant: CatalogVariant) -> Self {
        self.variants.insert(props.into(), variant);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogVariant {
    pub name: String,
    /// Falls back to the class value when absent.
    #[serde(default)]
    pub value: Option<f64>,
}

/// Class-keyed enrichment table. Unknown classes enrich like [`DefaultEnricher`].
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let entries: HashMap<String, CatalogEntry> = serde_json::from_str(json)?;
        Ok(Self { entries })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json_str(&raw)?;
        tracing::info!(path = %path.display(), classes = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    pub fn insert(&mut self, class: impl Into<String>, entry: CatalogEntry) {
        self.entries.insert(class.into(), entry);
    }

    pub fn with_entry(mut self, class: impl Into<String>, entry: CatalogEntry) -> Self {
        self.insert(class, entry);
        self
    }

    pub fn get(&self, class: &str) -> Option<&CatalogEntry> {
        self.entries.get(class)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Enricher for Catalog {
    fn enrich(&self, item: &Item) -> Enrichment {
        let Some(entry) = self.entries.get(&item.class) else {
            return DefaultEnricher.enrich(item);
        };

        let variant = item
            .props
            .as_deref()
            .and_then(|props| entry.variants.get(props.trim()));

        let (display_name, value) = match variant {
            Some(v) => (v.name.clone(), v.value.unwrap_or(entry.value)),
            None => (entry.name.clone(), entry.value),
        };

        Enrichment {
            display_name,
            group_key: GroupKey::for_item(item),
            unit_value: Value::from_units(value),
        }
    }
}
