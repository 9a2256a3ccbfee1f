//! Grouped inventory aggregation.
//!
//! This crate holds the canonical in-memory view of an inventory: items
//! stacked into groups by an enrichment-derived key, plus running summary
//! statistics kept exactly consistent with the groups. No IO beyond loading
//! an optional catalog file.

pub mod catalog;
pub mod enrichment;
pub mod group;
pub mod store;
pub mod summary;

pub use catalog::{Catalog, CatalogEntry, CatalogError, CatalogVariant};
pub use enrichment::{DefaultEnricher, Enricher, Enrichment};
pub use group::{GroupKey, GroupRecord, GroupedView};
pub use store::{AddOutcome, AggregationStore, InventorySnapshot};
pub use summary::{InventorySummary, NameTotals};
