//! Item enrichment: raw protocol item → display name, grouping key, value.

use stackview_core::{Item, Value};

use crate::group::GroupKey;

/// Result of enriching one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub display_name: String,
    pub group_key: GroupKey,
    pub unit_value: Value,
}

/// Maps a raw item to its enrichment.
///
/// Implementations must be pure from the store's point of view and must not
/// fail: unknown items get [`DefaultEnricher`] values so store invariants
/// never depend on catalog coverage.
pub trait Enricher: Send + Sync {
    fn enrich(&self, item: &Item) -> Enrichment;
}

/// Fallback enrichment: class code as name, class-derived key, zero value.
#[derive(Debug, Default, Copy, Clone)]
pub struct DefaultEnricher;

impl Enricher for DefaultEnricher {
    fn enrich(&self, item: &Item) -> Enrichment {
        Enrichment {
            display_name: item.class.clone(),
            group_key: GroupKey::for_item(item),
            unit_value: Value::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enrichment_is_class_based_and_worthless() {
        let e = DefaultEnricher.enrich(&Item::floor(3, "throne"));
        assert_eq!(e.display_name, "throne");
        assert_eq!(e.group_key, GroupKey::new("throne"));
        assert!(e.unit_value.is_zero());
    }
}
