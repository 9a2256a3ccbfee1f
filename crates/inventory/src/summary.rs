use std::collections::BTreeMap;

use serde::Serialize;
use stackview_core::Value;

/// Per-display-name aggregate.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct NameTotals {
    pub quantity: u64,
    pub total_value: Value,
}

/// Summary statistics, fully derived from the group records.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    pub total_unique_groups: u64,
    pub total_items: u64,
    pub total_value: Value,
    pub by_name: BTreeMap<String, NameTotals>,
}

impl InventorySummary {
    pub fn is_empty(&self) -> bool {
        self.total_items == 0
    }

    pub(crate) fn record_added(&mut self, name: &str, unit_value: Value) {
        self.total_items += 1;
        self.total_value = self.total_value + unit_value;

        let totals = self.by_name.entry(name.to_string()).or_default();
        totals.quantity += 1;
        totals.total_value = totals.total_value + unit_value;
    }

    pub(crate) fn record_removed(&mut self, name: &str, unit_value: Value) {
        self.total_items = self.total_items.saturating_sub(1);
        self.total_value = self.total_value.saturating_sub(unit_value);

        if let Some(totals) = self.by_name.get_mut(name) {
            totals.quantity = totals.quantity.saturating_sub(1);
            totals.total_value = totals.total_value.saturating_sub(unit_value);
            if totals.quantity == 0 {
                self.by_name.remove(name);
            }
        }
    }
}
