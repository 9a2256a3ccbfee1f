//! The aggregation store: single source of truth for the inventory view.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use stackview_core::{DomainError, DomainResult, Item, ItemId, Value};

use crate::enrichment::{Enricher, Enrichment};
use crate::group::{GroupKey, GroupRecord, GroupedView};
use crate::summary::{InventorySummary, NameTotals};

/// What `add_item` did with an item.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// First item of its key; a new group was created.
    NewGroup,
    /// Appended to an existing group.
    Stacked,
    /// The identifier is already present; nothing changed.
    Duplicate,
}

impl AddOutcome {
    pub fn is_added(&self) -> bool {
        !matches!(self, AddOutcome::Duplicate)
    }
}

/// Summary and grouped view taken under one read lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventorySnapshot {
    pub summary: InventorySummary,
    pub groups: GroupedView,
}

#[derive(Debug, Default)]
struct StoreState {
    groups: BTreeMap<GroupKey, GroupRecord>,
    /// Secondary index: member id → owning group.
    index: HashMap<ItemId, GroupKey>,
    summary: InventorySummary,
}

impl StoreState {
    fn insert(&mut self, item: Item, enrichment: Enrichment) -> AddOutcome {
        if self.index.contains_key(&item.id) {
            return AddOutcome::Duplicate;
        }

        let Enrichment {
            display_name,
            group_key,
            unit_value,
        } = enrichment;
        let id = item.id;

        // An existing group keeps the name and value of its first member so
        // that total_value stays Σ quantity × unit_value per group.
        let (outcome, name, unit) = match self.groups.get_mut(&group_key) {
            Some(group) => {
                group.push(item);
                (AddOutcome::Stacked, group.display_name().to_string(), group.unit_value())
            }
            None => {
                let group = GroupRecord::new(item, display_name.clone(), unit_value);
                self.groups.insert(group_key.clone(), group);
                self.summary.total_unique_groups += 1;
                (AddOutcome::NewGroup, display_name, unit_value)
            }
        };

        self.index.insert(id, group_key);
        self.summary.record_added(&name, unit);
        outcome
    }

    fn remove(&mut self, item_id: ItemId) -> Option<Item> {
        let key = self.index.get(&item_id)?.clone();
        let group = self.groups.get_mut(&key)?;
        let position = group.position_of(item_id)?;

        let item = group.take(position);
        let name = group.display_name().to_string();
        let unit = group.unit_value();
        let emptied = group.quantity() == 0;

        self.index.remove(&item_id);
        self.summary.record_removed(&name, unit);
        if emptied {
            self.groups.remove(&key);
            self.summary.total_unique_groups = self.summary.total_unique_groups.saturating_sub(1);
        }

        Some(item)
    }

    fn group_mut(&mut self, item_id: ItemId) -> Option<&mut GroupRecord> {
        let key = self.index.get(&item_id)?;
        self.groups.get_mut(key)
    }

    fn verify(&self) -> DomainResult<()> {
        let mut total_items = 0u64;
        let mut total_value = Value::ZERO;
        let mut by_name: BTreeMap<&str, (u64, Value)> = BTreeMap::new();
        let mut seen = 0usize;

        for (key, group) in &self.groups {
            let members = group.members().len() as u64;
            if group.quantity() != members {
                return Err(DomainError::invariant(format!(
                    "group {key}: quantity {} != members {members}",
                    group.quantity()
                )));
            }
            if members == 0 {
                return Err(DomainError::invariant(format!("group {key} is empty")));
            }
            for member in group.members() {
                seen += 1;
                if self.index.get(&member.id) != Some(key) {
                    return Err(DomainError::invariant(format!(
                        "item {} is not indexed under group {key}",
                        member.id
                    )));
                }
            }

            total_items += members;
            total_value = total_value + group.total_value();
            let entry = by_name.entry(group.display_name()).or_insert((0, Value::ZERO));
            entry.0 += members;
            entry.1 = entry.1 + group.total_value();
        }

        if seen != self.index.len() {
            return Err(DomainError::invariant(format!(
                "index holds {} ids but groups hold {seen}",
                self.index.len()
            )));
        }

        let s = &self.summary;
        if s.total_unique_groups != self.groups.len() as u64 {
            return Err(DomainError::invariant(format!(
                "total_unique_groups {} != {}",
                s.total_unique_groups,
                self.groups.len()
            )));
        }
        if s.total_items != total_items {
            return Err(DomainError::invariant(format!(
                "total_items {} != {total_items}",
                s.total_items
            )));
        }
        if s.total_value != total_value {
            return Err(DomainError::invariant(format!(
                "total_value {} != {total_value}",
                s.total_value
            )));
        }
        if s.by_name.len() != by_name.len() {
            return Err(DomainError::invariant("per-name table has stale entries"));
        }
        for (name, (quantity, value)) in by_name {
            match s.by_name.get(name) {
                Some(NameTotals {
                    quantity: q,
                    total_value: v,
                }) if *q == quantity && *v == value => {}
                other => {
                    return Err(DomainError::invariant(format!(
                        "per-name totals for {name:?} are {other:?}, expected {quantity} / {value}"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Thread-safe grouped inventory with running summary statistics.
///
/// Every operation runs under a single `RwLock`: mutations are atomic with
/// respect to each other and to readers, and reads return owned copies.
/// Operations on unknown identifiers are no-ops, since duplicate and late
/// protocol events are expected.
pub struct AggregationStore {
    enricher: Arc<dyn Enricher>,
    state: RwLock<StoreState>,
}

impl core::fmt::Debug for AggregationStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.read();
        f.debug_struct("AggregationStore")
            .field("groups", &state.groups.len())
            .field("items", &state.index.len())
            .finish()
    }
}

impl AggregationStore {
    pub fn new(enricher: Arc<dyn Enricher>) -> Self {
        Self {
            enricher,
            state: RwLock::new(StoreState::default()),
        }
    }

    // A panic can only happen outside the mutation helpers, so a poisoned
    // lock still guards a consistent state.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one item. Duplicated identifiers are ignored.
    pub fn add_item(&self, item: Item) -> AddOutcome {
        let enrichment = self.enricher.enrich(&item);
        self.write().insert(item, enrichment)
    }

    /// Add every item whose identifier is not yet present, atomically.
    ///
    /// Returns the identifiers that were added, in batch order.
    pub fn add_new_items(&self, items: impl IntoIterator<Item = Item>) -> Vec<ItemId> {
        let mut state = self.write();
        let mut added = Vec::new();
        for item in items {
            if state.index.contains_key(&item.id) {
                continue;
            }
            let id = item.id;
            let enrichment = self.enricher.enrich(&item);
            if state.insert(item, enrichment).is_added() {
                added.push(id);
            }
        }
        added
    }

    /// Remove one item, returning it if it was present.
    pub fn remove_item(&self, item_id: ItemId) -> Option<Item> {
        self.write().remove(item_id)
    }

    /// Set the reservation flag of the group owning `item_id`.
    ///
    /// Returns the previous flag, or `None` if the item is unknown.
    pub fn update_trade_status(&self, item_id: ItemId, reserved: bool) -> Option<bool> {
        self.write()
            .group_mut(item_id)
            .map(|group| group.set_reserved(reserved))
    }

    /// Clear every reservation flag; returns how many groups were reserved.
    pub fn clear_reservations(&self) -> usize {
        let mut state = self.write();
        state
            .groups
            .values_mut()
            .map(|group| group.set_reserved(false))
            .filter(|was| *was)
            .count()
    }

    /// Drop all groups and statistics.
    pub fn reset(&self) {
        *self.write() = StoreState::default();
    }

    pub fn exists(&self, item_id: ItemId) -> bool {
        self.read().index.contains_key(&item_id)
    }

    pub fn item(&self, item_id: ItemId) -> Option<Item> {
        let state = self.read();
        let key = state.index.get(&item_id)?;
        let group = state.groups.get(key)?;
        group.position_of(item_id).map(|i| group.members()[i].clone())
    }

    pub fn group_of(&self, item_id: ItemId) -> Option<GroupKey> {
        self.read().index.get(&item_id).cloned()
    }

    pub fn group(&self, key: &GroupKey) -> Option<GroupRecord> {
        self.read().groups.get(key).cloned()
    }

    /// Number of items held.
    pub fn len(&self) -> usize {
        self.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().index.is_empty()
    }

    pub fn summary(&self) -> InventorySummary {
        self.read().summary.clone()
    }

    pub fn grouped_view(&self) -> GroupedView {
        self.read().groups.clone()
    }

    pub fn snapshot(&self) -> InventorySnapshot {
        let state = self.read();
        InventorySnapshot {
            summary: state.summary.clone(),
            groups: state.groups.clone(),
        }
    }

    /// Recompute all derived state and compare it with the maintained one.
    pub fn verify_invariants(&self) -> DomainResult<()> {
        self.read().verify()
    }
}
