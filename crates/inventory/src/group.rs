use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stackview_core::{Item, ItemId, ItemKind, Value};

/// Key deciding which items stack together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Class-derived key. Wall items with sub-type properties stack per
    /// variant (`"poster:15"`), everything else per class.
    pub fn for_item(item: &Item) -> Self {
        match (item.kind, item.props.as_deref()) {
            (ItemKind::Wall, Some(props)) => Self(format!("{}:{}", item.class, props.trim())),
            _ => Self(item.class.clone()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only grouped view, ordered by key.
pub type GroupedView = BTreeMap<GroupKey, GroupRecord>;

/// One stack of same-kind items.
///
/// A record always has at least one member; the store deletes it when the
/// last member leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRecord {
    members: Vec<Item>,
    quantity: u64,
    display_name: String,
    unit_value: Value,
    reserved: bool,
}

impl GroupRecord {
    pub(crate) fn new(first: Item, display_name: String, unit_value: Value) -> Self {
        Self {
            members: vec![first],
            quantity: 1,
            display_name,
            unit_value,
            reserved: false,
        }
    }

    pub(crate) fn push(&mut self, item: Item) {
        self.members.push(item);
        self.quantity += 1;
    }

    pub(crate) fn take(&mut self, index: usize) -> Item {
        self.quantity -= 1;
        self.members.remove(index)
    }

    pub(crate) fn set_reserved(&mut self, reserved: bool) -> bool {
        core::mem::replace(&mut self.reserved, reserved)
    }

    /// Members in arrival order.
    pub fn members(&self) -> &[Item] {
        &self.members
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn unit_value(&self) -> Value {
        self.unit_value
    }

    pub fn total_value(&self) -> Value {
        self.unit_value * self.quantity
    }

    /// Whether a member is currently placed in an outgoing trade offer.
    pub fn is_reserved(&self) -> bool {
        self.reserved
    }

    pub fn position_of(&self, item_id: ItemId) -> Option<usize> {
        self.members.iter().position(|m| m.id == item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_items_key_on_variant() {
        assert_eq!(GroupKey::for_item(&Item::wall(1, "poster", "15")).as_str(), "poster:15");
        assert_eq!(GroupKey::for_item(&Item::floor(2, "chair")).as_str(), "chair");
    }

    #[test]
    fn record_tracks_quantity() {
        let mut g = GroupRecord::new(Item::floor(1, "chair"), "Chair".into(), Value::from_units(10.0));
        g.push(Item::floor(2, "chair"));
        assert_eq!(g.quantity(), 2);
        assert_eq!(g.total_value(), Value::from_units(20.0));

        let idx = g.position_of(ItemId::new(1)).unwrap();
        assert_eq!(g.take(idx).id.get(), 1);
        assert_eq!(g.quantity(), 1);
        assert_eq!(g.members()[0].id.get(), 2);
    }
}
