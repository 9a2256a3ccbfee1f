//! Items as delivered by the protocol feed.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::ItemId;

/// Placement kind of an item, as encoded by the protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// Floor furniture (`"S"`).
    #[serde(rename = "S")]
    Floor,
    /// Wall item (`"I"`); its sub-type lives in `Item::props`.
    #[serde(rename = "I")]
    Wall,
}

impl ItemKind {
    pub fn code(&self) -> &'static str {
        match self {
            ItemKind::Floor => "S",
            ItemKind::Wall => "I",
        }
    }
}

impl FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "S" | "s" => Ok(ItemKind::Floor),
            "I" | "i" => Ok(ItemKind::Wall),
            other => Err(DomainError::validation(format!("unknown item kind code: {other:?}"))),
        }
    }
}

/// A single inventory item. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Class/type code (e.g. `"chair_norja"`).
    pub class: String,
    pub kind: ItemKind,
    /// Optional sub-type properties (poster number, wallpaper pattern, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<String>,
}

impl Item {
    pub fn new(id: ItemId, class: impl Into<String>, kind: ItemKind, props: Option<String>) -> Self {
        Self {
            id,
            class: class.into(),
            kind,
            props: props.filter(|p| !p.trim().is_empty()),
        }
    }

    /// Floor item without sub-type properties.
    pub fn floor(id: i64, class: impl Into<String>) -> Self {
        Self::new(ItemId::new(id), class, ItemKind::Floor, None)
    }

    /// Wall item with its sub-type properties.
    pub fn wall(id: i64, class: impl Into<String>, props: impl Into<String>) -> Self {
        Self::new(ItemId::new(id), class, ItemKind::Wall, Some(props.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_protocol_codes() {
        assert_eq!("S".parse::<ItemKind>().unwrap(), ItemKind::Floor);
        assert_eq!("I".parse::<ItemKind>().unwrap(), ItemKind::Wall);
        assert!(matches!(
            "X".parse::<ItemKind>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn item_serializes_kind_as_code() {
        let item = Item::wall(7, "poster", "15");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "I");
        assert_eq!(json["props"], "15");

        let back: Item = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn blank_props_are_dropped() {
        let item = Item::new(ItemId::new(1), "chair", ItemKind::Floor, Some("  ".into()));
        assert_eq!(item.props, None);
    }
}
