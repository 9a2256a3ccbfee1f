//! Inbound protocol events, as delivered by the transport adapter.

use serde::{Deserialize, Serialize};
use stackview_core::{Item, ItemId};

/// Which party of a trade an offer or acceptance belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    /// This client's side (items leaving the inventory).
    Local,
    /// The counterparty (items entering the inventory).
    Remote,
}

/// Both sides' offers in a trade.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferPair {
    #[serde(default)]
    pub local: Vec<Item>,
    #[serde(default)]
    pub remote: Vec<Item>,
}

impl OfferPair {
    pub fn new(local: Vec<Item>, remote: Vec<Item>) -> Self {
        Self { local, remote }
    }
}

/// Everything the protocol transport can deliver to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// One page of the inventory listing.
    InventoryBatch(Vec<Item>),
    /// The remote inventory dropped an item outside of a trade.
    ItemRemoved(ItemId),
    TradeOffersChanged(OfferPair),
    TradeAccepted { side: TradeSide, accepted: bool },
    /// Final committed offers of both sides.
    TradeCompleted(OfferPair),
    TradeClosed,
}

impl ProtocolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::InventoryBatch(_) => "inventory_batch",
            ProtocolEvent::ItemRemoved(_) => "item_removed",
            ProtocolEvent::TradeOffersChanged(_) => "trade_offers_changed",
            ProtocolEvent::TradeAccepted { .. } => "trade_accepted",
            ProtocolEvent::TradeCompleted(_) => "trade_completed",
            ProtocolEvent::TradeClosed => "trade_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_tagged_events() {
        let ev: ProtocolEvent = serde_json::from_value(json!({
            "type": "inventory_batch",
            "data": [{ "id": 1, "class": "chair", "kind": "S" }]
        }))
        .unwrap();
        assert_eq!(ev, ProtocolEvent::InventoryBatch(vec![Item::floor(1, "chair")]));

        let ev: ProtocolEvent = serde_json::from_value(json!({
            "type": "trade_accepted",
            "data": { "side": "remote", "accepted": true }
        }))
        .unwrap();
        assert_eq!(
            ev,
            ProtocolEvent::TradeAccepted {
                side: TradeSide::Remote,
                accepted: true
            }
        );

        let ev: ProtocolEvent = serde_json::from_value(json!({ "type": "trade_closed" })).unwrap();
        assert_eq!(ev.name(), "trade_closed");
    }
}
