//! Presentation events and their publisher.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use stackview_core::{ItemId, ScanGeneration};
use stackview_events::{Event, EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use stackview_inventory::{AggregationStore, GroupedView, InventorySummary};

use crate::protocol::{OfferPair, TradeSide};

/// The fixed set of notifications a presentation sink can receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PresentationEvent {
    SummaryUpdated(InventorySummary),
    GroupedViewUpdated(GroupedView),
    /// A single item entered (`is_addition`) or left the inventory.
    ItemDelta { item_id: ItemId, is_addition: bool },
    ScanProgress {
        generation: ScanGeneration,
        batch: u64,
        new_items: usize,
        total_items: usize,
    },
    ScanComplete {
        generation: ScanGeneration,
        batches: u64,
        total_items: usize,
    },
    /// The scan ended without reaching its fixpoint.
    ScanStalled { generation: ScanGeneration, reason: String },
    /// `start_scan` was refused because `generation` is still running.
    ScanRejected { generation: ScanGeneration },
    TradeOffersChanged(OfferPair),
    TradeAccepted { side: TradeSide, accepted: bool },
    /// The trade window closed; `released` groups lost their reservation.
    TradeClosed { released: usize },
}

impl Event for PresentationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PresentationEvent::SummaryUpdated(_) => "inventory.summary_updated",
            PresentationEvent::GroupedViewUpdated(_) => "inventory.grouped_view_updated",
            PresentationEvent::ItemDelta { .. } => "inventory.item_delta",
            PresentationEvent::ScanProgress { .. } => "scan.progress",
            PresentationEvent::ScanComplete { .. } => "scan.complete",
            PresentationEvent::ScanStalled { .. } => "scan.stalled",
            PresentationEvent::ScanRejected { .. } => "scan.rejected",
            PresentationEvent::TradeOffersChanged(_) => "trade.offers_changed",
            PresentationEvent::TradeAccepted { .. } => "trade.accepted",
            PresentationEvent::TradeClosed { .. } => "trade.closed",
        }
    }
}

pub type PresentationEnvelope = EventEnvelope<PresentationEvent>;

/// Stamps presentation events and hands them to the bus.
///
/// Sequence allocation and delivery happen under one lock, so every sink
/// sees events in publish order. Publishing is fire-and-forget.
#[derive(Debug, Default)]
pub struct EventPublisher {
    bus: InMemoryEventBus<PresentationEnvelope>,
    sequence: Mutex<u64>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a presentation sink.
    pub fn subscribe(&self) -> Subscription<PresentationEnvelope> {
        self.bus.subscribe()
    }

    /// Sequence number of the most recently published event (0 if none).
    pub fn last_sequence(&self) -> u64 {
        *self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, event: PresentationEvent) {
        self.publish_all([event]);
    }

    /// Publish several events with consecutive sequence numbers.
    pub fn publish_all(&self, events: impl IntoIterator<Item = PresentationEvent>) {
        let mut sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        for event in events {
            *sequence += 1;
            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                event.event_type(),
                *sequence,
                Utc::now(),
                event,
            );
            if let Err(e) = self.bus.publish(envelope) {
                tracing::debug!(?e, sequence = *sequence, "presentation event dropped");
            }
        }
    }

    /// Publish a consistent `{summary, grouped view}` pair.
    pub fn publish_snapshot(&self, store: &AggregationStore) {
        let snapshot = store.snapshot();
        tracing::debug!(
            groups = snapshot.summary.total_unique_groups,
            items = snapshot.summary.total_items,
            value = %snapshot.summary.total_value,
            "publishing inventory snapshot"
        );
        self.publish_all([
            PresentationEvent::SummaryUpdated(snapshot.summary),
            PresentationEvent::GroupedViewUpdated(snapshot.groups),
        ]);
    }

    pub fn item_delta(&self, item_id: ItemId, is_addition: bool) {
        self.publish(PresentationEvent::ItemDelta {
            item_id,
            is_addition,
        });
    }
}
