//! Trade reconciliation: reservation flags while negotiating, inventory
//! mutation when a trade commits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stackview_core::ItemId;
use stackview_inventory::AggregationStore;
use thiserror::Error;

use crate::protocol::{OfferPair, TradeSide};
use crate::publisher::{EventPublisher, PresentationEvent};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TradeError {
    #[error("item {0} is not in the inventory")]
    UnknownItem(ItemId),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum TradePhase {
    #[default]
    Idle,
    Negotiating,
    Completed,
}

/// Inbound trade notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeEvent {
    OffersChanged(OfferPair),
    Accepted { side: TradeSide, accepted: bool },
    Completed(OfferPair),
    Closed,
}

pub struct TradeReconciler {
    store: Arc<AggregationStore>,
    transport: Arc<dyn Transport>,
    publisher: Arc<EventPublisher>,
    phase: Mutex<TradePhase>,
}

impl std::fmt::Debug for TradeReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeReconciler")
            .field("phase", &self.phase())
            .finish()
    }
}

impl TradeReconciler {
    pub fn new(
        store: Arc<AggregationStore>,
        transport: Arc<dyn Transport>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            store,
            transport,
            publisher,
            phase: Mutex::new(TradePhase::Idle),
        }
    }

    fn phase_mut(&self) -> MutexGuard<'_, TradePhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> TradePhase {
        *self.phase_mut()
    }

    fn set_phase(&self, next: TradePhase) {
        let mut phase = self.phase_mut();
        if *phase != next {
            tracing::debug!(from = ?*phase, to = ?next, "trade phase changed");
            *phase = next;
        }
    }

    /// Offer one of our items: reserve its group and tell the remote.
    ///
    /// Nothing is sent for an unknown item. If the send fails the group's
    /// previous reservation flag is restored.
    pub fn offer_item(&self, item_id: ItemId) -> Result<(), TradeError> {
        let previous = self
            .store
            .update_trade_status(item_id, true)
            .ok_or(TradeError::UnknownItem(item_id))?;

        if let Err(e) = self.transport.add_item_to_offer(item_id) {
            tracing::warn!(%item_id, error = %e, "failed to offer item");
            self.store.update_trade_status(item_id, previous);
            return Err(e.into());
        }

        tracing::info!(%item_id, "item offered");
        self.set_phase(TradePhase::Negotiating);
        self.publisher.publish_snapshot(&self.store);
        Ok(())
    }

    pub fn accept_trade(&self) -> Result<(), TradeError> {
        self.transport.accept_trade().map_err(|e| {
            tracing::warn!(error = %e, "failed to accept trade");
            TradeError::from(e)
        })
    }

    pub fn apply(&self, event: TradeEvent) {
        match event {
            TradeEvent::OffersChanged(pair) => {
                self.set_phase(TradePhase::Negotiating);
                self.publisher
                    .publish(PresentationEvent::TradeOffersChanged(pair));
            }
            TradeEvent::Accepted { side, accepted } => {
                self.set_phase(TradePhase::Negotiating);
                self.publisher
                    .publish(PresentationEvent::TradeAccepted { side, accepted });
            }
            TradeEvent::Completed(pair) => self.complete(pair),
            TradeEvent::Closed => {
                let released = self.store.clear_reservations();
                self.set_phase(TradePhase::Idle);
                tracing::info!(released, "trade closed");
                self.publisher.publish_snapshot(&self.store);
                self.publisher
                    .publish(PresentationEvent::TradeClosed { released });
            }
        }
    }

    fn complete(&self, pair: OfferPair) {
        let OfferPair { local, remote } = pair;
        let mut deltas = Vec::with_capacity(local.len() + remote.len());

        for item in &local {
            if self.store.remove_item(item.id).is_some() {
                deltas.push(PresentationEvent::ItemDelta {
                    item_id: item.id,
                    is_addition: false,
                });
            }
        }
        for item in remote {
            let item_id = item.id;
            if self.store.add_item(item).is_added() {
                deltas.push(PresentationEvent::ItemDelta {
                    item_id,
                    is_addition: true,
                });
            }
        }

        tracing::info!(changes = deltas.len(), "trade completed");
        self.set_phase(TradePhase::Completed);
        self.publisher.publish_all(deltas);
        self.publisher.publish_snapshot(&self.store);
    }
}
