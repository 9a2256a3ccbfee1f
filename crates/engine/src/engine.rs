use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stackview_core::{Item, ItemId, ScanGeneration};
use stackview_events::Subscription;
use stackview_inventory::{AggregationStore, Enricher, GroupedView, InventorySnapshot, InventorySummary};
use thiserror::Error;
use tokio::runtime::Handle;

use crate::config::EngineConfig;
use crate::protocol::ProtocolEvent;
use crate::publisher::{EventPublisher, PresentationEnvelope};
use crate::scan::{ScanCoordinator, ScanError, ScanPhase};
use crate::trade::{TradeError, TradeEvent, TradePhase, TradeReconciler};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine must be created inside a tokio runtime")]
    NoRuntime,

    #[error("item {0} is not in the inventory")]
    UnknownItem(ItemId),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The inventory engine.
///
/// Owns the store and every component that mutates it. Inbound events,
/// commands and the scan's timer tasks run under one dispatch lock, so sinks
/// observe events in mutation order. `accept_trade` only sends and takes no
/// lock.
pub struct Engine {
    config: EngineConfig,
    store: Arc<AggregationStore>,
    publisher: Arc<EventPublisher>,
    transport: Arc<dyn Transport>,
    scanner: ScanCoordinator,
    trades: TradeReconciler,
    dispatch: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("scanner", &self.scanner)
            .field("trades", &self.trades)
            .finish()
    }
}

impl Engine {
    /// Build an engine on the current tokio runtime.
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        enricher: Arc<dyn Enricher>,
    ) -> Result<Self, EngineError> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        Ok(Self::with_runtime(runtime, config, transport, enricher))
    }

    pub fn with_runtime(
        runtime: Handle,
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        let store = Arc::new(AggregationStore::new(enricher));
        let publisher = Arc::new(EventPublisher::new());
        let dispatch = Arc::new(Mutex::new(()));
        let scanner = ScanCoordinator::new(
            &config,
            dispatch.clone(),
            runtime,
            store.clone(),
            transport.clone(),
            publisher.clone(),
        );
        let trades = TradeReconciler::new(store.clone(), transport.clone(), publisher.clone());

        tracing::info!(
            batch_delay = ?config.batch_delay,
            stall_timeout = ?config.stall_timeout,
            rescan_policy = ?config.rescan_policy,
            "inventory engine ready"
        );

        Self {
            config,
            store,
            publisher,
            transport,
            scanner,
            trades,
            dispatch,
        }
    }

    fn serialised(&self) -> MutexGuard<'_, ()> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one inbound protocol event.
    pub fn handle(&self, event: ProtocolEvent) {
        let _guard = self.serialised();
        tracing::trace!(event = event.name(), "protocol event");

        match event {
            ProtocolEvent::InventoryBatch(items) => {
                let outcome = self.scanner.on_batch_received(items);
                tracing::trace!(?outcome, "inventory batch handled");
            }
            ProtocolEvent::ItemRemoved(item_id) => {
                if self.store.remove_item(item_id).is_some() {
                    self.publisher.item_delta(item_id, false);
                    self.publisher.publish_snapshot(&self.store);
                }
            }
            ProtocolEvent::TradeOffersChanged(pair) => {
                self.trades.apply(TradeEvent::OffersChanged(pair))
            }
            ProtocolEvent::TradeAccepted { side, accepted } => {
                self.trades.apply(TradeEvent::Accepted { side, accepted })
            }
            ProtocolEvent::TradeCompleted(pair) => self.trades.apply(TradeEvent::Completed(pair)),
            ProtocolEvent::TradeClosed => self.trades.apply(TradeEvent::Closed),
        }
    }

    pub fn start_scan(&self) -> Result<ScanGeneration, EngineError> {
        let _guard = self.serialised();
        Ok(self.scanner.start_scan()?)
    }

    pub fn offer_item(&self, item_id: ItemId) -> Result<(), EngineError> {
        let _guard = self.serialised();
        Ok(self.trades.offer_item(item_id)?)
    }

    pub fn accept_trade(&self) -> Result<(), EngineError> {
        Ok(self.trades.accept_trade()?)
    }

    /// Pick an item up from the room into the inventory.
    pub fn pickup_item(&self, item: Item) -> Result<(), EngineError> {
        let _guard = self.serialised();
        let item_id = item.id;
        self.transport.pickup_item(item_id)?;

        if self.store.add_item(item).is_added() {
            tracing::info!(%item_id, "item picked up");
            self.publisher.item_delta(item_id, true);
            self.publisher.publish_snapshot(&self.store);
        }
        Ok(())
    }

    /// Place an inventory item in the room at `(x, y)`.
    pub fn place_item(&self, item_id: ItemId, x: i32, y: i32) -> Result<(), EngineError> {
        let _guard = self.serialised();
        if !self.store.exists(item_id) {
            return Err(EngineError::UnknownItem(item_id));
        }
        self.transport.place_item(item_id, x, y)?;

        if self.store.remove_item(item_id).is_some() {
            tracing::info!(%item_id, x, y, "item placed");
            self.publisher.item_delta(item_id, false);
            self.publisher.publish_snapshot(&self.store);
        }
        Ok(())
    }

    pub fn subscribe(&self) -> Subscription<PresentationEnvelope> {
        self.publisher.subscribe()
    }

    pub fn summary(&self) -> InventorySummary {
        self.store.summary()
    }

    pub fn grouped_view(&self) -> GroupedView {
        self.store.grouped_view()
    }

    pub fn snapshot(&self) -> InventorySnapshot {
        self.store.snapshot()
    }

    pub fn scan_phase(&self) -> ScanPhase {
        self.scanner.phase()
    }

    pub fn trade_phase(&self) -> TradePhase {
        self.trades.phase()
    }

    pub fn store(&self) -> &AggregationStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop background tasks. Queries keep working.
    pub fn shutdown(&self) {
        tracing::info!("inventory engine shutting down");
        self.scanner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackview_inventory::DefaultEnricher;

    use crate::publisher::PresentationEvent;
    use crate::transport::InMemoryTransport;

    #[test]
    fn new_outside_runtime_fails() {
        let err = Engine::new(
            EngineConfig::default(),
            Arc::new(InMemoryTransport::new()),
            Arc::new(DefaultEnricher),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NoRuntime));
    }

    #[tokio::test]
    async fn placing_unknown_item_sends_nothing() {
        let transport = Arc::new(InMemoryTransport::new());
        let engine = Engine::new(EngineConfig::default(), transport.clone(), Arc::new(DefaultEnricher)).unwrap();

        let err = engine.place_item(ItemId::new(3), 0, 0).unwrap_err();
        assert!(matches!(err, EngineError::UnknownItem(id) if id == ItemId::new(3)));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn removal_notice_for_unknown_item_is_silent() {
        let engine = Engine::new(
            EngineConfig::default(),
            Arc::new(InMemoryTransport::new()),
            Arc::new(DefaultEnricher),
        )
        .unwrap();
        let sink = engine.subscribe();

        engine.handle(ProtocolEvent::ItemRemoved(ItemId::new(1)));
        assert!(sink.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stall_waits_for_the_dispatch_lock() {
        let config = EngineConfig::default().with_stall_timeout(std::time::Duration::from_millis(50));
        let engine = Engine::new(config, Arc::new(InMemoryTransport::new()), Arc::new(DefaultEnricher)).unwrap();
        let generation = engine.start_scan().unwrap();
        let sink = engine.subscribe();

        {
            let _guard = engine.serialised();
            std::thread::sleep(std::time::Duration::from_millis(300));
            assert_eq!(engine.scan_phase(), ScanPhase::Scanning(generation));
            assert!(sink.try_recv().is_err());
        }

        let stalled = sink.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert!(matches!(
            stalled.payload(),
            PresentationEvent::ScanStalled { generation: g, .. } if *g == generation
        ));
        assert_eq!(engine.scan_phase(), ScanPhase::Idle);
    }
}
