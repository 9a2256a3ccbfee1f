//! `stackview-sim`: runs the engine against a simulated remote inventory.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, bail};
use stackview_core::{Item, ItemId};
use stackview_engine::{
    Engine, EngineConfig, InMemoryTransport, OfferPair, OutboundCommand, ProtocolEvent, ScanPhase,
    TradeSide,
};
use stackview_inventory::{Catalog, CatalogEntry, CatalogVariant, Enricher};
use tokio::sync::mpsc::UnboundedReceiver;

const PAGE_SIZE: usize = 9;
/// Items repeated from the previous page, as the live service does.
const PAGE_OVERLAP: usize = 2;

/// Pages through a fixed inventory. Past the end it keeps answering with the
/// last page, which holds nothing new.
struct SimulatedRemote {
    items: Vec<Item>,
    cursor: usize,
}

impl SimulatedRemote {
    fn new(items: Vec<Item>) -> Self {
        Self { items, cursor: 0 }
    }

    fn next_page(&mut self) -> Vec<Item> {
        let len = self.items.len();
        if self.cursor >= len {
            return self.items[len.saturating_sub(PAGE_SIZE)..].to_vec();
        }
        let start = self.cursor.saturating_sub(PAGE_OVERLAP);
        let end = (self.cursor + PAGE_SIZE).min(len);
        self.cursor = end;
        self.items[start..end].to_vec()
    }
}

fn demo_inventory() -> Vec<Item> {
    let mut items = Vec::new();
    let mut id = 1000;
    let mut next_id = || {
        id += 1;
        id
    };

    for _ in 0..12 {
        items.push(Item::floor(next_id(), "chair_norja"));
    }
    for _ in 0..7 {
        items.push(Item::floor(next_id(), "lamp_basic"));
    }
    for _ in 0..5 {
        items.push(Item::wall(next_id(), "poster", "15"));
    }
    for _ in 0..3 {
        items.push(Item::wall(next_id(), "poster", "22"));
    }
    for _ in 0..4 {
        items.push(Item::floor(next_id(), "throne"));
    }
    items.push(Item::floor(next_id(), "mystery_box"));
    items
}

fn demo_catalog() -> Catalog {
    Catalog::new()
        .with_entry("chair_norja", CatalogEntry::new("Norja Chair", 3.0))
        .with_entry("lamp_basic", CatalogEntry::new("Basic Lamp", 1.5))
        .with_entry("throne", CatalogEntry::new("Throne", 120.0))
        .with_entry(
            "poster",
            CatalogEntry::new("Poster", 0.5)
                .with_variant(
                    "15",
                    CatalogVariant {
                        name: "Rose Poster".into(),
                        value: Some(2.0),
                    },
                )
                .with_variant(
                    "22",
                    CatalogVariant {
                        name: "Skull Poster".into(),
                        value: None,
                    },
                ),
        )
}

async fn run_scan(
    engine: &Engine,
    commands: &mut UnboundedReceiver<OutboundCommand>,
    remote: &mut SimulatedRemote,
) -> anyhow::Result<()> {
    engine.start_scan()?;
    let patience = engine.config().stall_timeout * 2;

    while engine.scan_phase() != ScanPhase::Idle {
        let command = match tokio::time::timeout(patience, commands.recv()).await {
            Ok(Some(command)) => command,
            Ok(None) => bail!("transport channel closed"),
            // The watchdog ends the scan; re-check the phase.
            Err(_) => continue,
        };

        match command {
            OutboundCommand::RequestNextBatch => {
                let page = remote.next_page();
                tracing::debug!(items = page.len(), "remote answered batch request");
                engine.handle(ProtocolEvent::InventoryBatch(page));
            }
            other => tracing::debug!(command = other.name(), "remote ignored command"),
        }
    }
    Ok(())
}

fn run_trade(engine: &Engine) -> anyhow::Result<()> {
    let offered: Vec<Item> = engine
        .grouped_view()
        .values()
        .next()
        .map(|group| group.members().iter().take(2).cloned().collect())
        .unwrap_or_default();
    if offered.is_empty() {
        tracing::warn!("inventory is empty; skipping trade");
        return Ok(());
    }

    for item in &offered {
        engine.offer_item(item.id)?;
    }
    let received = vec![Item::floor(5001, "throne"), Item::wall(5002, "poster", "15")];
    let pair = OfferPair::new(offered, received);

    engine.handle(ProtocolEvent::TradeOffersChanged(pair.clone()));
    engine.accept_trade()?;
    engine.handle(ProtocolEvent::TradeAccepted {
        side: TradeSide::Local,
        accepted: true,
    });
    engine.handle(ProtocolEvent::TradeAccepted {
        side: TradeSide::Remote,
        accepted: true,
    });
    engine.handle(ProtocolEvent::TradeCompleted(pair));
    engine.handle(ProtocolEvent::TradeClosed);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stackview_observability::init();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    let enricher: Arc<dyn Enricher> = if config.catalog_path.is_some() {
        config.load_enricher().context("failed to load catalog")?
    } else {
        tracing::info!("no catalog configured; using built-in demo catalog");
        Arc::new(demo_catalog())
    };

    let (transport, mut commands) = InMemoryTransport::with_channel();
    let engine = Engine::new(config, Arc::new(transport), enricher)?;
    let sink = engine.subscribe();
    // Runs until the engine, and with it every publisher, is gone.
    let sink_task = tokio::task::spawn_blocking(move || {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        while let Ok(envelope) = sink.recv() {
            tracing::trace!(
                event_id = %envelope.event_id(),
                sequence = envelope.sequence_number(),
                occurred_at = %envelope.occurred_at(),
                event_type = envelope.event_type(),
                "presentation event"
            );
            *counts.entry(envelope.event_type().to_string()).or_default() += 1;
        }
        counts
    });

    let mut remote = SimulatedRemote::new(demo_inventory());
    run_scan(&engine, &mut commands, &mut remote).await?;
    run_trade(&engine)?;

    engine.pickup_item(Item::floor(6001, "lamp_basic"))?;
    engine.place_item(ItemId::new(6001), 4, 7)?;

    engine
        .store()
        .verify_invariants()
        .context("inventory invariants violated")?;
    println!("{}", serde_json::to_string_pretty(&engine.summary())?);

    engine.shutdown();
    drop(engine);
    let counts = sink_task.await.context("presentation sink panicked")?;
    tracing::info!(?counts, "presentation events delivered");
    Ok(())
}
