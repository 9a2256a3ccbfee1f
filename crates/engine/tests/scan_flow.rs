use std::sync::Arc;
use std::time::Duration;

use stackview_core::{Item, ItemId, ScanGeneration};
use stackview_engine::{
    Engine, EngineConfig, EngineError, InMemoryTransport, OutboundCommand, PresentationEnvelope,
    PresentationEvent, ProtocolEvent, RescanPolicy, ScanError, ScanPhase,
};
use stackview_events::Subscription;
use stackview_inventory::DefaultEnricher;
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    engine: Engine,
    transport: Arc<InMemoryTransport>,
    commands: UnboundedReceiver<OutboundCommand>,
    sink: Subscription<PresentationEnvelope>,
}

impl Harness {
    fn new(config: EngineConfig) -> Self {
        let (transport, commands) = InMemoryTransport::with_channel();
        let transport = Arc::new(transport);
        let engine = Engine::new(config, transport.clone(), Arc::new(DefaultEnricher))
            .expect("inside a runtime");
        let sink = engine.subscribe();
        Self {
            engine,
            transport,
            commands,
            sink,
        }
    }

    async fn expect_batch_request(&mut self) {
        let command = tokio::time::timeout(Duration::from_secs(5), self.commands.recv())
            .await
            .expect("batch request within the debounce window")
            .expect("transport channel open");
        assert_eq!(command, OutboundCommand::RequestNextBatch);
    }

    fn deliver(&self, items: Vec<Item>) {
        self.engine.handle(ProtocolEvent::InventoryBatch(items));
    }

    fn events(&self) -> Vec<PresentationEvent> {
        self.sink.drain().into_iter().map(|e| e.into_payload()).collect()
    }
}

fn chairs(ids: impl IntoIterator<Item = i64>) -> Vec<Item> {
    ids.into_iter().map(|id| Item::floor(id, "chair")).collect()
}

fn count_complete(events: &[PresentationEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PresentationEvent::ScanComplete { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn repeated_batch_completes_scan_exactly_once() {
    let mut h = Harness::new(EngineConfig::default());

    let generation = h.engine.start_scan().unwrap();
    assert_eq!(h.engine.scan_phase(), ScanPhase::Scanning(generation));
    h.expect_batch_request().await;

    h.deliver(chairs([1]));
    assert_eq!(h.engine.scan_phase(), ScanPhase::Scanning(generation));
    h.expect_batch_request().await;

    h.deliver(chairs([1]));
    assert_eq!(h.engine.scan_phase(), ScanPhase::Idle);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(h.commands.try_recv().is_err());

    let events = h.events();
    assert_eq!(count_complete(&events), 1);
    assert!(events.contains(&PresentationEvent::ScanComplete {
        generation,
        batches: 2,
        total_items: 1,
    }));
    assert_eq!(h.engine.summary().total_items, 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_pages_reach_fixpoint() {
    let mut h = Harness::new(EngineConfig::default());
    h.engine.start_scan().unwrap();

    for page in [chairs(1..=4), chairs(3..=7), chairs(6..=9), chairs(8..=9)] {
        h.expect_batch_request().await;
        h.deliver(page);
    }

    assert_eq!(h.engine.scan_phase(), ScanPhase::Idle);
    assert_eq!(h.engine.summary().total_items, 9);
    assert_eq!(h.transport.count(&OutboundCommand::RequestNextBatch), 4);
    assert_eq!(count_complete(&h.events()), 1);
    h.engine.store().verify_invariants().unwrap();
}

#[tokio::test(start_paused = true)]
async fn next_request_waits_for_batch_delay() {
    let delay = Duration::from_millis(200);
    let mut h = Harness::new(EngineConfig::default().with_batch_delay(delay));
    h.engine.start_scan().unwrap();
    h.expect_batch_request().await;

    let merged_at = tokio::time::Instant::now();
    h.deliver(chairs([1, 2]));
    assert!(h.commands.try_recv().is_err());

    h.expect_batch_request().await;
    assert!(merged_at.elapsed() >= delay);
}

#[tokio::test(start_paused = true)]
async fn restart_discards_items_of_abandoned_scan() {
    let mut h = Harness::new(EngineConfig::default());

    let first = h.engine.start_scan().unwrap();
    h.expect_batch_request().await;
    h.deliver(chairs([1, 2, 3]));

    // Restart while the first scan's next request is still debounced.
    let second = h.engine.start_scan().unwrap();
    assert_eq!(second, first.next());
    assert!(h.engine.store().is_empty());
    h.expect_batch_request().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(h.commands.try_recv().is_err());

    h.deliver(chairs([10]));
    assert_eq!(h.engine.summary().total_items, 1);
    assert!(h.engine.store().exists(ItemId::new(10)));
    assert_eq!(h.engine.scan_phase(), ScanPhase::Scanning(second));
}

#[tokio::test(start_paused = true)]
async fn restart_after_lost_answer_still_fills_new_scan() {
    let mut h = Harness::new(EngineConfig::default());

    h.engine.start_scan().unwrap();
    h.expect_batch_request().await;
    // That request is never answered.
    let second = h.engine.start_scan().unwrap();
    h.expect_batch_request().await;

    h.deliver(chairs([1]));
    assert_eq!(h.engine.summary().total_items, 1);
    assert_eq!(h.engine.scan_phase(), ScanPhase::Scanning(second));
    h.expect_batch_request().await;

    h.deliver(chairs([1]));
    assert_eq!(h.engine.scan_phase(), ScanPhase::Idle);
    assert!(h.events().contains(&PresentationEvent::ScanComplete {
        generation: second,
        batches: 2,
        total_items: 1,
    }));
}

#[tokio::test(start_paused = true)]
async fn reject_policy_refuses_second_scan() {
    let mut h = Harness::new(EngineConfig::default().with_rescan_policy(RescanPolicy::Reject));

    let running = h.engine.start_scan().unwrap();
    h.expect_batch_request().await;
    h.deliver(chairs([1]));

    let err = h.engine.start_scan().unwrap_err();
    assert!(matches!(
        err,
        EngineError::Scan(ScanError::AlreadyScanning(g)) if g == running
    ));
    assert!(h
        .events()
        .contains(&PresentationEvent::ScanRejected { generation: running }));
    // The running scan keeps its items.
    assert_eq!(h.engine.summary().total_items, 1);
    assert_eq!(h.engine.scan_phase(), ScanPhase::Scanning(running));
}

#[tokio::test(start_paused = true)]
async fn silent_remote_stalls_scan() {
    let timeout = Duration::from_secs(3);
    let mut h = Harness::new(EngineConfig::default().with_stall_timeout(timeout));

    let generation = h.engine.start_scan().unwrap();
    h.expect_batch_request().await;

    tokio::time::sleep(timeout + Duration::from_millis(100)).await;

    assert_eq!(h.engine.scan_phase(), ScanPhase::Idle);
    let events = h.events();
    assert!(events.iter().any(|e| matches!(
        e,
        PresentationEvent::ScanStalled { generation: g, .. } if *g == generation
    )));
    assert_eq!(count_complete(&events), 0);

    // The next scan is not confused by the lost answer.
    let next = h.engine.start_scan().unwrap();
    h.expect_batch_request().await;
    h.deliver(chairs([5]));
    assert_eq!(h.engine.scan_phase(), ScanPhase::Scanning(next));
    assert_eq!(h.engine.summary().total_items, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_first_request_ends_scan() {
    let h = Harness::new(EngineConfig::default());
    h.transport.set_failing(true);

    let err = h.engine.start_scan().unwrap_err();
    assert!(matches!(err, EngineError::Scan(ScanError::Transport(_))));
    assert_eq!(h.engine.scan_phase(), ScanPhase::Idle);
    assert!(h.events().iter().any(|e| matches!(
        e,
        PresentationEvent::ScanStalled { generation, .. } if *generation == ScanGeneration::new(1)
    )));
}

#[tokio::test(start_paused = true)]
async fn batch_while_idle_is_ignored() {
    let h = Harness::new(EngineConfig::default());
    h.deliver(chairs([1, 2]));
    assert!(h.engine.store().is_empty());
    assert!(h.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rescan_starts_from_empty_store() {
    let mut h = Harness::new(EngineConfig::default());
    h.engine.start_scan().unwrap();
    h.expect_batch_request().await;
    h.deliver(chairs([1, 2]));
    h.expect_batch_request().await;
    h.deliver(chairs([2]));
    assert_eq!(h.engine.summary().total_items, 2);
    h.events();

    h.engine.start_scan().unwrap();
    match h.events().as_slice() {
        [PresentationEvent::SummaryUpdated(s), PresentationEvent::GroupedViewUpdated(g)] => {
            assert!(s.is_empty());
            assert!(g.is_empty());
        }
        other => panic!("unexpected events: {other:?}"),
    }
}
