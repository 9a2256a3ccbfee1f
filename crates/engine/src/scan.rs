//! Incremental inventory scan.
//!
//! The remote service has no end-of-list marker, so a scan keeps asking for
//! the next page until a page brings no identifier the store has not seen
//! (the fixpoint). Pages may legitimately repeat items near the boundary,
//! which is why completion is a novelty test rather than a count test.
//!
//! ```text
//! Idle --start_scan--> Scanning --batch w/o new ids--> Idle (ScanComplete)
//!                         |  ^
//!                         |  +-- batch with new ids, then next request after batch_delay
//!                         +-- no batch for stall_timeout / send failure --> Idle (ScanStalled)
//! ```
//!
//! Answers carry no request id. A batch counts for whichever scan is
//! running when it is merged; the generation only guards the background
//! tasks, so a superseded scan never issues another request or stalls the
//! current one.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;

use stackview_core::{Item, ScanGeneration};
use stackview_inventory::AggregationStore;

use crate::config::{EngineConfig, RescanPolicy};
use crate::publisher::{EventPublisher, PresentationEvent};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("scan {0} is already running")]
    AlreadyScanning(ScanGeneration),

    #[error("scan request failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Scanning(ScanGeneration),
}

/// What happened to an inbound batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// New items were merged; the next request is scheduled.
    Progress { new_items: usize },
    /// Nothing new: the scan finished.
    Complete { total_items: usize },
    /// No scan is running; dropped.
    Ignored,
}

#[derive(Debug)]
struct ActiveScan {
    generation: ScanGeneration,
    batches: u64,
    items_added: usize,
    last_activity: Instant,
}

#[derive(Debug, Default)]
struct ScanState {
    generation: ScanGeneration,
    active: Option<ActiveScan>,
}

struct Shared {
    store: Arc<AggregationStore>,
    transport: Arc<dyn Transport>,
    publisher: Arc<EventPublisher>,
    runtime: Handle,
    batch_delay: Duration,
    stall_timeout: Duration,
    policy: RescanPolicy,
    dispatch: Arc<Mutex<()>>,
    state: Mutex<ScanState>,
    shutdown: Notify,
    closed: AtomicBool,
}

/// Drives the batch-by-batch inventory pull.
///
/// Cheap to clone; clones share state with the background tasks.
#[derive(Clone)]
pub struct ScanCoordinator {
    shared: Arc<Shared>,
}

impl fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("phase", &self.phase())
            .field("policy", &self.shared.policy)
            .finish()
    }
}

impl ScanCoordinator {
    /// `dispatch` is the lock inbound events and commands run under. The
    /// background tasks take it before they touch the scan, so their events
    /// are ordered with everything else. Callers of the public methods are
    /// expected to hold it already.
    pub fn new(
        config: &EngineConfig,
        dispatch: Arc<Mutex<()>>,
        runtime: Handle,
        store: Arc<AggregationStore>,
        transport: Arc<dyn Transport>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                transport,
                publisher,
                runtime,
                batch_delay: config.batch_delay,
                stall_timeout: config.stall_timeout,
                policy: config.rescan_policy,
                dispatch,
                state: Mutex::new(ScanState::default()),
                shutdown: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScanState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn serialised(&self) -> MutexGuard<'_, ()> {
        self.shared.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> ScanPhase {
        match &self.state().active {
            Some(active) => ScanPhase::Scanning(active.generation),
            None => ScanPhase::Idle,
        }
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.phase(), ScanPhase::Scanning(_))
    }

    /// Generation of the most recently started scan.
    pub fn generation(&self) -> ScanGeneration {
        self.state().generation
    }

    /// Start a scan: empty the store, bump the generation and request the
    /// first page.
    ///
    /// While a scan is running, `RescanPolicy::Restart` abandons it and
    /// `RescanPolicy::Reject` refuses with `ScanError::AlreadyScanning`. An
    /// answer still in flight for the abandoned scan counts for the new one.
    pub fn start_scan(&self) -> Result<ScanGeneration, ScanError> {
        let generation = {
            let mut state = self.state();

            if let Some(running) = state.active.as_ref().map(|a| a.generation) {
                match self.shared.policy {
                    RescanPolicy::Reject => {
                        drop(state);
                        tracing::info!(%running, "scan start rejected; scan already running");
                        self.shared
                            .publisher
                            .publish(PresentationEvent::ScanRejected { generation: running });
                        return Err(ScanError::AlreadyScanning(running));
                    }
                    RescanPolicy::Restart => {
                        tracing::info!(%running, "abandoning running scan");
                    }
                }
            }

            state.generation = state.generation.next();
            let generation = state.generation;
            // Reset under the scan lock: nothing merged for the old
            // generation survives this point.
            self.shared.store.reset();
            state.active = Some(ActiveScan {
                generation,
                batches: 0,
                items_added: 0,
                last_activity: Instant::now(),
            });
            generation
        };

        tracing::info!(%generation, "inventory scan started");
        self.shared.publisher.publish_snapshot(&self.shared.store);

        self.request_batch(generation)?;
        self.spawn_watchdog(generation);
        Ok(generation)
    }

    /// Merge one inbound page.
    pub fn on_batch_received(&self, items: Vec<Item>) -> BatchOutcome {
        let mut state = self.state();

        let Some(active) = state.active.as_mut() else {
            tracing::debug!(items = items.len(), "dropping inventory batch; no scan running");
            return BatchOutcome::Ignored;
        };

        let generation = active.generation;
        let received = items.len();
        let added = self.shared.store.add_new_items(items);
        active.batches += 1;
        active.last_activity = Instant::now();
        let batch = active.batches;
        let items_added = active.items_added;
        let total_items = self.shared.store.len();

        if added.is_empty() {
            state.active = None;
            drop(state);

            tracing::info!(
                %generation,
                batches = batch,
                items_added,
                total_items,
                "inventory scan complete"
            );
            self.shared.publisher.publish_snapshot(&self.shared.store);
            self.shared.publisher.publish(PresentationEvent::ScanComplete {
                generation,
                batches: batch,
                total_items,
            });
            return BatchOutcome::Complete { total_items };
        }

        active.items_added += added.len();
        let new_items = added.len();
        drop(state);

        tracing::debug!(%generation, batch, received, new_items, total_items, "inventory batch merged");
        self.shared.publisher.publish(PresentationEvent::ScanProgress {
            generation,
            batch,
            new_items,
            total_items,
        });
        self.schedule_next_request(generation);

        BatchOutcome::Progress { new_items }
    }

    /// Stop all background work. Running scans are left as they are.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.shutdown.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: ScanGeneration) -> bool {
        matches!(&self.state().active, Some(a) if a.generation == generation)
    }

    fn request_batch(&self, generation: ScanGeneration) -> Result<(), ScanError> {
        match self.state().active.as_mut() {
            Some(active) if active.generation == generation => {
                active.last_activity = Instant::now();
            }
            _ => return Ok(()),
        }

        tracing::debug!(%generation, "requesting next inventory batch");
        if let Err(e) = self.shared.transport.request_next_batch() {
            tracing::warn!(%generation, error = %e, "batch request failed");
            self.abort(generation, format!("batch request failed: {e}"));
            return Err(ScanError::Transport(e));
        }
        Ok(())
    }

    fn schedule_next_request(&self, generation: ScanGeneration) {
        let this = self.clone();
        let delay = self.shared.batch_delay;

        self.shared.runtime.spawn(async move {
            tokio::select! {
                _ = this.shared.shutdown.notified() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let _guard = this.serialised();
            if this.is_closed() || !this.is_current(generation) {
                return;
            }
            // Failure already ended the scan and was logged.
            let _ = this.request_batch(generation);
        });
    }

    fn spawn_watchdog(&self, generation: ScanGeneration) {
        let this = self.clone();
        let timeout = self.shared.stall_timeout;

        self.shared.runtime.spawn(async move {
            loop {
                let deadline = match &this.state().active {
                    Some(a) if a.generation == generation => a.last_activity + timeout,
                    _ => return,
                };

                tokio::select! {
                    _ = this.shared.shutdown.notified() => return,
                    _ = tokio::time::sleep_until(deadline) => {}
                }
                let _guard = this.serialised();
                if this.is_closed() {
                    return;
                }

                let stalled = match &this.state().active {
                    Some(a) if a.generation == generation => {
                        Instant::now() >= a.last_activity + timeout
                    }
                    _ => return,
                };
                if stalled {
                    tracing::warn!(%generation, ?timeout, "inventory scan stalled");
                    this.abort(generation, format!("no batch received within {timeout:?}"));
                    return;
                }
            }
        });
    }

    /// End `generation` without completion.
    fn abort(&self, generation: ScanGeneration, reason: String) {
        {
            let mut state = self.state();
            match &state.active {
                Some(a) if a.generation == generation => state.active = None,
                _ => return,
            }
        }
        self.shared
            .publisher
            .publish(PresentationEvent::ScanStalled { generation, reason });
    }
}
