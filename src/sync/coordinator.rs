//! Sync coordinator
//!
//! One spawned task owns the `FlightControl` token and receives, as discrete
//! messages, every signal and every fetch completion:
//!
//! - durable store change push (`ChangeStream`)
//! - local mutation events (`EventBus<MutationEvent>`)
//! - focus-regained events (`EventBus<FocusEvent>`)
//!
//! The first signal while idle dispatches a fetch of the full collection;
//! signals that arrive while it is in flight are dropped, since that fetch
//! already reads the latest durable state. A successful fetch replaces the
//! `CollectionStore` contents in one swap. A failed or timed-out fetch is
//! logged and the previous contents stay.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::flight::{FlightControl, Generation};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::events::{
    ChangeFilter, ChangeNotification, EventBus, FocusEvent, MutationEvent, SyncSignal,
};
use crate::models::Collection;
use crate::store::{ChangeStream, CollectionStore, DurableStore};

// ============================================================================
// Counters
// ============================================================================

/// Live counters shared between the coordinator task and its handles
#[derive(Debug, Default)]
pub struct SyncCounters {
    signals_received: AtomicU64,
    signals_coalesced: AtomicU64,
    fetches_started: AtomicU64,
    fetches_applied: AtomicU64,
    fetches_failed: AtomicU64,
    fetches_discarded: AtomicU64,
    in_flight: AtomicBool,
    detached: AtomicBool,
}

impl SyncCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncStats {
        SyncStats {
            signals_received: self.signals_received.load(Ordering::Relaxed),
            signals_coalesced: self.signals_coalesced.load(Ordering::Relaxed),
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetches_applied: self.fetches_applied.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            fetches_discarded: self.fetches_discarded.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
            detached: self.detached.load(Ordering::Acquire),
        }
    }
}

/// Point-in-time view of the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub signals_received: u64,
    pub signals_coalesced: u64,
    pub fetches_started: u64,
    pub fetches_applied: u64,
    pub fetches_failed: u64,
    pub fetches_discarded: u64,
    /// Loading flag: a fetch is outstanding
    pub in_flight: bool,
    /// Listeners have been detached by teardown
    pub detached: bool,
}

/// Read-only, cloneable view of a coordinator's counters
#[derive(Debug, Clone)]
pub struct SyncMonitor {
    counters: Arc<SyncCounters>,
}

impl SyncMonitor {
    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }

    pub fn is_syncing(&self) -> bool {
        self.counters.in_flight.load(Ordering::Acquire)
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Signal sources a coordinator listens to. A `None` source is simply absent.
#[derive(Default)]
pub struct SyncSources {
    pub changes: Option<ChangeStream>,
    pub mutations: Option<broadcast::Receiver<MutationEvent>>,
    pub focus: Option<broadcast::Receiver<FocusEvent>>,
}

/// Builds and starts the coordinator task for one user
pub struct SyncCoordinator {
    store: Arc<dyn DurableStore>,
    collection: CollectionStore,
    user_id: String,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn DurableStore>,
        collection: CollectionStore,
        user_id: impl Into<String>,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            collection,
            user_id: user_id.into(),
            config,
            clock,
        }
    }

    /// Subscribe to all three sources and start the coordinator task.
    ///
    /// If the store refuses a change subscription the coordinator still runs
    /// on the two local sources.
    pub async fn start(
        self,
        mutations: &EventBus<MutationEvent>,
        focus: &EventBus<FocusEvent>,
    ) -> SyncHandle {
        // Local subscriptions first so nothing published during the store
        // handshake is missed
        let mutations = mutations.subscribe();
        let focus = focus.subscribe();

        let changes = match self
            .store
            .subscribe(ChangeFilter::for_user(self.user_id.clone()))
            .await
        {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(
                    "Change push unavailable from {} store, relying on local signals: {}",
                    self.store.backend(),
                    e
                );
                None
            }
        };

        self.spawn(SyncSources {
            changes,
            mutations: Some(mutations),
            focus: Some(focus),
        })
    }

    /// Start the coordinator task over explicit sources
    pub fn spawn(self, sources: SyncSources) -> SyncHandle {
        let cancel = CancellationToken::new();
        let counters = Arc::new(SyncCounters::default());
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (detached_tx, detached_rx) = oneshot::channel();

        let actor = CoordinatorTask {
            store: self.store,
            collection: self.collection,
            user_id: self.user_id,
            fetch_timeout: self.config.fetch_timeout,
            clock: self.clock,
            counters: counters.clone(),
            flight: FlightControl::new(),
            pending: 0,
            completions_tx,
            completions_rx,
            sources,
        };

        tokio::spawn(actor.run(
            cancel.clone(),
            self.config.refresh_on_start,
            detached_tx,
        ));

        SyncHandle {
            cancel,
            counters,
            detached: Some(detached_rx),
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Owner's handle on a running coordinator. Dropping it tears the coordinator down.
#[derive(Debug)]
pub struct SyncHandle {
    cancel: CancellationToken,
    counters: Arc<SyncCounters>,
    detached: Option<oneshot::Receiver<()>>,
}

impl SyncHandle {
    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }

    pub fn monitor(&self) -> SyncMonitor {
        SyncMonitor {
            counters: self.counters.clone(),
        }
    }

    /// Detach every listener and invalidate any in-flight fetch.
    ///
    /// Returns once the listeners are detached. A fetch still running is
    /// left to resolve in the background and is then discarded.
    pub async fn teardown(mut self) -> SyncStats {
        self.cancel.cancel();
        if let Some(detached) = self.detached.take() {
            // Err only if the task already finished
            let _ = detached.await;
        }
        self.counters.snapshot()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Coordinator task
// ============================================================================

struct FetchOutcome {
    generation: Generation,
    result: Result<Collection>,
}

/// Result of waiting on a broadcast source
enum Incoming<T> {
    Event(T),
    Lagged(u64),
    Closed,
}

struct CoordinatorTask {
    store: Arc<dyn DurableStore>,
    collection: CollectionStore,
    user_id: String,
    fetch_timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
    counters: Arc<SyncCounters>,
    flight: FlightControl,
    /// Dispatched fetches whose outcome has not been received yet
    pending: usize,
    completions_tx: mpsc::UnboundedSender<FetchOutcome>,
    completions_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    sources: SyncSources,
}

impl CoordinatorTask {
    #[instrument(skip_all, fields(user_id = %self.user_id, backend = self.store.backend()))]
    async fn run(
        mut self,
        cancel: CancellationToken,
        refresh_on_start: bool,
        detached: oneshot::Sender<()>,
    ) {
        info!("🔄 Sync coordinator started");

        if refresh_on_start {
            self.on_signal(SyncSignal::Startup);
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(outcome) = self.completions_rx.recv() => self.on_complete(outcome),

                change = next_change(&mut self.sources.changes) => match change {
                    Some(notification) => {
                        debug!(op = ?notification.op, item_id = ?notification.item_id, "Store change");
                        self.on_signal(SyncSignal::StoreChanged);
                    }
                    None => {
                        warn!("Store change stream closed, detaching it");
                        self.sources.changes = None;
                    }
                },

                mutation = next_event(&mut self.sources.mutations) => match mutation {
                    Incoming::Event(event) if event.user_id == self.user_id => {
                        self.on_signal(SyncSignal::LocalMutation);
                    }
                    Incoming::Event(event) => {
                        debug!("Ignoring mutation for user {}", event.user_id);
                    }
                    Incoming::Lagged(skipped) => {
                        debug!(skipped, "Mutation bus lagged");
                        self.on_signal(SyncSignal::LocalMutation);
                    }
                    Incoming::Closed => {
                        warn!("Mutation bus closed, detaching it");
                        self.sources.mutations = None;
                    }
                },

                focus = next_event(&mut self.sources.focus) => match focus {
                    Incoming::Event(_) | Incoming::Lagged(_) => {
                        self.on_signal(SyncSignal::FocusRegained);
                    }
                    Incoming::Closed => {
                        warn!("Focus bus closed, detaching it");
                        self.sources.focus = None;
                    }
                },
            }
        }

        self.detach();
        let _ = detached.send(());

        // Outstanding fetches still report back; each is discarded
        while self.pending > 0 {
            match self.completions_rx.recv().await {
                Some(outcome) => self.on_complete(outcome),
                None => break,
            }
        }

        info!("Sync coordinator stopped");
    }

    fn detach(&mut self) {
        self.flight.teardown();
        self.sources = SyncSources::default();
        self.counters.in_flight.store(false, Ordering::Release);
        self.counters.detached.store(true, Ordering::Release);
        info!("Sync listeners detached");
    }

    fn on_signal(&mut self, signal: SyncSignal) {
        SyncCounters::bump(&self.counters.signals_received);

        let Some(generation) = self.flight.begin() else {
            SyncCounters::bump(&self.counters.signals_coalesced);
            metrics::counter!("sync_signals_coalesced_total").increment(1);
            debug!(%signal, "Fetch already in flight, signal coalesced");
            return;
        };

        debug!(%signal, generation, "Dispatching collection fetch");
        SyncCounters::bump(&self.counters.fetches_started);
        metrics::counter!("sync_fetches_started_total").increment(1);
        self.counters.in_flight.store(true, Ordering::Release);
        self.pending += 1;

        let store = self.store.clone();
        let user_id = self.user_id.clone();
        let timeout = self.fetch_timeout;
        let completions = self.completions_tx.clone();

        tokio::spawn(async move {
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, store.get_all(&user_id))
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::Timeout {
                            timeout_ms: limit.as_millis() as u64,
                        })
                    }),
                None => store.get_all(&user_id).await,
            };
            // Receiver is gone only after the coordinator finished draining
            let _ = completions.send(FetchOutcome { generation, result });
        });
    }

    fn on_complete(&mut self, outcome: FetchOutcome) {
        self.pending = self.pending.saturating_sub(1);

        if !self.flight.complete(outcome.generation) {
            SyncCounters::bump(&self.counters.fetches_discarded);
            metrics::counter!("sync_fetches_discarded_total").increment(1);
            debug!(
                generation = outcome.generation,
                "Discarding fetch from a torn-down generation"
            );
            return;
        }
        self.counters.in_flight.store(false, Ordering::Release);

        match outcome.result {
            Ok(collection) => {
                let size = collection.len();
                self.collection.replace(collection, self.clock.now());
                SyncCounters::bump(&self.counters.fetches_applied);
                metrics::counter!("sync_fetches_applied_total").increment(1);
                info!(generation = outcome.generation, size, "✅ Collection refreshed");
            }
            Err(e) => {
                SyncCounters::bump(&self.counters.fetches_failed);
                metrics::counter!("sync_fetches_failed_total").increment(1);
                if e.is_error_level() {
                    error!(generation = outcome.generation, "Collection fetch failed: {}", e);
                } else {
                    warn!(generation = outcome.generation, "Collection fetch failed: {}", e);
                }
            }
        }
    }
}

async fn next_change(stream: &mut Option<ChangeStream>) -> Option<ChangeNotification> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_event<T: Clone>(source: &mut Option<broadcast::Receiver<T>>) -> Incoming<T> {
    let Some(receiver) = source else {
        return std::future::pending().await;
    };
    match receiver.recv().await {
        Ok(event) => Incoming::Event(event),
        Err(broadcast::error::RecvError::Lagged(skipped)) => Incoming::Lagged(skipped),
        Err(broadcast::error::RecvError::Closed) => Incoming::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;

    fn coordinator(store: Arc<MemoryStore>, collection: CollectionStore) -> SyncCoordinator {
        SyncCoordinator::new(
            store,
            collection,
            "u1",
            SyncConfig {
                fetch_timeout: None,
                refresh_on_start: true,
                signal_buffer: 8,
            },
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn test_refresh_on_start_loads_collection() {
        let store = Arc::new(MemoryStore::new());
        let collection = CollectionStore::new();
        let mut updates = collection.subscribe();

        let handle = coordinator(store, collection.clone()).spawn(SyncSources::default());
        updates.changed().await.unwrap();

        assert!(collection.is_loaded());
        let stats = handle.teardown().await;
        assert_eq!(stats.fetches_started, 1);
        assert_eq!(stats.fetches_applied, 1);
        assert!(stats.detached);
    }

    #[tokio::test]
    async fn test_dropping_handle_detaches_sources() {
        let store = Arc::new(MemoryStore::new());
        let bus: EventBus<FocusEvent> = EventBus::new(4);
        let handle = coordinator(store, CollectionStore::new()).spawn(SyncSources {
            focus: Some(bus.subscribe()),
            ..Default::default()
        });
        let monitor = handle.monitor();

        drop(handle);
        for _ in 0..100 {
            if monitor.stats().detached {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(monitor.stats().detached);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
