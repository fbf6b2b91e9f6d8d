//! # Publish/subscribe event bus.
//!
//! [`EventBus`] decouples producers from consumers: producers publish [`Event`]s,
//! subscribers register a handler for one event id or for the wildcard
//! [`EventId::ANY`].
//!
//! ## Architecture
//! ```text
//! Publishers (many):                              Dispatch task (one):
//!   Orchestrator ──┐
//!   Link        ───┼── publish() ──► [mpsc queue] ──► SubscriberSet::dispatch ──► handlers
//!   Transport   ───┤    (try_send)    (bounded)
//!   Input       ───┘
//!
//!   Producer ──── publish_sync() ───────────────────► SubscriberSet::dispatch ──► handlers
//!                                  (caller's task)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits; on a full queue the event
//!   is dropped, its payload released and `BusStats::dropped` incremented.
//! - **FIFO**: one queue and one consumer task, so async events are delivered in
//!   enqueue order.
//! - **Sync publish**: `publish_sync()` runs every matching handler before it returns.
//! - **Timestamps**: an event with `timestamp == 0` is stamped with milliseconds
//!   elapsed since the bus was created.
//! - **Lifecycle**: `new` -> `init` -> ... -> `deinit`; a deinitialized bus can be
//!   initialized again. Every operation except `new`, `init`, `pending_count`,
//!   `stats` and `is_initialized` fails with `InvalidState` outside that window.
//!
//! ## Example
//! ```rust
//! use nodevisor::{BusConfig, EventBus, EventId, HandlerFn, SourceId};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), nodevisor::BusError> {
//!     let bus = EventBus::new(BusConfig::default());
//!     bus.init()?;
//!
//!     bus.subscribe(EventId::SYSTEM_READY, HandlerFn::arc("ready", |ev| {
//!         println!("ready at {} ms", ev.timestamp);
//!     }))?;
//!     bus.post_sync(EventId::SYSTEM_READY, SourceId::SYSTEM)?;
//!
//!     bus.deinit().await
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::event::{Event, EventId, Payload, SourceId};
use crate::error::BusError;
use crate::subscribers::{HandlerRef, SubscriberSet};

/// Bus configuration.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Capacity of the async queue (events). Must be non-zero.
    pub queue_capacity: usize,
}

impl BusConfig {
    /// Default async queue capacity.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

    /// Creates a configuration with the given queue capacity.
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self { queue_capacity }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Snapshot of bus counters.
///
/// Counters survive `deinit` and keep counting after a re-`init`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events accepted by `publish` or `publish_sync`.
    pub published: u64,
    /// Handler invocations that returned normally.
    pub delivered: u64,
    /// Events dropped because the queue was full.
    pub dropped: u64,
    /// Events whose dispatch completed (async and sync).
    pub dispatched: u64,
    /// Handler invocations that panicked.
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    dispatched: AtomicU64,
    panicked: AtomicU64,
}

/// State shared with the dispatch task.
struct Shared {
    epoch: Instant,
    subscribers: SubscriberSet,
    counters: Counters,
}

impl Shared {
    fn now_ms(&self) -> u32 {
        // Wraps like a 32-bit tick counter.
        self.epoch.elapsed().as_millis() as u32
    }

    fn stamp(&self, mut event: Event) -> Event {
        if event.timestamp == 0 {
            event.timestamp = self.now_ms();
        }
        event
    }

    fn dispatch(&self, event: Event) {
        trace!(event_id = %event.id, source = event.source.0, "dispatch");
        let out = self.subscribers.dispatch(&event);
        drop(event);

        self.counters
            .delivered
            .fetch_add(out.delivered, Ordering::Relaxed);
        self.counters
            .panicked
            .fetch_add(out.panicked, Ordering::Relaxed);
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
    }
}

/// Resources that exist only between `init` and `deinit`.
struct Running {
    tx: mpsc::Sender<Event>,
    token: CancellationToken,
    worker: JoinHandle<()>,
}

struct Inner {
    cfg: BusConfig,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

/// Cloneable handle to one event bus instance.
///
/// Clones share the same queue, subscriptions and counters.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Creates an uninitialized bus.
    pub fn new(cfg: BusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                shared: Arc::new(Shared {
                    epoch: Instant::now(),
                    subscribers: SubscriberSet::default(),
                    counters: Counters::default(),
                }),
                running: Mutex::new(None),
            }),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_initialized(&self) -> Result<(), BusError> {
        if self.running().is_some() {
            Ok(())
        } else {
            Err(BusError::InvalidState {
                reason: "bus not initialized",
            })
        }
    }

    /// Creates the queue and spawns the dispatch task on the current tokio runtime.
    ///
    /// ### Errors
    /// - `InvalidState` if already initialized.
    /// - `InvalidArgument` if the configured capacity is zero.
    ///
    /// ### Panics
    /// Must be called from within a tokio runtime (spawns a task).
    pub fn init(&self) -> Result<(), BusError> {
        let mut running = self.running();
        if running.is_some() {
            return Err(BusError::InvalidState {
                reason: "bus already initialized",
            });
        }
        let capacity = self.inner.cfg.queue_capacity;
        if capacity == 0 {
            return Err(BusError::InvalidArgument {
                reason: "queue capacity must be non-zero",
            });
        }

        let (tx, rx) = mpsc::channel::<Event>(capacity);
        let token = CancellationToken::new();
        let worker = tokio::spawn(dispatch_loop(
            Arc::clone(&self.inner.shared),
            rx,
            token.clone(),
        ));
        *running = Some(Running { tx, token, worker });

        debug!(queue_capacity = capacity, "event bus initialized");
        Ok(())
    }

    /// Stops the dispatch task, releases every queued event and clears all subscriptions.
    ///
    /// Events still queued are dropped without being delivered.
    ///
    /// ### Errors
    /// - `InvalidState` if the bus is not initialized.
    pub async fn deinit(&self) -> Result<(), BusError> {
        let running = self.running().take().ok_or(BusError::InvalidState {
            reason: "bus not initialized",
        })?;

        running.token.cancel();
        drop(running.tx);
        if let Err(e) = running.worker.await {
            warn!(error = %e, "dispatch task ended abnormally");
        }
        self.inner.shared.subscribers.clear();

        debug!("event bus deinitialized");
        Ok(())
    }

    /// `true` between `init` and `deinit`.
    pub fn is_initialized(&self) -> bool {
        self.running().is_some()
    }

    /// Enqueues an event for asynchronous delivery. Never blocks.
    ///
    /// Stamps `timestamp` when it is zero.
    ///
    /// ### Errors
    /// - `QueueFull` if the queue is full; the event (and its payload) is dropped
    ///   and [`BusStats::dropped`] incremented.
    /// - `InvalidState` if the bus is not initialized.
    pub fn publish(&self, event: Event) -> Result<(), BusError> {
        let event = self.inner.shared.stamp(event);
        let id = event.id;

        let running = self.running();
        let Some(running) = running.as_ref() else {
            return Err(BusError::InvalidState {
                reason: "bus not initialized",
            });
        };

        match running.tx.try_send(event) {
            Ok(()) => {
                self.inner
                    .shared
                    .counters
                    .published
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                drop(dropped);
                self.inner
                    .shared
                    .counters
                    .dropped
                    .fetch_add(1, Ordering::Relaxed);
                warn!(event_id = %id, "event queue full, event dropped");
                Err(BusError::QueueFull { id })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(BusError::InvalidState {
                reason: "dispatch task stopped",
            }),
        }
    }

    /// Delivers an event synchronously in the caller's task.
    ///
    /// Every matching handler has returned when this function returns.
    /// Handlers run while the caller's locks are held: callers holding a lock that a
    /// handler also takes must use [`publish`](Self::publish) instead.
    ///
    /// ### Errors
    /// - `InvalidState` if the bus is not initialized.
    pub fn publish_sync(&self, event: Event) -> Result<(), BusError> {
        self.ensure_initialized()?;
        let event = self.inner.shared.stamp(event);
        self.inner
            .shared
            .counters
            .published
            .fetch_add(1, Ordering::Relaxed);
        self.inner.shared.dispatch(event);
        Ok(())
    }

    /// Publishes a payload-less event asynchronously.
    pub fn post(&self, id: EventId, source: SourceId) -> Result<(), BusError> {
        self.publish(Event::new(id, source))
    }

    /// Publishes a payload-less event synchronously.
    pub fn post_sync(&self, id: EventId, source: SourceId) -> Result<(), BusError> {
        self.publish_sync(Event::new(id, source))
    }

    /// Copies `data` into a new payload and publishes the event asynchronously.
    ///
    /// Empty `data` publishes an event without payload.
    ///
    /// ### Errors
    /// - `OutOfMemory` if the copy cannot be allocated.
    /// - Any error of [`publish`](Self::publish).
    pub fn post_data(&self, id: EventId, source: SourceId, data: &[u8]) -> Result<(), BusError> {
        if data.is_empty() {
            return self.post(id, source);
        }
        let payload = Payload::try_copy(data).ok_or(BusError::OutOfMemory { len: data.len() })?;
        self.publish(Event::new(id, source).with_payload(payload))
    }

    /// Registers `handler` for events matching `filter` ([`EventId::ANY`] matches all).
    ///
    /// Registering the same handler for several filters is allowed.
    ///
    /// ### Errors
    /// - `InvalidState` if the bus is not initialized.
    pub fn subscribe(&self, filter: EventId, handler: HandlerRef) -> Result<(), BusError> {
        self.ensure_initialized()?;
        self.inner.shared.subscribers.insert(filter, handler);
        Ok(())
    }

    /// Removes one subscription of `handler` for exactly `filter`.
    ///
    /// ### Errors
    /// - `NotFound` if no such subscription exists (benign).
    /// - `InvalidState` if the bus is not initialized.
    pub fn unsubscribe(&self, filter: EventId, handler: &HandlerRef) -> Result<(), BusError> {
        self.ensure_initialized()?;
        if self.inner.shared.subscribers.remove(filter, handler) {
            Ok(())
        } else {
            Err(BusError::NotFound { filter })
        }
    }

    /// Removes every subscription of `handler`; returns how many were removed.
    ///
    /// ### Errors
    /// - `InvalidState` if the bus is not initialized.
    pub fn unsubscribe_all(&self, handler: &HandlerRef) -> Result<usize, BusError> {
        self.ensure_initialized()?;
        Ok(self.inner.shared.subscribers.remove_all(handler))
    }

    /// `true` if `handler` holds at least one subscription.
    ///
    /// [`deinit`](Self::deinit) clears every subscription, so handlers must check
    /// this (or subscribe again) after the bus was re-initialized.
    pub fn is_subscribed(&self, handler: &HandlerRef) -> bool {
        self.inner.shared.subscribers.contains(handler)
    }

    /// Number of registered subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.shared.subscribers.len()
    }

    /// Number of events waiting in the async queue (0 when not initialized).
    pub fn pending_count(&self) -> usize {
        self.running()
            .as_ref()
            .map(|r| r.tx.max_capacity() - r.tx.capacity())
            .unwrap_or(0)
    }

    /// Returns a snapshot of the bus counters.
    pub fn stats(&self) -> BusStats {
        let c = &self.inner.shared.counters;
        BusStats {
            published: c.published.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            panicked: c.panicked.load(Ordering::Relaxed),
        }
    }

    /// Milliseconds on the bus clock (the value used to stamp events).
    pub fn now_ms(&self) -> u32 {
        self.inner.shared.now_ms()
    }
}

/// Drains the queue until cancelled or until every sender is gone.
///
/// On exit the queue is closed and remaining events are dropped undelivered.
async fn dispatch_loop(
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<Event>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => shared.dispatch(event),
                None => break,
            },
        }
    }

    rx.close();
    let mut discarded = 0usize;
    while let Ok(event) = rx.try_recv() {
        drop(event);
        discarded += 1;
    }
    if discarded > 0 {
        debug!(discarded, "queued events released on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::subscribers::HandlerFn;

    fn counting(count: &Arc<AtomicUsize>) -> HandlerRef {
        let count = Arc::clone(count);
        HandlerFn::arc("counting", move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn wait_dispatched(bus: &EventBus, n: u64) {
        for _ in 0..1000 {
            if bus.stats().dispatched >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("dispatch did not reach {n}, stats={:?}", bus.stats());
    }

    #[tokio::test]
    async fn test_operations_require_init() {
        let bus = EventBus::new(BusConfig::default());
        let h = HandlerFn::arc("noop", |_| {});

        assert!(matches!(
            bus.post(EventId::SYSTEM_READY, SourceId::SYSTEM),
            Err(BusError::InvalidState { .. })
        ));
        assert!(matches!(
            bus.subscribe(EventId::ANY, Arc::clone(&h)),
            Err(BusError::InvalidState { .. })
        ));
        assert!(matches!(
            bus.deinit().await,
            Err(BusError::InvalidState { .. })
        ));
        assert_eq!(bus.pending_count(), 0);

        bus.init().unwrap();
        assert!(matches!(bus.init(), Err(BusError::InvalidState { .. })));
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_capacity_is_rejected() {
        let bus = EventBus::new(BusConfig::with_capacity(0));
        assert!(matches!(
            bus.init(),
            Err(BusError::InvalidArgument { .. })
        ));
        assert!(!bus.is_initialized());
    }

    #[tokio::test]
    async fn test_async_delivery_is_fifo() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        bus.subscribe(
            EventId::ANY,
            HandlerFn::arc("order", move |ev| seen_in.lock().unwrap().push(ev.id.0)),
        )
        .unwrap();

        for raw in 0x1000u16..0x1010 {
            bus.post(EventId(raw), SourceId::USER).unwrap();
        }
        wait_dispatched(&bus, 16).await;

        let expected: Vec<u16> = (0x1000u16..0x1010).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_filter_and_wildcard() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();

        let any = Arc::new(AtomicUsize::new(0));
        let exact = Arc::new(AtomicUsize::new(0));
        bus.subscribe(EventId::ANY, counting(&any)).unwrap();
        bus.subscribe(EventId::LINK_CONNECTED, counting(&exact))
            .unwrap();

        bus.post_sync(EventId::LINK_CONNECTED, SourceId::LINK).unwrap();
        bus.post_sync(EventId::LINK_DISCONNECTED, SourceId::LINK)
            .unwrap();
        bus.post_sync(EventId::SYSTEM_READY, SourceId::SYSTEM).unwrap();

        assert_eq!(any.load(Ordering::SeqCst), 3);
        assert_eq!(exact.load(Ordering::SeqCst), 1);
        assert_eq!(bus.stats().delivered, 4);
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_releases_payload() {
        let bus = EventBus::new(BusConfig::with_capacity(2));
        bus.init().unwrap();

        // Current-thread runtime: the dispatch task cannot run until we yield.
        bus.post(EventId::USER_BASE, SourceId::USER).unwrap();
        bus.post(EventId::USER_BASE, SourceId::USER).unwrap();
        assert_eq!(bus.pending_count(), 2);

        let payload = Payload::from(vec![1u8, 2, 3]);
        let retained = payload.clone();
        let err = bus
            .publish(Event::new(EventId::USER_BASE, SourceId::USER).with_payload(payload))
            .unwrap_err();

        assert_eq!(err, BusError::QueueFull { id: EventId::USER_BASE });
        assert_eq!(bus.stats().dropped, 1);
        assert_eq!(bus.stats().published, 2);
        assert_eq!(retained.handle_count(), 1);

        wait_dispatched(&bus, 2).await;
        assert_eq!(bus.pending_count(), 0);
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribe_semantics() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let h = counting(&count);
        bus.subscribe(EventId::LINK_CONNECTED, Arc::clone(&h)).unwrap();
        bus.subscribe(EventId::SYSTEM_READY, Arc::clone(&h)).unwrap();

        bus.unsubscribe(EventId::LINK_CONNECTED, &h).unwrap();
        assert_eq!(
            bus.unsubscribe(EventId::LINK_CONNECTED, &h),
            Err(BusError::NotFound {
                filter: EventId::LINK_CONNECTED
            })
        );

        bus.post_sync(EventId::LINK_CONNECTED, SourceId::LINK).unwrap();
        bus.post_sync(EventId::SYSTEM_READY, SourceId::SYSTEM).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert_eq!(bus.unsubscribe_all(&h).unwrap(), 1);
        bus.post_sync(EventId::SYSTEM_READY, SourceId::SYSTEM).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_timestamp_stamped_only_when_zero() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();

        let stamps = Arc::new(Mutex::new(Vec::new()));
        let stamps_in = Arc::clone(&stamps);
        bus.subscribe(
            EventId::ANY,
            HandlerFn::arc("stamps", move |ev| stamps_in.lock().unwrap().push(ev.timestamp)),
        )
        .unwrap();

        bus.publish_sync(Event::new(EventId::USER_BASE, SourceId::USER).with_timestamp(77))
            .unwrap();
        assert_eq!(*stamps.lock().unwrap(), vec![77]);
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_deinit_releases_queued_payloads_and_allows_reinit() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(EventId::ANY, counting(&count)).unwrap();

        let payload = Payload::from(vec![0u8; 16]);
        let retained = payload.clone();
        bus.publish(Event::new(EventId::USER_BASE, SourceId::USER).with_payload(payload))
            .unwrap();
        assert_eq!(bus.pending_count(), 1);

        bus.deinit().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(retained.handle_count(), 1);
        assert_eq!(bus.subscriber_count(), 0);

        bus.init().unwrap();
        bus.subscribe(EventId::ANY, counting(&count)).unwrap();
        bus.post_sync(EventId::SYSTEM_READY, SourceId::SYSTEM).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_post_data_empty_degrades_to_post() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();

        let had_payload = Arc::new(Mutex::new(None));
        let had_in = Arc::clone(&had_payload);
        bus.subscribe(
            EventId::ANY,
            HandlerFn::arc("payload", move |ev| {
                *had_in.lock().unwrap() = Some(ev.payload.is_some())
            }),
        )
        .unwrap();

        bus.post_data(EventId::TRANSPORT_DATA, SourceId::TRANSPORT, &[])
            .unwrap();
        wait_dispatched(&bus, 1).await;
        assert_eq!(*had_payload.lock().unwrap(), Some(false));
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_may_publish_and_unsubscribe_during_dispatch() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let victim = counting(&count);

        let bus_in = bus.clone();
        let victim_in = Arc::clone(&victim);
        let killer = HandlerFn::arc("killer", move |ev| {
            if ev.id == EventId::SYSTEM_ERROR {
                bus_in.unsubscribe(EventId::ANY, &victim_in).unwrap();
                bus_in.post(EventId::SYSTEM_REBOOT, SourceId::SYSTEM).unwrap();
            }
        });
        bus.subscribe(EventId::ANY, killer).unwrap();
        bus.subscribe(EventId::ANY, victim).unwrap();

        bus.post(EventId::SYSTEM_ERROR, SourceId::SYSTEM).unwrap();
        wait_dispatched(&bus, 2).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(), 1);
        bus.deinit().await.unwrap();
    }
}
