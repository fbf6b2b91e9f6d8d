//! # Reconnector: fixed-interval retry loop of a connectivity collaborator.
//!
//! A [`Reconnector`] wraps one [`Connectivity`] collaborator and runs the
//! two-outcome loop shared by the link and transport collaborators: connected, or
//! waiting for the next attempt. It is not a state machine of its own.
//!
//! ## Lifecycle
//! ```text
//! step(now) ── disconnected && timer.poll(now)? ──► post(connecting) ──► target.connect()
//!                                                                         └─ Err ─► on_error(now)
//! on_connected()        ──► connected,    timer reset,          post(connected)
//! on_disconnected(now)  ──► disconnected, timer armed at `now`, post(disconnected)
//! on_error(now)         ──► disconnected, timer armed at `now`, post(error)
//! ```
//!
//! ## Rules
//! - The first step after creation attempts at once.
//! - After a failure, the next attempt waits for the configured interval; each
//!   attempt re-arms the timer, so an attempt that never reports back is retried
//!   one interval later.
//! - The driver reports outcomes through `on_connected` / `on_disconnected` / `on_error`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::collaborator::Connectivity;
use crate::core::config::ReconnectConfig;
use crate::events::{EventBus, EventId, SourceId};
use crate::policies::{Clock, RetryTimer, Tick};

/// Events a [`Reconnector`] posts for its collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectEvents {
    /// Posted before each attempt, if any.
    pub connecting: Option<EventId>,
    /// Posted on `on_connected`.
    pub connected: EventId,
    /// Posted on `on_disconnected`.
    pub disconnected: EventId,
    /// Posted on `on_error`, if any.
    pub error: Option<EventId>,
}

impl ReconnectEvents {
    /// Link lifecycle events.
    pub const LINK: ReconnectEvents = ReconnectEvents {
        connecting: None,
        connected: EventId::LINK_CONNECTED,
        disconnected: EventId::LINK_DISCONNECTED,
        error: None,
    };

    /// Transport lifecycle events.
    pub const TRANSPORT: ReconnectEvents = ReconnectEvents {
        connecting: Some(EventId::TRANSPORT_CONNECTING),
        connected: EventId::TRANSPORT_CONNECTED,
        disconnected: EventId::TRANSPORT_DISCONNECTED,
        error: Some(EventId::TRANSPORT_ERROR),
    };
}

struct ReconnectState {
    timer: RetryTimer,
    connected: bool,
    attempts: u64,
}

/// Retry loop around one connectivity collaborator.
pub struct Reconnector<T: Connectivity + ?Sized> {
    target: Arc<T>,
    bus: EventBus,
    source: SourceId,
    events: ReconnectEvents,
    cfg: ReconnectConfig,
    state: Mutex<ReconnectState>,
}

impl<T: Connectivity + ?Sized> Reconnector<T> {
    /// Creates a disconnected reconnector whose first attempt is due immediately.
    pub fn new(
        target: Arc<T>,
        bus: EventBus,
        source: SourceId,
        events: ReconnectEvents,
        cfg: ReconnectConfig,
    ) -> Self {
        let timer = RetryTimer::new(cfg.policy());
        Self {
            target,
            bus,
            source,
            events,
            cfg,
            state: Mutex::new(ReconnectState {
                timer,
                connected: false,
                attempts: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ReconnectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post(&self, id: EventId) {
        if let Err(e) = self.bus.post(id, self.source) {
            warn!(
                collaborator = self.target.name(),
                event_id = %id,
                error = %e,
                "lifecycle event not posted"
            );
        }
    }

    /// Attempts a connection if disconnected and the retry timer is due.
    ///
    /// Returns `true` if an attempt was made.
    pub fn step(&self, now: Tick) -> bool {
        let attempt = {
            let mut st = self.state();
            if st.connected || !st.timer.poll(now) {
                return false;
            }
            st.attempts += 1;
            st.attempts
        };

        debug!(collaborator = self.target.name(), attempt, now, "connection attempt");
        if let Some(id) = self.events.connecting {
            self.post(id);
        }
        if let Err(e) = self.target.connect() {
            warn!(collaborator = self.target.name(), attempt, error = %e, "connect failed");
            self.on_error(now);
        }
        true
    }

    /// Reports an established connection.
    pub fn on_connected(&self) {
        {
            let mut st = self.state();
            st.connected = true;
            st.timer.record_success();
        }
        info!(collaborator = self.target.name(), "connected");
        self.post(self.events.connected);
    }

    /// Reports a lost (or refused) connection at `now`; the next attempt waits for the interval.
    pub fn on_disconnected(&self, now: Tick) {
        {
            let mut st = self.state();
            st.connected = false;
            st.timer.record_failure(now);
        }
        info!(collaborator = self.target.name(), now, "disconnected");
        self.post(self.events.disconnected);
    }

    /// Reports a connection error at `now`; the next attempt waits for the interval.
    pub fn on_error(&self, now: Tick) {
        {
            let mut st = self.state();
            st.connected = false;
            st.timer.record_failure(now);
        }
        if let Some(id) = self.events.error {
            self.post(id);
        }
    }

    /// Forgets the last failure so the next step attempts at once.
    pub fn reset(&self) {
        self.state().timer.record_success();
    }

    /// `true` after `on_connected` until the next disconnect or error.
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Number of attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.state().attempts
    }

    /// Tick of the last failure or attempt, if any.
    pub fn last_failure(&self) -> Option<Tick> {
        self.state().timer.last_failure()
    }

    /// Host loop: calls [`step`](Self::step) every `step_interval` until `token` is cancelled.
    pub async fn run(&self, clock: &dyn Clock, token: CancellationToken) {
        let mut ticker = interval(self.cfg.step_interval_clamped());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.step(clock.now());
                }
            }
        }
        debug!(collaborator = self.target.name(), "reconnect loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::core::collaborator::Collaborator;
    use crate::error::ControlError;
    use crate::events::BusConfig;
    use crate::policies::MonotonicClock;
    use crate::subscribers::HandlerFn;

    #[derive(Default)]
    struct FakeLink {
        connects: AtomicUsize,
        refuse: AtomicBool,
    }

    impl Collaborator for FakeLink {
        fn name(&self) -> &'static str {
            "fake-link"
        }
        fn start(&self) -> Result<(), ControlError> {
            Ok(())
        }
        fn stop(&self) -> Result<(), ControlError> {
            Ok(())
        }
    }

    impl Connectivity for FakeLink {
        fn connect(&self) -> Result<(), ControlError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse.load(Ordering::SeqCst) {
                Err(ControlError::Failed {
                    collaborator: "fake-link",
                    reason: "refused".into(),
                })
            } else {
                Ok(())
            }
        }
        fn disconnect(&self) -> Result<(), ControlError> {
            Ok(())
        }
    }

    fn reconnector(bus: &EventBus, interval_ms: i64) -> (Arc<FakeLink>, Reconnector<FakeLink>) {
        let link = Arc::new(FakeLink::default());
        let cfg = ReconnectConfig {
            interval_ms,
            ..ReconnectConfig::default()
        };
        let r = Reconnector::new(
            Arc::clone(&link),
            bus.clone(),
            SourceId::TRANSPORT,
            ReconnectEvents::TRANSPORT,
            cfg,
        );
        (link, r)
    }

    #[tokio::test]
    async fn test_first_attempt_is_immediate() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();
        let (link, r) = reconnector(&bus, 5000);

        assert!(r.step(0));
        assert_eq!(link.connects.load(Ordering::SeqCst), 1);
        assert!(!r.step(1));
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_waits_interval_after_failure() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();
        let (link, r) = reconnector(&bus, 5000);

        r.on_disconnected(0);
        assert!(!r.step(4999));
        assert!(r.step(5000));
        assert_eq!(link.connects.load(Ordering::SeqCst), 1);
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connect_rearms_at_failure() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();
        let (link, r) = reconnector(&bus, 1000);
        link.refuse.store(true, Ordering::SeqCst);

        assert!(r.step(10));
        assert_eq!(r.last_failure(), Some(10));
        assert!(!r.step(1009));
        assert!(r.step(1010));
        assert_eq!(r.attempts(), 2);
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_policy_never_retries() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();
        let (link, r) = reconnector(&bus, -1);

        assert!(r.step(0));
        r.on_error(1);
        assert!(!r.step(u32::MAX / 2));
        assert_eq!(link.connects.load(Ordering::SeqCst), 1);
        bus.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_connected_stops_attempts_and_posts_events() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        bus.subscribe(
            EventId::ANY,
            HandlerFn::arc("seen", move |ev| seen_in.lock().unwrap().push(ev.id)),
        )
        .unwrap();
        let (_link, r) = reconnector(&bus, 0);

        assert!(r.step(0));
        r.on_connected();
        assert!(r.is_connected());
        assert!(!r.step(100));
        r.on_disconnected(200);
        assert!(r.step(200));

        while bus.stats().dispatched < 4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                EventId::TRANSPORT_CONNECTING,
                EventId::TRANSPORT_CONNECTED,
                EventId::TRANSPORT_DISCONNECTED,
                EventId::TRANSPORT_CONNECTING,
            ]
        );
        bus.deinit().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_steps_on_interval() {
        let bus = EventBus::new(BusConfig::default());
        bus.init().unwrap();
        let (link, r) = reconnector(&bus, 1000);
        let r = Arc::new(r);
        link.refuse.store(true, Ordering::SeqCst);

        let clock = MonotonicClock::new();
        let token = CancellationToken::new();
        let task = {
            let r = Arc::clone(&r);
            let token = token.clone();
            tokio::spawn(async move { r.run(&clock, token).await })
        };

        tokio::time::sleep(Duration::from_millis(2600)).await;
        token.cancel();
        task.await.unwrap();

        // Attempts at 0, 1000 and 2000 ms.
        assert_eq!(link.connects.load(Ordering::SeqCst), 3);
        bus.deinit().await.unwrap();
    }
}
