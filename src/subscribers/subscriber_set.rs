//! # Subscription list with reentrancy-safe fan-out.
//!
//! Provides [`SubscriberSet`], the list of `(filter, handler)` pairs owned by one
//! [`EventBus`](crate::EventBus), and the dispatch routine that invokes matching handlers.
//!
//! ## Architecture
//! ```text
//! dispatch(event)
//!     │
//!     ├─ lock list ─► collect matching Arc<Subscription> (insertion order) ─► unlock
//!     │
//!     ├──► sub1.active? ──► catch_unwind(handler1.on_event(&event))
//!     ├──► sub2.active? ──► catch_unwind(handler2.on_event(&event))
//!     └──► subN.active? ──► catch_unwind(handlerN.on_event(&event))
//! ```
//!
//! ## Rules
//! - The list lock is never held while a handler runs, so handlers may call
//!   `subscribe`/`unsubscribe` on the same bus.
//! - A subscription added during dispatch is first seen by the next event.
//! - A subscription removed during dispatch is tombstoned and never invoked again,
//!   including for the event currently being dispatched.
//! - Across threads the tombstone is best-effort: a dispatch running on another
//!   thread that already passed the `active` check may still complete one call
//!   after `unsubscribe` returned. Every dispatch that starts after the removal
//!   skips the handler.
//! - A panicking handler is isolated: the panic is logged and counted, the
//!   remaining handlers still receive the event.
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if a handler uses `Arc<Mutex<T>>` and panics while holding the lock.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::events::{Event, EventId};
use crate::subscribers::subscriber::{HandlerRef, same_handler};

/// One registered `(filter, handler)` pair.
struct Subscription {
    filter: EventId,
    handler: HandlerRef,
    active: AtomicBool,
}

impl Subscription {
    fn retire(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Outcome of dispatching one event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delivery {
    /// Handlers that returned normally.
    pub delivered: u64,
    /// Handlers that panicked.
    pub panicked: u64,
}

/// Ordered list of subscriptions.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    entries: Mutex<Vec<Arc<Subscription>>>,
}

impl SubscriberSet {
    fn entries(&self) -> MutexGuard<'_, Vec<Arc<Subscription>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a subscription. The same handler may be registered for several filters.
    pub fn insert(&self, filter: EventId, handler: HandlerRef) {
        trace!(event_id = %filter, handler = handler.name(), "subscribe");
        self.entries().push(Arc::new(Subscription {
            filter,
            handler,
            active: AtomicBool::new(true),
        }));
    }

    /// Removes the oldest subscription matching `(filter, handler)`.
    ///
    /// Returns `false` if nothing matched.
    pub fn remove(&self, filter: EventId, handler: &HandlerRef) -> bool {
        let mut entries = self.entries();
        let Some(pos) = entries
            .iter()
            .position(|s| s.filter == filter && same_handler(&s.handler, handler))
        else {
            return false;
        };
        entries.remove(pos).retire();
        drop(entries);

        trace!(event_id = %filter, handler = handler.name(), "unsubscribe");
        true
    }

    /// Removes every subscription owned by `handler`, whatever its filter.
    ///
    /// Returns the number of subscriptions removed.
    pub fn remove_all(&self, handler: &HandlerRef) -> usize {
        let mut removed = 0;
        self.entries().retain(|s| {
            if same_handler(&s.handler, handler) {
                s.retire();
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Retires and drops every subscription.
    pub fn clear(&self) {
        let drained: Vec<_> = self.entries().drain(..).collect();
        for s in &drained {
            s.retire();
        }
    }

    /// `true` if `handler` is registered under any filter.
    pub fn contains(&self, handler: &HandlerRef) -> bool {
        self.entries()
            .iter()
            .any(|s| same_handler(&s.handler, handler))
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Invokes every active handler whose filter matches `event`.
    pub fn dispatch(&self, event: &Event) -> Delivery {
        let matching: Vec<Arc<Subscription>> = self
            .entries()
            .iter()
            .filter(|s| s.filter.matches(event.id))
            .cloned()
            .collect();

        let mut out = Delivery::default();
        for sub in matching {
            // Checked per call, not held across it: see the cross-thread rule above.
            if !sub.is_active() {
                continue;
            }
            let handler = &sub.handler;
            match catch_unwind(AssertUnwindSafe(|| handler.on_event(event))) {
                Ok(()) => out.delivered += 1,
                Err(panic_err) => {
                    out.panicked += 1;
                    warn!(
                        event_id = %event.id,
                        handler = handler.name(),
                        info = %panic_message(panic_err.as_ref()),
                        "handler panicked"
                    );
                }
            }
        }
        out
    }
}

fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
