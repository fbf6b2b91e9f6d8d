//! # Event handler trait.
//!
//! Provides [`Subscribe`], the extension point for plugging handlers into the
//! [`EventBus`](crate::EventBus).
//!
//! Handlers are invoked:
//! - from the bus dispatch task for events published with [`EventBus::publish`](crate::EventBus::publish),
//! - from the publisher's own task for [`EventBus::publish_sync`](crate::EventBus::publish_sync).
//!
//! ## Rules
//! - `on_event` must be short and non-blocking: a slow handler stalls every
//!   other async subscriber (or the publishing task for sync publishes).
//! - Handlers may publish, subscribe and unsubscribe from inside `on_event`.
//! - A panic is caught by the bus, logged and counted; remaining handlers still run.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use nodevisor::{Event, Subscribe};
//!
//! #[derive(Default)]
//! struct Counter(AtomicUsize);
//!
//! impl Subscribe for Counter {
//!     fn on_event(&self, _ev: &Event) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//!
//!     fn name(&self) -> &'static str { "counter" }
//! }
//!
//! let handler: nodevisor::HandlerRef = Arc::new(Counter::default());
//! assert_eq!(handler.name(), "counter");
//! ```

use std::sync::Arc;

use crate::events::Event;

/// Shared handle to a subscriber.
///
/// Handler identity (used by `unsubscribe`) is the identity of the allocation
/// behind the `Arc`: clones of one handle are the same handler.
pub type HandlerRef = Arc<dyn Subscribe>;

/// Event handler registered on the bus.
///
/// The handler owns whatever context it needs; there is no separate context argument.
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// The event (and its payload) is borrowed for the duration of the call.
    /// Clone [`Event::payload`] to keep the bytes alive past the callback.
    fn on_event(&self, event: &Event);

    /// Returns the handler name used in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Returns `true` if both handles point to the same handler.
#[inline]
pub(crate) fn same_handler(a: &HandlerRef, b: &HandlerRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Closure-backed handler.
///
/// ## Example
/// ```rust
/// use nodevisor::{HandlerFn, HandlerRef};
///
/// let h: HandlerRef = HandlerFn::arc("printer", |ev| println!("event {}", ev.id));
/// assert_eq!(h.name(), "printer");
/// ```
pub struct HandlerFn<F> {
    name: &'static str,
    func: F,
}

impl<F> HandlerFn<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    /// Creates a new closure handler.
    pub fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }

    /// Creates the handler and returns it as a [`HandlerRef`].
    pub fn arc(name: &'static str, func: F) -> HandlerRef {
        Arc::new(Self::new(name, func))
    }
}

impl<F> Subscribe for HandlerFn<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event) {
        (self.func)(event)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_identity() {
        let a = HandlerFn::arc("a", |_| {});
        let b = HandlerFn::arc("a", |_| {});
        assert!(same_handler(&a, &Arc::clone(&a)));
        assert!(!same_handler(&a, &b));
    }
}
