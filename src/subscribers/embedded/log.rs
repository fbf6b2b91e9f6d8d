//! # LogWriter: event printer
//!
//! A minimal subscriber that logs every [`Event`] through `tracing`, tagged with
//! its category. It plays the role of a status display: observability only,
//! never feeding anything back into the bus.
//!
//! ## Example output
//! ```text
//! INFO nodevisor::log: [system] id=0x0001 source=1 ts=0
//! INFO nodevisor::log: [link] id=0x0103 source=2 ts=12
//! INFO nodevisor::log: [transport] id=0x0320 source=4 ts=840 len=17
//! WARN nodevisor::log: [system] id=0x0003 source=1 ts=901
//! ```

use tracing::{info, warn};

use crate::events::{Event, EventId};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Subscribe for LogWriter {
    fn on_event(&self, e: &Event) {
        let category = e.id.category().as_label();
        match (e.id, &e.payload) {
            (EventId::SYSTEM_ERROR | EventId::TRANSPORT_ERROR, _) => {
                warn!(target: "nodevisor::log", "[{category}] id={} source={} ts={}", e.id, e.source.0, e.timestamp);
            }
            (_, Some(payload)) => {
                info!(
                    target: "nodevisor::log",
                    "[{category}] id={} source={} ts={} len={}",
                    e.id,
                    e.source.0,
                    e.timestamp,
                    payload.len()
                );
            }
            (_, None) => {
                info!(target: "nodevisor::log", "[{category}] id={} source={} ts={}", e.id, e.source.0, e.timestamp);
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
