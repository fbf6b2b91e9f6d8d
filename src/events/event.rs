//! # Events carried by the bus.
//!
//! An [`Event`] is a small value: a 16-bit [`EventId`], a 16-bit [`SourceId`],
//! a millisecond timestamp and an optional immutable [`Payload`].
//!
//! ## Id space
//! The high byte of an id selects the category, the low byte the concrete event.
//! ```text
//! 0x0000..0x00FF  system        0x0400..0x04FF  input
//! 0x0100..0x01FF  link          0x0500..0x05FF  sensor
//! 0x0200..0x02FF  provisioning  0x0600..0x07FF  audio (reserved)
//! 0x0300..0x03FF  transport     0x0800..0x08FF  command
//! 0x1000..0xFFFE  user          0xFFFF          wildcard (EventId::ANY)
//! ```
//!
//! ## Payload ownership
//! A payload is moved into the event when it is published. The bus drops the
//! event after the last matching subscriber returned, releasing the buffer unless
//! a subscriber cloned the handle to keep it.
//!
//! ## Example
//! ```rust
//! use nodevisor::{Event, EventCategory, EventId, SourceId};
//!
//! let ev = Event::new(EventId::LINK_DISCONNECTED, SourceId::LINK).with_data(&[8, 0]);
//!
//! assert_eq!(ev.id.category(), EventCategory::Link);
//! assert_eq!(ev.data(), &[8, 0]);
//! ```

use std::fmt;
use std::sync::Arc;

/// 16-bit event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u16);

impl EventId {
    /// Wildcard filter: matches every event id.
    pub const ANY: EventId = EventId(0xFFFF);

    // === System (0x0000) ===
    /// Initialization finished.
    pub const SYSTEM_INIT_DONE: EventId = EventId(0x0001);
    /// Every service is up (published on entering READY).
    pub const SYSTEM_READY: EventId = EventId(0x0002);
    /// Fatal system error (published on entering ERROR, consumed by the catch-all).
    pub const SYSTEM_ERROR: EventId = EventId(0x0003);
    /// Heap running low.
    pub const SYSTEM_LOW_MEMORY: EventId = EventId(0x0004);
    /// Reboot imminent.
    pub const SYSTEM_REBOOT: EventId = EventId(0x0005);

    // === Link (0x0100) ===
    /// Link driver started.
    pub const LINK_STARTED: EventId = EventId(0x0101);
    /// Link driver stopped.
    pub const LINK_STOPPED: EventId = EventId(0x0102);
    /// Associated with the access point (no address yet).
    pub const LINK_CONNECTED: EventId = EventId(0x0103);
    /// Link lost.
    pub const LINK_DISCONNECTED: EventId = EventId(0x0104);
    /// Network address acquired.
    pub const LINK_ADDRESS_ACQUIRED: EventId = EventId(0x0105);
    /// Network address lost.
    pub const LINK_ADDRESS_LOST: EventId = EventId(0x0106);
    /// Scan finished.
    pub const LINK_SCAN_DONE: EventId = EventId(0x0110);

    // === Provisioning (0x0200) ===
    /// Provisioning stack initialized.
    pub const PROVISIONING_INIT_DONE: EventId = EventId(0x0201);
    /// Provisioning stack released.
    pub const PROVISIONING_DEINIT_DONE: EventId = EventId(0x0202);
    /// A provisioning peer connected.
    pub const PROVISIONING_PEER_CONNECTED: EventId = EventId(0x0203);
    /// The provisioning peer left.
    pub const PROVISIONING_PEER_DISCONNECTED: EventId = EventId(0x0204);
    /// Credentials received from the peer.
    pub const PROVISIONING_CONFIG_RECEIVED: EventId = EventId(0x0210);
    /// Provisioning finished.
    pub const PROVISIONING_DONE: EventId = EventId(0x0211);

    // === Transport (0x0300) ===
    /// Transport connection attempt in progress.
    pub const TRANSPORT_CONNECTING: EventId = EventId(0x0301);
    /// Transport session established.
    pub const TRANSPORT_CONNECTED: EventId = EventId(0x0302);
    /// Transport session lost.
    pub const TRANSPORT_DISCONNECTED: EventId = EventId(0x0303);
    /// Topic subscription acknowledged.
    pub const TRANSPORT_SUBSCRIBED: EventId = EventId(0x0310);
    /// Message publication acknowledged.
    pub const TRANSPORT_PUBLISHED: EventId = EventId(0x0311);
    /// Inbound message.
    pub const TRANSPORT_DATA: EventId = EventId(0x0320);
    /// Transport error.
    pub const TRANSPORT_ERROR: EventId = EventId(0x03FF);

    // === Input (0x0400) ===
    /// Button pressed.
    pub const INPUT_PRESSED: EventId = EventId(0x0401);
    /// Button released.
    pub const INPUT_RELEASED: EventId = EventId(0x0402);
    /// Single click.
    pub const INPUT_CLICK: EventId = EventId(0x0403);
    /// Double click.
    pub const INPUT_DOUBLE_CLICK: EventId = EventId(0x0404);
    /// Long press.
    pub const INPUT_LONG_PRESS: EventId = EventId(0x0405);

    // === Commands (0x0800) ===
    /// Ask the link collaborator to connect.
    pub const CMD_LINK_CONNECT: EventId = EventId(0x0801);
    /// Ask the link collaborator to disconnect.
    pub const CMD_LINK_DISCONNECT: EventId = EventId(0x0802);
    /// Ask the transport collaborator to connect.
    pub const CMD_TRANSPORT_CONNECT: EventId = EventId(0x0810);
    /// Ask the transport collaborator to disconnect.
    pub const CMD_TRANSPORT_DISCONNECT: EventId = EventId(0x0811);
    /// Ask the transport collaborator to publish the payload.
    pub const CMD_TRANSPORT_PUBLISH: EventId = EventId(0x0812);
    /// Enter provisioning.
    pub const CMD_PROVISIONING_START: EventId = EventId(0x0820);
    /// Leave provisioning (cancel).
    pub const CMD_PROVISIONING_STOP: EventId = EventId(0x0821);

    /// First id of the user-defined range.
    pub const USER_BASE: EventId = EventId(0x1000);

    /// `true` for the wildcard id.
    #[inline]
    pub fn is_any(self) -> bool {
        self == Self::ANY
    }

    /// `true` if a subscription with this filter receives `id`.
    #[inline]
    pub fn matches(self, id: EventId) -> bool {
        self.is_any() || self == id
    }

    /// Category of this id.
    pub fn category(self) -> EventCategory {
        match self.0 {
            0xFFFF => EventCategory::Any,
            0x1000.. => EventCategory::User,
            0x0800..=0x08FF => EventCategory::Command,
            0x0600..=0x07FF => EventCategory::Audio,
            0x0500..=0x05FF => EventCategory::Sensor,
            0x0400..=0x04FF => EventCategory::Input,
            0x0300..=0x03FF => EventCategory::Transport,
            0x0200..=0x02FF => EventCategory::Provisioning,
            0x0100..=0x01FF => EventCategory::Link,
            0x0000..=0x00FF => EventCategory::System,
            _ => EventCategory::Unassigned,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl From<u16> for EventId {
    fn from(raw: u16) -> Self {
        EventId(raw)
    }
}

/// Logical grouping of event ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// System lifecycle.
    System,
    /// Link layer.
    Link,
    /// Out-of-band provisioning.
    Provisioning,
    /// Messaging transport.
    Transport,
    /// Physical inputs.
    Input,
    /// Sensor readings.
    Sensor,
    /// Audio (reserved).
    Audio,
    /// Inter-module commands.
    Command,
    /// User-defined.
    User,
    /// Ids between the command and user ranges.
    Unassigned,
    /// The wildcard id.
    Any,
}

impl EventCategory {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventCategory::System => "system",
            EventCategory::Link => "link",
            EventCategory::Provisioning => "provisioning",
            EventCategory::Transport => "transport",
            EventCategory::Input => "input",
            EventCategory::Sensor => "sensor",
            EventCategory::Audio => "audio",
            EventCategory::Command => "command",
            EventCategory::User => "user",
            EventCategory::Unassigned => "unassigned",
            EventCategory::Any => "any",
        }
    }
}

/// 16-bit identifier of the producer of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u16);

impl SourceId {
    /// Unknown producer.
    pub const UNKNOWN: SourceId = SourceId(0);
    /// The orchestrator / system core.
    pub const SYSTEM: SourceId = SourceId(1);
    /// Link collaborator.
    pub const LINK: SourceId = SourceId(2);
    /// Provisioning collaborator.
    pub const PROVISIONING: SourceId = SourceId(3);
    /// Transport collaborator.
    pub const TRANSPORT: SourceId = SourceId(4);
    /// Input driver.
    pub const INPUT: SourceId = SourceId(5);
    /// First id available to applications.
    pub const USER: SourceId = SourceId(100);
}

/// Immutable, reference-counted event payload.
///
/// Cloning is cheap (bumps a reference count). The underlying buffer is freed
/// when the event and every clone are dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload(Arc<[u8]>);

impl Payload {
    /// Copies `data` into a new buffer, reporting allocation failure instead of aborting.
    pub(crate) fn try_copy(data: &[u8]) -> Option<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(data.len()).ok()?;
        buf.extend_from_slice(data);
        Some(Self(buf.into()))
    }

    /// Payload bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the payload has no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of live handles to the buffer (the buffer is freed when it reaches zero).
    #[inline]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl From<Arc<[u8]>> for Payload {
    fn from(buf: Arc<[u8]>) -> Self {
        Self(buf)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(buf: Vec<u8>) -> Self {
        Self(buf.into())
    }
}

impl From<&[u8]> for Payload {
    fn from(buf: &[u8]) -> Self {
        Self(buf.into())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.0.len())
    }
}

/// Event published on the bus.
///
/// - `timestamp`: milliseconds on the bus clock; `0` means "stamp on publish".
/// - `payload`: optional bytes owned by the event until dispatch completes.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event identifier.
    pub id: EventId,
    /// Producer identifier.
    pub source: SourceId,
    /// Milliseconds since the bus clock epoch (wrapping).
    pub timestamp: u32,
    /// Optional payload.
    pub payload: Option<Payload>,
}

impl Event {
    /// Creates an event without payload and with an unset timestamp.
    pub fn new(id: EventId, source: SourceId) -> Self {
        Self {
            id,
            source,
            timestamp: 0,
            payload: None,
        }
    }

    /// Attaches a payload.
    #[inline]
    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Copies `data` into a new payload.
    #[inline]
    pub fn with_data(self, data: &[u8]) -> Self {
        self.with_payload(data)
    }

    /// Sets an explicit timestamp.
    #[inline]
    pub fn with_timestamp(mut self, ms: u32) -> Self {
        self.timestamp = ms;
        self
    }

    /// Payload bytes, empty when there is no payload.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.payload.as_ref().map(Payload::as_bytes).unwrap_or(&[])
    }
}
