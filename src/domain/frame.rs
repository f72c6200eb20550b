//! Signal frames, payloads and subscription handles.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Opaque handle for one subscription registered with a bus connection.
///
/// Handed out by [`crate::bus::BusConnection::subscribe_pattern`] and
/// released with [`crate::bus::BusConnection::unsubscribe`]. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(NonZeroU32);

impl SubscriptionId {
    /// Wraps a non-zero raw id.
    #[must_use]
    pub const fn new(raw: NonZeroU32) -> Self {
        Self(raw)
    }

    /// Wraps a raw id, returning `None` for zero.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signal payload. Carried through the core without being inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(serde_json::Value);

impl Payload {
    /// Wraps a JSON value.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Returns the wrapped value.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consumes the payload, returning the wrapped value.
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Fully resolved outbound signal handed to the bus connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Destination endpoint. `None` broadcasts to every listener.
    pub bus_endpoint: Option<String>,
    /// Interface name.
    pub interface: String,
    /// Object path of the emitting object.
    pub object_path: String,
    /// Signal (member) name.
    pub signal_name: String,
    /// Optional payload.
    pub payload: Option<Payload>,
}

/// A signal delivered by the bus to a subscription handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedSignal {
    /// Unique name of the sending connection.
    pub sender: String,
    /// Object path the signal was emitted from.
    pub object_path: String,
    /// Interface name.
    pub interface: String,
    /// Signal (member) name.
    pub signal_name: String,
    /// Optional payload.
    pub payload: Option<Payload>,
}

impl ReceivedSignal {
    /// Builds the delivered form of `frame` as sent by `sender`.
    #[must_use]
    pub fn from_frame(sender: impl Into<String>, frame: &EventFrame) -> Self {
        Self {
            sender: sender.into(),
            object_path: frame.object_path.clone(),
            interface: frame.interface.clone(),
            signal_name: frame.signal_name.clone(),
            payload: frame.payload.clone(),
        }
    }
}
