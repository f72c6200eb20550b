//! Bus connection seam.
//!
//! [`BusConnection`] is the boundary to whatever carries signals between
//! processes. The core only needs three things from it: register a match
//! rule with a handler, release a registration, and emit a frame. The
//! connection owns the event loop that calls [`SignalHandler::dispatch`].
//!
//! [`LocalBus`] is an in-process implementation driven by tokio.

pub mod local;

#[cfg(test)]
pub(crate) mod recording;

use std::fmt;
use std::sync::Arc;

use crate::domain::{EventFrame, MatchRule, ReceivedSignal, SubscriptionId};
use crate::error::BusError;

pub use local::{LocalBus, LocalConnection};

/// Receives signals matching a registered [`MatchRule`].
///
/// Called from the connection's event loop, possibly on another thread
/// than the one that subscribed. A slow handler stalls further delivery
/// on that connection, so long-running work should be handed off (for
/// example to a channel or a spawned task).
///
/// Closures with the matching signature implement this trait.
pub trait SignalHandler: Send + Sync {
    /// Handles one delivered signal. Every field is passed through as the
    /// bus delivered it.
    fn dispatch(&self, connection: &dyn BusConnection, signal: &ReceivedSignal);
}

impl<F> SignalHandler for F
where
    F: Fn(&dyn BusConnection, &ReceivedSignal) + Send + Sync,
{
    fn dispatch(&self, connection: &dyn BusConnection, signal: &ReceivedSignal) {
        self(connection, signal);
    }
}

/// Wraps a closure as a shareable [`SignalHandler`].
///
/// Lets the closure's argument types be inferred at the call site.
pub fn handler_fn<F>(f: F) -> Arc<dyn SignalHandler>
where
    F: Fn(&dyn BusConnection, &ReceivedSignal) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A connection to an addressed message bus.
pub trait BusConnection: Send + Sync + fmt::Debug {
    /// Registers `rule` and arranges for `handler` to be called for every
    /// matching signal until the returned id is released.
    ///
    /// # Errors
    ///
    /// Returns a [`BusError`] if the bus rejects the rule.
    fn subscribe_pattern(
        &self,
        rule: &MatchRule,
        handler: Arc<dyn SignalHandler>,
    ) -> Result<SubscriptionId, BusError>;

    /// Releases a registration. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Emits one signal.
    ///
    /// # Errors
    ///
    /// Returns a [`BusError`] if the bus refuses the frame.
    fn emit_signal(&self, frame: &EventFrame) -> Result<(), BusError>;

    /// Unique name of this connection on the bus, if it has one.
    fn unique_name(&self) -> Option<&str> {
        None
    }
}
