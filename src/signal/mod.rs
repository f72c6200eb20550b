//! Signal layer: subscription registry and emitter.
//!
//! [`SubscriptionRegistry`] handles the inbound side (match rules and
//! dispatch), [`SignalEmitter`] the outbound side. Both sit directly on a
//! [`crate::bus::BusConnection`] and can share one.

pub mod emitter;
pub mod registry;

pub use emitter::{OutboundSignal, SignalEmitter};
pub use registry::SubscriptionRegistry;
