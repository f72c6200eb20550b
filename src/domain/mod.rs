//! Domain layer: addressing, name rules, frames and handles.
//!
//! This module contains the value types shared by the subscription and
//! emission sides: stored address defaults and their resolution, match
//! rules, outbound frames, delivered signals, and subscription handles.

pub mod address;
pub mod frame;
pub mod names;

pub use address::{BaseAddress, MatchRule, resolve, resolve_required};
pub use frame::{EventFrame, Payload, ReceivedSignal, SubscriptionId};
