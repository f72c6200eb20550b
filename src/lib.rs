//! # bus-signals
//!
//! Signal subscription and emission on top of an addressed message bus.
//!
//! Signals are addressed by {bus endpoint, interface, object path, signal
//! name}. This crate decides what gets subscribed, how partial addresses
//! are filled in, how delivered signals reach a handler, and how
//! subscriptions are reliably released. The bus connection itself, and the
//! payload encoding, are collaborators behind [`bus::BusConnection`].
//!
//! ## Architecture
//!
//! ```text
//! Application
//!     │
//!     ├── SubscriptionRegistry (signal/)   inbound: match rules, dispatch
//!     ├── SignalEmitter (signal/)          outbound: validated frames
//!     │
//!     ├── BaseAddress / MatchRule / EventFrame (domain/)
//!     │
//!     └── BusConnection (bus/)
//!           └── LocalBus: in-process bus on tokio
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bus_signals::bus::{BusConnection, LocalBus, handler_fn};
//! use bus_signals::domain::BaseAddress;
//! use bus_signals::signal::{SignalEmitter, SubscriptionRegistry};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = LocalBus::new(64);
//! let conn: Arc<dyn BusConnection> = bus.connect()?;
//! let base = BaseAddress::new()
//!     .with_interface("com.example.Iface")
//!     .with_object_path("/com/example/obj");
//!
//! let registry = SubscriptionRegistry::new(
//!     Arc::clone(&conn),
//!     base.clone(),
//!     handler_fn(|_, signal| println!("got {}", signal.signal_name)),
//! );
//! registry.subscribe("Ping")?;
//!
//! let emitter = SignalEmitter::new(conn, base)?;
//! emitter.emit("Ping", None)?;
//!
//! registry.close();
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod signal;

pub use error::{BusError, SignalError};
