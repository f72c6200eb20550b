//! Address defaults and fallback resolution.
//!
//! A signal is addressed by {bus endpoint, interface, object path, signal
//! name}. Callers store defaults for the first three in a [`BaseAddress`]
//! and may override any of them per call. [`resolve`] is the single place
//! where an explicit argument and a stored default are combined.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ReceivedSignal;

/// Returns `value` unless it is empty.
#[must_use]
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Combines an explicit argument with a stored default.
///
/// An explicit value always wins, and an explicit empty string resolves to
/// "absent" even when a default is stored. Without an explicit value the
/// default is used. Empty strings never survive resolution.
#[must_use]
pub fn resolve(explicit: Option<&str>, fallback: Option<&str>) -> Option<String> {
    match explicit {
        Some(value) => non_empty(Some(value)).map(str::to_owned),
        None => non_empty(fallback).map(str::to_owned),
    }
}

/// Like [`resolve`] for a component that must end up present: an explicit
/// empty string counts as omitted and `fallback` is used.
#[must_use]
pub fn resolve_required(explicit: Option<&str>, fallback: &str) -> String {
    non_empty(explicit).unwrap_or(fallback).to_owned()
}

/// Default address components stored by a registry or emitter.
///
/// Every component is optional here; the emitter additionally requires
/// `interface` and `object_path` at construction time. Setters normalize
/// empty strings to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseAddress {
    /// Bus endpoint (unique or well-known name). `None` means any/broadcast.
    pub bus_endpoint: Option<String>,
    /// Interface name qualifying the signals.
    pub interface: Option<String>,
    /// Object path of the emitting object.
    pub object_path: Option<String>,
}

impl BaseAddress {
    /// Creates an address with no stored components.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default bus endpoint.
    #[must_use]
    pub fn with_bus_endpoint(mut self, bus_endpoint: impl Into<String>) -> Self {
        self.bus_endpoint = owned_non_empty(bus_endpoint.into());
        self
    }

    /// Sets the default interface name.
    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = owned_non_empty(interface.into());
        self
    }

    /// Sets the default object path.
    #[must_use]
    pub fn with_object_path(mut self, object_path: impl Into<String>) -> Self {
        self.object_path = owned_non_empty(object_path.into());
        self
    }

    /// Builds the subscription pattern for `signal_name`, filling the
    /// omitted endpoint and object path from the stored defaults.
    ///
    /// The interface always comes from the stored default.
    #[must_use]
    pub fn match_rule(
        &self,
        bus_endpoint: Option<&str>,
        object_path: Option<&str>,
        signal_name: &str,
    ) -> MatchRule {
        MatchRule {
            sender: resolve(bus_endpoint, self.bus_endpoint.as_deref()),
            interface: resolve(None, self.interface.as_deref()),
            object_path: resolve(object_path, self.object_path.as_deref()),
            signal_name: signal_name.to_string(),
        }
    }
}

fn owned_non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// A subscription pattern registered with the bus connection.
///
/// `None` fields are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRule {
    /// Sender to match, by unique or well-known name.
    pub sender: Option<String>,
    /// Interface to match.
    pub interface: Option<String>,
    /// Object path to match.
    pub object_path: Option<String>,
    /// Signal (member) name. Always explicit.
    pub signal_name: String,
}

impl MatchRule {
    /// Returns `true` if `signal` satisfies every non-wildcard field.
    ///
    /// `sender_names` lists the well-known names owned by the sender; the
    /// sender field matches either the unique name or one of those.
    #[must_use]
    pub fn matches(&self, signal: &ReceivedSignal, sender_names: &[String]) -> bool {
        if let Some(sender) = &self.sender
            && *sender != signal.sender
            && !sender_names.iter().any(|n| n == sender)
        {
            return false;
        }
        if let Some(interface) = &self.interface
            && *interface != signal.interface
        {
            return false;
        }
        if let Some(path) = &self.object_path
            && *path != signal.object_path
        {
            return false;
        }
        self.signal_name == signal.signal_name
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type='signal'")?;
        if let Some(sender) = &self.sender {
            write!(f, ",sender='{sender}'")?;
        }
        if let Some(interface) = &self.interface {
            write!(f, ",interface='{interface}'")?;
        }
        if let Some(path) = &self.object_path {
            write!(f, ",path='{path}'")?;
        }
        write!(f, ",member='{}'", self.signal_name)
    }
}
