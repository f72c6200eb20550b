//! Outbound signal emission.
//!
//! [`SignalEmitter`] validates its base address once, at construction, and
//! fills every omitted component of an [`OutboundSignal`] from it before
//! handing the frame to the bus connection.

use std::sync::Arc;

use crate::bus::BusConnection;
use crate::domain::{BaseAddress, EventFrame, Payload, resolve, resolve_required};
use crate::error::SignalError;

/// A signal to send, with optional per-call address overrides.
///
/// Overrides left unset are taken from the emitter's defaults. An explicit
/// empty bus endpoint broadcasts even when the emitter has a default
/// endpoint; an explicit empty interface or object path counts as unset.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundSignal {
    /// Signal (member) name.
    pub signal_name: String,
    /// Destination override.
    pub bus_endpoint: Option<String>,
    /// Interface override.
    pub interface: Option<String>,
    /// Object path override.
    pub object_path: Option<String>,
    /// Optional payload.
    pub payload: Option<Payload>,
}

impl OutboundSignal {
    /// Creates a signal with no overrides and no payload.
    #[must_use]
    pub fn new(signal_name: impl Into<String>) -> Self {
        Self {
            signal_name: signal_name.into(),
            bus_endpoint: None,
            interface: None,
            object_path: None,
            payload: None,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Overrides the destination endpoint. `""` broadcasts.
    #[must_use]
    pub fn with_destination(mut self, bus_endpoint: impl Into<String>) -> Self {
        self.bus_endpoint = Some(bus_endpoint.into());
        self
    }

    /// Overrides the interface name.
    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Overrides the object path.
    #[must_use]
    pub fn with_object_path(mut self, object_path: impl Into<String>) -> Self {
        self.object_path = Some(object_path.into());
        self
    }
}

/// Sends signals from a fixed base address.
#[derive(Debug, Clone)]
pub struct SignalEmitter {
    connection: Arc<dyn BusConnection>,
    bus_endpoint: Option<String>,
    interface: String,
    object_path: String,
}

impl SignalEmitter {
    /// Creates an emitter, validating the base address.
    ///
    /// The bus endpoint may be unset, meaning broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Validation`] if the interface or the object
    /// path is empty. No bus call is made in that case.
    pub fn new(
        connection: Arc<dyn BusConnection>,
        defaults: BaseAddress,
    ) -> Result<Self, SignalError> {
        let BaseAddress {
            bus_endpoint,
            interface,
            object_path,
        } = defaults;
        let interface = interface
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SignalError::Validation("interface cannot be empty".to_string()))?;
        let object_path = object_path
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SignalError::Validation("object path cannot be empty".to_string()))?;

        Ok(Self {
            connection,
            bus_endpoint: bus_endpoint.filter(|v| !v.is_empty()),
            interface,
            object_path,
        })
    }

    /// Resolves `signal` against the stored defaults without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Validation`] if the signal name is empty.
    pub fn resolve_frame(&self, signal: OutboundSignal) -> Result<EventFrame, SignalError> {
        if signal.signal_name.is_empty() {
            return Err(SignalError::Validation(
                "signal name cannot be empty".to_string(),
            ));
        }
        Ok(EventFrame {
            bus_endpoint: resolve(signal.bus_endpoint.as_deref(), self.bus_endpoint.as_deref()),
            interface: resolve_required(signal.interface.as_deref(), &self.interface),
            object_path: resolve_required(signal.object_path.as_deref(), &self.object_path),
            signal_name: signal.signal_name,
            payload: signal.payload,
        })
    }

    /// Sends one signal. Exactly one emission call reaches the bus; there
    /// is no retry and no buffering.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Validation`] for an empty signal name and
    /// [`SignalError::Emission`] carrying the bus failure if the bus
    /// refuses the frame.
    pub fn send(&self, signal: OutboundSignal) -> Result<(), SignalError> {
        let frame = self.resolve_frame(signal)?;
        if let Err(source) = self.connection.emit_signal(&frame) {
            tracing::warn!(signal = %frame.signal_name, error = %source, "signal emission failed");
            return Err(SignalError::Emission {
                signal: frame.signal_name,
                source,
            });
        }
        tracing::debug!(
            signal = %frame.signal_name,
            destination = frame.bus_endpoint.as_deref().unwrap_or("*"),
            path = %frame.object_path,
            "signal sent"
        );
        Ok(())
    }

    /// Sends `signal_name` from the base address.
    ///
    /// # Errors
    ///
    /// See [`SignalEmitter::send`].
    pub fn emit(&self, signal_name: &str, payload: Option<Payload>) -> Result<(), SignalError> {
        let mut signal = OutboundSignal::new(signal_name);
        signal.payload = payload;
        self.send(signal)
    }

    /// Returns the default bus endpoint, if any.
    #[must_use]
    pub fn bus_endpoint(&self) -> Option<&str> {
        self.bus_endpoint.as_deref()
    }

    /// Returns the default interface name.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Returns the default object path.
    #[must_use]
    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    /// Returns the validated base address as a [`BaseAddress`].
    #[must_use]
    pub fn defaults(&self) -> BaseAddress {
        BaseAddress {
            bus_endpoint: self.bus_endpoint.clone(),
            interface: Some(self.interface.clone()),
            object_path: Some(self.object_path.clone()),
        }
    }

    /// Returns the bus connection signals are sent on.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn BusConnection> {
        &self.connection
    }
}
