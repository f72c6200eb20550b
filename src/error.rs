//! Error types for signal subscription and emission.
//!
//! [`SignalError`] is what callers of the registry and emitter see.
//! [`BusError`] is what a [`crate::bus::BusConnection`] reports; it is
//! wrapped as the source of subscription and emission failures.

use crate::domain::MatchRule;

/// Failure reported by a bus connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// A bus name, interface, object path or member failed validation.
    #[error("invalid {kind}: {name:?}")]
    InvalidName {
        /// Which kind of name was rejected (e.g. `"object path"`).
        kind: &'static str,
        /// The offending value.
        name: String,
    },

    /// A well-known name is already owned by another connection.
    #[error("name {0} is already owned by another connection")]
    NameTaken(String),

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,

    /// No async runtime was available to drive the dispatch loop.
    #[error("no tokio runtime available to drive the connection")]
    NoRuntime,

    /// The bus refused the request for another reason.
    #[error("{0}")]
    Rejected(String),
}

/// Error returned by [`crate::signal::SubscriptionRegistry`] and
/// [`crate::signal::SignalEmitter`].
///
/// # Error Codes
///
/// | Code | Variant        |
/// |------|----------------|
/// | 1001 | `Validation`   |
/// | 2001 | `Subscription` |
/// | 3001 | `Emission`     |
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// A mandatory address component was empty.
    #[error("invalid address: {0}")]
    Validation(String),

    /// The bus connection rejected a subscription request.
    #[error("failed to subscribe to the {} signal ({rule}): {source}", .rule.signal_name)]
    Subscription {
        /// The fully resolved pattern that was rejected.
        rule: MatchRule,
        /// Underlying bus failure.
        #[source]
        source: BusError,
    },

    /// The bus connection failed to emit a signal.
    #[error("failed to send '{signal}' signal: {source}")]
    Emission {
        /// Name of the signal that could not be sent.
        signal: String,
        /// Underlying bus failure.
        #[source]
        source: BusError,
    },
}

impl SignalError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::Subscription { .. } => 2001,
            Self::Emission { .. } => 3001,
        }
    }
}
