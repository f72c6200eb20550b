//! Signal subscription registry.
//!
//! [`SubscriptionRegistry`] tracks at most one bus subscription per signal
//! name, resolves partial addresses against its stored defaults, and hands
//! every delivered signal to one [`SignalHandler`].
//!
//! # Teardown
//!
//! [`SubscriptionRegistry::close`] is the primary teardown path and should
//! be called explicitly. Dropping the registry runs the same cleanup as a
//! safety net. Both are idempotent. Types that embed a registry and hold
//! their own resources must call `close` from their own teardown before
//! relying on the drop.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bus::{BusConnection, SignalHandler};
use crate::domain::{BaseAddress, SubscriptionId};
use crate::error::SignalError;

/// Subscriptions keyed by signal name, plus the "subscribed" mark.
#[derive(Debug, Default)]
struct Tracked {
    subscriptions: HashMap<String, SubscriptionId>,
    subscribed: bool,
}

/// Owns the bus subscriptions for one handler.
///
/// # Concurrency
///
/// The subscription map is guarded by a mutex that is held only for the
/// map operation itself, never across a bus call or a handler dispatch.
/// The registry can be shared between threads (for example behind an
/// `Arc`) while the bus delivers signals on its own event loop.
///
/// # Duplicate subscriptions
///
/// Subscribing again to a signal name that is already tracked registers
/// the new pattern first and, once the bus accepts it, releases the
/// previously tracked handle.
pub struct SubscriptionRegistry {
    connection: Arc<dyn BusConnection>,
    defaults: BaseAddress,
    handler: Arc<dyn SignalHandler>,
    tracked: Mutex<Tracked>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("connection", &self.connection)
            .field("defaults", &self.defaults)
            .field("tracked", &*self.tracked())
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    /// Creates a registry with no subscriptions.
    ///
    /// `defaults` may leave any component unset; unset components act as
    /// wildcards when subscribing.
    #[must_use]
    pub fn new(
        connection: Arc<dyn BusConnection>,
        defaults: BaseAddress,
        handler: Arc<dyn SignalHandler>,
    ) -> Self {
        Self {
            connection,
            defaults,
            handler,
            tracked: Mutex::new(Tracked::default()),
        }
    }

    /// Creates a registry and immediately subscribes to `signal_name`.
    ///
    /// # Errors
    ///
    /// Returns the error of the initial [`SubscriptionRegistry::subscribe`].
    pub fn with_signal(
        connection: Arc<dyn BusConnection>,
        defaults: BaseAddress,
        handler: Arc<dyn SignalHandler>,
        signal_name: &str,
    ) -> Result<Self, SignalError> {
        let registry = Self::new(connection, defaults, handler);
        registry.subscribe(signal_name)?;
        Ok(registry)
    }

    fn tracked(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to `signal_name` using the stored endpoint and object path.
    ///
    /// # Errors
    ///
    /// See [`SubscriptionRegistry::subscribe_at`].
    pub fn subscribe(&self, signal_name: &str) -> Result<SubscriptionId, SignalError> {
        self.subscribe_at(None, None, signal_name)
    }

    /// Subscribes to `signal_name`, overriding the stored bus endpoint and
    /// object path where given.
    ///
    /// On success the returned handle is tracked under `signal_name`. An
    /// explicit empty string clears the stored default, making that field a
    /// wildcard.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Validation`] for an empty signal name and
    /// [`SignalError::Subscription`] if the bus rejects the pattern. In
    /// both cases the registry is left unchanged.
    pub fn subscribe_at(
        &self,
        bus_endpoint: Option<&str>,
        object_path: Option<&str>,
        signal_name: &str,
    ) -> Result<SubscriptionId, SignalError> {
        if signal_name.is_empty() {
            return Err(SignalError::Validation(
                "signal name cannot be empty".to_string(),
            ));
        }
        let rule = self
            .defaults
            .match_rule(bus_endpoint, object_path, signal_name);

        let id = match self
            .connection
            .subscribe_pattern(&rule, Arc::clone(&self.handler))
        {
            Ok(id) => id,
            Err(source) => {
                tracing::warn!(%rule, error = %source, "subscription rejected");
                return Err(SignalError::Subscription { rule, source });
            }
        };

        let previous = {
            let mut tracked = self.tracked();
            tracked.subscribed = true;
            tracked.subscriptions.insert(signal_name.to_string(), id)
        };
        if let Some(previous) = previous {
            tracing::debug!(signal = signal_name, %previous, "releasing replaced subscription");
            self.connection.unsubscribe(previous);
        }

        tracing::debug!(signal = signal_name, %id, %rule, "subscribed");
        Ok(id)
    }

    /// Releases the subscription tracked under `signal_name`.
    ///
    /// Returns `true` if a handle was released; unknown names are a no-op.
    pub fn unsubscribe(&self, signal_name: &str) -> bool {
        let Some(id) = self.tracked().subscriptions.remove(signal_name) else {
            return false;
        };
        self.connection.unsubscribe(id);
        tracing::debug!(signal = signal_name, %id, "unsubscribed");
        true
    }

    /// Returns the handle tracked under `signal_name`, if any.
    #[must_use]
    pub fn subscription_id(&self, signal_name: &str) -> Option<SubscriptionId> {
        self.tracked().subscriptions.get(signal_name).copied()
    }

    /// Returns the tracked signal names, sorted.
    #[must_use]
    pub fn subscribed_signals(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tracked().subscriptions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` if a subscription was made since the last cleanup.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.tracked().subscribed
    }

    /// Releases every tracked subscription and clears the registry.
    ///
    /// Does nothing, and makes no bus calls, unless something was
    /// subscribed since the last cleanup.
    pub fn cleanup(&self) {
        let released: Vec<(String, SubscriptionId)> = {
            let mut tracked = self.tracked();
            if !tracked.subscribed {
                return;
            }
            tracked.subscribed = false;
            tracked.subscriptions.drain().collect()
        };
        for (signal, id) in &released {
            self.connection.unsubscribe(*id);
            tracing::debug!(signal = %signal, %id, "unsubscribed during cleanup");
        }
        tracing::debug!(released = released.len(), "subscription registry cleaned up");
    }

    /// Explicit teardown. Equivalent to [`SubscriptionRegistry::cleanup`].
    pub fn close(&self) {
        self.cleanup();
    }

    /// Returns the stored address defaults.
    #[must_use]
    pub fn defaults(&self) -> &BaseAddress {
        &self.defaults
    }

    /// Returns the bus connection this registry subscribes on.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn BusConnection> {
        &self.connection
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.cleanup();
    }
}
