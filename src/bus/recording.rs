//! Recording bus connection used by unit tests.
//!
//! Records every call, tracks which handles are live, and lets a test
//! deliver signals to matching handlers synchronously.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{BusConnection, SignalHandler};
use crate::domain::{EventFrame, MatchRule, ReceivedSignal, SubscriptionId};
use crate::error::BusError;

#[derive(Default)]
struct Calls {
    subscribes: Vec<MatchRule>,
    unsubscribes: Vec<SubscriptionId>,
    emitted: Vec<EventFrame>,
    active: HashMap<SubscriptionId, (MatchRule, Arc<dyn SignalHandler>)>,
    stale_releases: Vec<SubscriptionId>,
}

pub(crate) struct RecordingConnection {
    calls: Mutex<Calls>,
    next_id: AtomicU32,
    subscribe_error: Option<BusError>,
    emit_error: Option<BusError>,
}

impl fmt::Debug for RecordingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingConnection").finish_non_exhaustive()
    }
}

impl RecordingConnection {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::build(None, None))
    }

    pub(crate) fn rejecting_subscribe(error: BusError) -> Arc<Self> {
        Arc::new(Self::build(Some(error), None))
    }

    pub(crate) fn failing_emit(error: BusError) -> Arc<Self> {
        Arc::new(Self::build(None, Some(error)))
    }

    fn build(subscribe_error: Option<BusError>, emit_error: Option<BusError>) -> Self {
        Self {
            calls: Mutex::new(Calls::default()),
            next_id: AtomicU32::new(1),
            subscribe_error,
            emit_error,
        }
    }

    fn calls(&self) -> MutexGuard<'_, Calls> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe_calls(&self) -> Vec<MatchRule> {
        self.calls().subscribes.clone()
    }

    pub(crate) fn unsubscribe_calls(&self) -> Vec<SubscriptionId> {
        self.calls().unsubscribes.clone()
    }

    pub(crate) fn emitted(&self) -> Vec<EventFrame> {
        self.calls().emitted.clone()
    }

    pub(crate) fn active_ids(&self) -> Vec<SubscriptionId> {
        let mut ids: Vec<_> = self.calls().active.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Ids released while not live: double releases or made-up handles.
    pub(crate) fn stale_releases(&self) -> Vec<SubscriptionId> {
        self.calls().stale_releases.clone()
    }

    /// Delivers `signal` to every live handler whose rule matches.
    /// Returns the number of handlers invoked.
    pub(crate) fn deliver(&self, signal: &ReceivedSignal) -> usize {
        let handlers: Vec<Arc<dyn SignalHandler>> = self
            .calls()
            .active
            .values()
            .filter(|(rule, _)| rule.matches(signal, &[]))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in &handlers {
            handler.dispatch(self, signal);
        }
        handlers.len()
    }
}

impl BusConnection for RecordingConnection {
    fn subscribe_pattern(
        &self,
        rule: &MatchRule,
        handler: Arc<dyn SignalHandler>,
    ) -> Result<SubscriptionId, BusError> {
        let mut calls = self.calls();
        calls.subscribes.push(rule.clone());
        if let Some(err) = &self.subscribe_error {
            return Err(err.clone());
        }
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = SubscriptionId::from_raw(raw)
            .ok_or_else(|| BusError::Rejected("id space exhausted".to_string()))?;
        calls.active.insert(id, (rule.clone(), handler));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut calls = self.calls();
        calls.unsubscribes.push(id);
        if calls.active.remove(&id).is_none() {
            calls.stale_releases.push(id);
        }
    }

    fn emit_signal(&self, frame: &EventFrame) -> Result<(), BusError> {
        let mut calls = self.calls();
        calls.emitted.push(frame.clone());
        match &self.emit_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn unique_name(&self) -> Option<&str> {
        Some(":1.0")
    }
}
