//! Readiness state machine: a single one-way `initialized` flag and the
//! one-shot `Ready` event.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::ConfigState;
use crate::events::{EventBroadcaster, EventStream, ProviderEvent};

/// Tracks whether the provider has seen usable configuration data and
/// guarantees the `Ready` event is emitted exactly once per provider
/// instance.
///
/// Readiness is defined as "event successfully observed", not merely "flag
/// set": when the emission fails, the flag is rolled back so a later trigger
/// retries it. The flag and the emission span two steps, so the transition
/// is guarded by a compare-and-set with an explicit compensating action.
pub(crate) struct ReadinessGate {
    initialized: AtomicBool,
    events: EventBroadcaster,
}

impl ReadinessGate {
    pub(crate) fn new() -> ReadinessGate {
        ReadinessGate {
            initialized: AtomicBool::new(false),
            events: EventBroadcaster::new(),
        }
    }

    /// Attempt the `NotInitialized -> Initialized` transition for a reported
    /// configuration state. Returns `true` if this call emitted `Ready`.
    ///
    /// States without flag data never trigger the transition. Concurrent
    /// triggers race on the compare-and-set; only the winner emits.
    pub(crate) fn signal(&self, state: ConfigState) -> bool {
        if !state.has_flag_data() {
            return false;
        }
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if !self.events.try_emit(ProviderEvent::Ready) {
            log::warn!(target: "flagbridge", "ready event could not be recorded; will retry on the next configuration change");
            self.initialized.store(false, Ordering::Release);
            return false;
        }
        log::debug!(target: "flagbridge", "provider is ready");
        true
    }

    #[cfg(test)]
    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }
}
