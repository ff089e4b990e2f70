use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::id::{ConditionId, IdSlot};

/// A node in the condition dependency graph.
///
/// Implementors never hold a reference back to the engine that owns them
/// (ownership is unidirectional: the engine holds `Arc<dyn Condition>`, never
/// the reverse) and `evaluate` must be pure with respect to the cached child
/// state maintained via `initialize`/`on_condition_event`.
pub trait Condition: Send + Sync {
    /// Slot the owning engine binds this condition's id into at registration.
    fn id_slot(&self) -> &IdSlot;

    /// Human-readable identity, e.g. `"(a and b)"` for a composite.
    fn identifier(&self) -> String;

    /// Evaluate against currently cached child state. Must not mutate
    /// anything the engine depends on for graph shape.
    fn evaluate(&self) -> bool;

    /// Ordered child conditions, evaluated and registered before this one.
    fn subconditions(&self) -> &[Arc<dyn Condition>] {
        &[]
    }

    /// How long this condition must stay continuously true before it turns
    /// `On`, or `None` to transition immediately.
    fn duration(&self) -> Option<Duration> {
        None
    }

    /// Deadline by which this condition must reach `On`, or `None` for no
    /// deadline.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Seed cached child state right after registration, keyed by the
    /// already-assigned ids of `subconditions()`.
    fn initialize(&self, _states: &[(ConditionId, bool)]) {}

    /// Update cached state for one child whose own state just changed.
    fn on_condition_event(&self, _child: ConditionId, _state: bool) {}

    /// Called once, right before the engine drops this condition.
    fn removed(&self) {}

    /// Allow a condition's `duration` to be set after construction, as
    /// `RuleUtils::wait_for` does. Conditions with a fixed duration may
    /// ignore this.
    fn set_duration(&self, _duration: Option<Duration>) {}

    /// Same as `set_duration`, for `timeout`.
    fn set_timeout(&self, _timeout: Option<Duration>) {}

    /// The id assigned by the owning engine. Panics if called before
    /// registration.
    fn instance_id(&self) -> ConditionId {
        self.id_slot()
            .get()
            .expect("condition has not been registered with an engine yet")
    }
}

/// Shared, interior-mutable timeout/duration storage for the built-in
/// condition types, which all support `set_duration`/`set_timeout`.
#[derive(Debug, Default)]
pub(crate) struct ConditionTiming {
    duration: Mutex<Option<Duration>>,
    timeout: Mutex<Option<Duration>>,
}

impl ConditionTiming {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn duration(&self) -> Option<Duration> {
        *self.duration.lock().unwrap()
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        *self.timeout.lock().unwrap()
    }

    pub(crate) fn set_duration(&self, duration: Option<Duration>) {
        *self.duration.lock().unwrap() = duration;
    }

    pub(crate) fn set_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.lock().unwrap() = timeout;
    }
}
