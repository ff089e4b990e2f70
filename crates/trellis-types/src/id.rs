use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identity handed out by a `ConditionEngine` when a condition is registered.
///
/// A freshly constructed condition has no id until
/// `ConditionEngine::add_condition` assigns one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConditionId(u64);

impl ConditionId {
    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cond-{}", self.0)
    }
}

/// Monotonic issuer of `ConditionId`s, owned by a `ConditionEngine`.
#[derive(Debug, Default)]
pub struct ConditionIdAllocator(AtomicU64);

impl ConditionIdAllocator {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> ConditionId {
        ConditionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Interior-mutable slot a `Condition` impl embeds to remember the id it was
/// assigned at registration. Zero means unassigned.
#[derive(Debug, Default)]
pub struct IdSlot(AtomicU64);

impl IdSlot {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn get(&self) -> Option<ConditionId> {
        let raw = self.0.load(Ordering::Acquire);
        (raw != 0).then_some(ConditionId(raw))
    }

    pub fn bind(&self, id: ConditionId) {
        self.0.store(id.raw(), Ordering::Release);
    }
}
