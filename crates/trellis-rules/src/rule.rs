use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use trellis_types::Condition;

use crate::error::RuleError;
use crate::utility::UtilityContext;

/// Builds the condition a trigger rule waits on for its next firing. Called
/// once per iteration of the rule's loop, so it may return a freshly built
/// condition each time.
pub type TriggerProvider =
    Arc<dyn Fn(&UtilityContext) -> Result<Arc<dyn Condition>, RuleError> + Send + Sync>;

/// Produces the next wall-clock instant a timer rule should fire at, or
/// `None` to end the rule's task.
pub type TimeProvider = Arc<dyn Fn() -> Option<DateTime<Utc>> + Send + Sync>;

pub type ActionFuture = Pin<Box<dyn Future<Output = Result<(), RuleError>> + Send>>;

/// The work a rule performs once its trigger fires.
pub type Action = Arc<dyn Fn(UtilityContext) -> ActionFuture + Send + Sync>;

/// A rule whose dispatch is driven by a condition becoming true.
pub struct TriggerRule {
    pub(crate) trigger_provider: TriggerProvider,
    pub(crate) routine: Action,
}

impl TriggerRule {
    pub fn new(trigger_provider: TriggerProvider, routine: Action) -> Self {
        Self {
            trigger_provider,
            routine,
        }
    }
}

/// A rule whose dispatch is driven by a wall-clock schedule.
pub struct TimerRule {
    pub(crate) time_provider: TimeProvider,
    pub(crate) routine: Action,
}

impl TimerRule {
    pub fn new(time_provider: TimeProvider, routine: Action) -> Self {
        Self {
            time_provider,
            routine,
        }
    }
}
