use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use trellis_engine::ConditionEngine;
use trellis_types::{
    AlwaysFalseCondition, AlwaysTrueCondition, BooleanCondition, BooleanOperator, Condition,
    ValidationError,
};

use crate::error::RuleError;

/// Per-invocation utility resolution, threaded to every trigger provider and
/// action closure.
///
/// Each callable asks this context for exactly the utility types it needs via
/// [`UtilityContext::get`], which resolves by concrete type against
/// `RuleUtils` plus the plugin-contributed utility index, rejecting types
/// that aren't registered.
pub struct UtilityContext {
    rule_utils: RuleUtils,
    plugin_utils: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl UtilityContext {
    pub(crate) fn new(
        rule_utils: RuleUtils,
        plugin_utils: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            rule_utils,
            plugin_utils,
        }
    }

    /// The always-available built-in utility (`all_of`, `wait`, ...).
    pub fn rule_utils(&self) -> &RuleUtils {
        &self.rule_utils
    }

    /// A plugin-contributed utility of type `T`, if one is registered.
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, RuleError> {
        self.plugin_utils
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or(RuleError::MissingUtility(std::any::type_name::<T>()))?
            .downcast::<T>()
            .map_err(|_| RuleError::MissingUtility(std::any::type_name::<T>()))
    }
}

/// Built-in condition-building and waiting helpers, handed to every trigger
/// provider and action via [`UtilityContext`].
#[derive(Clone)]
pub struct RuleUtils {
    engine: ConditionEngine,
}

impl RuleUtils {
    pub(crate) fn new(engine: ConditionEngine) -> Self {
        Self { engine }
    }

    pub fn all_of(
        &self,
        conditions: Vec<Arc<dyn Condition>>,
    ) -> Result<Arc<dyn Condition>, ValidationError> {
        Ok(Arc::new(BooleanCondition::new(
            BooleanOperator::And,
            conditions,
        )?))
    }

    pub fn any_of(
        &self,
        conditions: Vec<Arc<dyn Condition>>,
    ) -> Result<Arc<dyn Condition>, ValidationError> {
        Ok(Arc::new(BooleanCondition::new(
            BooleanOperator::Or,
            conditions,
        )?))
    }

    pub fn is_not(&self, condition: Arc<dyn Condition>) -> Result<Arc<dyn Condition>, ValidationError> {
        Ok(Arc::new(BooleanCondition::new(
            BooleanOperator::Not,
            vec![condition],
        )?))
    }

    pub fn true_(&self, reason: Option<&str>) -> Arc<dyn Condition> {
        Arc::new(AlwaysTrueCondition::new(reason.map(str::to_string)))
    }

    pub fn false_(&self, reason: Option<&str>) -> Arc<dyn Condition> {
        Arc::new(AlwaysFalseCondition::new(reason.map(str::to_string)))
    }

    pub async fn wait(&self, for_time: Duration) {
        tokio::time::sleep(for_time).await;
    }

    /// Sleeps until the next occurrence of `time_of_day`, rolling over to
    /// tomorrow if that time has already passed today.
    pub async fn wait_until(&self, time_of_day: NaiveTime) {
        let now = Local::now().naive_local();
        let mut target = now.date().and_time(time_of_day);
        if target <= now {
            target = (now.date() + chrono::Duration::days(1)).and_time(time_of_day);
        }
        let sleep_for = (target - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(sleep_for).await;
    }

    /// Waits for `condition` to turn on, optionally requiring it stay true
    /// for `for_duration` first and/or bounding the whole wait by `timeout`.
    /// Returns `true` if the condition fired, `false` if it timed out
    /// first. Always deregisters `condition` before returning.
    pub async fn wait_for(
        &self,
        condition: Arc<dyn Condition>,
        timeout: Option<Duration>,
        for_duration: Option<Duration>,
    ) -> Result<bool, RuleError> {
        if let (Some(t), Some(d)) = (timeout, for_duration) {
            if t <= d {
                return Err(RuleError::TimeoutNotLongerThanDuration);
            }
        }
        if let Some(d) = for_duration {
            condition.set_duration(Some(d));
        }
        if let Some(t) = timeout {
            condition.set_timeout(Some(t));
        }

        let handle = self
            .engine
            .add_condition(condition.clone(), true, timeout.is_some())
            .await
            .ok_or(RuleError::EngineUnavailable)?;
        let fired = handle.fired.expect("wait_for always requests a fired event");

        let result = match handle.timed_out {
            Some(timed_out) => {
                tokio::select! {
                    res = fired => res.is_ok(),
                    res = timed_out => { let _ = res; false }
                }
            }
            None => fired.await.is_ok(),
        };

        self.engine.remove_condition(condition.instance_id()).await;
        Ok(result)
    }
}
