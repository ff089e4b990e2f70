use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use trellis_engine::ConditionEngine;
use trellis_types::Condition;
use uuid::Uuid;

use crate::error::RuleError;
use crate::plugin::PluginService;
use crate::rule::{Action, TimerRule, TriggerRule};
use crate::utility::{RuleUtils, UtilityContext};

struct RuleManagerInner {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    suspended: Mutex<HashSet<String>>,
}

/// Installs, suspends, resumes, and uninstalls concurrent rule tasks,
/// resolving each invocation's utilities from [`RuleUtils`] plus whatever the
/// registered plugins contribute.
#[derive(Clone)]
pub struct RuleManager {
    engine: ConditionEngine,
    plugins: PluginService,
    inner: Arc<RuleManagerInner>,
}

impl RuleManager {
    pub fn new(engine: ConditionEngine, plugins: PluginService) -> Self {
        Self {
            engine,
            plugins,
            inner: Arc::new(RuleManagerInner {
                tasks: Mutex::new(HashMap::new()),
                suspended: Mutex::new(HashSet::new()),
            }),
        }
    }

    fn build_utility_context(&self) -> UtilityContext {
        UtilityContext::new(RuleUtils::new(self.engine.clone()), self.plugins.snapshot_utilities())
    }

    /// Spawns `rule`'s loop under `rule_id`, or a fresh uuid if none is
    /// given. Returns the id the rule was installed under.
    ///
    /// The spawned task waits on `ready_rx` before running the rule loop, so
    /// it cannot reach its own self-removal from `tasks` before this call has
    /// finished inserting its `JoinHandle` there — otherwise a rule that ends
    /// on its very first iteration (no `.await` reached before returning)
    /// could complete and self-remove before the handle was ever inserted,
    /// leaving a stale entry behind.
    pub fn install_trigger_rule(&self, rule: TriggerRule, rule_id: Option<String>) -> String {
        let id = rule_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let manager = self.clone();
        let task_id = id.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let _ = ready_rx.await;
            manager.run_trigger_rule(&task_id, rule).await;
            manager.inner.tasks.lock().unwrap().remove(&task_id);
            manager.inner.suspended.lock().unwrap().remove(&task_id);
        });
        self.inner.tasks.lock().unwrap().insert(id.clone(), handle);
        let _ = ready_tx.send(());
        id
    }

    /// Spawns `rule`'s loop under `rule_id`, or a fresh uuid if none is
    /// given. Returns the id the rule was installed under. See
    /// `install_trigger_rule` for why the spawned task waits on `ready_rx`.
    pub fn install_timed_rule(&self, rule: TimerRule, rule_id: Option<String>) -> String {
        let id = rule_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let manager = self.clone();
        let task_id = id.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let _ = ready_rx.await;
            manager.run_timed_rule(&task_id, rule).await;
            manager.inner.tasks.lock().unwrap().remove(&task_id);
            manager.inner.suspended.lock().unwrap().remove(&task_id);
        });
        self.inner.tasks.lock().unwrap().insert(id.clone(), handle);
        let _ = ready_tx.send(());
        id
    }

    /// Cancels and deregisters a rule's task. Returns `false` if `rule_id`
    /// was not installed.
    pub fn uninstall_rule(&self, rule_id: &str) -> bool {
        let Some(handle) = self.inner.tasks.lock().unwrap().remove(rule_id) else {
            return false;
        };
        if !handle.is_finished() {
            handle.abort();
        }
        self.inner.suspended.lock().unwrap().remove(rule_id);
        true
    }

    pub fn suspend_rule(&self, rule_id: &str) {
        self.inner.suspended.lock().unwrap().insert(rule_id.to_string());
    }

    pub fn resume_rule(&self, rule_id: &str) {
        self.inner.suspended.lock().unwrap().remove(rule_id);
    }

    pub fn is_rule_suspended(&self, rule_id: &str) -> bool {
        self.inner.suspended.lock().unwrap().contains(rule_id)
    }

    pub fn get_all_rules(&self) -> Vec<String> {
        self.inner.tasks.lock().unwrap().keys().cloned().collect()
    }

    /// Runs `action` once, outside of any installed rule's loop, resolving
    /// utilities the same way a rule dispatch would.
    pub async fn run_action_once(&self, action: Action) -> Result<(), RuleError> {
        let utils = self.build_utility_context();
        action(utils).await
    }

    async fn run_trigger_rule(&self, rule_id: &str, rule: TriggerRule) {
        loop {
            let trigger = {
                let utils = self.build_utility_context();
                match (rule.trigger_provider)(&utils) {
                    Ok(cond) => cond,
                    Err(err) => {
                        error!(rule_id, %err, "trigger provider failed, ending rule task");
                        return;
                    }
                }
            };
            if trigger.timeout().is_some() {
                let err = RuleError::TriggerHasTimeout;
                error!(rule_id, %err, "ending rule task");
                return;
            }

            let Some(handle) = self.engine.add_condition(trigger.clone(), true, false).await else {
                debug!(rule_id, "condition engine is gone, ending rule task");
                return;
            };
            let fired = handle
                .fired
                .expect("trigger registration always requests a fired event");
            let _ = fired.await;
            self.engine.remove_condition(trigger.instance_id()).await;

            if self.is_rule_suspended(rule_id) {
                debug!(rule_id, "rule suspended, skipping dispatch");
                continue;
            }

            let utils = self.build_utility_context();
            if let Err(err) = (rule.routine)(utils).await {
                error!(rule_id, %err, "rule action failed, ending rule task");
                return;
            }
        }
    }

    async fn run_timed_rule(&self, rule_id: &str, rule: TimerRule) {
        loop {
            let mut next = (rule.time_provider)();
            if next.is_none() {
                return;
            }

            // The provider gets up to three tries total to produce an
            // instant that isn't already in the past.
            let mut tries = 0;
            while let Some(instant) = next {
                if instant > Utc::now() {
                    break;
                }
                if tries >= 2 {
                    break;
                }
                tries += 1;
                next = (rule.time_provider)();
            }

            match next {
                Some(instant) if instant > Utc::now() => {
                    let sleep_for = (instant - Utc::now()).to_std().unwrap_or_default();
                    tokio::time::sleep(sleep_for).await;
                }
                _ => {
                    debug!(rule_id, "time provider exhausted, ending rule task");
                    return;
                }
            }

            if self.is_rule_suspended(rule_id) {
                debug!(rule_id, "rule suspended, skipping dispatch");
                continue;
            }

            let utils = self.build_utility_context();
            if let Err(err) = (rule.routine)(utils).await {
                error!(rule_id, %err, "rule action failed, ending rule task");
                return;
            }
        }
    }
}
