use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use trellis_engine::ConditionEngine;
use trellis_types::Condition;
use uuid::Uuid;

/// An external collaborator contributing both condition changes and,
/// optionally, a rule utility keyed by its concrete type (e.g. a solar or
/// lunar time-of-day helper). `next_batch` is driven the same way as
/// [`crate::EventSource::next_batch`]; `rule_utility` is read once, at
/// registration.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn next_batch(&mut self) -> Option<Vec<Arc<dyn Condition>>>;

    fn rule_utility(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

struct PluginServiceInner {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    utils: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

/// Runs registered plugins' main loops and indexes the rule utility each one
/// contributes by its concrete type, for [`crate::UtilityContext`]
/// resolution.
#[derive(Clone)]
pub struct PluginService {
    engine: ConditionEngine,
    inner: Arc<PluginServiceInner>,
}

impl PluginService {
    pub fn new(engine: ConditionEngine) -> Self {
        Self {
            engine,
            inner: Arc::new(PluginServiceInner {
                tasks: Mutex::new(HashMap::new()),
                utils: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Spawns a task driving `plugin` until it ends, indexing its optional
    /// rule utility under its concrete type for the lifetime of the task. A
    /// later plugin contributing the same utility type overwrites the
    /// earlier one.
    pub fn register_plugin(&self, mut plugin: Box<dyn Plugin>) -> String {
        let id = Uuid::new_v4().to_string();
        let util = plugin.rule_utility().map(|u| (u.type_id(), u));
        if let Some((type_id, util)) = util.clone() {
            self.inner.utils.lock().unwrap().insert(type_id, util);
        }

        let engine = self.engine.clone();
        let inner = self.inner.clone();
        let task_id = id.clone();
        let util_type = util.map(|(t, _)| t);

        let handle = tokio::spawn(async move {
            loop {
                match plugin.next_batch().await {
                    Some(impacted) if !impacted.is_empty() => {
                        let ids = impacted.iter().map(|c| c.instance_id()).collect();
                        engine.report_condition_event(ids).await;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            inner.tasks.lock().unwrap().remove(&task_id);
            if let Some(t) = util_type {
                inner.utils.lock().unwrap().remove(&t);
            }
        });

        self.inner.tasks.lock().unwrap().insert(id.clone(), handle);
        id
    }

    /// A point-in-time copy of the current plugin utility index, used to
    /// build a [`crate::UtilityContext`] for one rule invocation.
    pub(crate) fn snapshot_utilities(&self) -> HashMap<TypeId, Arc<dyn Any + Send + Sync>> {
        self.inner.utils.lock().unwrap().clone()
    }
}
