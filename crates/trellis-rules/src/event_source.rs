use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use trellis_engine::ConditionEngine;
use trellis_types::Condition;
use uuid::Uuid;

/// An external feed of condition changes, e.g. a sensor poller or a message
/// bus subscriber. `next_batch` is called in a loop; returning `None` ends
/// the source's task.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn next_batch(&mut self) -> Option<Vec<Arc<dyn Condition>>>;
}

/// Runs every registered [`EventSource`] as its own task, forwarding
/// non-empty batches to the engine's `report_condition_event`.
#[derive(Clone)]
pub struct EventSourceService {
    engine: ConditionEngine,
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl EventSourceService {
    pub fn new(engine: ConditionEngine) -> Self {
        Self {
            engine,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawns a task driving `source` until it ends, returning the source's
    /// id.
    pub fn register_source(&self, mut source: Box<dyn EventSource>) -> String {
        let id = Uuid::new_v4().to_string();
        let engine = self.engine.clone();
        let tasks = self.tasks.clone();
        let task_id = id.clone();

        let handle = tokio::spawn(async move {
            loop {
                match source.next_batch().await {
                    Some(impacted) if !impacted.is_empty() => {
                        let ids = impacted.iter().map(|c| c.instance_id()).collect();
                        engine.report_condition_event(ids).await;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            tasks.lock().unwrap().remove(&task_id);
        });

        self.tasks.lock().unwrap().insert(id.clone(), handle);
        id
    }
}
