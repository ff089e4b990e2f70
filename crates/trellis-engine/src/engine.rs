use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use trellis_types::{Condition, ConditionId};

use crate::command::EngineCommand;
use crate::handle::ConditionHandle;
use crate::state::EngineState;

/// Cheap, cloneable handle to a running condition engine.
///
/// All graph mutation happens inside a single actor task reached through an
/// unbounded channel, so there is never a need to lock the graph from
/// outside: every `ConditionEngine` clone just hands commands to the same
/// owner.
#[derive(Clone)]
pub struct ConditionEngine {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl ConditionEngine {
    /// Spawns the actor task and returns a handle to it.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = EngineState::new(tx.clone());
        tokio::spawn(Self::run(state, rx));
        Self { tx }
    }

    async fn run(mut state: EngineState, mut rx: mpsc::UnboundedReceiver<EngineCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                EngineCommand::Add {
                    condition,
                    want_fired,
                    want_timeout,
                    reply,
                } => {
                    let handle = state.add_condition(condition, want_fired, want_timeout);
                    let _ = reply.send(handle);
                }
                EngineCommand::Remove { id, reply } => {
                    state.remove_condition(id);
                    let _ = reply.send(());
                }
                EngineCommand::Report { ids, reply } => {
                    state.report_condition_event(ids);
                    let _ = reply.send(());
                }
                EngineCommand::DurationElapsed(id) => state.on_duration_elapsed(id),
                EngineCommand::TimeoutElapsed(id) => state.on_timeout_elapsed(id),
            }
        }
    }

    /// Registers `condition` (and, recursively, its subconditions). No
    /// notification fires as a side effect of registration, even if the
    /// condition is immediately `On`. Returns `None` if the engine's actor
    /// task has already ended, same as its sibling methods.
    pub async fn add_condition(
        &self,
        condition: Arc<dyn Condition>,
        want_fired: bool,
        want_timeout: bool,
    ) -> Option<ConditionHandle> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(EngineCommand::Add {
                condition,
                want_fired,
                want_timeout,
                reply: reply_tx,
            })
            .is_err()
        {
            return None;
        }
        reply_rx.await.ok()
    }

    /// Removes a condition and, recursively, its subconditions, cancelling
    /// any live timers. A no-op if `id` is not currently registered.
    pub async fn remove_condition(&self, id: ConditionId) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(EngineCommand::Remove { id, reply: reply_tx })
            .is_err()
        {
            return;
        }
        let _ = reply_rx.await;
    }

    /// Reports that the listed conditions (typically leaves touched by an
    /// event source) may have changed, and propagates the effect through the
    /// dependency graph.
    pub async fn report_condition_event(&self, ids: Vec<ConditionId>) {
        if ids.is_empty() {
            return;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(EngineCommand::Report { ids, reply: reply_tx })
            .is_err()
        {
            return;
        }
        let _ = reply_rx.await;
    }
}
