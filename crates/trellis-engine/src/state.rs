use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use trellis_types::{Condition, ConditionId, ConditionIdAllocator, ConditionState};

use crate::command::EngineCommand;
use crate::handle::ConditionHandle;

struct ConditionEntry {
    condition: Arc<dyn Condition>,
    state: ConditionState,
    fired_tx: Option<oneshot::Sender<()>>,
    timed_out_tx: Option<oneshot::Sender<()>>,
}

/// All condition-graph state, owned by a single actor task. No method here
/// ever awaits: propagation and timer elapse handling run to completion
/// synchronously, matching the single-threaded cooperative scheduler model.
pub(crate) struct EngineState {
    entries: HashMap<ConditionId, ConditionEntry>,
    dependencies: HashMap<ConditionId, HashSet<ConditionId>>,
    duration_timers: HashMap<ConditionId, JoinHandle<()>>,
    timeout_timers: HashMap<ConditionId, JoinHandle<()>>,
    ids: ConditionIdAllocator,
    self_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineState {
    pub(crate) fn new(self_tx: mpsc::UnboundedSender<EngineCommand>) -> Self {
        Self {
            entries: HashMap::new(),
            dependencies: HashMap::new(),
            duration_timers: HashMap::new(),
            timeout_timers: HashMap::new(),
            ids: ConditionIdAllocator::new(),
            self_tx,
        }
    }

    pub(crate) fn add_condition(
        &mut self,
        condition: Arc<dyn Condition>,
        want_fired: bool,
        want_timeout: bool,
    ) -> ConditionHandle {
        let (id, fired, timed_out) = self.add_recursive(condition, Some((want_fired, want_timeout)));
        ConditionHandle {
            id,
            fired,
            timed_out,
        }
    }

    /// Registers `condition` and, depth-first, every subcondition it owns.
    /// `events` is `Some` only for the outermost call: notifiers created for
    /// internally-registered subconditions never carry events.
    fn add_recursive(
        &mut self,
        condition: Arc<dyn Condition>,
        events: Option<(bool, bool)>,
    ) -> (ConditionId, Option<oneshot::Receiver<()>>, Option<oneshot::Receiver<()>>) {
        let id = self.ids.next();
        condition.id_slot().bind(id);

        for child in condition.subconditions() {
            let (child_id, _, _) = self.add_recursive(Arc::clone(child), None);
            self.dependencies.entry(child_id).or_default().insert(id);
        }

        let child_states: Vec<(ConditionId, bool)> = condition
            .subconditions()
            .iter()
            .map(|c| {
                let cid = c.instance_id();
                let on = self
                    .entries
                    .get(&cid)
                    .map(|e| e.state.is_on())
                    .unwrap_or(false);
                (cid, on)
            })
            .collect();
        condition.initialize(&child_states);

        let evaluated = condition.evaluate();
        let duration = condition.duration();
        let timeout = condition.timeout();

        let (want_fired, want_timeout) = events.unwrap_or((false, false));
        let (fired_tx, fired_rx) = if want_fired {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let (timed_out_tx, timed_out_rx) = if want_timeout {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        self.entries.insert(
            id,
            ConditionEntry {
                condition: Arc::clone(&condition),
                state: ConditionState::Off,
                fired_tx,
                timed_out_tx,
            },
        );

        // A condition that will be On the instant it is added can never time
        // out, so its timeout timer (if any) is never armed.
        let reaches_on_immediately = evaluated && duration.is_none();
        if let Some(t) = timeout {
            if !reaches_on_immediately {
                self.arm_timeout_timer(id, t);
            }
        }

        let state = if evaluated {
            if let Some(d) = duration {
                self.arm_duration_timer(id, d);
                ConditionState::Pending
            } else {
                ConditionState::On
            }
        } else {
            ConditionState::Off
        };
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.state = state;
        }
        trace!(id = %id, ?state, "condition registered");

        (id, fired_rx, timed_out_rx)
    }

    pub(crate) fn remove_condition(&mut self, id: ConditionId) {
        let Some(entry) = self.entries.remove(&id) else {
            return;
        };
        self.dependencies.remove(&id);
        self.cancel_duration_timer(id);
        self.cancel_timeout_timer(id);
        entry.condition.removed();
        for child in entry.condition.subconditions() {
            self.remove_condition(child.instance_id());
        }
        trace!(id = %id, "condition removed");
    }

    /// Breadth-first propagation from a batch of directly-changed
    /// conditions, without a visited set: a node reachable through more than
    /// one parent is revisited once per incoming edge, matching the model
    /// this engine realizes.
    pub(crate) fn report_condition_event(&mut self, ids: Vec<ConditionId>) {
        let mut work: VecDeque<ConditionId> = ids.into_iter().collect();
        let mut prev_states: HashMap<ConditionId, ConditionState> = HashMap::new();
        let mut touched_set: HashSet<ConditionId> = HashSet::new();
        let mut touched_order: Vec<ConditionId> = Vec::new();

        while let Some(id) = work.pop_front() {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            let prev_state = entry.state;
            prev_states.entry(id).or_insert(prev_state);
            if touched_set.insert(id) {
                touched_order.push(id);
            }

            let evaluated = entry.condition.evaluate();
            let new_state = self.transition(id, prev_state, evaluated);
            if new_state != prev_state {
                if let Some(e) = self.entries.get_mut(&id) {
                    e.state = new_state;
                }
            }

            let is_on = new_state.is_on();
            if let Some(parents) = self.dependencies.get(&id).cloned() {
                for parent_id in parents {
                    if let Some(parent_entry) = self.entries.get(&parent_id) {
                        parent_entry.condition.on_condition_event(id, is_on);
                        work.push_back(parent_id);
                    }
                }
            }
        }

        for id in touched_order {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            let curr = entry.state;
            let prev = prev_states[&id];
            match (prev, curr) {
                (ConditionState::Off, ConditionState::On) => {
                    self.cancel_timeout_timer(id);
                    self.fire_notifier(id);
                }
                (ConditionState::Pending, ConditionState::Off) => {
                    self.cancel_duration_timer(id);
                }
                _ => {}
            }
        }
    }

    /// Computes the condition's next state purely from its previous state
    /// and its fresh evaluation, arming a duration timer on the `Off -> On`
    /// transition that requires one. `Timeout` never leaves itself.
    fn transition(&mut self, id: ConditionId, prev: ConditionState, evaluated: bool) -> ConditionState {
        use ConditionState::*;
        match (prev, evaluated) {
            (Timeout, _) => Timeout,
            (Off, true) => {
                let duration = self.entries.get(&id).and_then(|e| e.condition.duration());
                match duration {
                    Some(d) => {
                        self.arm_duration_timer(id, d);
                        Pending
                    }
                    None => On,
                }
            }
            (Off, false) => Off,
            (Pending, true) => Pending,
            (Pending, false) => Off,
            (On, true) => On,
            (On, false) => Off,
        }
    }

    pub(crate) fn on_duration_elapsed(&mut self, id: ConditionId) {
        if self.duration_timers.remove(&id).is_none() {
            return;
        }
        self.cancel_timeout_timer(id);
        if !self.entries.contains_key(&id) {
            return;
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.state = ConditionState::On;
        }
        debug!(id = %id, "duration satisfied, condition is on");
        self.fire_notifier(id);

        let parents: Vec<ConditionId> = self
            .dependencies
            .get(&id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        for &parent_id in &parents {
            if let Some(parent_entry) = self.entries.get(&parent_id) {
                parent_entry.condition.on_condition_event(id, true);
            }
        }
        if !parents.is_empty() {
            self.report_condition_event(parents);
        }
    }

    pub(crate) fn on_timeout_elapsed(&mut self, id: ConditionId) {
        if self.timeout_timers.remove(&id).is_none() {
            return;
        }
        self.cancel_duration_timer(id);
        if !self.entries.contains_key(&id) {
            return;
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.state = ConditionState::Timeout;
        }
        debug!(id = %id, "condition timed out");
        self.fire_timeout_notifier(id);
    }

    fn arm_duration_timer(&mut self, id: ConditionId, duration: Duration) {
        self.cancel_duration_timer(id);
        let tx = self.self_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(EngineCommand::DurationElapsed(id));
        });
        self.duration_timers.insert(id, handle);
    }

    fn arm_timeout_timer(&mut self, id: ConditionId, timeout: Duration) {
        let tx = self.self_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(EngineCommand::TimeoutElapsed(id));
        });
        self.timeout_timers.insert(id, handle);
    }

    fn cancel_duration_timer(&mut self, id: ConditionId) {
        if let Some(handle) = self.duration_timers.remove(&id) {
            handle.abort();
        }
    }

    fn cancel_timeout_timer(&mut self, id: ConditionId) {
        if let Some(handle) = self.timeout_timers.remove(&id) {
            handle.abort();
        }
    }

    fn fire_notifier(&mut self, id: ConditionId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if let Some(tx) = entry.fired_tx.take() {
                let _ = tx.send(());
            }
        }
    }

    fn fire_timeout_notifier(&mut self, id: ConditionId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if let Some(tx) = entry.timed_out_tx.take() {
                let _ = tx.send(());
            }
        }
    }
}
