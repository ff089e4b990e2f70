use tokio::sync::oneshot;
use trellis_types::ConditionId;

/// What `ConditionEngine::add_condition` hands back: the assigned id, and a
/// one-shot receiver per event the caller asked for. Internally-registered
/// subconditions never get one of these — only the outermost condition a
/// caller registers can carry `fired`/`timed_out` events.
pub struct ConditionHandle {
    pub id: ConditionId,
    pub fired: Option<oneshot::Receiver<()>>,
    pub timed_out: Option<oneshot::Receiver<()>>,
}
