use std::sync::Arc;

use tokio::sync::oneshot;
use trellis_types::{Condition, ConditionId};

use crate::handle::ConditionHandle;

pub(crate) enum EngineCommand {
    Add {
        condition: Arc<dyn Condition>,
        want_fired: bool,
        want_timeout: bool,
        reply: oneshot::Sender<ConditionHandle>,
    },
    Remove {
        id: ConditionId,
        reply: oneshot::Sender<()>,
    },
    Report {
        ids: Vec<ConditionId>,
        reply: oneshot::Sender<()>,
    },
    DurationElapsed(ConditionId),
    TimeoutElapsed(ConditionId),
}
