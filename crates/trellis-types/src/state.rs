use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered condition.
///
/// `Timeout` is terminal: once entered, a condition only leaves it by being
/// removed and re-added.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionState {
    Off,
    Pending,
    On,
    Timeout,
}

impl ConditionState {
    pub fn is_on(self) -> bool {
        matches!(self, ConditionState::On)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConditionState::Timeout)
    }
}

impl std::fmt::Display for ConditionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConditionState::Off => "off",
            ConditionState::Pending => "pending",
            ConditionState::On => "on",
            ConditionState::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_on_is_on() {
        assert!(ConditionState::On.is_on());
        assert!(!ConditionState::Off.is_on());
        assert!(!ConditionState::Pending.is_on());
        assert!(!ConditionState::Timeout.is_on());
    }

    #[test]
    fn only_timeout_is_terminal() {
        assert!(ConditionState::Timeout.is_terminal());
        assert!(!ConditionState::On.is_terminal());
    }
}
