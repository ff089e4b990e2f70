/// Errors raised while resolving utilities or running rule tasks.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("no utility registered for type {0}")]
    MissingUtility(&'static str),

    #[error("trigger condition must not declare a timeout")]
    TriggerHasTimeout,

    #[error("wait_for timeout must be longer than for_duration")]
    TimeoutNotLongerThanDuration,

    #[error("condition engine is no longer running")]
    EngineUnavailable,

    #[error(transparent)]
    Validation(#[from] trellis_types::ValidationError),

    #[error("action failed: {0}")]
    Action(#[from] anyhow::Error),
}
