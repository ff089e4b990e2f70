/// Errors raised while constructing a condition.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("'not' requires exactly one subcondition, found {found}")]
    NotRequiresSingleChild { found: usize },
}
