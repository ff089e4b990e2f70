//! Data model for the condition dependency graph: the `Condition` trait,
//! engine-assigned identity, lifecycle state, the built-in boolean
//! combinators, and the validation errors raised while building conditions.

mod builtin;
mod condition;
mod error;
mod id;
mod state;

pub use builtin::{AlwaysFalseCondition, AlwaysTrueCondition, BooleanCondition, BooleanOperator};
pub use condition::Condition;
pub use error::ValidationError;
pub use id::{ConditionId, ConditionIdAllocator, IdSlot};
pub use state::ConditionState;
