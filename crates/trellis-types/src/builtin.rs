use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::condition::{Condition, ConditionTiming};
use crate::error::ValidationError;
use crate::id::{ConditionId, IdSlot};

/// Boolean combinator applied over one or more subconditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BooleanOperator {
    And,
    Or,
    Not,
}

impl BooleanOperator {
    fn symbol(self) -> &'static str {
        match self {
            BooleanOperator::And => "and",
            BooleanOperator::Or => "or",
            BooleanOperator::Not => "not",
        }
    }
}

/// AND/OR/NOT over a fixed list of subconditions.
///
/// `Not` requires exactly one child; `And`/`Or` accept any non-empty list.
pub struct BooleanCondition {
    id_slot: IdSlot,
    operator: BooleanOperator,
    children: Vec<Arc<dyn Condition>>,
    states: Mutex<HashMap<ConditionId, bool>>,
    timing: ConditionTiming,
}

impl BooleanCondition {
    pub fn new(
        operator: BooleanOperator,
        children: Vec<Arc<dyn Condition>>,
    ) -> Result<Self, ValidationError> {
        if operator == BooleanOperator::Not && children.len() != 1 {
            return Err(ValidationError::NotRequiresSingleChild {
                found: children.len(),
            });
        }
        Ok(Self {
            id_slot: IdSlot::new(),
            operator,
            children,
            states: Mutex::new(HashMap::new()),
            timing: ConditionTiming::new(),
        })
    }

    fn child_state(&self, id: ConditionId) -> bool {
        self.states.lock().unwrap().get(&id).copied().unwrap_or(false)
    }
}

impl Condition for BooleanCondition {
    fn id_slot(&self) -> &IdSlot {
        &self.id_slot
    }

    fn identifier(&self) -> String {
        let op = self.operator.symbol();
        let joined = self
            .children
            .iter()
            .map(|c| c.identifier())
            .collect::<Vec<_>>()
            .join(&format!(" {op} "));
        format!("({joined})")
    }

    fn evaluate(&self) -> bool {
        match self.operator {
            BooleanOperator::And => self
                .children
                .iter()
                .all(|c| self.child_state(c.instance_id())),
            BooleanOperator::Or => self
                .children
                .iter()
                .any(|c| self.child_state(c.instance_id())),
            BooleanOperator::Not => !self.child_state(self.children[0].instance_id()),
        }
    }

    fn subconditions(&self) -> &[Arc<dyn Condition>] {
        &self.children
    }

    fn initialize(&self, states: &[(ConditionId, bool)]) {
        let mut map = self.states.lock().unwrap();
        map.clear();
        map.extend(states.iter().copied());
    }

    fn on_condition_event(&self, child: ConditionId, state: bool) {
        self.states.lock().unwrap().insert(child, state);
    }

    fn duration(&self) -> Option<Duration> {
        self.timing.duration()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timing.timeout()
    }

    fn set_duration(&self, duration: Option<Duration>) {
        self.timing.set_duration(duration);
    }

    fn set_timeout(&self, timeout: Option<Duration>) {
        self.timing.set_timeout(timeout);
    }
}

/// A condition that always evaluates false, carrying a diagnostic reason.
pub struct AlwaysFalseCondition {
    id_slot: IdSlot,
    reason: String,
    timing: ConditionTiming,
}

impl AlwaysFalseCondition {
    pub fn new(reason: impl Into<Option<String>>) -> Self {
        Self {
            id_slot: IdSlot::new(),
            reason: reason.into().unwrap_or_else(|| "always_false".to_string()),
            timing: ConditionTiming::new(),
        }
    }
}

impl Condition for AlwaysFalseCondition {
    fn id_slot(&self) -> &IdSlot {
        &self.id_slot
    }

    fn identifier(&self) -> String {
        format!("always_false({})", self.reason)
    }

    fn evaluate(&self) -> bool {
        false
    }

    fn duration(&self) -> Option<Duration> {
        self.timing.duration()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timing.timeout()
    }

    fn set_duration(&self, duration: Option<Duration>) {
        self.timing.set_duration(duration);
    }

    fn set_timeout(&self, timeout: Option<Duration>) {
        self.timing.set_timeout(timeout);
    }
}

/// A condition that always evaluates true, carrying a diagnostic reason.
pub struct AlwaysTrueCondition {
    id_slot: IdSlot,
    reason: String,
    timing: ConditionTiming,
}

impl AlwaysTrueCondition {
    pub fn new(reason: impl Into<Option<String>>) -> Self {
        Self {
            id_slot: IdSlot::new(),
            reason: reason.into().unwrap_or_else(|| "always_true".to_string()),
            timing: ConditionTiming::new(),
        }
    }
}

impl Condition for AlwaysTrueCondition {
    fn id_slot(&self) -> &IdSlot {
        &self.id_slot
    }

    fn identifier(&self) -> String {
        format!("always_true({})", self.reason)
    }

    fn evaluate(&self) -> bool {
        true
    }

    fn duration(&self) -> Option<Duration> {
        self.timing.duration()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timing.timeout()
    }

    fn set_duration(&self, duration: Option<Duration>) {
        self.timing.set_duration(duration);
    }

    fn set_timeout(&self, timeout: Option<Duration>) {
        self.timing.set_timeout(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ConditionIdAllocator;

    fn leaf(alloc: &ConditionIdAllocator, on: bool) -> (Arc<dyn Condition>, ConditionId) {
        let cond: Arc<dyn Condition> = if on {
            Arc::new(AlwaysTrueCondition::new(None))
        } else {
            Arc::new(AlwaysFalseCondition::new(None))
        };
        let id = alloc.next();
        cond.id_slot().bind(id);
        (cond, id)
    }

    #[test]
    fn not_rejects_zero_or_many_children() {
        let alloc = ConditionIdAllocator::new();
        assert!(BooleanCondition::new(BooleanOperator::Not, vec![]).is_err());
        let (a, _) = leaf(&alloc, true);
        let (b, _) = leaf(&alloc, true);
        assert!(BooleanCondition::new(BooleanOperator::Not, vec![a, b]).is_err());
    }

    #[test]
    fn and_requires_all_children_true() {
        let alloc = ConditionIdAllocator::new();
        let (a, a_id) = leaf(&alloc, true);
        let (b, b_id) = leaf(&alloc, true);
        let and = BooleanCondition::new(BooleanOperator::And, vec![a, b]).unwrap();
        and.initialize(&[(a_id, true), (b_id, true)]);
        assert!(and.evaluate());
        and.on_condition_event(b_id, false);
        assert!(!and.evaluate());
    }

    #[test]
    fn or_requires_any_child_true() {
        let alloc = ConditionIdAllocator::new();
        let (a, a_id) = leaf(&alloc, false);
        let (b, b_id) = leaf(&alloc, false);
        let or = BooleanCondition::new(BooleanOperator::Or, vec![a, b]).unwrap();
        or.initialize(&[(a_id, false), (b_id, false)]);
        assert!(!or.evaluate());
        or.on_condition_event(a_id, true);
        assert!(or.evaluate());
    }

    #[test]
    fn not_inverts_single_child() {
        let alloc = ConditionIdAllocator::new();
        let (a, a_id) = leaf(&alloc, true);
        let not = BooleanCondition::new(BooleanOperator::Not, vec![a]).unwrap();
        not.initialize(&[(a_id, true)]);
        assert!(!not.evaluate());
        not.on_condition_event(a_id, false);
        assert!(not.evaluate());
    }

    #[test]
    fn identifier_joins_children_with_operator() {
        let alloc = ConditionIdAllocator::new();
        let (a, _) = leaf(&alloc, true);
        let (b, _) = leaf(&alloc, true);
        let and = BooleanCondition::new(BooleanOperator::And, vec![a, b]).unwrap();
        insta::assert_snapshot!(
            and.identifier(),
            @"(always_true(always_true) and always_true(always_true))"
        );
    }

    #[test]
    fn nested_composite_identifier_reads_left_to_right() {
        let alloc = ConditionIdAllocator::new();
        let (a, _) = leaf(&alloc, true);
        let (b, _) = leaf(&alloc, false);
        let (c, _) = leaf(&alloc, true);
        let or = BooleanCondition::new(BooleanOperator::Or, vec![a, b]).unwrap();
        let or: Arc<dyn Condition> = Arc::new(or);
        let top = BooleanCondition::new(BooleanOperator::And, vec![or, c]).unwrap();
        insta::assert_snapshot!(
            top.identifier(),
            @"((always_true(always_true) or always_false(always_false)) and always_true(always_true))"
        );
    }

    #[test]
    fn boolean_state_maps_diff_cleanly_on_mismatch() {
        let alloc = ConditionIdAllocator::new();
        let (a, a_id) = leaf(&alloc, true);
        let (b, b_id) = leaf(&alloc, false);
        let and = BooleanCondition::new(BooleanOperator::And, vec![a, b]).unwrap();
        and.initialize(&[(a_id, true), (b_id, false)]);
        and.on_condition_event(b_id, true);

        let expected: HashMap<ConditionId, bool> =
            HashMap::from([(a_id, true), (b_id, true)]);
        similar_asserts::assert_eq!(*and.states.lock().unwrap(), expected);
    }
}
