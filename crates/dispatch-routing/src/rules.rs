//! Rule registry and condition evaluation.

use chrono::{DateTime, Utc};
use dispatch_core::{
    ConditionOperator, ConversationRequest, DispatchError, DispatchResult, RoutingCondition,
    RoutingRule, RuleUpdate,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use tracing::trace;

/// Registry of routing rules, kept sorted by priority.
///
/// Rules with equal priority keep their registration order.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: RwLock<Vec<RoutingRule>>,
}

impl RuleRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole registry, e.g. with a persisted collection
    pub fn replace_all(&self, mut rules: Vec<RoutingRule>) {
        let mut seen = std::collections::HashSet::new();
        rules.retain(|r| seen.insert(r.id.clone()));
        rules.sort_by_key(|r| r.priority);
        *self.rules.write() = rules;
    }

    /// Register a new rule
    pub fn insert(&self, rule: RoutingRule) -> DispatchResult<RoutingRule> {
        rule.validate()?;
        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(DispatchError::DuplicateRule(rule.id));
        }
        rules.push(rule.clone());
        rules.sort_by_key(|r| r.priority);
        Ok(rule)
    }

    /// Apply an update to a rule
    pub fn update(
        &self,
        rule_id: &str,
        update: RuleUpdate,
        at: DateTime<Utc>,
    ) -> DispatchResult<RoutingRule> {
        let mut rules = self.rules.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| DispatchError::RuleNotFound(rule_id.to_string()))?;
        update.apply(rule, at)?;
        let updated = rule.clone();
        rules.sort_by_key(|r| r.priority);
        Ok(updated)
    }

    /// Remove a rule, returning it
    pub fn remove(&self, rule_id: &str) -> DispatchResult<RoutingRule> {
        let mut rules = self.rules.write();
        let index = rules
            .iter()
            .position(|r| r.id == rule_id)
            .ok_or_else(|| DispatchError::RuleNotFound(rule_id.to_string()))?;
        Ok(rules.remove(index))
    }

    /// Copy of one rule
    #[must_use]
    pub fn get(&self, rule_id: &str) -> Option<RoutingRule> {
        self.rules.read().iter().find(|r| r.id == rule_id).cloned()
    }

    /// Copies of every rule, in priority order
    #[must_use]
    pub fn snapshot(&self) -> Vec<RoutingRule> {
        self.rules.read().clone()
    }

    /// Every active rule whose conditions all hold, in priority order
    #[must_use]
    pub fn find_matching_rules(&self, request: &ConversationRequest) -> Vec<RoutingRule> {
        self.rules
            .read()
            .iter()
            .filter(|r| r.is_active && rule_matches(r, request))
            .cloned()
            .collect()
    }

    /// Record that a rule supplied the candidates for a decision
    pub fn record_usage(&self, rule_id: &str, succeeded: bool, at: DateTime<Utc>) -> bool {
        let mut rules = self.rules.write();
        match rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.usage.record(succeeded, at);
                true
            }
            None => false,
        }
    }

    /// Number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// Whether there are no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

fn rule_matches(rule: &RoutingRule, request: &ConversationRequest) -> bool {
    rule.conditions.iter().all(|c| {
        let holds = evaluate_condition(c, request);
        if !holds {
            trace!(rule_id = %rule.id, field = %c.field, "Condition did not hold");
        }
        holds
    })
}

/// Evaluate one condition against a request.
///
/// Unknown fields, unknown operators and operands of the wrong shape make
/// the condition false.
#[must_use]
pub fn evaluate_condition(condition: &RoutingCondition, request: &ConversationRequest) -> bool {
    let Some(actual) = request.field_value(&condition.field) else {
        return false;
    };
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => same_kind(&actual, expected) && values_equal(&actual, expected),
        ConditionOperator::NotEquals => {
            same_kind(&actual, expected) && !values_equal(&actual, expected)
        }
        ConditionOperator::GreaterThan => compare(&actual, expected) == Some(Ordering::Greater),
        ConditionOperator::LessThan => compare(&actual, expected) == Some(Ordering::Less),
        ConditionOperator::Contains => match (&actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|i| values_equal(i, needle)),
            _ => false,
        },
        ConditionOperator::In => expected
            .as_array()
            .is_some_and(|items| items.iter().any(|i| values_equal(&actual, i))),
        ConditionOperator::NotIn => expected
            .as_array()
            .is_some_and(|items| !items.iter().any(|i| values_equal(&actual, i))),
        ConditionOperator::Between => match expected.as_array().map(Vec::as_slice) {
            Some([low, high]) => match (actual.as_f64(), low.as_f64(), high.as_f64()) {
                (Some(v), Some(lo), Some(hi)) => lo <= v && v <= hi,
                _ => false,
            },
            _ => false,
        },
        ConditionOperator::Unknown => false,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::String(_), Value::String(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Null, Value::Null)
    )
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}
