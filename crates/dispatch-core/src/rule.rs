//! Routing rule definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{DispatchError, DispatchResult};

/// Comparison operator of a rule condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Field equals value
    Equals,
    /// Field differs from value
    NotEquals,
    /// Numeric field is strictly greater
    GreaterThan,
    /// Numeric field is strictly smaller
    LessThan,
    /// String field contains the value as a substring
    Contains,
    /// Field is one of the listed values
    In,
    /// Field is none of the listed values
    NotIn,
    /// Numeric field lies within `[low, high]`
    Between,
    /// Operator this build does not understand; never matches
    #[default]
    #[serde(other)]
    Unknown,
}

/// A single `(field, operator, value)` test against the request context.
///
/// Missing parts deserialize to values that make the condition false, so a
/// malformed condition never rejects the rule that carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingCondition {
    /// Context field name
    #[serde(default)]
    pub field: String,
    /// Operator
    #[serde(default)]
    pub operator: ConditionOperator,
    /// Operand
    #[serde(default)]
    pub value: Value,
}

impl RoutingCondition {
    /// Create a condition
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Endpoint selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Rotate through candidates
    #[default]
    RoundRobin,
    /// Fewest in-flight conversations
    LeastConnections,
    /// Random, proportional to weight
    Weighted,
    /// Lowest average response time
    LatencyBased,
    /// Lowest estimated cost
    CostOptimized,
}

impl fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::LeastConnections => write!(f, "least_connections"),
            Self::Weighted => write!(f, "weighted"),
            Self::LatencyBased => write!(f, "latency_based"),
            Self::CostOptimized => write!(f, "cost_optimized"),
        }
    }
}

/// How callers should react when the selected endpoint fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverStrategy {
    /// Move to the next alternative straight away
    Immediate,
    /// Retry the same endpoint before moving on
    Retry,
    /// Rely on the circuit breaker to exclude the endpoint
    #[default]
    CircuitBreaker,
}

impl fmt::Display for FailoverStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Retry => write!(f, "retry"),
            Self::CircuitBreaker => write!(f, "circuit_breaker"),
        }
    }
}

/// Usage metadata maintained by the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUsage {
    /// Times the rule supplied the candidate set
    pub times_applied: u64,
    /// Fraction of applications that ended with a selected endpoint
    pub success_rate: f64,
    /// Last application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied: Option<DateTime<Utc>>,
}

impl Default for RuleUsage {
    fn default() -> Self {
        Self {
            times_applied: 0,
            success_rate: 1.0,
            last_applied: None,
        }
    }
}

impl RuleUsage {
    /// Record one application of the rule
    pub fn record(&mut self, succeeded: bool, at: DateTime<Utc>) {
        self.times_applied += 1;
        let n = self.times_applied as f64;
        let outcome = if succeeded { 1.0 } else { 0.0 };
        self.success_rate = self.success_rate.mul_add(n - 1.0, outcome) / n;
        self.last_applied = Some(at);
    }
}

/// A priority-ordered selection policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    /// Unique rule identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Evaluation order, lower first
    pub priority: i32,
    /// Conditions, all of which must hold
    #[serde(default)]
    pub conditions: Vec<RoutingCondition>,
    /// Endpoint ids this rule routes to
    pub target_models: Vec<String>,
    /// Selection strategy among targets
    #[serde(default)]
    pub load_balancing: LoadBalancingStrategy,
    /// Failover policy
    #[serde(default)]
    pub failover: FailoverStrategy,
    /// Inactive rules never match
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Usage metadata
    #[serde(default)]
    pub usage: RuleUsage,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl RoutingRule {
    /// Create an active, unconditional rule
    #[must_use]
    pub fn new(id: impl Into<String>, priority: i32) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            priority,
            conditions: Vec::new(),
            target_models: Vec::new(),
            load_balancing: LoadBalancingStrategy::default(),
            failover: FailoverStrategy::default(),
            is_active: true,
            usage: RuleUsage::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a condition
    #[must_use]
    pub fn with_condition(mut self, condition: RoutingCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Set the target endpoints
    #[must_use]
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_models = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Set the selection strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.load_balancing = strategy;
        self
    }

    /// Set the failover policy
    #[must_use]
    pub fn with_failover(mut self, failover: FailoverStrategy) -> Self {
        self.failover = failover;
        self
    }

    /// Set whether the rule is active
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Validate the rule's shape.
    ///
    /// Conditions are not checked here; a bad condition only makes the rule
    /// never match.
    pub fn validate(&self) -> DispatchResult<()> {
        if self.id.trim().is_empty() {
            return Err(DispatchError::validation_field("rule id must not be empty", "id"));
        }
        if self.target_models.is_empty() {
            return Err(DispatchError::validation_field(
                format!("rule '{}' must target at least one model", self.id),
                "targetModels",
            ));
        }
        Ok(())
    }
}

/// Partial update of a routing rule. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    /// New display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// New condition list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<RoutingCondition>>,
    /// New targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_models: Option<Vec<String>>,
    /// New strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing: Option<LoadBalancingStrategy>,
    /// New failover policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover: Option<FailoverStrategy>,
    /// Activate or deactivate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl RuleUpdate {
    /// Apply the update to `rule`, validating the result.
    ///
    /// On error `rule` is left unchanged.
    pub fn apply(self, rule: &mut RoutingRule, at: DateTime<Utc>) -> DispatchResult<()> {
        let mut updated = rule.clone();
        if let Some(name) = self.name {
            updated.name = name;
        }
        if let Some(description) = self.description {
            updated.description = description;
        }
        if let Some(priority) = self.priority {
            updated.priority = priority;
        }
        if let Some(conditions) = self.conditions {
            updated.conditions = conditions;
        }
        if let Some(targets) = self.target_models {
            updated.target_models = targets;
        }
        if let Some(strategy) = self.load_balancing {
            updated.load_balancing = strategy;
        }
        if let Some(failover) = self.failover {
            updated.failover = failover;
        }
        if let Some(active) = self.is_active {
            updated.is_active = active;
        }
        updated.validate()?;
        updated.updated_at = at;
        *rule = updated;
        Ok(())
    }
}
