//! Rule templates and their evaluation against a context
//!
//! A template is a list of `(field, operator, threshold)` conditions that must
//! all hold for its advice to be emitted. Templates are authored outside the
//! core and fetched per timeframe from a [`RuleStore`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

use crate::context::{ContextFields, ContextValue};
use crate::error::{LiftError, Result, RuleError};
use crate::models::{Goal, Soreness, UserProfile};
use crate::store::RuleStore;

/// Window a template applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Daily => "daily",
            Timeframe::Weekly => "weekly",
            Timeframe::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = RuleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Timeframe::Daily),
            "weekly" => Ok(Timeframe::Weekly),
            "monthly" => Ok(Timeframe::Monthly),
            _ => Err(RuleError::UnknownTimeframe(s.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator in a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "==" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            _ => None,
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
        }
    }

    /// Outcome when the operands cannot be ordered: equality checks still
    /// answer, ordering checks have no answer.
    fn unordered(&self, equal: bool) -> Option<bool> {
        match self {
            Operator::Eq => Some(equal),
            Operator::Ne => Some(!equal),
            _ => None,
        }
    }
}

/// One `(field, operator, threshold)` test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Context signal name, e.g. "sleep_h"
    pub field: String,

    /// Operator symbol as authored; unknown symbols fail at evaluation
    pub operator: String,

    /// Threshold, usually a number
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// Whether the condition holds for `ctx`
    ///
    /// Absent fields (see [`ContextValue::is_sentinel`]), unknown operators and
    /// incomparable operands all make the condition fail.
    pub fn matches(&self, ctx: &dyn ContextFields) -> bool {
        let Some(op) = Operator::parse(&self.operator) else {
            trace!(operator = %self.operator, "Unknown operator");
            return false;
        };
        let actual = match ctx.field(&self.field) {
            Some(value) if !value.is_sentinel() => value,
            _ => return false,
        };
        compare(&actual, op, &self.value).unwrap_or(false)
    }
}

fn compare(actual: &ContextValue, op: Operator, threshold: &Value) -> Option<bool> {
    let threshold_number = match threshold {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };

    match (actual, threshold) {
        (ContextValue::Number(a), _) => match threshold_number {
            Some(t) => a.partial_cmp(&t).map(|ord| op.holds(ord)),
            None => op.unordered(false),
        },
        (ContextValue::Text(a), Value::String(t)) => Some(op.holds(a.as_str().cmp(t.as_str()))),
        (ContextValue::Text(_), _) => op.unordered(false),
        (ContextValue::Soreness(a), Value::Object(_)) => {
            op.unordered(*a == Soreness::from(threshold.clone()))
        }
        (ContextValue::Soreness(_), _) => op.unordered(false),
    }
}

/// An authored rule: all conditions must hold for the advice to fire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTemplate {
    pub id: String,

    /// Human description of what the rule detects
    pub description: String,

    /// Conditions, evaluated in order with short-circuit
    pub conditions: Vec<Condition>,

    /// Text emitted when the rule fires
    pub advice: String,

    /// Goals the rule applies to, `None` or empty for every goal
    #[serde(default)]
    pub for_goals: Option<Vec<String>>,

    pub timeframe: Timeframe,
}

impl RuleTemplate {
    /// Check a template before it is stored
    pub fn validate(&self) -> std::result::Result<(), RuleError> {
        let invalid = |reason: String| RuleError::InvalidTemplate {
            id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty".to_string()));
        }
        if self.advice.trim().is_empty() {
            return Err(invalid("advice must not be empty".to_string()));
        }
        if self.conditions.is_empty() {
            return Err(invalid("at least one condition is required".to_string()));
        }
        for condition in &self.conditions {
            if condition.field.trim().is_empty() {
                return Err(invalid("condition field must not be empty".to_string()));
            }
            if Operator::parse(&condition.operator).is_none() {
                return Err(invalid(format!("unknown operator '{}'", condition.operator)));
            }
        }
        if let Some(goals) = &self.for_goals {
            for goal in goals {
                goal.parse::<Goal>().map_err(invalid)?;
            }
        }
        Ok(())
    }

    /// Whether the goal filter admits a user with `goal`
    pub fn applies_to(&self, goal: Option<Goal>) -> bool {
        match &self.for_goals {
            None => true,
            Some(goals) if goals.is_empty() => true,
            Some(goals) => match goal {
                Some(goal) => goals.iter().any(|g| g.parse::<Goal>().ok() == Some(goal)),
                None => false,
            },
        }
    }

    /// Whether every condition holds for `ctx`
    pub fn matches(&self, ctx: &dyn ContextFields) -> bool {
        self.conditions.iter().all(|c| c.matches(ctx))
    }
}

/// Advice of every template that applies to `goal` and matches `ctx`, in template order
pub fn evaluate_templates(
    ctx: &dyn ContextFields,
    templates: &[RuleTemplate],
    goal: Option<Goal>,
) -> Vec<String> {
    templates
        .iter()
        .filter(|t| t.applies_to(goal))
        .filter(|t| t.matches(ctx))
        .map(|t| t.advice.clone())
        .collect()
}

/// Evaluates stored templates for a user
pub struct RuleEngine<'a, S: RuleStore> {
    store: &'a S,
}

impl<'a, S: RuleStore> RuleEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn evaluate(
        &self,
        ctx: &dyn ContextFields,
        timeframe: Timeframe,
        user: &UserProfile,
    ) -> Result<Vec<String>> {
        let templates = self.store.rules_for_timeframe(timeframe)?;
        let advice = evaluate_templates(ctx, &templates, user.goal);
        debug!(
            user_id = %user.id,
            %timeframe,
            templates = templates.len(),
            fired = advice.len(),
            "Evaluated rule templates"
        );
        Ok(advice)
    }
}

/// Read templates from a JSON array file, validating each one
pub fn load_templates_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<RuleTemplate>> {
    let content = fs::read_to_string(path.as_ref())?;
    let templates: Vec<RuleTemplate> = serde_json::from_str(&content).map_err(|e| {
        LiftError::Validation(format!(
            "Failed to parse rule templates {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;
    for template in &templates {
        template.validate()?;
    }
    Ok(templates)
}
