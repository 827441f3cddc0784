//! Status conditions
//!
//! Follows the Cluster API condition conventions: a list keyed by condition
//! type, kept sorted with `Ready` first and the rest alphabetically, where the
//! transition time only moves when the status itself changes.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Summary condition type, always sorted first
pub const READY_CONDITION: &str = "Ready";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, unique within a list
    #[serde(rename = "type")]
    pub type_: String,

    /// True, False or Unknown
    pub status: ConditionStatus,

    /// Last time the status moved from one value to another
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// CamelCase reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable details about the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl Condition {
    /// A `True` condition with no reason or message
    pub fn true_condition(type_: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status: ConditionStatus::True,
            last_transition_time: None,
            reason: None,
            message: None,
        }
    }

    /// A `False` condition carrying why it is not satisfied
    pub fn false_condition(type_: &str, reason: &str, message: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status: ConditionStatus::False,
            last_transition_time: None,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }
    }
}

/// Returns the condition with the given type, if present
pub fn get_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// True when the condition exists and its status is `True`
pub fn is_true(conditions: &[Condition], type_: &str) -> bool {
    get_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Inserts or replaces a condition, returning whether the list changed
///
/// An identical condition (same status, reason and message) leaves the list
/// untouched. When only reason or message change the previous transition time
/// is kept.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.status == condition.status
            && existing.reason == condition.reason
            && existing.message == condition.message
        {
            return false;
        }
        condition.last_transition_time = if existing.status == condition.status {
            existing.last_transition_time
        } else {
            Some(Utc::now())
        };
        *existing = condition;
    } else {
        condition.last_transition_time = Some(Utc::now());
        conditions.push(condition);
    }

    conditions.sort_by(|a, b| {
        let a_ready = a.type_ == READY_CONDITION;
        let b_ready = b.type_ == READY_CONDITION;
        b_ready.cmp(&a_ready).then_with(|| a.type_.cmp(&b.type_))
    });
    true
}

/// Marks a condition `True`
pub fn mark_true(conditions: &mut Vec<Condition>, type_: &str) -> bool {
    set_condition(conditions, Condition::true_condition(type_))
}

/// Marks a condition `False` with a reason and message
pub fn mark_false(conditions: &mut Vec<Condition>, type_: &str, reason: &str, message: &str) -> bool {
    set_condition(conditions, Condition::false_condition(type_, reason, message))
}
