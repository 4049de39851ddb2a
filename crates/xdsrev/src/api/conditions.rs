//! Named status conditions shared by DesiredConfig and Revision records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// DesiredConfig: the published version differs from the desired one.
pub const CACHE_OUT_OF_SYNC: &str = "CacheOutOfSync";
/// DesiredConfig: every revision in the history is tainted.
pub const ROLLBACK_FAILED: &str = "RollbackFailed";
/// DesiredConfig: a proxy rejected the configuration it was sent.
pub const CONFIG_FAILED: &str = "ConfigFailed";

/// Revision: this is the revision the node should be served.
pub const REVISION_PUBLISHED: &str = "RevisionPublished";
/// Revision: the content is known bad and must never be published again.
pub const REVISION_TAINTED: &str = "RevisionTainted";
/// Revision: referenced external content changed and must be republished.
pub const RESOURCES_OUT_OF_SYNC: &str = "ResourcesOutOfSync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn from_bool(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        condition_type: &str,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|c| c.condition_type == condition_type)
}

/// Status of the named condition, `Unknown` when absent.
pub fn condition_status(conditions: &[Condition], condition_type: &str) -> ConditionStatus {
    find_condition(conditions, condition_type)
        .map(|c| c.status)
        .unwrap_or(ConditionStatus::Unknown)
}

pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    condition_status(conditions, condition_type) == ConditionStatus::True
}

/// Inserts or updates a condition. The transition time only moves when the
/// status flips. Returns true if anything changed.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) => {
            let mut changed = false;
            if existing.status != condition.status {
                existing.status = condition.status;
                existing.last_transition_time = condition.last_transition_time;
                changed = true;
            }
            if existing.reason != condition.reason {
                existing.reason = condition.reason;
                changed = true;
            }
            if existing.message != condition.message {
                existing.message = condition.message;
                changed = true;
            }
            changed
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

/// Removes the named condition. Returns true if it was present.
pub fn remove_condition(conditions: &mut Vec<Condition>, condition_type: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.condition_type != condition_type);
    before != conditions.len()
}
