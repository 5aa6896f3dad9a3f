// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for the CloudStack custom resources.
//!
//! Conditions follow the standard Kubernetes shape: a `type`, a
//! "True"/"False"/"Unknown" status, a CamelCase reason and a human-readable
//! message, stamped with the transition time.

use chrono::Utc;

use crate::crd::Condition;

/// The Ready condition type.
pub const CONDITION_READY: &str = "Ready";

/// Create a new condition with the current timestamp.
///
/// # Arguments
///
/// * `condition_type` - The type of condition (e.g., "Ready")
/// * `status` - The status: "True", "False", or "Unknown"
/// * `reason` - A programmatic identifier in `CamelCase`
/// * `message` - A human-readable explanation
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Check if a condition differs from the matching existing condition.
///
/// The `reason` and `lastTransitionTime` are not compared; they change with
/// the condition itself. Updating status only when a condition actually
/// changed keeps reconcile loops from re-triggering themselves.
#[must_use]
pub fn condition_changed(existing: &[Condition], new_condition: &Condition) -> bool {
    match existing
        .iter()
        .find(|c| c.r#type == new_condition.r#type)
    {
        None => true,
        Some(current) => {
            current.status != new_condition.status || current.message != new_condition.message
        }
    }
}

/// Upsert a condition into a condition list by type.
///
/// Returns whether the list was modified.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    if !condition_changed(conditions, &condition) {
        return false;
    }
    match conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
    true
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
