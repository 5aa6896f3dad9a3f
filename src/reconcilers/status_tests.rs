// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for status condition helpers.

use super::*;

#[test]
fn test_create_condition_stamps_time() {
    let condition = create_condition(CONDITION_READY, "True", "InstanceRunning", "VM is running");
    assert_eq!(condition.r#type, "Ready");
    assert_eq!(condition.status, "True");
    assert!(condition.last_transition_time.is_some());
}

#[test]
fn test_condition_changed_on_first_observation() {
    let new = create_condition(CONDITION_READY, "False", "Pending", "waiting");
    assert!(condition_changed(&[], &new));
}

#[test]
fn test_condition_unchanged_when_status_and_message_match() {
    let existing = create_condition(CONDITION_READY, "True", "OldReason", "same message");
    let new = create_condition(CONDITION_READY, "True", "NewReason", "same message");
    assert!(
        !condition_changed(std::slice::from_ref(&existing), &new),
        "reason alone must not force a status update"
    );
}

#[test]
fn test_set_condition_upserts_by_type() {
    let mut conditions = Vec::new();
    assert!(set_condition(
        &mut conditions,
        create_condition(CONDITION_READY, "False", "Pending", "waiting"),
    ));
    assert_eq!(conditions.len(), 1);

    // Same state: no modification.
    assert!(!set_condition(
        &mut conditions,
        create_condition(CONDITION_READY, "False", "StillPending", "waiting"),
    ));

    // Transition: replaced in place.
    assert!(set_condition(
        &mut conditions,
        create_condition(CONDITION_READY, "True", "Running", "converged"),
    ));
    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].status, "True");
}
