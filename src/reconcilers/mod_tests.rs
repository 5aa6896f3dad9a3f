// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for shared reconciler helpers.

use super::*;

#[test]
fn test_should_reconcile_first_reconciliation() {
    assert!(should_reconcile(Some(1), None));
}

#[test]
fn test_should_reconcile_spec_changed() {
    assert!(should_reconcile(Some(7), Some(5)));
}

#[test]
fn test_should_not_reconcile_when_generations_match() {
    assert!(!should_reconcile(Some(5), Some(5)));
}

#[test]
fn test_should_not_reconcile_without_generation() {
    assert!(!should_reconcile(None, None));
    assert!(!should_reconcile(None, Some(3)));
}

#[test]
fn test_status_changed() {
    assert!(status_changed(&Some("Running"), &Some("Error")));
    assert!(status_changed(&None, &Some("Running")));
    assert!(!status_changed(&Some("Running"), &Some("Running")));
    assert!(!status_changed::<String>(&None, &None));
}
