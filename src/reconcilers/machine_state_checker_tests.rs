// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the machine state checker verdict logic.

use chrono::{Duration, Utc};

use super::*;

#[test]
fn test_running_both_sides_is_healthy() {
    let now = Utc::now();
    assert_eq!(
        checker_verdict(Some("Running"), Some("Running"), Some(now), now),
        Verdict::Healthy
    );
}

#[test]
fn test_cloudstack_not_running_recycles() {
    let now = Utc::now();
    assert_eq!(
        checker_verdict(Some("Stopped"), Some("Running"), Some(now), now),
        Verdict::Recycle
    );
    assert_eq!(
        checker_verdict(Some("Error"), Some("Running"), Some(now), now),
        Verdict::Recycle
    );
    // A vanished VM reports no state at all.
    assert_eq!(
        checker_verdict(None, Some("Running"), Some(now), now),
        Verdict::Recycle
    );
}

#[test]
fn test_capi_stuck_within_timeout_waits() {
    let now = Utc::now();
    let since = now - Duration::seconds(120);
    assert_eq!(
        checker_verdict(Some("Running"), Some("Provisioned"), Some(since), now),
        Verdict::Wait
    );
}

#[test]
fn test_capi_stuck_past_timeout_recycles() {
    let now = Utc::now();
    let since = now - Duration::seconds(301);
    assert_eq!(
        checker_verdict(Some("Running"), Some("Provisioned"), Some(since), now),
        Verdict::Recycle
    );
}

#[test]
fn test_unknown_phase_age_waits() {
    let now = Utc::now();
    assert_eq!(
        checker_verdict(Some("Running"), Some("Provisioning"), None, now),
        Verdict::Wait
    );
}
