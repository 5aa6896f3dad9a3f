// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for CloudStack error classification.

use super::*;
use std::sync::Mutex;

/// Serializes tests that touch the terminal-code environment variable.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn test_classify_not_found_variants() {
    for message in [
        "no match found for zone zone1",
        "Entity not found",
        "Network with id net-1 does not exist",
    ] {
        let err = classify_api_error(message.to_string());
        assert_eq!(err.kind(), ErrorKind::NotFound, "{message}");
        assert!(err.is_not_found());
    }
}

#[test]
fn test_classify_already_exists_variants() {
    for message in [
        "firewall rule already exists",
        "There is already a rule for this network",
    ] {
        let err = classify_api_error(message.to_string());
        assert_eq!(err.kind(), ErrorKind::AlreadyExists, "{message}");
        assert!(err.is_already_applied());
    }
}

#[test]
fn test_classify_generic_is_transient() {
    let err = classify_api_error("internal error provisioning volume".to_string());
    assert_eq!(err.kind(), ErrorKind::Transient);
}

#[test]
fn test_ambiguous_carries_count() {
    let err = CloudError::Ambiguous {
        resource: "zone",
        name: "zone1".to_string(),
        count: 2,
    };
    assert_eq!(err.kind(), ErrorKind::Ambiguous);
    assert!(err.to_string().contains("found 2"));
}

#[test]
fn test_terminal_deploy_error_default_codes() {
    let _guard = ENV_LOCK.lock().unwrap();
    assert!(is_terminal_deploy_error(
        "Unable to deploy VM; CSExceptionErrorCode: 4250 insufficient capacity"
    ));
    assert!(is_terminal_deploy_error(
        "job failed, CSExceptionErrorCode: 9999"
    ));
    assert!(!is_terminal_deploy_error(
        "job failed, CSExceptionErrorCode: 4350"
    ));
    assert!(!is_terminal_deploy_error("plain failure with no code"));
}

#[test]
fn test_terminal_deploy_error_env_override() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("CLOUDSTACK_TERMINAL_FAILURE_CODES", "1234");
    assert!(is_terminal_deploy_error("CSExceptionErrorCode: 1234"));
    assert!(!is_terminal_deploy_error("CSExceptionErrorCode: 4250"));
    std::env::remove_var("CLOUDSTACK_TERMINAL_FAILURE_CODES");
    assert!(is_terminal_deploy_error("CSExceptionErrorCode: 4250"));
}

#[test]
fn test_classify_terminal_deploy_message() {
    let _guard = ENV_LOCK.lock().unwrap();
    let err = classify_api_error(
        "Unable to create a deployment for VM; CSExceptionErrorCode: 9999".to_string(),
    );
    assert_eq!(err.kind(), ErrorKind::Terminal);
}
