// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for cloud-config parsing.

use super::*;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_from_file_parses_global_section() {
    let file = write_config(
        "# CAPC cloud config\n\
         [Global]\n\
         api-url = https://acs.example.com/client/api\n\
         api-key = AAAA\n\
         secret-key = BBBB\n\
         verify-ssl = false\n",
    );

    let config = CloudConfig::from_file(file.path()).unwrap();
    assert_eq!(config.api_url, "https://acs.example.com/client/api");
    assert_eq!(config.api_key, "AAAA");
    assert_eq!(config.secret_key, "BBBB");
    assert!(!config.verify_ssl);
}

#[test]
fn test_from_file_missing_global_section_is_fatal() {
    let file = write_config("[Other]\napi-url = x\n");
    let err = CloudConfig::from_file(file.path()).unwrap_err();
    assert!(err.root_cause().to_string().contains("[Global]"));
}

#[test]
fn test_from_file_unreadable_is_fatal() {
    let err = CloudConfig::from_file(std::path::Path::new("/nonexistent/cloud-config"))
        .unwrap_err();
    assert!(err.to_string().contains("failed to read"));
}

#[test]
fn test_verify_ssl_defaults_true() {
    let mut values = std::collections::BTreeMap::new();
    values.insert("api-url".to_string(), "https://acs".to_string());
    values.insert("api-key".to_string(), "k".to_string());
    values.insert("secret-key".to_string(), "s".to_string());

    let config = CloudConfig::from_pairs(&values).unwrap();
    assert!(config.verify_ssl);
}

#[test]
fn test_verify_ssl_boolean_coercion() {
    let mut values = std::collections::BTreeMap::new();
    values.insert("api-url".to_string(), "https://acs".to_string());
    values.insert("api-key".to_string(), "k".to_string());
    values.insert("secret-key".to_string(), "s".to_string());

    for (raw, expected) in [("1", true), ("Yes", true), ("0", false), ("FALSE", false)] {
        values.insert("verify-ssl".to_string(), raw.to_string());
        let config = CloudConfig::from_pairs(&values).unwrap();
        assert_eq!(config.verify_ssl, expected, "verify-ssl={raw}");
    }

    values.insert("verify-ssl".to_string(), "maybe".to_string());
    assert!(CloudConfig::from_pairs(&values).is_err());
}

#[test]
fn test_missing_required_key_is_error() {
    let mut values = std::collections::BTreeMap::new();
    values.insert("api-url".to_string(), "https://acs".to_string());
    values.insert("api-key".to_string(), "k".to_string());

    let err = CloudConfig::from_pairs(&values).unwrap_err();
    assert!(err.to_string().contains("secret-key"));
}

#[test]
fn test_with_keys_preserves_endpoint() {
    let mut values = std::collections::BTreeMap::new();
    values.insert("api-url".to_string(), "https://acs".to_string());
    values.insert("api-key".to_string(), "base-key".to_string());
    values.insert("secret-key".to_string(), "base-secret".to_string());

    let base = CloudConfig::from_pairs(&values).unwrap();
    let scoped = base.with_keys("user-key", "user-secret");
    assert_eq!(scoped.api_url, base.api_url);
    assert_eq!(scoped.api_key, "user-key");
    assert_eq!(scoped.secret_key, "user-secret");
}
