// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for credential resolution.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::*;
use crate::cloud::mock::MockCloudApi;
use crate::cloud::DynCloudApi;

fn base_config() -> CloudConfig {
    let mut values = BTreeMap::new();
    values.insert("api-url".to_string(), "https://acs/client/api".to_string());
    values.insert("api-key".to_string(), "endpoint-key".to_string());
    values.insert("secret-key".to_string(), "endpoint-secret".to_string());
    CloudConfig::from_pairs(&values).unwrap()
}

/// Factory handing out mocks keyed by the config's API key, so tests can
/// observe which identity each client was built for.
fn mock_factory(seed: MockCloudApi) -> CloudApiFactory {
    let built: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    Arc::new(move |config: &CloudConfig| {
        built.lock().unwrap().push(config.api_key.clone());
        let api = if config.api_key == "endpoint-key" {
            seed.clone()
        } else {
            MockCloudApi::with_api_key(&config.api_key)
        };
        Ok(Arc::new(api) as DynCloudApi)
    })
}

fn seeded_mock() -> MockCloudApi {
    let mock = MockCloudApi::with_api_key("endpoint-key");
    mock.add_domain("d-root", "ROOT", "ROOT");
    mock.add_domain("d-sub", "team", "ROOT/team");
    mock.add_account("d-sub", "acct-1", "cluster-account");
    mock.add_user(
        "cluster-account",
        "d-sub",
        "u-1",
        "capc-user",
        "user-key",
        "user-secret",
    );
    mock
}

#[tokio::test]
async fn test_no_account_returns_base_client() {
    let factory = mock_factory(seeded_mock());
    let (manager, domain_id) = failure_domain_manager(&factory, &base_config(), None, None)
        .await
        .unwrap();
    assert_eq!(manager.api_key(), "endpoint-key");
    assert!(domain_id.is_none());
}

#[tokio::test]
async fn test_account_yields_impersonated_client() {
    let factory = mock_factory(seeded_mock());
    let (manager, domain_id) = failure_domain_manager(
        &factory,
        &base_config(),
        Some("cluster-account"),
        Some("team"),
    )
    .await
    .unwrap();
    // The scoped client authenticates with the resolved user's key, not the
    // endpoint's.
    assert_eq!(manager.api_key(), "user-key");
    assert_eq!(domain_id.as_deref(), Some("d-sub"));
}

#[tokio::test]
async fn test_missing_domain_fails_closed() {
    let factory = mock_factory(seeded_mock());
    let err = failure_domain_manager(
        &factory,
        &base_config(),
        Some("cluster-account"),
        Some("no-such-team"),
    )
    .await
    .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_account_without_api_key_fails_closed() {
    let mock = seeded_mock();
    mock.add_account("d-sub", "acct-2", "keyless-account");
    let factory = mock_factory(mock);
    let err = failure_domain_manager(
        &factory,
        &base_config(),
        Some("keyless-account"),
        Some("team"),
    )
    .await
    .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_domain_path_resolution_auto_prefixes_root() {
    let mock = seeded_mock();
    let manager = CloudStackManager::from_api(Arc::new(mock));

    // "team" and "ROOT/team" resolve identically.
    assert_eq!(manager.resolve_domain_id("team").await.unwrap(), "d-sub");
    assert_eq!(
        manager.resolve_domain_id("ROOT/team").await.unwrap(),
        "d-sub"
    );
    assert_eq!(manager.resolve_domain_id("ROOT").await.unwrap(), "d-root");
}

#[tokio::test]
async fn test_ambiguous_account_fails() {
    let mock = seeded_mock();
    mock.add_account("d-sub", "acct-dup", "cluster-account");
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let err = manager
        .resolve_user("cluster-account", "team")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), crate::cloud::ErrorKind::Ambiguous);
}
