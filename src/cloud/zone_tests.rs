// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for zone resolution.

use std::sync::Arc;

use super::*;
use crate::cloud::mock::MockCloudApi;
use crate::cloud::ErrorKind;
use crate::crd::NetworkSpec;

fn zone_spec(name: &str, network: &str) -> ZoneSpec {
    ZoneSpec {
        name: name.to_string(),
        id: None,
        network: NetworkSpec {
            name: network.to_string(),
            id: None,
            r#type: None,
        },
    }
}

#[tokio::test]
async fn test_resolve_zone_by_name_sets_id() {
    let mock = MockCloudApi::new();
    mock.add_zone("z-1", "zone1");
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let mut zone = zone_spec("zone1", "net1");
    manager.resolve_zone(&mut zone).await.unwrap();
    assert_eq!(zone.id.as_deref(), Some("z-1"));
}

#[tokio::test]
async fn test_resolve_zone_zero_matches_is_not_found() {
    let mock = MockCloudApi::new();
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let mut zone = zone_spec("missing", "net1");
    let err = manager.resolve_zone(&mut zone).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_resolve_zone_duplicate_names_is_ambiguous() {
    let mock = MockCloudApi::new();
    mock.add_zone("z-1", "zone1");
    mock.add_zone("z-2", "zone1");
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let mut zone = zone_spec("zone1", "net1");
    let err = manager.resolve_zone(&mut zone).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ambiguous);
    assert!(err.to_string().contains("found 2"));
}

#[tokio::test]
async fn test_resolve_network_fills_type() {
    let mock = MockCloudApi::new();
    mock.add_zone("z-1", "zone1");
    mock.add_network("n-1", "net1", "Shared", "z-1");
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let mut zone = zone_spec("zone1", "net1");
    manager.resolve_zone(&mut zone).await.unwrap();
    manager.resolve_network_for_zone(&mut zone).await.unwrap();
    assert_eq!(zone.network.id.as_deref(), Some("n-1"));
    assert_eq!(zone.network.r#type.as_deref(), Some("Shared"));
}

#[tokio::test]
async fn test_resolve_network_absent_is_not_found() {
    let mock = MockCloudApi::new();
    mock.add_zone("z-1", "zone1");
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let mut zone = zone_spec("zone1", "to-be-created");
    manager.resolve_zone(&mut zone).await.unwrap();
    let err = manager
        .resolve_network_for_zone(&mut zone)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
