// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for CKS shadow cluster operations.

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::*;
use crate::capi::ClusterSpec;
use crate::cloud::mock::MockCloudApi;
use crate::crd::{
    ApiEndpoint, CloudStackClusterSpec, CloudStackClusterStatus, NetworkSpec, SecretRef, ZoneSpec,
};

fn capi_cluster() -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some("capi-c".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: ClusterSpec {
            paused: None,
            control_plane_ref: None,
            infrastructure_ref: None,
        },
        status: None,
    }
}

fn cs_cluster() -> CloudStackCluster {
    CloudStackCluster {
        metadata: ObjectMeta {
            name: Some("cs-c".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("uid-1".to_string()),
            ..Default::default()
        },
        spec: CloudStackClusterSpec {
            zones: vec![],
            control_plane_endpoint: ApiEndpoint::default(),
            account: None,
            domain: None,
            identity_ref: None,
        },
        status: Some(CloudStackClusterStatus::default()),
    }
}

fn fd_spec() -> CloudStackFailureDomainSpec {
    CloudStackFailureDomainSpec {
        zone: ZoneSpec {
            name: "zone1".to_string(),
            id: Some("z-1".to_string()),
            network: NetworkSpec::default(),
        },
        account: None,
        domain: None,
        acs_endpoint: SecretRef {
            namespace: "default".to_string(),
            name: "creds".to_string(),
        },
    }
}

fn stored_id(cluster: &CloudStackCluster) -> Option<String> {
    cluster
        .status
        .as_ref()
        .and_then(|s| s.cloud_stack_cluster_id.clone())
}

#[test]
fn test_composite_name_format() {
    let name = cks_cluster_name(&capi_cluster(), &cs_cluster());
    assert_eq!(name, "capi-c - cs-c - uid-1");
}

#[tokio::test]
async fn test_get_or_create_stores_id_and_is_idempotent() {
    let mock = MockCloudApi::new();
    mock.require_resolve_before_create();
    let manager = CloudStackManager::from_api(Arc::new(mock.clone()));

    let capi = capi_cluster();
    let mut cs = cs_cluster();
    manager
        .get_or_create_cks_cluster(&capi, &mut cs, &fd_spec())
        .await
        .unwrap();
    let id = stored_id(&cs).unwrap();
    assert_eq!(mock.calls("create_kubernetes_cluster"), 1);

    manager
        .get_or_create_cks_cluster(&capi, &mut cs, &fd_spec())
        .await
        .unwrap();
    assert_eq!(stored_id(&cs).as_deref(), Some(id.as_str()));
    assert_eq!(mock.calls("create_kubernetes_cluster"), 1);
}

#[tokio::test]
async fn test_lookup_by_composite_name_recovers_lost_status() {
    let mock = MockCloudApi::new();
    let manager = CloudStackManager::from_api(Arc::new(mock.clone()));

    let capi = capi_cluster();
    let mut cs = cs_cluster();
    manager
        .get_or_create_cks_cluster(&capi, &mut cs, &fd_spec())
        .await
        .unwrap();
    let id = stored_id(&cs).unwrap();

    // Simulate a crash between create and status patch: the stored ID is
    // gone, but the name lookup finds the shadow cluster again.
    let mut amnesiac = cs_cluster();
    manager
        .get_or_create_cks_cluster(&capi, &mut amnesiac, &fd_spec())
        .await
        .unwrap();
    assert_eq!(stored_id(&amnesiac).as_deref(), Some(id.as_str()));
    assert_eq!(mock.calls("create_kubernetes_cluster"), 1);
}

#[tokio::test]
async fn test_vm_membership_round_trip() {
    let mock = MockCloudApi::new();
    let manager = CloudStackManager::from_api(Arc::new(mock.clone()));

    let capi = capi_cluster();
    let mut cs = cs_cluster();
    manager
        .get_or_create_cks_cluster(&capi, &mut cs, &fd_spec())
        .await
        .unwrap();
    let id = stored_id(&cs).unwrap();

    manager.add_vm_to_cks_cluster(&cs, "vm-1").await.unwrap();
    assert_eq!(mock.cks_members(&id), vec!["vm-1".to_string()]);

    manager
        .remove_vm_from_cks_cluster(&cs, "vm-1")
        .await
        .unwrap();
    assert!(mock.cks_members(&id).is_empty());
}

#[tokio::test]
async fn test_delete_clears_stored_id() {
    let mock = MockCloudApi::new();
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let capi = capi_cluster();
    let mut cs = cs_cluster();
    manager
        .get_or_create_cks_cluster(&capi, &mut cs, &fd_spec())
        .await
        .unwrap();

    manager.delete_cks_cluster(&mut cs).await.unwrap();
    assert!(stored_id(&cs).is_none());

    // Deleting again is a no-op.
    manager.delete_cks_cluster(&mut cs).await.unwrap();
}

#[tokio::test]
async fn test_add_vm_without_shadow_cluster_fails() {
    let mock = MockCloudApi::new();
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let cs = cs_cluster();
    let err = manager.add_vm_to_cks_cluster(&cs, "vm-1").await.unwrap_err();
    assert!(err.is_not_found());
}
