// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for CRD type definitions.

use super::*;
use kube::core::CustomResourceExt;
use kube::Resource;

#[test]
fn test_cluster_crd_group_and_kind() {
    assert_eq!(
        CloudStackCluster::group(&()),
        "infrastructure.cluster.x-k8s.io"
    );
    assert_eq!(CloudStackCluster::kind(&()), "CloudStackCluster");
    assert_eq!(CloudStackCluster::version(&()), "v1beta3");
}

#[test]
fn test_machine_spec_serializes_camel_case() {
    let spec = CloudStackMachineSpec {
        offering: ResourceIdentifier {
            name: Some("Medium".to_string()),
            id: None,
        },
        template: ResourceIdentifier {
            name: Some("Ubuntu20".to_string()),
            id: None,
        },
        disk_offering: None,
        ssh_key: Some("ops-key".to_string()),
        details: None,
        affinity: Some("pro".to_string()),
        affinity_group_ids: None,
        uncompressed_user_data: None,
        failure_domain_name: Some("fd-zone1".to_string()),
        identity_ref: None,
        instance_id: None,
        provider_id: None,
    };

    let json = serde_json::to_value(&spec).unwrap();
    assert_eq!(json["sshKey"], "ops-key");
    assert_eq!(json["failureDomainName"], "fd-zone1");
    // Unset optional fields are omitted entirely.
    assert!(json.get("instanceId").is_none());
    assert!(json.get("providerId").is_none());
}

#[test]
fn test_zone_status_map_round_trip() {
    let mut status = CloudStackClusterStatus::default();
    status.zone_status_map.insert(
        "zone1".to_string(),
        ZoneStatus {
            id: Some("z-1".to_string()),
            network_id: Some("n-1".to_string()),
            network_type: Some("Isolated".to_string()),
        },
    );
    status.failure_domains.insert("fd-zone1".to_string(), true);

    let json = serde_json::to_string(&status).unwrap();
    let back: CloudStackClusterStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(back.zone_status_map["zone1"].id.as_deref(), Some("z-1"));
    assert!(back.failure_domains["fd-zone1"]);
}

#[test]
fn test_machine_status_defaults() {
    let status: CloudStackMachineStatus = serde_json::from_str("{}").unwrap();
    assert!(!status.ready);
    assert!(status.addresses.is_empty());
    assert!(status.instance_state.is_none());
}

#[test]
fn test_all_crds_generate_schemas() {
    // Each CRD must yield a well-formed schema with a status subresource.
    for crd in [
        CloudStackCluster::crd(),
        CloudStackMachine::crd(),
        CloudStackFailureDomain::crd(),
        CloudStackIsolatedNetwork::crd(),
        CloudStackAffinityGroup::crd(),
        CloudStackMachineStateChecker::crd(),
    ] {
        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1beta3");
        assert!(version.subresources.is_some(), "status subresource missing");
    }
}
