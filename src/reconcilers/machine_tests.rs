// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for machine reconciliation helpers.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use super::*;
use crate::capi::{Bootstrap, MachineSpec};

fn capi_machine_with_owner(kind: &str) -> Machine {
    Machine {
        metadata: ObjectMeta {
            name: Some("m-1".to_string()),
            namespace: Some("default".to_string()),
            owner_references: Some(vec![
                OwnerReference {
                    api_version: "cluster.x-k8s.io/v1beta1".to_string(),
                    kind: "Cluster".to_string(),
                    name: "c-1".to_string(),
                    uid: "uid-cluster".to_string(),
                    controller: None,
                    block_owner_deletion: None,
                },
                OwnerReference {
                    api_version: "cluster.x-k8s.io/v1beta1".to_string(),
                    kind: kind.to_string(),
                    name: "owner-1".to_string(),
                    uid: "uid-owner".to_string(),
                    controller: Some(true),
                    block_owner_deletion: None,
                },
            ]),
            ..Default::default()
        },
        spec: MachineSpec {
            cluster_name: "c-1".to_string(),
            bootstrap: Bootstrap::default(),
            failure_domain: None,
            provider_id: None,
        },
        status: None,
    }
}

#[test]
fn test_deployable_owner_finds_machineset() {
    let machine = capi_machine_with_owner("MachineSet");
    let owner = deployable_owner(&machine).unwrap();
    assert_eq!(owner.kind, "MachineSet");
    assert_eq!(owner.name, "owner-1");
}

#[test]
fn test_deployable_owner_finds_control_plane_kinds() {
    for kind in ["KubeadmControlPlane", "EtcdadmCluster"] {
        let machine = capi_machine_with_owner(kind);
        assert_eq!(deployable_owner(&machine).unwrap().kind, kind);
    }
}

#[test]
fn test_deployable_owner_ignores_other_kinds() {
    let machine = capi_machine_with_owner("SomethingElse");
    assert!(deployable_owner(&machine).is_none());
}

#[test]
fn test_reconcile_stage_names_cover_guards() {
    // The guard pipeline must bind parents before the cloud client: a
    // reordered pipeline would query CloudStack with no credential scope.
    let names: Vec<&str> = RECONCILE_STAGES.iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![
            "get_capi_machine",
            "get_capi_cluster",
            "check_paused",
            "require_infrastructure_ready",
            "get_failure_domain",
            "bind_cloud_client",
        ]
    );
}
