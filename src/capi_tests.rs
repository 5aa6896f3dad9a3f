// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the partial CAPI contract types.

use super::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

fn machine_with_labels(labels: Option<BTreeMap<String, String>>) -> Machine {
    Machine {
        metadata: ObjectMeta {
            name: Some("m-1".to_string()),
            namespace: Some("default".to_string()),
            labels,
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
fn test_is_control_plane_machine() {
    let mut labels = BTreeMap::new();
    labels.insert(
        "cluster.x-k8s.io/control-plane".to_string(),
        String::new(),
    );
    assert!(is_control_plane_machine(&machine_with_labels(Some(labels))));
    assert!(!is_control_plane_machine(&machine_with_labels(None)));
}

#[test]
fn test_is_paused_via_cluster_spec() {
    let cluster = Cluster {
        metadata: ObjectMeta::default(),
        spec: ClusterSpec {
            paused: Some(true),
            control_plane_ref: None,
            infrastructure_ref: None,
        },
        status: None,
    };
    assert!(is_paused(Some(&cluster), &BTreeMap::new()));
}

#[test]
fn test_is_paused_via_annotation() {
    let mut annotations = BTreeMap::new();
    annotations.insert("cluster.x-k8s.io/paused".to_string(), "true".to_string());
    assert!(is_paused(None, &annotations));
    assert!(!is_paused(None, &BTreeMap::new()));
}

#[test]
fn test_bootstrap_secret_name_absent_until_rendered() {
    let machine = machine_with_labels(None);
    assert!(bootstrap_secret_name(&machine).is_none());

    let mut machine = machine;
    machine.spec.bootstrap.data_secret_name = Some("m-1-bootstrap".to_string());
    assert_eq!(bootstrap_secret_name(&machine), Some("m-1-bootstrap"));
}

#[test]
fn test_machine_deserializes_capi_payload() {
    // Shape as served by the CAPI API server; unknown fields are ignored.
    let json = serde_json::json!({
        "apiVersion": "cluster.x-k8s.io/v1beta1",
        "kind": "Machine",
        "metadata": {"name": "m-1", "namespace": "default"},
        "spec": {
            "clusterName": "c-1",
            "bootstrap": {"dataSecretName": "m-1-bootstrap", "configRef": {"kind": "KubeadmConfig"}},
            "failureDomain": "fd-zone1",
            "version": "v1.29.0"
        },
        "status": {"phase": "Provisioning"}
    });
    let machine: Machine = serde_json::from_value(json).unwrap();
    assert_eq!(machine.spec.cluster_name, "c-1");
    assert_eq!(machine.spec.failure_domain.as_deref(), Some("fd-zone1"));
    assert_eq!(
        machine.status.as_ref().unwrap().phase.as_deref(),
        Some("Provisioning")
    );
}
