// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for cluster reconciliation helpers.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::*;
use crate::crd::{ApiEndpoint, CloudStackClusterSpec, CloudStackFailureDomainStatus, IdentityRef, NetworkSpec};

fn zone(name: &str) -> ZoneSpec {
    ZoneSpec {
        name: name.to_string(),
        id: None,
        network: NetworkSpec {
            name: format!("{name}-net"),
            id: None,
            r#type: None,
        },
    }
}

fn cluster(zones: Vec<ZoneSpec>) -> CloudStackCluster {
    CloudStackCluster {
        metadata: ObjectMeta {
            name: Some("c-1".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("uid-1".to_string()),
            ..Default::default()
        },
        spec: CloudStackClusterSpec {
            zones,
            control_plane_endpoint: ApiEndpoint {
                host: String::new(),
                port: 6443,
            },
            account: None,
            domain: None,
            identity_ref: Some(IdentityRef {
                kind: "Secret".to_string(),
                name: "acs-creds".to_string(),
            }),
        },
        status: None,
    }
}

fn child(name: &str, ready: bool) -> CloudStackFailureDomain {
    let mut fd = desired_failure_domain(&cluster(vec![zone("zone1")]), "capi-c", &zone("zone1"));
    fd.metadata.name = Some(name.to_string());
    fd.status = Some(CloudStackFailureDomainStatus {
        ready,
        conditions: vec![],
    });
    fd
}

#[test]
fn test_failure_domain_name_is_deterministic() {
    let z = zone("Zone1");
    assert_eq!(failure_domain_name("c-1", &z), "c-1-zone1");
    assert_eq!(failure_domain_name("c-1", &z), failure_domain_name("c-1", &z));
}

#[test]
fn test_desired_failure_domain_carries_owner_and_label() {
    let c = cluster(vec![zone("zone1")]);
    let fd = desired_failure_domain(&c, "capi-c", &c.spec.zones[0]);

    let owner = &fd.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!(owner.kind, "CloudStackCluster");
    assert_eq!(owner.name, "c-1");
    assert_eq!(owner.uid, "uid-1");

    let labels = fd.metadata.labels.as_ref().unwrap();
    assert_eq!(
        labels.get("cluster.x-k8s.io/cluster-name").map(String::as_str),
        Some("capi-c")
    );
    assert_eq!(fd.spec.acs_endpoint.name, "acs-creds");
    assert_eq!(fd.spec.acs_endpoint.namespace, "default");
    assert_eq!(fd.spec.zone.name, "zone1");
}

#[test]
fn test_desired_failure_domain_defaults_credentials_secret() {
    let mut c = cluster(vec![zone("zone1")]);
    c.spec.identity_ref = None;
    let fd = desired_failure_domain(&c, "capi-c", &c.spec.zones[0]);
    assert_eq!(fd.spec.acs_endpoint.name, "cloudstack-credentials");
}

#[test]
fn test_aggregate_reports_missing_children_not_ready() {
    let c = cluster(vec![zone("zone1"), zone("zone2")]);
    let children = vec![child("c-1-zone1", true)];

    let (readiness, _zones, all_ready) =
        aggregate_failure_domains("c-1", &c.spec.zones, &children);
    assert_eq!(readiness.get("c-1-zone1"), Some(&true));
    assert_eq!(readiness.get("c-1-zone2"), Some(&false));
    assert!(!all_ready);
}

#[test]
fn test_aggregate_all_ready() {
    let c = cluster(vec![zone("zone1")]);
    let mut fd = child("c-1-zone1", true);
    fd.spec.zone.id = Some("z-1".to_string());
    fd.spec.zone.network.id = Some("n-1".to_string());
    fd.spec.zone.network.r#type = Some("Isolated".to_string());

    let (readiness, zones, all_ready) =
        aggregate_failure_domains("c-1", &c.spec.zones, &[fd]);
    assert!(all_ready);
    assert_eq!(readiness.len(), 1);

    let zone_status = zones.get("zone1").unwrap();
    assert_eq!(zone_status.id.as_deref(), Some("z-1"));
    assert_eq!(zone_status.network_type.as_deref(), Some("Isolated"));
}

#[test]
fn test_aggregate_no_zones_is_not_ready() {
    let (_readiness, _zones, all_ready) = aggregate_failure_domains("c-1", &[], &[]);
    assert!(!all_ready);
}
