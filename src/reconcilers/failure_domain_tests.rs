// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for failure-domain reconciliation helpers.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::*;
use crate::crd::{CloudStackFailureDomainSpec, NetworkSpec, SecretRef, ZoneSpec};

fn authority(desired: i32, observed: i32, ready: i32) -> ReplicaAuthority {
    ReplicaAuthority {
        desired: Some(desired),
        observed: Some(observed),
        ready: Some(ready),
    }
}

#[test]
fn test_replica_authority_reconciled() {
    assert!(authority(3, 3, 3).reconciled());
    assert!(!authority(3, 2, 2).reconciled());
    assert!(!authority(3, 3, 2).reconciled());
}

#[test]
fn test_replica_authority_unknown_counts_are_unsafe() {
    assert!(!ReplicaAuthority::default().reconciled());
    assert!(!ReplicaAuthority {
        desired: Some(3),
        observed: Some(3),
        ready: None,
    }
    .reconciled());
}

#[test]
fn test_machine_deletion_safe_requires_control_plane() {
    let authorities = [authority(3, 3, 3)];
    assert!(machine_deletion_safe(true, &authorities));
    assert!(!machine_deletion_safe(false, &authorities));
}

#[test]
fn test_machine_deletion_safe_blocks_mid_rollout() {
    let authorities = [authority(3, 3, 3), authority(5, 4, 4)];
    assert!(!machine_deletion_safe(true, &authorities));
}

#[test]
fn test_machine_deletion_safe_with_no_machines() {
    // Vacuously safe: nothing to destroy.
    assert!(machine_deletion_safe(true, &[]));
}

#[test]
fn test_isolated_network_name_is_sanitized() {
    let fd = CloudStackFailureDomain {
        metadata: ObjectMeta {
            name: Some("c-1-zone1".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: CloudStackFailureDomainSpec {
            zone: ZoneSpec {
                name: "zone1".to_string(),
                id: None,
                network: NetworkSpec {
                    name: "Guest_Network_One".to_string(),
                    id: None,
                    r#type: None,
                },
            },
            account: None,
            domain: None,
            acs_endpoint: SecretRef {
                namespace: "default".to_string(),
                name: "creds".to_string(),
            },
        },
        status: None,
    };
    assert_eq!(isolated_network_name(&fd), "guest-network-one");
}
