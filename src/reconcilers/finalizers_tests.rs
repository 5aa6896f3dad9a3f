// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for finalizer helpers that do not need an API server.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::*;
use crate::crd::{CloudStackMachine, CloudStackMachineSpec, ResourceIdentifier};
use crate::labels::FINALIZER_MACHINE;

fn machine_with_finalizers(finalizers: Option<Vec<String>>) -> CloudStackMachine {
    CloudStackMachine {
        metadata: ObjectMeta {
            name: Some("m-1".to_string()),
            namespace: Some("default".to_string()),
            finalizers,
            ..Default::default()
        },
        spec: CloudStackMachineSpec {
            offering: ResourceIdentifier::default(),
            template: ResourceIdentifier::default(),
            disk_offering: None,
            ssh_key: None,
            details: None,
            affinity: None,
            affinity_group_ids: None,
            uncompressed_user_data: None,
            failure_domain_name: None,
            identity_ref: None,
            instance_id: None,
            provider_id: None,
        },
        status: None,
    }
}

#[test]
fn test_has_finalizer_absent() {
    let machine = machine_with_finalizers(None);
    assert!(!has_finalizer(&machine, FINALIZER_MACHINE));

    let machine = machine_with_finalizers(Some(vec!["other/finalizer".to_string()]));
    assert!(!has_finalizer(&machine, FINALIZER_MACHINE));
}

#[test]
fn test_has_finalizer_present() {
    let machine = machine_with_finalizers(Some(vec![
        "other/finalizer".to_string(),
        FINALIZER_MACHINE.to_string(),
    ]));
    assert!(has_finalizer(&machine, FINALIZER_MACHINE));
}
