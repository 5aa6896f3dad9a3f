// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for VM instance operations.

use std::io::Read;
use std::sync::Arc;

use base64::Engine;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::*;
use crate::cloud::mock::MockCloudApi;
use crate::crd::{
    CloudStackMachineDiskOffering, CloudStackMachineSpec, CloudStackMachineStatus, NetworkSpec,
    ZoneSpec,
};

fn machine(name: &str) -> CloudStackMachine {
    CloudStackMachine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: CloudStackMachineSpec {
            offering: ResourceIdentifier {
                name: Some("Medium".to_string()),
                id: None,
            },
            template: ResourceIdentifier {
                name: Some("Ubuntu20".to_string()),
                id: None,
            },
            disk_offering: None,
            ssh_key: None,
            details: None,
            affinity: None,
            affinity_group_ids: None,
            uncompressed_user_data: None,
            failure_domain_name: Some("fd-zone1".to_string()),
            identity_ref: None,
            instance_id: None,
            provider_id: None,
        },
        status: Some(CloudStackMachineStatus::default()),
    }
}

fn failure_domain_spec() -> CloudStackFailureDomainSpec {
    CloudStackFailureDomainSpec {
        zone: ZoneSpec {
            name: "zone1".to_string(),
            id: Some("z-1".to_string()),
            network: NetworkSpec {
                name: "net1".to_string(),
                id: Some("n-1".to_string()),
                r#type: Some("Shared".to_string()),
            },
        },
        account: None,
        domain: None,
        acs_endpoint: crate::crd::SecretRef {
            namespace: "default".to_string(),
            name: "creds".to_string(),
        },
    }
}

fn seeded_mock() -> MockCloudApi {
    let mock = MockCloudApi::new();
    mock.add_service_offering("so-1", "Medium");
    mock.add_template("t-1", "Ubuntu20");
    mock
}

#[tokio::test]
async fn test_deploy_sets_instance_and_provider_id() {
    let mock = seeded_mock();
    mock.require_resolve_before_create();
    let manager = CloudStackManager::from_api(Arc::new(mock.clone()));

    let mut m = machine("m-1");
    manager
        .get_or_create_vm_instance(&mut m, &failure_domain_spec(), &[], b"#cloud-config")
        .await
        .unwrap();

    let instance_id = m.spec.instance_id.clone().unwrap();
    assert_eq!(
        m.spec.provider_id.as_deref(),
        Some(format!("cloudstack:///{instance_id}").as_str())
    );
    let status = m.status.as_ref().unwrap();
    assert_eq!(status.instance_state.as_deref(), Some("Running"));
    assert!(!status.addresses.is_empty());
    assert_eq!(mock.calls("deploy_virtual_machine"), 1);
}

#[tokio::test]
async fn test_second_call_resolves_by_instance_id() {
    let mock = seeded_mock();
    let manager = CloudStackManager::from_api(Arc::new(mock.clone()));

    let mut m = machine("m-1");
    let fd = failure_domain_spec();
    manager
        .get_or_create_vm_instance(&mut m, &fd, &[], b"")
        .await
        .unwrap();
    let first = m.spec.instance_id.clone();

    manager
        .get_or_create_vm_instance(&mut m, &fd, &[], b"")
        .await
        .unwrap();
    assert_eq!(m.spec.instance_id, first);
    assert_eq!(mock.calls("deploy_virtual_machine"), 1, "must not redeploy");
}

#[tokio::test]
async fn test_adoption_by_name_before_deploy() {
    let mock = seeded_mock();
    mock.add_vm("vm-preexisting", "m-1", "Running");
    let manager = CloudStackManager::from_api(Arc::new(mock.clone()));

    let mut m = machine("m-1");
    manager
        .get_or_create_vm_instance(&mut m, &failure_domain_spec(), &[], b"")
        .await
        .unwrap();
    assert_eq!(m.spec.instance_id.as_deref(), Some("vm-preexisting"));
    assert_eq!(mock.calls("deploy_virtual_machine"), 0);
}

#[tokio::test]
async fn test_missing_template_is_not_found() {
    let mock = MockCloudApi::new();
    mock.add_service_offering("so-1", "Medium");
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let mut m = machine("m-1");
    let err = manager
        .get_or_create_vm_instance(&mut m, &failure_domain_spec(), &[], b"")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("Ubuntu20"));
}

#[tokio::test]
async fn test_custom_disk_offering_requires_size() {
    let mock = seeded_mock();
    mock.add_disk_offering("do-1", "BigDisk", true);
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let mut m = machine("m-1");
    m.spec.disk_offering = Some(CloudStackMachineDiskOffering {
        name: Some("BigDisk".to_string()),
        id: None,
        custom_size_in_gb: None,
    });
    let err = manager
        .get_or_create_vm_instance(&mut m, &failure_domain_spec(), &[], b"")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("custom size"));
}

#[tokio::test]
async fn test_resolve_details_refreshes_state() {
    let mock = seeded_mock();
    let manager = CloudStackManager::from_api(Arc::new(mock.clone()));

    let mut m = machine("m-1");
    manager
        .get_or_create_vm_instance(&mut m, &failure_domain_spec(), &[], b"")
        .await
        .unwrap();
    let instance_id = m.spec.instance_id.clone().unwrap();

    mock.set_vm_state(&instance_id, "Error");
    manager.resolve_vm_instance_details(&mut m).await.unwrap();
    assert_eq!(
        m.status.as_ref().unwrap().instance_state.as_deref(),
        Some("Error")
    );
}

#[tokio::test]
async fn test_resolve_details_missing_instance_is_not_found() {
    let mock = seeded_mock();
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let mut m = machine("m-1");
    m.spec.instance_id = Some("vm-gone".to_string());
    let err = manager.resolve_vm_instance_details(&mut m).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_slow_deploy_reports_interim_state() {
    let mock = seeded_mock();
    mock.set_deploy_state("Starting");
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let mut m = machine("m-1");
    manager
        .get_or_create_vm_instance(&mut m, &failure_domain_spec(), &[], b"")
        .await
        .unwrap();
    assert_eq!(
        m.status.as_ref().unwrap().instance_state.as_deref(),
        Some("Starting")
    );
    assert!(m.status.as_ref().unwrap().instance_state_last_updated.is_some());
}

#[tokio::test]
async fn test_deploy_failure_surfaces_injected_error() {
    let mock = seeded_mock();
    mock.inject_error(
        "deploy_virtual_machine",
        "Unable to deploy VM: insufficient capacity",
    );
    let manager = CloudStackManager::from_api(Arc::new(mock.clone()));

    let mut m = machine("m-1");
    let err = manager
        .get_or_create_vm_instance(&mut m, &failure_domain_spec(), &[], b"")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("insufficient capacity"));
    assert!(m.spec.instance_id.is_none());

    // The error was consumed; the retry deploys.
    manager
        .get_or_create_vm_instance(&mut m, &failure_domain_spec(), &[], b"")
        .await
        .unwrap();
    assert!(m.spec.instance_id.is_some());
}

#[tokio::test]
async fn test_destroy_tolerates_missing_instance() {
    let mock = seeded_mock();
    let manager = CloudStackManager::from_api(Arc::new(mock));

    let mut m = machine("m-1");
    m.spec.instance_id = Some("vm-gone".to_string());
    manager.destroy_vm_instance(&m).await.unwrap();
}

#[test]
fn test_encode_user_data_small_is_plain_base64() {
    let data = b"#cloud-config\n";
    let encoded = encode_user_data(data, false);
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    assert_eq!(decoded, data);
}

#[test]
fn test_encode_user_data_large_is_gzipped() {
    let data = vec![b'x'; 10 * 1024];
    let encoded = encode_user_data(&data, false);
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    // Gzip magic bytes.
    assert_eq!(&decoded[..2], &[0x1f, 0x8b]);

    let mut inflated = Vec::new();
    flate2::read::GzDecoder::new(decoded.as_slice())
        .read_to_end(&mut inflated)
        .unwrap();
    assert_eq!(inflated, data);
}

#[test]
fn test_encode_user_data_respects_uncompressed_flag() {
    let data = vec![b'x'; 10 * 1024];
    let encoded = encode_user_data(&data, true);
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    assert_eq!(decoded, data);
}
