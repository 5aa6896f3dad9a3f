// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests for the CAPC controllers.
//!
//! These tests verify basic CRUD against a live Kubernetes cluster with the
//! CAPC CRDs installed. They skip gracefully when no cluster is reachable.
//!
//! Run with: cargo test --test simple_integration

mod common;

use capc::crd::{
    ApiEndpoint, CloudStackCluster, CloudStackClusterSpec, CloudStackMachine,
    CloudStackMachineSpec, IdentityRef, NetworkSpec, ResourceIdentifier, ZoneSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};

use common::{cleanup_test_namespace, create_test_namespace, get_kube_client_or_skip};

const TEST_NAMESPACE: &str = "capc-integration-test";

fn test_cluster(name: &str) -> CloudStackCluster {
    CloudStackCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: CloudStackClusterSpec {
            zones: vec![ZoneSpec {
                name: "zone1".to_string(),
                id: None,
                network: NetworkSpec {
                    name: "guest-net".to_string(),
                    id: None,
                    r#type: None,
                },
            }],
            control_plane_endpoint: ApiEndpoint {
                host: String::new(),
                port: 6443,
            },
            account: None,
            domain: None,
            identity_ref: Some(IdentityRef {
                kind: "Secret".to_string(),
                name: "cloudstack-credentials".to_string(),
            }),
        },
        status: None,
    }
}

fn test_machine(name: &str) -> CloudStackMachine {
    CloudStackMachine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
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
            failure_domain_name: None,
            identity_ref: None,
            instance_id: None,
            provider_id: None,
        },
        status: None,
    }
}

#[tokio::test]
async fn test_cloudstack_cluster_crud() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    if create_test_namespace(&client, TEST_NAMESPACE).await.is_err() {
        eprintln!("Skipping: cannot create test namespace");
        return;
    }

    let api: Api<CloudStackCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let cluster = test_cluster("crud-cluster");

    match api.create(&PostParams::default(), &cluster).await {
        Ok(created) => {
            assert_eq!(created.spec.zones.len(), 1);
            assert_eq!(created.spec.zones[0].name, "zone1");

            let fetched = api.get("crud-cluster").await.expect("get after create");
            assert_eq!(fetched.spec.control_plane_endpoint.port, 6443);

            api.delete("crud-cluster", &DeleteParams::default())
                .await
                .expect("delete");
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            eprintln!("Skipping: CloudStackCluster CRD not installed");
        }
        Err(e) => panic!("unexpected API error: {e}"),
    }

    let _ = cleanup_test_namespace(&client, TEST_NAMESPACE).await;
}

#[tokio::test]
async fn test_cloudstack_machine_crud() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    if create_test_namespace(&client, TEST_NAMESPACE).await.is_err() {
        eprintln!("Skipping: cannot create test namespace");
        return;
    }

    let api: Api<CloudStackMachine> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let machine = test_machine("crud-machine");

    match api.create(&PostParams::default(), &machine).await {
        Ok(created) => {
            assert_eq!(created.spec.offering.name.as_deref(), Some("Medium"));
            assert!(created.spec.instance_id.is_none());

            api.delete("crud-machine", &DeleteParams::default())
                .await
                .expect("delete");
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            eprintln!("Skipping: CloudStackMachine CRD not installed");
        }
        Err(e) => panic!("unexpected API error: {e}"),
    }

    let _ = cleanup_test_namespace(&client, TEST_NAMESPACE).await;
}
