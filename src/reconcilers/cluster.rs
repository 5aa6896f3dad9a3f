// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStackCluster reconciliation logic.
//!
//! The cluster controller materializes one `CloudStackFailureDomain` per
//! zone in the cluster spec, aggregates failure-domain readiness back into
//! the cluster status, and gates deletion on all child failure domains
//! being gone.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Resource, ResourceExt};
use tracing::{debug, info};

use crate::capi::{self, Cluster};
use crate::constants::{API_GROUP_VERSION, DEPENDENCY_REQUEUE_SECS, KIND_CLOUDSTACK_CLUSTER};
use crate::context::Context;
use crate::crd::{
    CloudStackCluster, CloudStackClusterStatus, CloudStackFailureDomain,
    CloudStackFailureDomainSpec, Condition, SecretRef, ZoneSpec, ZoneStatus,
};
use crate::labels::{CAPI_CLUSTER_LABEL, FINALIZER_CLUSTER};
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::runner::{
    dependency_requeue, done, get_owner_of_kind, patch_status, Flow, StageResult,
};
use crate::reconcilers::status::{create_condition, set_condition, CONDITION_READY};

/// Secret consulted for failure-domain credentials when the cluster does
/// not name one explicitly.
const DEFAULT_CREDENTIALS_SECRET: &str = "cloudstack-credentials";

/// Compute the name of the failure domain generated for a zone.
#[must_use]
pub fn failure_domain_name(cluster_name: &str, zone: &ZoneSpec) -> String {
    format!("{cluster_name}-{}", zone.name.to_lowercase())
}

/// Build the desired failure domain CR for one zone of a cluster.
///
/// The child carries both an owner reference (for garbage collection) and
/// the cluster-name label (so lookups survive cluster-controller restarts).
#[must_use]
pub fn desired_failure_domain(
    cluster: &CloudStackCluster,
    capi_cluster_name: &str,
    zone: &ZoneSpec,
) -> CloudStackFailureDomain {
    let cluster_name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();
    let secret_name = cluster
        .spec
        .identity_ref
        .as_ref()
        .map_or(DEFAULT_CREDENTIALS_SECRET, |r| r.name.as_str())
        .to_string();

    let mut labels = BTreeMap::new();
    labels.insert(
        CAPI_CLUSTER_LABEL.to_string(),
        capi_cluster_name.to_string(),
    );

    CloudStackFailureDomain {
        metadata: ObjectMeta {
            name: Some(failure_domain_name(&cluster_name, zone)),
            namespace: Some(namespace.clone()),
            labels: Some(labels),
            owner_references: Some(vec![OwnerReference {
                api_version: API_GROUP_VERSION.to_string(),
                kind: KIND_CLOUDSTACK_CLUSTER.to_string(),
                name: cluster_name,
                uid: cluster.metadata.uid.clone().unwrap_or_default(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..Default::default()
        },
        spec: CloudStackFailureDomainSpec {
            zone: zone.clone(),
            account: cluster.spec.account.clone(),
            domain: cluster.spec.domain.clone(),
            acs_endpoint: SecretRef {
                namespace,
                name: secret_name,
            },
        },
        status: None,
    }
}

/// Aggregate child failure-domain readiness into cluster status fields.
///
/// Returns the per-failure-domain readiness map, the per-zone status map
/// and whether every zone's failure domain is ready.
#[must_use]
pub fn aggregate_failure_domains(
    cluster_name: &str,
    zones: &[ZoneSpec],
    children: &[CloudStackFailureDomain],
) -> (BTreeMap<String, bool>, BTreeMap<String, ZoneStatus>, bool) {
    let mut readiness = BTreeMap::new();
    let mut zone_status = BTreeMap::new();

    for zone in zones {
        let fd_name = failure_domain_name(cluster_name, zone);
        let child = children.iter().find(|fd| fd.name_any() == fd_name);
        let ready = child
            .and_then(|fd| fd.status.as_ref())
            .is_some_and(|s| s.ready);
        readiness.insert(fd_name, ready);

        if let Some(child) = child {
            zone_status.insert(
                zone.name.clone(),
                ZoneStatus {
                    id: child.spec.zone.id.clone(),
                    network_id: child.spec.zone.network.id.clone(),
                    network_type: child.spec.zone.network.r#type.clone(),
                },
            );
        }
    }

    let all_ready = !readiness.is_empty() && readiness.values().all(|ready| *ready);
    (readiness, zone_status, all_ready)
}

/// List the failure domains labeled as belonging to a CAPI cluster.
async fn list_failure_domains(
    ctx: &Context,
    namespace: &str,
    capi_cluster_name: &str,
) -> Result<Vec<CloudStackFailureDomain>> {
    let api: Api<CloudStackFailureDomain> = Api::namespaced(ctx.client.clone(), namespace);
    let params =
        ListParams::default().labels(&format!("{CAPI_CLUSTER_LABEL}={capi_cluster_name}"));
    Ok(api.list(&params).await?.items)
}

/// Reconciles a `CloudStackCluster` resource.
///
/// # Errors
///
/// Returns an error when Kubernetes API operations fail; expected waits
/// (missing CAPI owner) surface as requeues instead.
pub async fn reconcile_cloudstack_cluster(
    ctx: Arc<Context>,
    cluster: CloudStackCluster,
) -> StageResult {
    let namespace = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();
    info!("Reconciling CloudStackCluster: {}/{}", namespace, name);

    if cluster.metadata.deletion_timestamp.is_some() {
        return delete_cloudstack_cluster(&ctx, &cluster).await;
    }

    // Parent linkage is set asynchronously by the CAPI core controllers.
    let Some(capi_cluster) = get_owner_of_kind::<Cluster>(&ctx.client, &cluster).await? else {
        debug!("CloudStackCluster {}/{} has no owning Cluster yet", namespace, name);
        return dependency_requeue();
    };
    if capi::is_paused(Some(&capi_cluster), cluster.annotations()) {
        debug!("reconciliation paused for {}/{}", namespace, name);
        return done();
    }

    ensure_finalizer(&ctx.client, &cluster, FINALIZER_CLUSTER).await?;

    // Materialize one failure domain per zone.
    let capi_name = capi_cluster.name_any();
    let fd_api: Api<CloudStackFailureDomain> = Api::namespaced(ctx.client.clone(), &namespace);
    for zone in &cluster.spec.zones {
        let fd_name = failure_domain_name(&name, zone);
        match fd_api.get_opt(&fd_name).await? {
            Some(_) => {}
            None => {
                let desired = desired_failure_domain(&cluster, &capi_name, zone);
                fd_api
                    .create(&PostParams::default(), &desired)
                    .await
                    .with_context(|| format!("failed to create failure domain {fd_name}"))?;
                info!("Created CloudStackFailureDomain {}/{}", namespace, fd_name);
            }
        }
    }

    // Reflect child readiness into status.
    let children = list_failure_domains(&ctx, &namespace, &capi_name).await?;
    let (failure_domains, zone_status_map, all_ready) =
        aggregate_failure_domains(&name, &cluster.spec.zones, &children);

    let mut status = cluster.status.clone().unwrap_or_default();
    status.failure_domains = failure_domains;
    status.zone_status_map = zone_status_map;
    status.ready = all_ready;
    set_ready_condition(&mut status, all_ready);
    patch_status(&ctx.client, &cluster, &status).await?;

    if all_ready {
        done()
    } else {
        Ok(Flow::Requeue(std::time::Duration::from_secs(
            DEPENDENCY_REQUEUE_SECS,
        )))
    }
}

fn set_ready_condition(status: &mut CloudStackClusterStatus, ready: bool) {
    let condition: Condition = if ready {
        create_condition(
            CONDITION_READY,
            "True",
            "FailureDomainsReady",
            "all failure domains resolved",
        )
    } else {
        create_condition(
            CONDITION_READY,
            "False",
            "WaitingForFailureDomains",
            "one or more failure domains are not ready",
        )
    };
    set_condition(&mut status.conditions, condition);
}

/// Cleans up a `CloudStackCluster` being deleted.
///
/// Deletion blocks until every child failure domain is gone; the failure
/// domains release their own cloud resources behind their own finalizers.
///
/// # Errors
///
/// Returns an error when Kubernetes API operations fail.
pub async fn delete_cloudstack_cluster(
    ctx: &Context,
    cluster: &CloudStackCluster,
) -> StageResult {
    let namespace = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();
    info!("CloudStackCluster {}/{} is being deleted", namespace, name);

    if !has_finalizer(cluster, FINALIZER_CLUSTER) {
        return done();
    }

    // Children link back via the CAPI cluster-name label; fall back to the
    // owner reference name when the owning Cluster is already gone.
    let capi_name = get_owner_of_kind::<Cluster>(&ctx.client, cluster)
        .await?
        .map_or_else(
            || {
                cluster
                    .owner_references()
                    .iter()
                    .find(|r| r.kind == Cluster::kind(&()).as_ref())
                    .map_or_else(|| name.clone(), |r| r.name.clone())
            },
            |c| c.name_any(),
        );

    let children = list_failure_domains(ctx, &namespace, &capi_name).await?;
    if !children.is_empty() {
        let fd_api: Api<CloudStackFailureDomain> = Api::namespaced(ctx.client.clone(), &namespace);
        for child in &children {
            if child.metadata.deletion_timestamp.is_none() {
                fd_api
                    .delete(&child.name_any(), &DeleteParams::default())
                    .await
                    .with_context(|| {
                        format!("failed to delete failure domain {}", child.name_any())
                    })?;
                info!("Deleted CloudStackFailureDomain {}", child.name_any());
            }
        }
        return dependency_requeue();
    }

    remove_finalizer(&ctx.client, cluster, FINALIZER_CLUSTER).await?;
    done()
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod cluster_tests;
