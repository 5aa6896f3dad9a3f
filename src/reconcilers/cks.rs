// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStack Kubernetes Service (CKS) reconciliation logic.
//!
//! Two additional controllers run over the existing CRDs: one on
//! `CloudStackCluster` maintaining the "ExternalManaged" CKS shadow cluster
//! whose lifecycle mirrors the CAPI cluster, and one on `CloudStackMachine`
//! keeping the shadow cluster's VM membership in sync. Each holds its own
//! finalizer so shadow-object cleanup happens before the primary
//! controllers release the resources.

use std::sync::Arc;

use kube::{Api, ResourceExt};
use tracing::{debug, info, warn};

use crate::capi::{self, Cluster, Machine};
use crate::context::Context;
use crate::crd::{CloudStackCluster, CloudStackFailureDomain, CloudStackMachine};
use crate::labels::{CAPI_CLUSTER_LABEL, FINALIZER_CKS_CLUSTER, FINALIZER_CKS_MACHINE};
use crate::reconcilers::cluster::failure_domain_name;
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::runner::{
    dependency_requeue, done, get_owner_of_kind, patch_status, StageResult,
};

/// Pick the failure domain whose credential scope anchors the CKS shadow
/// cluster: the first zone's.
async fn anchor_failure_domain(
    ctx: &Context,
    cluster: &CloudStackCluster,
) -> anyhow::Result<Option<CloudStackFailureDomain>> {
    let Some(zone) = cluster.spec.zones.first() else {
        return Ok(None);
    };
    let namespace = cluster.namespace().unwrap_or_default();
    let fd_name = failure_domain_name(&cluster.name_any(), zone);
    let api: Api<CloudStackFailureDomain> = Api::namespaced(ctx.client.clone(), &namespace);
    Ok(api.get_opt(&fd_name).await?)
}

/// Reconciles the CKS shadow cluster of a `CloudStackCluster`.
///
/// # Errors
///
/// Returns an error when CloudStack or Kubernetes operations fail; missing
/// parents surface as requeues.
pub async fn reconcile_cks_cluster(
    ctx: Arc<Context>,
    cluster: CloudStackCluster,
) -> StageResult {
    let namespace = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();
    debug!("Reconciling CKS shadow cluster for {}/{}", namespace, name);

    if cluster.metadata.deletion_timestamp.is_some() {
        return delete_cks_cluster(&ctx, &cluster).await;
    }

    let Some(capi_cluster) = get_owner_of_kind::<Cluster>(&ctx.client, &cluster).await? else {
        return dependency_requeue();
    };
    if capi::is_paused(Some(&capi_cluster), cluster.annotations()) {
        return done();
    }

    let Some(failure_domain) = anchor_failure_domain(&ctx, &cluster).await? else {
        return dependency_requeue();
    };
    if !failure_domain.status.as_ref().is_some_and(|s| s.ready) {
        return dependency_requeue();
    }

    ensure_finalizer(&ctx.client, &cluster, FINALIZER_CKS_CLUSTER).await?;

    let (manager, _domain_id) = ctx.failure_domain_manager(&failure_domain).await?;
    let mut desired = cluster.clone();
    manager
        .get_or_create_cks_cluster(&capi_cluster, &mut desired, &failure_domain.spec)
        .await?;

    if desired.status != cluster.status {
        if let Some(status) = &desired.status {
            patch_status(&ctx.client, &cluster, status).await?;
        }
    }
    done()
}

/// Removes the CKS shadow cluster of a `CloudStackCluster` being deleted.
///
/// # Errors
///
/// Returns an error when the CloudStack delete or finalizer removal fails.
pub async fn delete_cks_cluster(ctx: &Context, cluster: &CloudStackCluster) -> StageResult {
    if !has_finalizer(cluster, FINALIZER_CKS_CLUSTER) {
        return done();
    }
    let namespace = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();
    info!("Removing CKS shadow cluster for {}/{}", namespace, name);

    match anchor_failure_domain(ctx, cluster).await? {
        Some(failure_domain) => {
            let (manager, _domain_id) = ctx.failure_domain_manager(&failure_domain).await?;
            let mut target = cluster.clone();
            manager.delete_cks_cluster(&mut target).await?;
        }
        None => {
            warn!(
                "releasing CKS shadow cluster for {}/{} without cloud cleanup: failure domain gone",
                namespace, name
            );
        }
    }

    remove_finalizer(&ctx.client, cluster, FINALIZER_CKS_CLUSTER).await?;
    done()
}

/// Reconciles the CKS membership of a `CloudStackMachine`.
///
/// Once the machine has an instance ID, its VM is attached to the owning
/// cluster's CKS shadow cluster; on deletion it is detached again.
///
/// # Errors
///
/// Returns an error when CloudStack or Kubernetes operations fail; missing
/// parents surface as requeues.
pub async fn reconcile_cks_machine(
    ctx: Arc<Context>,
    machine: CloudStackMachine,
) -> StageResult {
    let namespace = machine.namespace().unwrap_or_default();
    let name = machine.name_any();
    debug!("Reconciling CKS membership for {}/{}", namespace, name);

    if machine.metadata.deletion_timestamp.is_some() {
        return delete_cks_machine(&ctx, &machine).await;
    }

    // Membership needs a deployed instance.
    let Some(instance_id) = machine.spec.instance_id.clone() else {
        return dependency_requeue();
    };

    let Some(cluster) = cluster_for_machine(&ctx, &machine).await? else {
        return dependency_requeue();
    };
    if cluster
        .status
        .as_ref()
        .and_then(|s| s.cloud_stack_cluster_id.as_ref())
        .is_none()
    {
        debug!("CKS shadow cluster not created yet");
        return dependency_requeue();
    }

    let Some(failure_domain) = machine_failure_domain(&ctx, &machine).await? else {
        return dependency_requeue();
    };

    ensure_finalizer(&ctx.client, &machine, FINALIZER_CKS_MACHINE).await?;

    let (manager, _domain_id) = ctx.failure_domain_manager(&failure_domain).await?;
    manager.add_vm_to_cks_cluster(&cluster, &instance_id).await?;
    done()
}

/// Removes a machine's VM from the CKS shadow cluster on deletion.
///
/// # Errors
///
/// Returns an error when the CloudStack call or finalizer removal fails.
pub async fn delete_cks_machine(ctx: &Context, machine: &CloudStackMachine) -> StageResult {
    if !has_finalizer(machine, FINALIZER_CKS_MACHINE) {
        return done();
    }
    let namespace = machine.namespace().unwrap_or_default();
    let name = machine.name_any();
    info!("Removing CKS membership for {}/{}", namespace, name);

    let cluster = cluster_for_machine(ctx, machine).await?;
    let failure_domain = machine_failure_domain(ctx, machine).await?;
    match (
        machine.spec.instance_id.clone(),
        cluster,
        failure_domain,
    ) {
        (Some(instance_id), Some(cluster), Some(failure_domain)) => {
            let (manager, _domain_id) = ctx.failure_domain_manager(&failure_domain).await?;
            manager
                .remove_vm_from_cks_cluster(&cluster, &instance_id)
                .await?;
        }
        _ => {
            debug!("skipping CKS detach: instance or parents already gone");
        }
    }

    remove_finalizer(&ctx.client, machine, FINALIZER_CKS_MACHINE).await?;
    done()
}

/// The CloudStackCluster a machine belongs to, via its CAPI machine owner.
async fn cluster_for_machine(
    ctx: &Context,
    machine: &CloudStackMachine,
) -> anyhow::Result<Option<CloudStackCluster>> {
    let namespace = machine.namespace().unwrap_or_default();
    if let Some(capi_machine) = get_owner_of_kind::<Machine>(&ctx.client, machine).await? {
        return crate::reconcilers::cloudstack_cluster_for_capi_name(
            ctx,
            &namespace,
            &capi_machine.spec.cluster_name,
        )
        .await;
    }
    // Fallback through the cluster-name label when the CAPI machine is
    // already gone (deletion path).
    if let Some(capi_name) = machine.labels().get(CAPI_CLUSTER_LABEL) {
        return crate::reconcilers::cloudstack_cluster_for_capi_name(ctx, &namespace, capi_name)
            .await;
    }
    Ok(None)
}

/// The failure domain a machine is placed into, if resolvable.
async fn machine_failure_domain(
    ctx: &Context,
    machine: &CloudStackMachine,
) -> anyhow::Result<Option<CloudStackFailureDomain>> {
    let Some(fd_name) = &machine.spec.failure_domain_name else {
        return Ok(None);
    };
    let namespace = machine.namespace().unwrap_or_default();
    let api: Api<CloudStackFailureDomain> = Api::namespaced(ctx.client.clone(), &namespace);
    Ok(api.get_opt(fd_name).await?)
}
