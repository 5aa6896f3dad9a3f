// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStackIsolatedNetwork reconciliation logic.
//!
//! Brings an isolated guest network to ready: the network itself, the
//! public IP fronting the cluster's control-plane endpoint, egress firewall
//! rules and the load balancer rule. Teardown releases those resources via
//! tag-based reference counting.

use std::sync::Arc;

use kube::{Api, ResourceExt};
use tracing::{info, warn};

use crate::capi;
use crate::context::Context;
use crate::crd::{CloudStackFailureDomain, CloudStackIsolatedNetwork};
use crate::labels::FINALIZER_ISOLATED_NETWORK;
use crate::reconcilers::cloudstack_cluster_for;
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::runner::{
    dependency_requeue, done, patch_spec, patch_status, StageResult,
};

/// Reconciles a `CloudStackIsolatedNetwork` resource.
///
/// # Errors
///
/// Returns an error when CloudStack or Kubernetes operations fail; missing
/// parents surface as requeues.
pub async fn reconcile_isolated_network(
    ctx: Arc<Context>,
    iso_net: CloudStackIsolatedNetwork,
) -> StageResult {
    let namespace = iso_net.namespace().unwrap_or_default();
    let name = iso_net.name_any();
    info!("Reconciling CloudStackIsolatedNetwork: {}/{}", namespace, name);

    if iso_net.metadata.deletion_timestamp.is_some() {
        return delete_isolated_network(&ctx, &iso_net).await;
    }
    if capi::is_paused(None, iso_net.annotations()) {
        return done();
    }

    ensure_finalizer(&ctx.client, &iso_net, FINALIZER_ISOLATED_NETWORK).await?;

    let fd_api: Api<CloudStackFailureDomain> = Api::namespaced(ctx.client.clone(), &namespace);
    let Some(failure_domain) = fd_api.get_opt(&iso_net.spec.failure_domain_name).await? else {
        return dependency_requeue();
    };
    let Some(cluster) = cloudstack_cluster_for(&ctx, &iso_net).await? else {
        return dependency_requeue();
    };

    let (manager, _domain_id) = ctx.failure_domain_manager(&failure_domain).await?;

    let mut desired_net = iso_net.clone();
    let mut desired_cluster = cluster.clone();
    manager
        .get_or_create_isolated_network(&failure_domain, &mut desired_net, &mut desired_cluster)
        .await?;

    // Patch back everything the operation filled in.
    if desired_net.spec != iso_net.spec {
        patch_spec(&ctx.client, &iso_net, &desired_net.spec).await?;
    }
    let mut status = desired_net.status.unwrap_or_default();
    status.ready = true;
    patch_status(&ctx.client, &iso_net, &status).await?;

    if desired_cluster.spec != cluster.spec {
        patch_spec(&ctx.client, &cluster, &desired_cluster.spec).await?;
    }
    if desired_cluster.status != cluster.status {
        if let Some(cluster_status) = &desired_cluster.status {
            patch_status(&ctx.client, &cluster, cluster_status).await?;
        }
    }
    done()
}

/// Cleans up a `CloudStackIsolatedNetwork` being deleted.
///
/// # Errors
///
/// Returns an error when CloudStack or Kubernetes operations fail.
pub async fn delete_isolated_network(
    ctx: &Context,
    iso_net: &CloudStackIsolatedNetwork,
) -> StageResult {
    let namespace = iso_net.namespace().unwrap_or_default();
    let name = iso_net.name_any();
    info!("CloudStackIsolatedNetwork {}/{} is being deleted", namespace, name);

    if !has_finalizer(iso_net, FINALIZER_ISOLATED_NETWORK) {
        return done();
    }

    let fd_api: Api<CloudStackFailureDomain> = Api::namespaced(ctx.client.clone(), &namespace);
    let failure_domain = fd_api.get_opt(&iso_net.spec.failure_domain_name).await?;
    let cluster = cloudstack_cluster_for(ctx, iso_net).await?;

    match (failure_domain, cluster) {
        (Some(failure_domain), Some(cluster)) => {
            let (manager, _domain_id) = ctx.failure_domain_manager(&failure_domain).await?;
            manager
                .dispose_isolated_network_resources(iso_net, &cluster)
                .await?;
        }
        _ => {
            // Credential scope or cluster already gone; the tags keep other
            // clusters' resources safe, but ours cannot be released anymore.
            warn!(
                "releasing isolated network {}/{} without cloud cleanup: parent resources gone",
                namespace, name
            );
        }
    }

    remove_finalizer(&ctx.client, iso_net, FINALIZER_ISOLATED_NETWORK).await?;
    done()
}
