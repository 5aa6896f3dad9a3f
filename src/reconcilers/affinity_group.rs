// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStackAffinityGroup reconciliation logic.
//!
//! Resolves or creates the CloudStack affinity group named by the CR and
//! reports readiness; deletion removes the group from CloudStack before the
//! finalizer is released.

use std::sync::Arc;

use kube::{Api, ResourceExt};
use tracing::{info, warn};

use crate::capi;
use crate::context::Context;
use crate::crd::{CloudStackAffinityGroup, CloudStackAffinityGroupStatus, CloudStackFailureDomain};
use crate::labels::FINALIZER_AFFINITY_GROUP;
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::runner::{
    dependency_requeue, done, patch_spec, patch_status, StageResult,
};

/// Fetch the failure domain scoping an affinity group, if named.
async fn failure_domain_for(
    ctx: &Context,
    group: &CloudStackAffinityGroup,
) -> anyhow::Result<Option<CloudStackFailureDomain>> {
    let Some(fd_name) = &group.spec.failure_domain_name else {
        return Ok(None);
    };
    let namespace = group.namespace().unwrap_or_default();
    let api: Api<CloudStackFailureDomain> = Api::namespaced(ctx.client.clone(), &namespace);
    Ok(api.get_opt(fd_name).await?)
}

/// Reconciles a `CloudStackAffinityGroup` resource.
///
/// # Errors
///
/// Returns an error when CloudStack or Kubernetes operations fail; a
/// missing failure domain surfaces as a requeue.
pub async fn reconcile_affinity_group(
    ctx: Arc<Context>,
    group: CloudStackAffinityGroup,
) -> StageResult {
    let namespace = group.namespace().unwrap_or_default();
    let name = group.name_any();
    info!("Reconciling CloudStackAffinityGroup: {}/{}", namespace, name);

    if group.metadata.deletion_timestamp.is_some() {
        return delete_affinity_group_cr(&ctx, &group).await;
    }
    if capi::is_paused(None, group.annotations()) {
        return done();
    }

    ensure_finalizer(&ctx.client, &group, FINALIZER_AFFINITY_GROUP).await?;

    let Some(failure_domain) = failure_domain_for(&ctx, &group).await? else {
        return dependency_requeue();
    };
    let (manager, _domain_id) = ctx.failure_domain_manager(&failure_domain).await?;

    let mut desired = group.clone();
    manager.get_or_create_affinity_group(&mut desired).await?;

    if desired.spec != group.spec {
        patch_spec(&ctx.client, &group, &desired.spec).await?;
    }
    patch_status(
        &ctx.client,
        &group,
        &CloudStackAffinityGroupStatus { ready: true },
    )
    .await?;
    done()
}

/// Cleans up a `CloudStackAffinityGroup` being deleted.
///
/// # Errors
///
/// Returns an error when the CloudStack delete or finalizer removal fails.
pub async fn delete_affinity_group_cr(
    ctx: &Context,
    group: &CloudStackAffinityGroup,
) -> StageResult {
    let namespace = group.namespace().unwrap_or_default();
    let name = group.name_any();
    info!("CloudStackAffinityGroup {}/{} is being deleted", namespace, name);

    if !has_finalizer(group, FINALIZER_AFFINITY_GROUP) {
        return done();
    }

    match failure_domain_for(ctx, group).await? {
        Some(failure_domain) => {
            let (manager, _domain_id) = ctx.failure_domain_manager(&failure_domain).await?;
            let mut target = group.clone();
            manager.delete_affinity_group(&mut target).await?;
        }
        None => {
            // Credential scope already gone; the group cannot be addressed.
            warn!(
                "releasing affinity group {}/{} without cloud cleanup: failure domain gone",
                namespace, name
            );
        }
    }

    remove_finalizer(&ctx.client, group, FINALIZER_AFFINITY_GROUP).await?;
    done()
}
