// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation controllers for CloudStack infrastructure.
//!
//! This module contains the reconciliation logic for all CAPC Custom
//! Resources. Each reconciler watches for changes to its resource type and
//! drives CloudStack toward the declared state.
//!
//! # Reconciliation Architecture
//!
//! Every reconciler follows the staged-pipeline pattern from [`runner`]:
//! guard stages (paused-check, parent lookup, failure-domain credential
//! binding) run strictly in order and short-circuit on requeue or error,
//! followed by the resource-specific reconcile or delete logic, followed by
//! a status patch-back.
//!
//! # Available Reconcilers
//!
//! ## Cluster Infrastructure
//!
//! - [`reconcile_cloudstack_cluster`] - Materializes failure domains per zone
//! - [`reconcile_failure_domain`] - Resolves zones/networks, gates machine drains
//! - [`reconcile_isolated_network`] - Endpoint plumbing for isolated networks
//!
//! ## Machine Infrastructure
//!
//! - [`reconcile_cloudstack_machine`] - VM instance lifecycle
//! - [`reconcile_affinity_group`] - CloudStack (anti-)affinity groups
//! - [`reconcile_machine_state_checker`] - VM/CAPI liveness watchdog
//!
//! ## CloudStack Kubernetes Service
//!
//! - [`reconcile_cks_cluster`] - Shadow CKS cluster per CAPI cluster
//! - [`reconcile_cks_machine`] - CKS membership per machine

pub mod affinity_group;
pub mod cks;
pub mod cluster;
pub mod failure_domain;
pub mod finalizers;
pub mod isolated_network;
pub mod machine;
pub mod machine_state_checker;
pub mod retry;
pub mod runner;
pub mod status;

pub use affinity_group::{delete_affinity_group_cr, reconcile_affinity_group};
pub use cks::{reconcile_cks_cluster, reconcile_cks_machine};
pub use cluster::{delete_cloudstack_cluster, reconcile_cloudstack_cluster};
pub use failure_domain::{delete_failure_domain, reconcile_failure_domain};
pub use isolated_network::{delete_isolated_network, reconcile_isolated_network};
pub use machine::{delete_cloudstack_machine, reconcile_cloudstack_machine};
pub use machine_state_checker::reconcile_machine_state_checker;

use anyhow::Result;
use kube::{Api, ResourceExt};

use crate::capi::Cluster;
use crate::context::Context;
use crate::crd::CloudStackCluster;
use crate::labels::CAPI_CLUSTER_LABEL;

/// Check if a resource's spec has changed by comparing generation with
/// `observed_generation`.
///
/// The `metadata.generation` field is incremented by Kubernetes only when
/// the spec changes, while `status.observed_generation` is set by the
/// controller after processing a spec.
#[must_use]
pub fn should_reconcile(current_generation: Option<i64>, observed_generation: Option<i64>) -> bool {
    match (current_generation, observed_generation) {
        (Some(current), Some(observed)) => current != observed,
        (Some(_), None) => true, // First reconciliation
        _ => false,              // No generation tracking available
    }
}

/// Check if a status value has actually changed compared to the current
/// status.
///
/// In kube-rs, status updates trigger "object updated" events which cause
/// new reconciliations; updating only on change breaks the loop.
#[must_use]
pub fn status_changed<T: PartialEq>(current_value: &Option<T>, new_value: &Option<T>) -> bool {
    current_value != new_value
}

/// Resolve the `CloudStackCluster` a labeled resource belongs to.
///
/// Follows the `cluster.x-k8s.io/cluster-name` label to the CAPI Cluster,
/// then its `infrastructureRef` to the CloudStackCluster. Any missing link
/// yields `Ok(None)`; callers requeue.
///
/// # Errors
///
/// Returns an error for Kubernetes API failures other than not-found.
pub async fn cloudstack_cluster_for(
    ctx: &Context,
    resource: &impl ResourceExt,
) -> Result<Option<CloudStackCluster>> {
    let namespace = resource.namespace().unwrap_or_default();
    let Some(capi_name) = resource.labels().get(CAPI_CLUSTER_LABEL) else {
        return Ok(None);
    };
    cloudstack_cluster_for_capi_name(ctx, &namespace, capi_name).await
}

/// Resolve the `CloudStackCluster` behind a CAPI Cluster name.
///
/// # Errors
///
/// Returns an error for Kubernetes API failures other than not-found.
pub async fn cloudstack_cluster_for_capi_name(
    ctx: &Context,
    namespace: &str,
    capi_name: &str,
) -> Result<Option<CloudStackCluster>> {
    let capi_api: Api<Cluster> = Api::namespaced(ctx.client.clone(), namespace);
    let Some(capi_cluster) = capi_api.get_opt(capi_name).await? else {
        return Ok(None);
    };
    let Some(infra_name) = capi_cluster
        .spec
        .infrastructure_ref
        .as_ref()
        .and_then(|r| r.name.clone())
    else {
        return Ok(None);
    };
    let cs_api: Api<CloudStackCluster> = Api::namespaced(ctx.client.clone(), namespace);
    Ok(cs_api.get_opt(&infra_name).await?)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
