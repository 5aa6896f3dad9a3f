// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Staged reconciliation pipeline.
//!
//! Every reconciler composes the same shape: a sequence of guard stages
//! (paused-check, parent lookup, credential binding) followed by the
//! resource-specific reconcile logic, followed by a status patch-back. The
//! stages run strictly in order; the first stage returning anything other
//! than [`Flow::Proceed`] (or an error) short-circuits the rest of the
//! invocation. Independent concerns compose without duplicating control
//! flow in every reconciler.
//!
//! Per-invocation mutable state lives on a context value built fresh by the
//! reconcile wrapper and owned by the pipeline; the immutable operator
//! services ([`crate::context::Context`]) are shared behind an `Arc`. This
//! makes the "never shared across goroutines" invariant structural.

use std::fmt::Debug;
use std::time::Duration;

use anyhow::{Context as _, Result};
use futures::future::BoxFuture;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::runtime::controller::Action;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, trace};

use crate::constants::{DEPENDENCY_REQUEUE_SECS, NOT_READY_REQUEUE_SECS, READY_REQUEUE_SECS};

/// Outcome of one stage (or one whole reconcile pass).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next stage.
    Proceed,

    /// Stop now and reschedule after the given delay. Used for expected
    /// eventual-consistency waits, never for errors.
    Requeue(Duration),

    /// Stop now; the resource has converged (steady-state requeue applies).
    Done,
}

/// Result type threaded through stages.
pub type StageResult = Result<Flow>;

/// One named stage over a per-invocation context.
pub struct Stage<C> {
    /// Stage name, used in trace logging.
    pub name: &'static str,

    /// The stage body.
    pub run: for<'a> fn(&'a mut C) -> BoxFuture<'a, StageResult>,
}

/// Continue with the next stage.
#[must_use]
pub fn proceed() -> StageResult {
    Ok(Flow::Proceed)
}

/// Short-circuit and reschedule after `secs` seconds.
#[must_use]
pub fn requeue(secs: u64) -> StageResult {
    Ok(Flow::Requeue(Duration::from_secs(secs)))
}

/// Short-circuit: converged.
#[must_use]
pub fn done() -> StageResult {
    Ok(Flow::Done)
}

/// Run stages strictly in order, short-circuiting on the first non-proceed
/// outcome or error.
///
/// # Errors
///
/// Propagates the first stage error unchanged.
pub async fn run_stages<C>(ctx: &mut C, stages: &[Stage<C>]) -> StageResult {
    for stage in stages {
        trace!(stage = stage.name, "running stage");
        match (stage.run)(ctx).await? {
            Flow::Proceed => {}
            other => {
                debug!(stage = stage.name, outcome = ?other, "stage short-circuited");
                return Ok(other);
            }
        }
    }
    Ok(Flow::Proceed)
}

/// Convert a pipeline outcome into a controller action.
///
/// `Proceed`/`Done` fall back to the steady-state interval when the
/// resource is ready, and the not-ready interval otherwise.
#[must_use]
pub fn flow_to_action(flow: Flow, ready: bool) -> Action {
    match flow {
        Flow::Requeue(after) => Action::requeue(after),
        Flow::Proceed | Flow::Done => {
            if ready {
                Action::requeue(Duration::from_secs(READY_REQUEUE_SECS))
            } else {
                Action::requeue(Duration::from_secs(NOT_READY_REQUEUE_SECS))
            }
        }
    }
}

/// Fetch the owner of `resource` with the given kind, if an owner reference
/// to one exists.
///
/// A missing owner reference (or a referenced object that does not exist
/// yet) yields `Ok(None)`: parent linkage is set asynchronously by another
/// controller, so callers requeue rather than error.
///
/// # Errors
///
/// Returns an error for Kubernetes API failures other than not-found.
pub async fn get_owner_of_kind<T>(client: &Client, resource: &impl ResourceExt) -> Result<Option<T>>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + Debug
        + DeserializeOwned,
{
    let kind = T::kind(&());
    let Some(owner_ref) = resource
        .owner_references()
        .iter()
        .find(|r| r.kind == kind.as_ref())
    else {
        return Ok(None);
    };
    let namespace = resource.namespace().unwrap_or_default();
    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    match api.get(&owner_ref.name).await {
        Ok(owner) => Ok(Some(owner)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to get owning {kind}")),
    }
}

/// Patch the status subresource of a resource with an optimistic merge.
///
/// A failure here after an otherwise successful reconcile must surface as
/// the reconcile error so status mutations are never silently dropped.
///
/// # Errors
///
/// Returns an error when the patch fails.
pub async fn patch_status<K>(
    client: &Client,
    resource: &K,
    status: &impl Serialize,
) -> Result<()>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
{
    let namespace = resource.namespace().unwrap_or_default();
    let api: Api<K> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "status": status });
    api.patch_status(
        &resource.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await
    .with_context(|| {
        format!(
            "failed to patch status of {} {}/{}",
            K::kind(&()),
            namespace,
            resource.name_any()
        )
    })?;
    Ok(())
}

/// Patch the spec of a resource with an optimistic merge.
///
/// Used for the few spec fields the controllers own (instance IDs, resolved
/// zone/network identities, the one-time endpoint host).
///
/// # Errors
///
/// Returns an error when the patch fails.
pub async fn patch_spec<K>(client: &Client, resource: &K, spec: &impl Serialize) -> Result<()>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
{
    let namespace = resource.namespace().unwrap_or_default();
    let api: Api<K> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "spec": spec });
    api.patch(
        &resource.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await
    .with_context(|| {
        format!(
            "failed to patch spec of {} {}/{}",
            K::kind(&()),
            namespace,
            resource.name_any()
        )
    })?;
    Ok(())
}

/// The standard requeue for missing dependencies.
#[must_use]
pub fn dependency_requeue() -> StageResult {
    requeue(DEPENDENCY_REQUEUE_SECS)
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod runner_tests;
