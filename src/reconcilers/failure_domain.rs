// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStackFailureDomain reconciliation logic.
//!
//! A failure domain resolves its zone and network against CloudStack using
//! the credentials from its endpoint secret, lazily materializes a
//! `CloudStackIsolatedNetwork` when the zone's network is Isolated, and
//! reports readiness. Deletion is gated behind a replica-safety check: the
//! machines placed into the failure domain are only recycled when their
//! replica authorities are fully reconciled and the control plane is ready.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, ResourceExt};
use tracing::{debug, info, warn};

use crate::capi::{
    self, Cluster, EtcdadmCluster, KubeadmControlPlane, Machine, MachineSet,
};
use crate::constants::{
    API_GROUP_VERSION, KIND_CLOUDSTACK_FAILURE_DOMAIN, NETWORK_TYPE_ISOLATED,
    NOT_READY_REQUEUE_SECS,
};
use crate::context::Context;
use crate::crd::{
    CloudStackFailureDomain, CloudStackIsolatedNetwork, CloudStackIsolatedNetworkSpec,
    CloudStackMachine,
};
use crate::labels::{CAPI_CLUSTER_LABEL, FINALIZER_FAILURE_DOMAIN};
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::runner::{
    dependency_requeue, done, get_owner_of_kind, patch_spec, patch_status, requeue, StageResult,
};
use crate::reconcilers::status::{create_condition, set_condition, CONDITION_READY};

/// Replica accounting of one machine's owning
/// MachineSet/KubeadmControlPlane/EtcdadmCluster.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReplicaAuthority {
    /// Desired replica count from spec.
    pub desired: Option<i32>,

    /// Observed replica count from status.
    pub observed: Option<i32>,

    /// Ready replica count from status.
    pub ready: Option<i32>,
}

impl ReplicaAuthority {
    /// Whether the authority has fully reconciled its replicas.
    ///
    /// Unknown counts are treated as not reconciled; destroying machines
    /// mid-rollout is never safe.
    #[must_use]
    pub fn reconciled(&self) -> bool {
        match (self.desired, self.observed, self.ready) {
            (Some(desired), Some(observed), Some(ready)) => {
                desired == observed && desired == ready
            }
            _ => false,
        }
    }
}

/// Whether recycling the failure domain's machines is safe.
///
/// Requires the CAPI control plane to be ready and every involved replica
/// authority to be fully reconciled.
#[must_use]
pub fn machine_deletion_safe(control_plane_ready: bool, authorities: &[ReplicaAuthority]) -> bool {
    control_plane_ready && authorities.iter().all(ReplicaAuthority::reconciled)
}

/// Name of the isolated-network CR materialized for a failure domain.
#[must_use]
pub fn isolated_network_name(failure_domain: &CloudStackFailureDomain) -> String {
    failure_domain
        .spec
        .zone
        .network
        .name
        .to_lowercase()
        .replace('_', "-")
}

/// Reconciles a `CloudStackFailureDomain` resource.
///
/// # Errors
///
/// Returns an error when CloudStack resolution or Kubernetes API
/// operations fail; expected waits surface as requeues.
pub async fn reconcile_failure_domain(
    ctx: Arc<Context>,
    failure_domain: CloudStackFailureDomain,
) -> StageResult {
    let namespace = failure_domain.namespace().unwrap_or_default();
    let name = failure_domain.name_any();
    info!("Reconciling CloudStackFailureDomain: {}/{}", namespace, name);

    if failure_domain.metadata.deletion_timestamp.is_some() {
        return delete_failure_domain(&ctx, &failure_domain).await;
    }
    if capi::is_paused(None, failure_domain.annotations()) {
        return done();
    }

    ensure_finalizer(&ctx.client, &failure_domain, FINALIZER_FAILURE_DOMAIN).await?;

    let (manager, _domain_id) = ctx.failure_domain_manager(&failure_domain).await?;

    // Resolve zone then network; a missing network means an isolated
    // network that does not exist yet.
    let mut zone = failure_domain.spec.zone.clone();
    manager.resolve_zone(&mut zone).await?;
    match manager.resolve_network_for_zone(&mut zone).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            debug!(network = %zone.network.name, "network absent, treating as isolated");
            zone.network.r#type = Some(NETWORK_TYPE_ISOLATED.to_string());
        }
        Err(e) => return Err(e.into()),
    }

    // Persist resolved identities on the spec.
    if zone != failure_domain.spec.zone {
        let mut spec = failure_domain.spec.clone();
        spec.zone = zone.clone();
        patch_spec(&ctx.client, &failure_domain, &spec).await?;
    }

    // Isolated networks get their endpoint plumbing from a dedicated CR.
    if zone.network.r#type.as_deref() == Some(NETWORK_TYPE_ISOLATED) {
        ensure_isolated_network_cr(&ctx, &failure_domain).await?;
    }

    let mut status = failure_domain.status.clone().unwrap_or_default();
    status.ready = true;
    set_condition(
        &mut status.conditions,
        create_condition(CONDITION_READY, "True", "ZoneResolved", "zone and network resolved"),
    );
    patch_status(&ctx.client, &failure_domain, &status).await?;

    // An isolated network still being materialized has no ID yet; keep
    // re-resolving on the short interval until it appears.
    if zone.network.id.is_none() {
        return requeue(NOT_READY_REQUEUE_SECS);
    }
    done()
}

/// Create the `CloudStackIsolatedNetwork` CR for a failure domain if absent.
async fn ensure_isolated_network_cr(
    ctx: &Context,
    failure_domain: &CloudStackFailureDomain,
) -> Result<()> {
    let namespace = failure_domain.namespace().unwrap_or_default();
    let net_name = isolated_network_name(failure_domain);
    let api: Api<CloudStackIsolatedNetwork> = Api::namespaced(ctx.client.clone(), &namespace);
    if api.get_opt(&net_name).await?.is_some() {
        return Ok(());
    }

    let mut labels = BTreeMap::new();
    if let Some(cluster_name) = failure_domain.labels().get(CAPI_CLUSTER_LABEL) {
        labels.insert(CAPI_CLUSTER_LABEL.to_string(), cluster_name.clone());
    }

    let desired = CloudStackIsolatedNetwork {
        metadata: ObjectMeta {
            name: Some(net_name.clone()),
            namespace: Some(namespace.clone()),
            labels: Some(labels),
            owner_references: Some(vec![OwnerReference {
                api_version: API_GROUP_VERSION.to_string(),
                kind: KIND_CLOUDSTACK_FAILURE_DOMAIN.to_string(),
                name: failure_domain.name_any(),
                uid: failure_domain.metadata.uid.clone().unwrap_or_default(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..Default::default()
        },
        spec: CloudStackIsolatedNetworkSpec {
            name: failure_domain.spec.zone.network.name.clone(),
            id: failure_domain.spec.zone.network.id.clone(),
            failure_domain_name: failure_domain.name_any(),
            control_plane_endpoint: Default::default(),
        },
        status: None,
    };
    api.create(&PostParams::default(), &desired)
        .await
        .with_context(|| format!("failed to create isolated network {net_name}"))?;
    info!("Created CloudStackIsolatedNetwork {}/{}", namespace, net_name);
    Ok(())
}

/// The replica authority of one CAPI machine's owner, fetched by kind.
async fn authority_for_machine(
    ctx: &Context,
    capi_machine: &Machine,
) -> Result<Option<ReplicaAuthority>> {
    if let Some(ms) = get_owner_of_kind::<MachineSet>(&ctx.client, capi_machine).await? {
        return Ok(Some(ReplicaAuthority {
            desired: ms.spec.replicas,
            observed: ms.status.as_ref().and_then(|s| s.replicas),
            ready: ms.status.as_ref().and_then(|s| s.ready_replicas),
        }));
    }
    if let Some(kcp) = get_owner_of_kind::<KubeadmControlPlane>(&ctx.client, capi_machine).await? {
        return Ok(Some(ReplicaAuthority {
            desired: kcp.spec.replicas,
            observed: kcp.status.as_ref().and_then(|s| s.replicas),
            ready: kcp.status.as_ref().and_then(|s| s.ready_replicas),
        }));
    }
    if let Some(etcd) = get_owner_of_kind::<EtcdadmCluster>(&ctx.client, capi_machine).await? {
        return Ok(Some(ReplicaAuthority {
            desired: etcd.spec.replicas,
            observed: etcd.status.as_ref().and_then(|s| s.replicas),
            ready: etcd.status.as_ref().and_then(|s| s.ready_replicas),
        }));
    }
    Ok(None)
}

/// Cleans up a `CloudStackFailureDomain` being deleted.
///
/// Machines placed into the failure domain are recycled (their CAPI
/// Machines deleted, forcing re-provisioning elsewhere) only when every
/// owning replica authority is fully reconciled and the control plane is
/// ready; otherwise deletion blocks and requeues.
///
/// # Errors
///
/// Returns an error when Kubernetes API operations fail.
pub async fn delete_failure_domain(
    ctx: &Context,
    failure_domain: &CloudStackFailureDomain,
) -> StageResult {
    let namespace = failure_domain.namespace().unwrap_or_default();
    let name = failure_domain.name_any();
    info!("CloudStackFailureDomain {}/{} is being deleted", namespace, name);

    if !has_finalizer(failure_domain, FINALIZER_FAILURE_DOMAIN) {
        return done();
    }

    let Some(cluster_name) = failure_domain.labels().get(CAPI_CLUSTER_LABEL).cloned() else {
        // No cluster linkage: nothing to protect.
        remove_finalizer(&ctx.client, failure_domain, FINALIZER_FAILURE_DOMAIN).await?;
        return done();
    };

    // Machines still placed in this failure domain.
    let machine_api: Api<CloudStackMachine> = Api::namespaced(ctx.client.clone(), &namespace);
    let params = ListParams::default().labels(&format!("{CAPI_CLUSTER_LABEL}={cluster_name}"));
    let machines: Vec<CloudStackMachine> = machine_api
        .list(&params)
        .await?
        .items
        .into_iter()
        .filter(|m| m.spec.failure_domain_name.as_deref() == Some(name.as_str()))
        .collect();

    if machines.is_empty() {
        remove_finalizer(&ctx.client, failure_domain, FINALIZER_FAILURE_DOMAIN).await?;
        return done();
    }

    // Safety gate: control plane ready and all replica authorities settled.
    let cluster_api: Api<Cluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let control_plane_ready = cluster_api
        .get_opt(&cluster_name)
        .await?
        .as_ref()
        .map(capi::control_plane_ready)
        .unwrap_or(false);

    let mut authorities = Vec::new();
    let mut capi_machines = Vec::new();
    for machine in &machines {
        let Some(capi_machine) = get_owner_of_kind::<Machine>(&ctx.client, machine).await? else {
            return dependency_requeue();
        };
        if let Some(authority) = authority_for_machine(ctx, &capi_machine).await? {
            authorities.push(authority);
        }
        capi_machines.push(capi_machine);
    }

    if !machine_deletion_safe(control_plane_ready, &authorities) {
        warn!(
            "blocking deletion of failure domain {}/{}: replicas not reconciled or control plane not ready",
            namespace, name
        );
        return requeue(NOT_READY_REQUEUE_SECS);
    }

    let capi_machine_api: Api<Machine> = Api::namespaced(ctx.client.clone(), &namespace);
    for capi_machine in &capi_machines {
        if capi_machine.metadata.deletion_timestamp.is_none() {
            capi_machine_api
                .delete(&capi_machine.name_any(), &DeleteParams::default())
                .await
                .with_context(|| {
                    format!("failed to delete CAPI machine {}", capi_machine.name_any())
                })?;
            info!("Deleted CAPI Machine {} for failure domain drain", capi_machine.name_any());
        }
    }
    dependency_requeue()
}

#[cfg(test)]
#[path = "failure_domain_tests.rs"]
mod failure_domain_tests;
