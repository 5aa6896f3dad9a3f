// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStackMachine reconciliation logic.
//!
//! State machine: Pending (no instance ID) → Creating/Fetching
//! (get-or-create in flight) → Running (ready) → Error (recycle the owning
//! CAPI Machine) → Deleting (destroy with expunge) → gone. Guard stages
//! collect the CAPI parents and the failure-domain-scoped CloudStack client
//! before any cloud call is made.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{DeleteParams, PostParams};
use kube::{Api, ResourceExt};
use tracing::{debug, info, warn};

use crate::capi::{self, Cluster, Machine};
use crate::cloud::affinity::{affinity_group_name, affinity_group_type};
use crate::cloud::{CloudStackManager, ErrorKind};
use crate::constants::{
    AFFINITY_NONE, API_GROUP_VERSION, KIND_CLOUDSTACK_MACHINE, NETWORK_TYPE_ISOLATED,
    NOT_READY_REQUEUE_SECS, VM_STATE_ERROR, VM_STATE_RUNNING,
};
use crate::context::Context;
use crate::crd::{
    CloudStackAffinityGroup, CloudStackAffinityGroupSpec, CloudStackFailureDomain,
    CloudStackIsolatedNetwork, CloudStackMachine, CloudStackMachineStateChecker,
    CloudStackMachineStateCheckerSpec,
};
use crate::labels::{CAPI_CLUSTER_LABEL, FINALIZER_MACHINE};
use crate::reconcilers::failure_domain::isolated_network_name;
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::runner::{
    dependency_requeue, done, get_owner_of_kind, patch_spec, patch_status, proceed, requeue,
    run_stages, Flow, Stage, StageResult,
};

/// Per-invocation state of one machine reconcile.
///
/// Built fresh by the reconcile wrapper; the guard stages fill the optional
/// fields in order.
pub struct MachineScope {
    /// Shared operator services.
    pub ctx: Arc<Context>,

    /// The reconciliation subject.
    pub machine: CloudStackMachine,

    /// Owning CAPI Machine, fetched by owner reference.
    pub capi_machine: Option<Machine>,

    /// The CAPI Cluster named by the owning machine.
    pub capi_cluster: Option<Cluster>,

    /// The failure domain the machine is placed into.
    pub failure_domain: Option<CloudStackFailureDomain>,

    /// Failure-domain-scoped CloudStack client, memoized for the
    /// invocation so every downstream call shares one identity.
    pub cloud: Option<CloudStackManager>,
}

impl MachineScope {
    fn new(ctx: Arc<Context>, machine: CloudStackMachine) -> Self {
        Self {
            ctx,
            machine,
            capi_machine: None,
            capi_cluster: None,
            failure_domain: None,
            cloud: None,
        }
    }

    fn namespace(&self) -> String {
        self.machine.namespace().unwrap_or_default()
    }
}

fn stage_get_capi_machine(scope: &mut MachineScope) -> BoxFuture<'_, StageResult> {
    Box::pin(async move {
        match get_owner_of_kind::<Machine>(&scope.ctx.client, &scope.machine).await? {
            Some(capi_machine) => {
                scope.capi_machine = Some(capi_machine);
                proceed()
            }
            None => {
                debug!("machine has no owning CAPI Machine yet");
                dependency_requeue()
            }
        }
    })
}

fn stage_get_capi_cluster(scope: &mut MachineScope) -> BoxFuture<'_, StageResult> {
    Box::pin(async move {
        let namespace = scope.namespace();
        let Some(capi_machine) = &scope.capi_machine else {
            return dependency_requeue();
        };
        let api: Api<Cluster> = Api::namespaced(scope.ctx.client.clone(), &namespace);
        match api.get_opt(&capi_machine.spec.cluster_name).await? {
            Some(cluster) => {
                scope.capi_cluster = Some(cluster);
                proceed()
            }
            None => dependency_requeue(),
        }
    })
}

fn stage_check_paused(scope: &mut MachineScope) -> BoxFuture<'_, StageResult> {
    Box::pin(async move {
        if capi::is_paused(scope.capi_cluster.as_ref(), scope.machine.annotations()) {
            debug!("reconciliation paused");
            return Ok(Flow::Done);
        }
        proceed()
    })
}

fn stage_require_infrastructure_ready(scope: &mut MachineScope) -> BoxFuture<'_, StageResult> {
    Box::pin(async move {
        let ready = scope
            .capi_cluster
            .as_ref()
            .and_then(|c| c.status.as_ref())
            .and_then(|s| s.infrastructure_ready)
            .unwrap_or(false);
        if ready {
            proceed()
        } else {
            debug!("cluster infrastructure not ready yet");
            dependency_requeue()
        }
    })
}

fn stage_get_failure_domain(scope: &mut MachineScope) -> BoxFuture<'_, StageResult> {
    Box::pin(async move {
        let namespace = scope.namespace();
        let fd_name = scope
            .machine
            .spec
            .failure_domain_name
            .clone()
            .or_else(|| {
                scope
                    .capi_machine
                    .as_ref()
                    .and_then(|m| m.spec.failure_domain.clone())
            });
        let Some(fd_name) = fd_name else {
            debug!("machine has no failure domain assigned yet");
            return dependency_requeue();
        };
        let api: Api<CloudStackFailureDomain> =
            Api::namespaced(scope.ctx.client.clone(), &namespace);
        match api.get_opt(&fd_name).await? {
            Some(fd) => {
                scope.failure_domain = Some(fd);
                proceed()
            }
            None => dependency_requeue(),
        }
    })
}

fn stage_bind_cloud_client(scope: &mut MachineScope) -> BoxFuture<'_, StageResult> {
    Box::pin(async move {
        if scope.cloud.is_some() {
            return proceed();
        }
        let Some(failure_domain) = &scope.failure_domain else {
            return dependency_requeue();
        };
        let (manager, _domain_id) = scope.ctx.failure_domain_manager(failure_domain).await?;
        scope.cloud = Some(manager);
        proceed()
    })
}

/// Guard stages shared by the create/update path.
const RECONCILE_STAGES: [Stage<MachineScope>; 6] = [
    Stage { name: "get_capi_machine", run: stage_get_capi_machine },
    Stage { name: "get_capi_cluster", run: stage_get_capi_cluster },
    Stage { name: "check_paused", run: stage_check_paused },
    Stage { name: "require_infrastructure_ready", run: stage_require_infrastructure_ready },
    Stage { name: "get_failure_domain", run: stage_get_failure_domain },
    Stage { name: "bind_cloud_client", run: stage_bind_cloud_client },
];

/// Reconciles a `CloudStackMachine` resource.
///
/// # Errors
///
/// Returns an error when CloudStack or Kubernetes operations fail;
/// dependency waits surface as requeues.
pub async fn reconcile_cloudstack_machine(
    ctx: Arc<Context>,
    machine: CloudStackMachine,
) -> StageResult {
    let namespace = machine.namespace().unwrap_or_default();
    let name = machine.name_any();
    info!("Reconciling CloudStackMachine: {}/{}", namespace, name);

    let mut scope = MachineScope::new(ctx, machine);

    if scope.machine.metadata.deletion_timestamp.is_some() {
        return delete_cloudstack_machine(&mut scope).await;
    }

    match run_stages(&mut scope, &RECONCILE_STAGES).await? {
        Flow::Proceed => {}
        other => return Ok(other),
    }
    reconcile_normal(&mut scope).await
}

async fn reconcile_normal(scope: &mut MachineScope) -> StageResult {
    let namespace = scope.namespace();
    ensure_finalizer(&scope.ctx.client, &scope.machine, FINALIZER_MACHINE).await?;

    let capi_machine = scope
        .capi_machine
        .clone()
        .context("guard stages must fetch the CAPI machine")?;

    // VM creation waits for rendered bootstrap user data.
    let Some(secret_name) = capi::bootstrap_secret_name(&capi_machine) else {
        debug!("bootstrap secret not rendered yet");
        return dependency_requeue();
    };
    let Some(user_data) = fetch_bootstrap_data(&scope.ctx, &namespace, secret_name).await? else {
        debug!("bootstrap secret {} not available yet", secret_name);
        return dependency_requeue();
    };

    // Affinity group IDs: explicit, or managed through a CR per owner.
    let affinity_ids = match resolve_affinity_group_ids(scope, &capi_machine).await? {
        Ok(ids) => ids,
        Err(flow) => return Ok(flow),
    };

    let failure_domain = scope
        .failure_domain
        .clone()
        .context("guard stages must fetch the failure domain")?;
    // Placement needs resolved cloud identities; the failure-domain
    // controller fills these in (creating the isolated network first when
    // needed).
    if failure_domain.spec.zone.id.is_none() || failure_domain.spec.zone.network.id.is_none() {
        debug!("failure domain not fully resolved yet");
        return dependency_requeue();
    }
    let cloud = scope
        .cloud
        .clone()
        .context("guard stages must bind the cloud client")?;

    let mut desired = scope.machine.clone();
    // Persist the assignment so deletion and the state checker can find
    // the credential scope without the CAPI machine.
    desired
        .spec
        .failure_domain_name
        .get_or_insert_with(|| failure_domain.name_any());
    match cloud
        .get_or_create_vm_instance(&mut desired, &failure_domain.spec, &affinity_ids, &user_data)
        .await
    {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::Terminal => {
            // Retrying the deploy cannot succeed; recycle the CAPI machine
            // so its owner provisions a replacement.
            warn!(error = %e, "terminal deploy error, recycling CAPI machine");
            recycle_capi_machine(&scope.ctx, &capi_machine).await?;
            return dependency_requeue();
        }
        Err(e) => return Err(e.into()),
    }

    // Patch back identity before anything that could fail.
    if desired.spec != scope.machine.spec {
        patch_spec(&scope.ctx.client, &scope.machine, &desired.spec).await?;
    }

    let mut status = desired.status.clone().unwrap_or_default();
    let state = status.instance_state.clone().unwrap_or_default();
    match state.as_str() {
        VM_STATE_RUNNING => {
            status.ready = true;
            patch_status(&scope.ctx.client, &scope.machine, &status).await?;

            ensure_state_checker(scope, &desired).await?;

            // Control-plane machines on isolated networks join the
            // endpoint's load balancer once running.
            if capi::is_control_plane_machine(&capi_machine)
                && failure_domain.spec.zone.network.r#type.as_deref()
                    == Some(NETWORK_TYPE_ISOLATED)
            {
                match assign_to_lb(scope, &failure_domain, &desired).await? {
                    Flow::Proceed => {}
                    other => return Ok(other),
                }
            }
            done()
        }
        VM_STATE_ERROR => {
            status.ready = false;
            patch_status(&scope.ctx.client, &scope.machine, &status).await?;
            warn!("instance in Error state, recycling CAPI machine");
            recycle_capi_machine(&scope.ctx, &capi_machine).await?;
            dependency_requeue()
        }
        _ => {
            status.ready = false;
            patch_status(&scope.ctx.client, &scope.machine, &status).await?;
            requeue(NOT_READY_REQUEUE_SECS)
        }
    }
}

/// Read the rendered cloud-init data out of a CAPI bootstrap secret.
///
/// A secret that does not exist yet yields `Ok(None)` (expected while the
/// bootstrap provider is still rendering); a secret without the `value`
/// key is malformed and errors.
async fn fetch_bootstrap_data(
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Option<Vec<u8>>> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    let Some(secret) = api.get_opt(name).await? else {
        return Ok(None);
    };
    let value = secret
        .data
        .as_ref()
        .and_then(|d| d.get("value"))
        .map(|v| v.0.clone())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|d| d.get("value"))
                .map(|v| v.clone().into_bytes())
        })
        .with_context(|| format!("bootstrap secret {namespace}/{name} has no value key"))?;
    Ok(Some(value))
}

/// Resolve the affinity group IDs the machine deploys with.
///
/// Explicit IDs pass through. A managed affinity intent materializes a
/// `CloudStackAffinityGroup` CR named deterministically from the CAPI
/// machine's owner; the deploy waits until the affinity-group controller
/// has resolved its CloudStack ID.
async fn resolve_affinity_group_ids(
    scope: &MachineScope,
    capi_machine: &Machine,
) -> Result<std::result::Result<Vec<String>, Flow>> {
    if let Some(ids) = &scope.machine.spec.affinity_group_ids {
        return Ok(Ok(ids.clone()));
    }
    let affinity = scope.machine.spec.affinity.clone().unwrap_or_default();
    if affinity.is_empty() || affinity == AFFINITY_NONE {
        return Ok(Ok(Vec::new()));
    }
    // Validates the intent before any CR is created.
    let group_type = affinity_group_type(&affinity)?;

    let Some(owner) = deployable_owner(capi_machine) else {
        debug!("CAPI machine has no replica-set owner yet");
        return Ok(Err(Flow::Requeue(std::time::Duration::from_secs(
            crate::constants::DEPENDENCY_REQUEUE_SECS,
        ))));
    };

    let group_name = affinity_group_name(&owner.kind, &owner.name, &owner.uid, &affinity);
    let cr_name = group_name.to_lowercase();
    let namespace = scope.namespace();
    let api: Api<CloudStackAffinityGroup> = Api::namespaced(scope.ctx.client.clone(), &namespace);

    let group = match api.get_opt(&cr_name).await? {
        Some(group) => group,
        None => {
            let desired = desired_affinity_group(scope, &cr_name, &group_name, group_type);
            api.create(&PostParams::default(), &desired)
                .await
                .with_context(|| format!("failed to create affinity group {cr_name}"))?;
            info!("Created CloudStackAffinityGroup {}/{}", namespace, cr_name);
            return Ok(Err(Flow::Requeue(std::time::Duration::from_secs(
                crate::constants::DEPENDENCY_REQUEUE_SECS,
            ))));
        }
    };

    match &group.spec.id {
        Some(id) => Ok(Ok(vec![id.clone()])),
        None => {
            debug!("affinity group {} not resolved yet", cr_name);
            Ok(Err(Flow::Requeue(std::time::Duration::from_secs(
                crate::constants::DEPENDENCY_REQUEUE_SECS,
            ))))
        }
    }
}

/// The CAPI machine's owning MachineSet/KubeadmControlPlane/EtcdadmCluster
/// reference, if set.
#[must_use]
pub fn deployable_owner(capi_machine: &Machine) -> Option<&OwnerReference> {
    capi_machine
        .owner_references()
        .iter()
        .find(|r| matches!(r.kind.as_str(), "MachineSet" | "KubeadmControlPlane" | "EtcdadmCluster"))
}

fn desired_affinity_group(
    scope: &MachineScope,
    cr_name: &str,
    group_name: &str,
    group_type: &str,
) -> CloudStackAffinityGroup {
    let namespace = scope.namespace();
    let mut labels = BTreeMap::new();
    if let Some(cluster_name) = scope.machine.labels().get(CAPI_CLUSTER_LABEL) {
        labels.insert(CAPI_CLUSTER_LABEL.to_string(), cluster_name.clone());
    }
    CloudStackAffinityGroup {
        metadata: ObjectMeta {
            name: Some(cr_name.to_string()),
            namespace: Some(namespace),
            labels: Some(labels),
            owner_references: Some(vec![OwnerReference {
                api_version: API_GROUP_VERSION.to_string(),
                kind: KIND_CLOUDSTACK_MACHINE.to_string(),
                name: scope.machine.name_any(),
                uid: scope.machine.metadata.uid.clone().unwrap_or_default(),
                controller: None,
                block_owner_deletion: None,
            }]),
            ..Default::default()
        },
        spec: CloudStackAffinityGroupSpec {
            name: group_name.to_string(),
            r#type: group_type.to_string(),
            failure_domain_name: scope.machine.spec.failure_domain_name.clone(),
            id: None,
        },
        status: None,
    }
}

/// Create the machine-state-checker watchdog for a running instance.
async fn ensure_state_checker(
    scope: &MachineScope,
    machine: &CloudStackMachine,
) -> Result<()> {
    let Some(instance_id) = machine.spec.instance_id.clone() else {
        return Ok(());
    };
    let namespace = scope.namespace();
    let name = machine.name_any();
    let api: Api<CloudStackMachineStateChecker> =
        Api::namespaced(scope.ctx.client.clone(), &namespace);
    if api.get_opt(&name).await?.is_some() {
        return Ok(());
    }

    let mut labels = BTreeMap::new();
    if let Some(cluster_name) = machine.labels().get(CAPI_CLUSTER_LABEL) {
        labels.insert(CAPI_CLUSTER_LABEL.to_string(), cluster_name.clone());
    }
    let checker = CloudStackMachineStateChecker {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            labels: Some(labels),
            owner_references: Some(vec![OwnerReference {
                api_version: API_GROUP_VERSION.to_string(),
                kind: KIND_CLOUDSTACK_MACHINE.to_string(),
                name: name.clone(),
                uid: machine.metadata.uid.clone().unwrap_or_default(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..Default::default()
        },
        spec: CloudStackMachineStateCheckerSpec { instance_id },
        status: None,
    };
    api.create(&PostParams::default(), &checker)
        .await
        .with_context(|| format!("failed to create machine state checker {name}"))?;
    info!("Created CloudStackMachineStateChecker {}/{}", namespace, name);
    Ok(())
}

/// Join the control-plane load balancer once the isolated network is ready.
async fn assign_to_lb(
    scope: &MachineScope,
    failure_domain: &CloudStackFailureDomain,
    machine: &CloudStackMachine,
) -> StageResult {
    let Some(instance_id) = machine.spec.instance_id.clone() else {
        return dependency_requeue();
    };
    let namespace = scope.namespace();
    let net_name = isolated_network_name(failure_domain);
    let api: Api<CloudStackIsolatedNetwork> = Api::namespaced(scope.ctx.client.clone(), &namespace);
    let Some(iso_net) = api.get_opt(&net_name).await? else {
        debug!("isolated network {} not materialized yet", net_name);
        return dependency_requeue();
    };
    if iso_net
        .status
        .as_ref()
        .and_then(|s| s.lb_rule_id.as_ref())
        .is_none()
    {
        debug!("isolated network {} has no load balancer rule yet", net_name);
        return dependency_requeue();
    }

    let cloud = scope
        .cloud
        .clone()
        .context("guard stages must bind the cloud client")?;
    cloud
        .assign_vm_to_load_balancer_rule(&iso_net, &instance_id)
        .await?;
    proceed()
}

/// Delete the owning CAPI Machine so its replica authority provisions a
/// replacement.
async fn recycle_capi_machine(ctx: &Context, capi_machine: &Machine) -> Result<()> {
    if capi_machine.metadata.deletion_timestamp.is_some() {
        return Ok(());
    }
    let namespace = capi_machine.namespace().unwrap_or_default();
    let api: Api<Machine> = Api::namespaced(ctx.client.clone(), &namespace);
    match api
        .delete(&capi_machine.name_any(), &DeleteParams::default())
        .await
    {
        Ok(_) => {
            info!("Deleted CAPI Machine {} for recycling", capi_machine.name_any());
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Cleans up a `CloudStackMachine` being deleted.
///
/// Destroys the instance (with expunge) when an instance ID is known; a VM
/// that is already gone counts as success.
///
/// # Errors
///
/// Returns an error when the destroy or finalizer removal fails.
pub async fn delete_cloudstack_machine(scope: &mut MachineScope) -> StageResult {
    let namespace = scope.namespace();
    let name = scope.machine.name_any();
    info!("CloudStackMachine {}/{} is being deleted", namespace, name);

    if !has_finalizer(&scope.machine, FINALIZER_MACHINE) {
        return done();
    }

    if scope.machine.spec.instance_id.is_some() {
        // Bind the scoped client through the failure domain; without one
        // the instance cannot be addressed.
        if scope.failure_domain.is_none() {
            let fd_name = scope.machine.spec.failure_domain_name.clone();
            if let Some(fd_name) = fd_name {
                let api: Api<CloudStackFailureDomain> =
                    Api::namespaced(scope.ctx.client.clone(), &namespace);
                scope.failure_domain = api.get_opt(&fd_name).await?;
            }
        }
        match &scope.failure_domain {
            Some(failure_domain) => {
                let (cloud, _domain_id) =
                    scope.ctx.failure_domain_manager(failure_domain).await?;
                cloud.destroy_vm_instance(&scope.machine).await?;
            }
            None => {
                warn!(
                    "destroying machine {}/{} without cloud cleanup: failure domain gone",
                    namespace, name
                );
            }
        }
    }

    remove_finalizer(&scope.ctx.client, &scope.machine, FINALIZER_MACHINE).await?;
    done()
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod machine_tests;
