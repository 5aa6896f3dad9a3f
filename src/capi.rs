// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Partial typed mirrors of the Cluster API contract resources.
//!
//! CAPC consumes (but does not own) several Cluster API resources: the CAPI
//! `Cluster` and `Machine` as reconciliation parents, and
//! `MachineSet`/`KubeadmControlPlane`/`EtcdadmCluster` as replica authorities
//! during failure-domain deletion. Only the fields the controllers actually
//! read are modeled here; everything else is preserved opaquely by the API
//! server since these types are never written back as whole objects.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::labels::{CAPI_CONTROL_PLANE_LABEL, CAPI_PAUSED_ANNOTATION};

/// Typed reference to another Kubernetes object, as used by CAPI refs.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypedObjectRef {
    /// API version of the referent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Kind of the referent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Name of the referent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Namespace of the referent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

// ============================================================================
// cluster.x-k8s.io/v1beta1 Cluster
// ============================================================================

/// The slice of a CAPI Cluster spec this provider reads.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    plural = "clusters",
    namespaced,
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Pauses reconciliation of this cluster and all owned resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,

    /// Reference to the control-plane provider object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<TypedObjectRef>,

    /// Reference to the infrastructure provider object (a `CloudStackCluster`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<TypedObjectRef>,
}

/// The slice of a CAPI Cluster status this provider reads.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Whether the cluster's control plane is ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ready: Option<bool>,

    /// Whether the cluster's infrastructure is ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ready: Option<bool>,

    /// CAPI cluster phase string ("Provisioning", "Provisioned", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

// ============================================================================
// cluster.x-k8s.io/v1beta1 Machine
// ============================================================================

/// Bootstrap configuration slice of a CAPI Machine.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    /// Name of the secret holding the rendered bootstrap user data. Absent
    /// until the bootstrap provider has produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_secret_name: Option<String>,
}

/// The slice of a CAPI Machine spec this provider reads.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Machine",
    plural = "machines",
    namespaced,
    status = "MachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Name of the owning CAPI Cluster.
    #[serde(default)]
    pub cluster_name: String,

    /// Bootstrap configuration for the machine.
    #[serde(default)]
    pub bootstrap: Bootstrap,

    /// Failure domain the machine is scheduled into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_domain: Option<String>,

    /// Provider ID mirrored from the infrastructure machine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// The slice of a CAPI Machine status this provider reads.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// CAPI machine phase string ("Pending", "Provisioning", "Running", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// When the machine phase last transitioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

// ============================================================================
// cluster.x-k8s.io/v1beta1 MachineSet
// ============================================================================

/// The slice of a CAPI MachineSet spec this provider reads.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "MachineSet",
    plural = "machinesets",
    namespaced,
    status = "MachineSetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetSpec {
    /// Desired replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// The slice of a CAPI MachineSet status this provider reads.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetStatus {
    /// Observed replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Observed ready replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,
}

// ============================================================================
// controlplane.cluster.x-k8s.io/v1beta1 KubeadmControlPlane
// ============================================================================

/// The slice of a KubeadmControlPlane spec this provider reads.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "controlplane.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "KubeadmControlPlane",
    plural = "kubeadmcontrolplanes",
    namespaced,
    status = "KubeadmControlPlaneStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmControlPlaneSpec {
    /// Desired replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// The slice of a KubeadmControlPlane status this provider reads.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmControlPlaneStatus {
    /// Observed replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Observed ready replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,

    /// Whether the control plane is ready to accept requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
}

// ============================================================================
// etcdcluster.cluster.x-k8s.io/v1beta1 EtcdadmCluster
// ============================================================================

/// The slice of an EtcdadmCluster spec this provider reads.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "etcdcluster.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "EtcdadmCluster",
    plural = "etcdadmclusters",
    namespaced,
    status = "EtcdadmClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdadmClusterSpec {
    /// Desired replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// The slice of an EtcdadmCluster status this provider reads.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdadmClusterStatus {
    /// Observed replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Observed ready replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,

    /// Whether the etcd cluster is ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Check whether reconciliation of a resource is paused, either through the
/// owning CAPI Cluster's `spec.paused` or the pause annotation on the
/// resource itself.
#[must_use]
pub fn is_paused(cluster: Option<&Cluster>, annotations: &std::collections::BTreeMap<String, String>) -> bool {
    if let Some(cluster) = cluster {
        if cluster.spec.paused.unwrap_or(false) {
            return true;
        }
    }
    annotations.contains_key(CAPI_PAUSED_ANNOTATION)
}

/// Check whether a CAPI Machine belongs to the control plane.
#[must_use]
pub fn is_control_plane_machine(machine: &Machine) -> bool {
    machine
        .metadata
        .labels
        .as_ref()
        .is_some_and(|labels| labels.contains_key(CAPI_CONTROL_PLANE_LABEL))
}

/// Name of the bootstrap data secret of a CAPI Machine, if rendered yet.
#[must_use]
pub fn bootstrap_secret_name(machine: &Machine) -> Option<&str> {
    machine.spec.bootstrap.data_secret_name.as_deref()
}

/// Whether the CAPI cluster reports its control plane ready.
#[must_use]
pub fn control_plane_ready(cluster: &Cluster) -> bool {
    cluster
        .status
        .as_ref()
        .and_then(|s| s.control_plane_ready)
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "capi_tests.rs"]
mod capi_tests;
