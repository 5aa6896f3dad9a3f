// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for CloudStack infrastructure.
//!
//! This module defines all Kubernetes Custom Resource Definitions used by CAPC
//! to manage Apache CloudStack infrastructure on behalf of Cluster API.
//!
//! # Resource Types
//!
//! ## Cluster Infrastructure
//!
//! - [`CloudStackCluster`] - Top-level cluster infrastructure resource
//! - [`CloudStackFailureDomain`] - One CloudStack zone plus its credential scope
//! - [`CloudStackIsolatedNetwork`] - Isolated guest network with endpoint plumbing
//!
//! ## Machine Infrastructure
//!
//! - [`CloudStackMachine`] - One CloudStack VM instance
//! - [`CloudStackAffinityGroup`] - A named (anti-)affinity grouping of VMs
//! - [`CloudStackMachineStateChecker`] - Watchdog pairing a VM with its CAPI Machine
//!
//! # Example: Describing a Cluster
//!
//! ```rust,no_run
//! use capc::crd::{CloudStackClusterSpec, ApiEndpoint, ZoneSpec, NetworkSpec};
//!
//! let spec = CloudStackClusterSpec {
//!     zones: vec![ZoneSpec {
//!         name: "zone1".to_string(),
//!         id: None,
//!         network: NetworkSpec {
//!             name: "guest-net".to_string(),
//!             id: None,
//!             r#type: None,
//!         },
//!     }],
//!     control_plane_endpoint: ApiEndpoint {
//!         host: String::new(),
//!         port: 6443,
//!     },
//!     account: None,
//!     domain: None,
//!     identity_ref: None,
//! };
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition represents an observation of a resource's current state.
///
/// Conditions are used in status subresources to communicate the state of
/// a resource to users and controllers.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition. Common types include: Ready, Available, Progressing, Failed.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Host and port of the cluster's API server endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// Hostname or IP address of the endpoint. One-time set: once non-empty
    /// it is treated as immutable by the cluster controller.
    pub host: String,

    /// TCP port of the endpoint.
    pub port: u16,
}

/// A CloudStack guest network, identified by name and/or ID.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Network name.
    pub name: String,

    /// CloudStack network UUID, resolved by the controllers when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Network type as reported by CloudStack ("Shared" or "Isolated").
    /// Populated during zone resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

/// A CloudStack zone together with the guest network machines attach to.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSpec {
    /// Zone name.
    pub name: String,

    /// CloudStack zone UUID, resolved by the controllers when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Guest network within the zone.
    pub network: NetworkSpec,
}

/// A CloudStack resource identified by name and/or ID (offering, template, ...).
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    /// Resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// CloudStack resource UUID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Reference to the Kubernetes Secret holding CloudStack credentials.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Namespace of the secret.
    pub namespace: String,

    /// Name of the secret.
    pub name: String,
}

/// Reference to a credential object by kind and name (same namespace).
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    /// Kind of the referenced object. Only "Secret" is supported.
    pub kind: String,

    /// Name of the referenced object.
    pub name: String,
}

// ============================================================================
// CloudStackCluster
// ============================================================================

/// Desired state of the CloudStack infrastructure backing a CAPI Cluster.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta3",
    kind = "CloudStackCluster",
    plural = "cloudstackclusters",
    namespaced,
    status = "CloudStackClusterStatus",
    shortname = "cscluster"
)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackClusterSpec {
    /// Zones machines of this cluster may be placed into. The cluster
    /// controller creates one `CloudStackFailureDomain` per entry.
    pub zones: Vec<ZoneSpec>,

    /// API server endpoint of the workload cluster. The host is one-time
    /// set; once non-empty it must not change.
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,

    /// CloudStack account to operate as. When set together with `domain`,
    /// the controllers impersonate the account's user instead of acting as
    /// the endpoint credentials directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// CloudStack domain path of the account (e.g. "ROOT/sub1/sub2").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Reference to the Secret carrying the CloudStack endpoint credentials
    /// for this cluster's failure domains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_ref: Option<IdentityRef>,
}

/// Per-zone observed state, keyed into [`CloudStackClusterStatus::zone_status_map`].
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStatus {
    /// Resolved CloudStack zone UUID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Resolved network UUID within the zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,

    /// Network type ("Shared" or "Isolated").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
}

/// Observed state of a `CloudStackCluster`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackClusterStatus {
    /// Observed per-zone state keyed by zone name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub zone_status_map: BTreeMap<String, ZoneStatus>,

    /// Readiness of each failure domain, keyed by failure-domain name.
    /// Consumed by CAPI core when distributing machines.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failure_domains: BTreeMap<String, bool>,

    /// Whether the cluster infrastructure is ready for machines.
    #[serde(default)]
    pub ready: bool,

    /// Resolved CloudStack domain UUID when an account override is in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,

    /// Public IP backing the control-plane endpoint, when allocated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_id: Option<String>,

    /// Load balancer rule bound to the control-plane endpoint, when created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lb_rule_id: Option<String>,

    /// Identifier of the shadow CloudStack Kubernetes Service cluster that
    /// mirrors this CAPI cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_stack_cluster_id: Option<String>,

    /// Current conditions of the cluster.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

// ============================================================================
// CloudStackFailureDomain
// ============================================================================

/// One CloudStack zone plus the credential scope machines placed into it use.
///
/// Exactly one zone per failure domain; the zone identity is immutable after
/// creation. Failure domains are linked to their cluster through the
/// `cluster.x-k8s.io/cluster-name` label so they survive cluster-controller
/// restarts.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta3",
    kind = "CloudStackFailureDomain",
    plural = "cloudstackfailuredomains",
    namespaced,
    status = "CloudStackFailureDomainStatus",
    shortname = "csfd"
)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackFailureDomainSpec {
    /// The zone this failure domain places machines into.
    pub zone: ZoneSpec,

    /// CloudStack account override for this failure domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// CloudStack domain path of the account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Secret holding `api-url`, `api-key`, `secret-key` and `verify-ssl`
    /// for the CloudStack endpoint serving this failure domain.
    pub acs_endpoint: SecretRef,
}

/// Observed state of a `CloudStackFailureDomain`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackFailureDomainStatus {
    /// Whether the zone and its network have been resolved.
    #[serde(default)]
    pub ready: bool,

    /// Current conditions of the failure domain.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

// ============================================================================
// CloudStackIsolatedNetwork
// ============================================================================

/// An isolated guest network plus the public IP and load-balancer rule that
/// expose the cluster's control-plane endpoint through it.
///
/// Created lazily by the failure-domain controller once a zone resolves to an
/// Isolated (not Shared) network type.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta3",
    kind = "CloudStackIsolatedNetwork",
    plural = "cloudstackisolatednetworks",
    namespaced,
    status = "CloudStackIsolatedNetworkStatus",
    shortname = "csisonet"
)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackIsolatedNetworkSpec {
    /// Network name.
    pub name: String,

    /// CloudStack network UUID, set once resolved or created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Name of the failure domain this network belongs to.
    pub failure_domain_name: String,

    /// Control-plane endpoint the network's load balancer fronts.
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,
}

/// Observed state of a `CloudStackIsolatedNetwork`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackIsolatedNetworkStatus {
    /// Public IP associated for the control-plane endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_id: Option<String>,

    /// The network the public IP lives in. Differs from the isolated
    /// network's own ID when the address is drawn from a shared network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_network_id: Option<String>,

    /// Round-robin load balancer rule bound to the control-plane port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lb_rule_id: Option<String>,

    /// Whether the network and its endpoint plumbing are in place.
    #[serde(default)]
    pub ready: bool,
}

// ============================================================================
// CloudStackMachine
// ============================================================================

/// Optional data disk attached to a machine at deploy time.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackMachineDiskOffering {
    /// Disk offering name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// CloudStack disk offering UUID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Size in GB for custom-sized offerings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_size_in_gb: Option<i64>,
}

/// Desired state of one CloudStack VM instance.
///
/// Offering, template, SSH key, details and affinity are immutable after
/// creation (enforced by admission); the reconciler treats them as stable
/// keys for idempotent lookup. `instance_id`, once set, is the primary key
/// for all subsequent fetch/destroy calls; before it is set, the machine
/// name is the fallback lookup key.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta3",
    kind = "CloudStackMachine",
    plural = "cloudstackmachines",
    namespaced,
    status = "CloudStackMachineStatus",
    shortname = "csmachine"
)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackMachineSpec {
    /// Compute service offering of the instance.
    pub offering: ResourceIdentifier,

    /// Template the instance boots from.
    pub template: ResourceIdentifier,

    /// Optional data disk offering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_offering: Option<CloudStackMachineDiskOffering>,

    /// Name of a registered SSH key pair to inject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,

    /// Optional key/value details passed through to the deploy call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,

    /// Affinity intent: "pro", "anti" or "no". Mutually exclusive with
    /// `affinity_group_ids`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<String>,

    /// Explicit CloudStack affinity group IDs to join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity_group_ids: Option<Vec<String>>,

    /// Skip gzip compression of the instance user data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncompressed_user_data: Option<bool>,

    /// Failure domain this machine is placed into. Mirrors the CAPI
    /// Machine's `spec.failureDomain` once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_domain_name: Option<String>,

    /// Per-machine credential override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_ref: Option<IdentityRef>,

    /// CloudStack instance UUID, set exactly once after deploy or adoption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Provider ID in the form `cloudstack:///<instance id>`, consumed by
    /// CAPI core to correlate Nodes with Machines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Observed state of a `CloudStackMachine`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackMachineStatus {
    /// IP addresses of the instance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,

    /// Free-text mirror of the CloudStack VM state (e.g. "Running", "Error").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_state: Option<String>,

    /// When `instance_state` was last refreshed from CloudStack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_state_last_updated: Option<chrono::DateTime<chrono::Utc>>,

    /// Whether the instance is running and ready.
    #[serde(default)]
    pub ready: bool,
}

// ============================================================================
// CloudStackAffinityGroup
// ============================================================================

/// A named CloudStack (anti-)affinity grouping.
///
/// One group is created per owning MachineSet/KubeadmControlPlane/
/// EtcdadmCluster that requests affinity; the group name is derived
/// deterministically from the owner's UID so repeated reconciles are
/// idempotent.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta3",
    kind = "CloudStackAffinityGroup",
    plural = "cloudstackaffinitygroups",
    namespaced,
    status = "CloudStackAffinityGroupStatus",
    shortname = "csag"
)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackAffinityGroupSpec {
    /// Name of the affinity group in CloudStack.
    pub name: String,

    /// CloudStack affinity group type: "host affinity" or "host anti-affinity".
    pub r#type: String,

    /// Failure domain whose credential scope the group is created in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_domain_name: Option<String>,

    /// CloudStack affinity group UUID, set once resolved or created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Observed state of a `CloudStackAffinityGroup`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackAffinityGroupStatus {
    /// Whether the group exists in CloudStack.
    #[serde(default)]
    pub ready: bool,
}

// ============================================================================
// CloudStackMachineStateChecker
// ============================================================================

/// Watchdog resource pairing a `CloudStackMachine` with its CAPI Machine.
///
/// The checker compares the CloudStack VM state against the CAPI machine
/// phase on every tick and deletes the CAPI Machine when CloudStack reports
/// not-Running, or when the CAPI machine has been stuck non-Running for more
/// than five minutes while CloudStack reports Running. This is a liveness
/// loop, not a one-shot reconcile.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta3",
    kind = "CloudStackMachineStateChecker",
    plural = "cloudstackmachinestatecheckers",
    namespaced,
    status = "CloudStackMachineStateCheckerStatus",
    shortname = "csmsc"
)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackMachineStateCheckerSpec {
    /// CloudStack instance UUID under watch.
    pub instance_id: String,
}

/// Observed state of a `CloudStackMachineStateChecker`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudStackMachineStateCheckerStatus {
    /// True while both CloudStack and CAPI agree the machine is running.
    #[serde(default)]
    pub ready: bool,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
