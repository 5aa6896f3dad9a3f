// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label, annotation and finalizer constants used across all reconcilers.
//!
//! This module defines the Cluster API contract labels and the CAPC-specific
//! labels/annotations to ensure consistency across all resources created by
//! the controllers.

// ============================================================================
// Cluster API Contract Labels
// https://cluster-api.sigs.k8s.io/developer/providers/contracts
// ============================================================================

/// Label carrying the name of the owning CAPI Cluster.
///
/// Children that cannot carry a strict owner reference (failure domains must
/// survive cluster-controller restarts) are linked to their cluster through
/// this label instead.
pub const CAPI_CLUSTER_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Label present on CAPI Machines that belong to the control plane
pub const CAPI_CONTROL_PLANE_LABEL: &str = "cluster.x-k8s.io/control-plane";

/// Annotation that pauses reconciliation of a resource
pub const CAPI_PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

// ============================================================================
// CAPC-Specific Labels
// ============================================================================

/// Label indicating which controller created a child resource
pub const CAPC_MANAGED_BY_LABEL: &str = "capc.infrastructure.cluster.x-k8s.io/managed-by";

// ============================================================================
// CloudStack Resource Tags
// ============================================================================

/// Tag marking a CloudStack resource as created by this provider.
///
/// Only resources carrying this tag are candidates for deletion on teardown.
pub const CREATED_BY_CAPC_TAG: &str = "created_by_CAPC";

/// Prefix of per-cluster usage tags on shared CloudStack resources.
///
/// The full tag key is `CAPC_cluster_<cluster uid>`; a resource is released
/// only once no cluster tag from any cluster remains on it.
pub const CLUSTER_TAG_PREFIX: &str = "CAPC_cluster_";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer for `CloudStackCluster` resources
pub const FINALIZER_CLUSTER: &str = "cloudstackcluster.infrastructure.cluster.x-k8s.io";

/// Finalizer for `CloudStackMachine` resources
pub const FINALIZER_MACHINE: &str = "cloudstackmachine.infrastructure.cluster.x-k8s.io";

/// Finalizer for `CloudStackFailureDomain` resources
pub const FINALIZER_FAILURE_DOMAIN: &str = "cloudstackfailuredomain.infrastructure.cluster.x-k8s.io";

/// Finalizer for `CloudStackIsolatedNetwork` resources
pub const FINALIZER_ISOLATED_NETWORK: &str =
    "cloudstackisolatednetwork.infrastructure.cluster.x-k8s.io";

/// Finalizer for `CloudStackAffinityGroup` resources
pub const FINALIZER_AFFINITY_GROUP: &str =
    "cloudstackaffinitygroup.infrastructure.cluster.x-k8s.io";

/// Finalizer held by the CKS cluster controller on `CloudStackCluster`
pub const FINALIZER_CKS_CLUSTER: &str = "ckscloudstackcluster.infrastructure.cluster.x-k8s.io";

/// Finalizer held by the CKS machine controller on `CloudStackMachine`
pub const FINALIZER_CKS_MACHINE: &str = "ckscloudstackmachine.infrastructure.cluster.x-k8s.io";

/// Build the per-cluster CloudStack resource tag key for a cluster UID.
#[must_use]
pub fn cluster_tag_key(cluster_uid: &str) -> String {
    format!("{CLUSTER_TAG_PREFIX}{cluster_uid}")
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod labels_tests;
