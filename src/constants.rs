// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the CAPC operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all CloudStack infrastructure CRDs
pub const API_GROUP: &str = "infrastructure.cluster.x-k8s.io";

/// API version for all CloudStack infrastructure CRDs
pub const API_VERSION: &str = "v1beta3";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta3";

/// API group of the Cluster API contract types this provider consumes
pub const CAPI_GROUP: &str = "cluster.x-k8s.io";

/// Kind name for `CloudStackCluster` resource
pub const KIND_CLOUDSTACK_CLUSTER: &str = "CloudStackCluster";

/// Kind name for `CloudStackMachine` resource
pub const KIND_CLOUDSTACK_MACHINE: &str = "CloudStackMachine";

/// Kind name for `CloudStackFailureDomain` resource
pub const KIND_CLOUDSTACK_FAILURE_DOMAIN: &str = "CloudStackFailureDomain";

/// Kind name for `CloudStackIsolatedNetwork` resource
pub const KIND_CLOUDSTACK_ISOLATED_NETWORK: &str = "CloudStackIsolatedNetwork";

/// Kind name for `CloudStackAffinityGroup` resource
pub const KIND_CLOUDSTACK_AFFINITY_GROUP: &str = "CloudStackAffinityGroup";

/// Kind name for `CloudStackMachineStateChecker` resource
pub const KIND_CLOUDSTACK_MACHINE_STATE_CHECKER: &str = "CloudStackMachineStateChecker";

// ============================================================================
// CloudStack Constants
// ============================================================================

/// CloudStack network type for shared guest networks
pub const NETWORK_TYPE_SHARED: &str = "Shared";

/// CloudStack network type for isolated guest networks
pub const NETWORK_TYPE_ISOLATED: &str = "Isolated";

/// Network offering used when creating isolated networks
pub const NET_OFFERING_NAME: &str = "DefaultIsolatedNetworkOfferingWithSourceNatService";

/// VM state reported by CloudStack for a healthy instance
pub const VM_STATE_RUNNING: &str = "Running";

/// VM state reported by CloudStack for a failed instance
pub const VM_STATE_ERROR: &str = "Error";

/// CloudStack Kubernetes Service cluster type managed outside of CloudStack
pub const CKS_CLUSTER_TYPE_EXTERNAL_MANAGED: &str = "ExternalManaged";

/// Prefix for `spec.providerID` values on machines
pub const PROVIDER_ID_PREFIX: &str = "cloudstack:///";

/// Affinity setting requesting a host affinity group
pub const AFFINITY_PRO: &str = "pro";

/// Affinity setting requesting a host anti-affinity group
pub const AFFINITY_ANTI: &str = "anti";

/// Affinity setting requesting no affinity group management
pub const AFFINITY_NONE: &str = "no";

/// CloudStack affinity group type for host affinity
pub const AFFINITY_GROUP_TYPE_PRO: &str = "host affinity";

/// CloudStack affinity group type for host anti-affinity
pub const AFFINITY_GROUP_TYPE_ANTI: &str = "host anti-affinity";

// ============================================================================
// Cloud Config Constants
// ============================================================================

/// Environment variable naming the cloud-config file path
pub const CLOUD_CONFIG_FILE_ENV: &str = "CLOUD_CONFIG_FILE";

/// Default path of the mounted cloud-config file
pub const DEFAULT_CLOUD_CONFIG_FILE: &str = "/config/cloud-config";

/// INI section holding the CloudStack endpoint credentials
pub const CLOUD_CONFIG_GLOBAL_SECTION: &str = "Global";

/// Environment variable overriding the terminal VM deploy error codes
pub const TERMINAL_FAILURE_CODES_ENV: &str = "CLOUDSTACK_TERMINAL_FAILURE_CODES";

/// Default CloudStack error codes treated as terminal deploy failures
pub const DEFAULT_TERMINAL_FAILURE_CODES: [u32; 2] = [4250, 9999];

// ============================================================================
// Requeue Constants
// ============================================================================

/// Requeue duration while waiting on a missing dependency (owner ref,
/// bootstrap secret, unresolved failure domain)
pub const DEPENDENCY_REQUEUE_SECS: u64 = 5;

/// Requeue duration while a resource is converging toward ready
pub const NOT_READY_REQUEUE_SECS: u64 = 30;

/// Requeue duration for steady-state re-observation of ready resources
pub const READY_REQUEUE_SECS: u64 = 300;

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Poll interval of the machine state checker loop
pub const MACHINE_STATE_CHECK_INTERVAL_SECS: u64 = 5;

/// How long a CAPI machine may sit non-Running with a Running CloudStack VM
/// before the state checker recycles it
pub const MACHINE_STUCK_TIMEOUT_SECS: i64 = 300;

// ============================================================================
// CloudStack Client Constants
// ============================================================================

/// Page size used for paginated CloudStack list calls
pub const CLOUDSTACK_PAGE_SIZE: u32 = 500;

/// Poll interval while waiting on a CloudStack async job
pub const ASYNC_JOB_POLL_INTERVAL_MILLIS: u64 = 500;

/// Upper bound on total async-job wait time
pub const ASYNC_JOB_TIMEOUT_SECS: u64 = 600;

/// User data larger than this is gzip-compressed before base64 encoding
pub const USER_DATA_COMPRESSION_THRESHOLD: usize = 2048;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
