// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # CAPC - Cluster API Infrastructure Provider for Apache CloudStack
//!
//! CAPC is a Kubernetes operator written in Rust that provisions Apache
//! CloudStack infrastructure on behalf of Cluster API: zones become failure
//! domains, isolated networks get endpoint plumbing, and machines become VM
//! instances, with observed cloud state reflected back into resource
//! status.
//!
//! ## Overview
//!
//! This library provides the core functionality of the operator:
//!
//! - Custom Resource Definitions for CloudStack infrastructure
//! - Staged reconciliation logic for each resource type
//! - An idempotent, tenant-scoped CloudStack API client
//! - Partial typed mirrors of the Cluster API contract resources
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`capi`] - Partial Cluster API contract types the controllers consume
//! - [`cloud`] - CloudStack API client and idempotent operations
//! - [`reconcilers`] - Reconciliation logic for each resource type
//! - [`context`] - Shared services handed to all controllers
//! - [`labels`] - Label, tag and finalizer constants
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use capc::crd::{CloudStackMachineSpec, ResourceIdentifier};
//!
//! // Describe a machine: a Medium instance booted from an Ubuntu template.
//! let spec = CloudStackMachineSpec {
//!     offering: ResourceIdentifier {
//!         name: Some("Medium".to_string()),
//!         id: None,
//!     },
//!     template: ResourceIdentifier {
//!         name: Some("Ubuntu20".to_string()),
//!         id: None,
//!     },
//!     disk_offering: None,
//!     ssh_key: None,
//!     details: None,
//!     affinity: Some("anti".to_string()),
//!     affinity_group_ids: None,
//!     uncompressed_user_data: None,
//!     failure_domain_name: None,
//!     identity_ref: None,
//!     instance_id: None,
//!     provider_id: None,
//! };
//! ```
//!
//! ## Features
//!
//! - **Idempotent cloud operations** - Every create resolves first
//! - **Multi-tenant credential scoping** - Domain → Account → User resolution
//! - **Tag-based reference counting** - Shared resources survive other clusters
//! - **Status tracking** - Full status subresources

pub mod capi;
pub mod cloud;
pub mod constants;
pub mod context;
pub mod crd;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
