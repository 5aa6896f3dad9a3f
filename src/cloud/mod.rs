// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStack management via the CloudStack HTTP API.
//!
//! This module provides idempotent, tenant-scoped operations against the
//! CloudStack control plane. It handles:
//!
//! - Resolving zones, networks, offerings and templates by name or ID
//! - Creating isolated networks with public IPs, egress firewall rules and
//!   load balancer rules for the control-plane endpoint
//! - Deploying, adopting and destroying VM instances
//! - Affinity groups, resource tags and CKS shadow clusters
//! - Resolving Domain → Account → User credential chains for multi-tenant
//!   credential scoping
//!
//! # Architecture
//!
//! The raw API surface is the [`CloudApi`] trait, implemented over HTTP by
//! [`CloudStackClient`] and in memory by [`mock::MockCloudApi`]. The
//! [`CloudStackManager`] wraps a `CloudApi` and layers the resolve-or-create
//! semantics on top: every create path first attempts resolution by stable
//! identity and only calls the create API when resolution fails with a
//! not-found-class error, which makes each operation safe to retry after a
//! partial failure.
//!
//! # Example
//!
//! ```rust,no_run
//! use capc::cloud::{CloudConfig, CloudStackManager};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = CloudConfig::from_file(std::path::Path::new("/config/cloud-config"))?;
//! let manager = CloudStackManager::new(&config)?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub mod affinity;
pub mod cks;
pub mod instance;
pub mod network;
pub mod tags;
pub mod user;
pub mod zone;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use api::CloudApi;
pub use client::CloudStackClient;
pub use config::CloudConfig;
pub use error::{classify_api_error, is_terminal_deploy_error, CloudError, ErrorKind};

use std::sync::Arc;

/// Shared handle to a raw CloudStack API implementation.
pub type DynCloudApi = Arc<dyn CloudApi>;

/// Factory building a raw API client for a given endpoint configuration.
///
/// The operator context carries one of these so credential resolution can
/// construct impersonated clients; tests swap in a factory returning mocks.
pub type CloudApiFactory =
    Arc<dyn Fn(&CloudConfig) -> Result<DynCloudApi, CloudError> + Send + Sync>;

/// The production factory: HTTP clients speaking to real CloudStack.
#[must_use]
pub fn http_client_factory() -> CloudApiFactory {
    Arc::new(|config| Ok(Arc::new(CloudStackClient::new(config)?) as DynCloudApi))
}

/// High-level, idempotent CloudStack operations.
///
/// The manager is cheap to clone and holds no per-reconcile state; a fresh
/// scoped manager is built per reconcile by the credential resolution layer.
#[derive(Clone)]
pub struct CloudStackManager {
    api: DynCloudApi,
}

impl CloudStackManager {
    /// Build a manager speaking HTTP to the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &CloudConfig) -> Result<Self, CloudError> {
        Ok(Self {
            api: Arc::new(CloudStackClient::new(config)?),
        })
    }

    /// Wrap an existing API implementation (used by tests and the credential
    /// resolution layer).
    #[must_use]
    pub fn from_api(api: DynCloudApi) -> Self {
        Self { api }
    }

    /// The raw API handle.
    #[must_use]
    pub fn api(&self) -> &DynCloudApi {
        &self.api
    }

    /// The API key the underlying client authenticates with.
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api.api_key()
    }
}

impl std::fmt::Debug for CloudStackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudStackManager").finish_non_exhaustive()
    }
}
