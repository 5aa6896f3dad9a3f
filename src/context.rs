// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Every controller receives an `Arc<Context>` carrying the Kubernetes
//! client and the CloudStack client factory. The context is read-only after
//! construction; all per-reconcile mutable state lives on scope values the
//! reconcile wrappers build fresh per invocation.

use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

use crate::cloud::user::failure_domain_manager;
use crate::cloud::{CloudApiFactory, CloudConfig, CloudStackManager};
use crate::crd::CloudStackFailureDomain;
use crate::reconcilers::retry::retry_api_call;

/// Shared services passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations.
    pub client: Client,

    /// Factory building CloudStack clients for endpoint configurations.
    /// Production wires the HTTP client; tests substitute mocks.
    pub cloud_factory: CloudApiFactory,
}

impl Context {
    /// Build a context around a Kubernetes client and a CloudStack client
    /// factory.
    #[must_use]
    pub fn new(client: Client, cloud_factory: CloudApiFactory) -> Self {
        Self {
            client,
            cloud_factory,
        }
    }

    /// Load the endpoint credentials referenced by a failure domain.
    ///
    /// # Errors
    ///
    /// Returns an error when the secret is absent or malformed.
    pub async fn cloud_config_for(
        &self,
        failure_domain: &CloudStackFailureDomain,
    ) -> Result<CloudConfig> {
        let secret_ref = &failure_domain.spec.acs_endpoint;
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &secret_ref.namespace);
        let secret = retry_api_call(
            || api.get(&secret_ref.name),
            "get failure domain credentials secret",
        )
        .await
        .with_context(|| {
            format!(
                "failed to read ACS endpoint secret {}/{}",
                secret_ref.namespace, secret_ref.name
            )
        })?;
        CloudConfig::from_secret(&secret)
    }

    /// Build the CloudStack manager acting as the failure domain's tenant.
    ///
    /// Without an account override on the failure domain the endpoint
    /// credentials are used directly; otherwise the Domain → Account → User
    /// chain is resolved and a client impersonating that user is returned.
    /// The resolved domain ID (when any) is returned for status reporting.
    ///
    /// # Errors
    ///
    /// Fails closed when the secret or any resolution step fails.
    pub async fn failure_domain_manager(
        &self,
        failure_domain: &CloudStackFailureDomain,
    ) -> Result<(CloudStackManager, Option<String>)> {
        let config = self.cloud_config_for(failure_domain).await?;
        let (manager, domain_id) = failure_domain_manager(
            &self.cloud_factory,
            &config,
            failure_domain.spec.account.as_deref(),
            failure_domain.spec.domain.as_deref(),
        )
        .await
        .with_context(|| {
            format!(
                "failed to build scoped CloudStack client for failure domain {:?}",
                failure_domain.metadata.name
            )
        })?;
        Ok((manager, domain_id))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}
