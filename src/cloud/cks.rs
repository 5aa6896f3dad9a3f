// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStack Kubernetes Service (CKS) shadow cluster operations.
//!
//! CloudStack can track externally-managed Kubernetes clusters. CAPC
//! maintains one "ExternalManaged" CKS cluster per CAPI cluster so the
//! CloudStack UI and API reflect the machines this provider runs. Lookup
//! order is the stored CloudStack cluster ID, then the deterministic
//! composite name, then create.

use tracing::{debug, info};

use crate::capi::Cluster;
use crate::cloud::error::{CloudError, ErrorKind};
use crate::cloud::types::CreateCksClusterParams;
use crate::cloud::CloudStackManager;
use crate::constants::CKS_CLUSTER_TYPE_EXTERNAL_MANAGED;
use crate::crd::{CloudStackCluster, CloudStackFailureDomainSpec};

/// Composite name of the CKS shadow cluster for a CAPI/CloudStack pair.
#[must_use]
pub fn cks_cluster_name(capi_cluster: &Cluster, cs_cluster: &CloudStackCluster) -> String {
    let capi_name = capi_cluster.metadata.name.as_deref().unwrap_or_default();
    let cs_name = cs_cluster.metadata.name.as_deref().unwrap_or_default();
    let cs_uid = cs_cluster.metadata.uid.as_deref().unwrap_or_default();
    format!("{capi_name} - {cs_name} - {cs_uid}")
}

impl CloudStackManager {
    /// Ensure the CKS shadow cluster exists and record its ID on the
    /// CloudStack cluster status.
    ///
    /// # Errors
    ///
    /// Returns an error when the failure domain zone is unresolved or a
    /// CloudStack call fails.
    pub async fn get_or_create_cks_cluster(
        &self,
        capi_cluster: &Cluster,
        cs_cluster: &mut CloudStackCluster,
        failure_domain: &CloudStackFailureDomainSpec,
    ) -> Result<(), CloudError> {
        // Stored ID wins.
        if let Some(id) = cs_cluster
            .status
            .as_ref()
            .and_then(|s| s.cloud_stack_cluster_id.clone())
        {
            let clusters = self.api().list_kubernetes_clusters(Some(&id), None).await?;
            if !clusters.is_empty() {
                debug!(id, "resolved CKS cluster by stored id");
                return Ok(());
            }
        }

        // Composite name next.
        let name = cks_cluster_name(capi_cluster, cs_cluster);
        let clusters = self
            .api()
            .list_kubernetes_clusters(None, Some(&name))
            .await?;
        let id = if let Some(existing) = clusters.first() {
            debug!(id = %existing.id, "resolved CKS cluster by name");
            existing.id.clone()
        } else {
            let Some(zone_id) = failure_domain.zone.id.clone() else {
                return Err(CloudError::not_found("zone", &failure_domain.zone.name));
            };
            let created = self
                .api()
                .create_kubernetes_cluster(CreateCksClusterParams {
                    name: name.clone(),
                    zone_id,
                    cluster_type: CKS_CLUSTER_TYPE_EXTERNAL_MANAGED.to_string(),
                })
                .await?;
            info!(id = %created.id, name = %created.name, "created CKS cluster");
            created.id
        };

        cs_cluster
            .status
            .get_or_insert_with(Default::default)
            .cloud_stack_cluster_id = Some(id);
        Ok(())
    }

    /// Delete the CKS shadow cluster; an absent cluster counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error when deletion fails for any reason other than the
    /// cluster being absent.
    pub async fn delete_cks_cluster(
        &self,
        cs_cluster: &mut CloudStackCluster,
    ) -> Result<(), CloudError> {
        let Some(id) = cs_cluster
            .status
            .as_ref()
            .and_then(|s| s.cloud_stack_cluster_id.clone())
        else {
            return Ok(());
        };
        match self.api().delete_kubernetes_cluster(&id).await {
            Ok(()) | Err(CloudError::Api { kind: ErrorKind::NotFound, .. }) => {
                if let Some(status) = cs_cluster.status.as_mut() {
                    status.cloud_stack_cluster_id = None;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Attach a VM to the CKS shadow cluster.
    ///
    /// Already-attached VMs are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the shadow cluster ID is missing or the call
    /// fails.
    pub async fn add_vm_to_cks_cluster(
        &self,
        cs_cluster: &CloudStackCluster,
        instance_id: &str,
    ) -> Result<(), CloudError> {
        let Some(id) = cs_cluster
            .status
            .as_ref()
            .and_then(|s| s.cloud_stack_cluster_id.clone())
        else {
            return Err(CloudError::not_found(
                "CKS cluster",
                cs_cluster.metadata.name.as_deref().unwrap_or_default(),
            ));
        };
        match self
            .api()
            .add_vms_to_kubernetes_cluster(&id, &[instance_id.to_string()])
            .await
        {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            other => other,
        }
    }

    /// Detach a VM from the CKS shadow cluster.
    ///
    /// # Errors
    ///
    /// Returns an error when the call fails for any reason other than the
    /// VM or cluster being absent.
    pub async fn remove_vm_from_cks_cluster(
        &self,
        cs_cluster: &CloudStackCluster,
        instance_id: &str,
    ) -> Result<(), CloudError> {
        let Some(id) = cs_cluster
            .status
            .as_ref()
            .and_then(|s| s.cloud_stack_cluster_id.clone())
        else {
            return Ok(());
        };
        match self
            .api()
            .remove_vms_from_kubernetes_cluster(&id, &[instance_id.to_string()])
            .await
        {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
#[path = "cks_tests.rs"]
mod cks_tests;
