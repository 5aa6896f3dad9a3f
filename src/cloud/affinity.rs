// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Affinity group operations and deterministic group naming.

use tracing::{debug, info};

use crate::cloud::error::{CloudError, ErrorKind};
use crate::cloud::CloudStackManager;
use crate::constants::{
    AFFINITY_ANTI, AFFINITY_GROUP_TYPE_ANTI, AFFINITY_GROUP_TYPE_PRO, AFFINITY_PRO,
};
use crate::crd::CloudStackAffinityGroup;

/// Derive the CloudStack affinity group name for an owning CAPI object.
///
/// The name is a pure function of the owner's identity and the affinity
/// intent, so repeated reconciles of the same MachineSet /
/// KubeadmControlPlane / EtcdadmCluster always land on the same group.
#[must_use]
pub fn affinity_group_name(owner_kind: &str, owner_name: &str, owner_uid: &str, affinity: &str) -> String {
    format!("{owner_kind}-{owner_name}-{affinity}Affinity-{owner_uid}")
}

/// Map the machine-level affinity intent ("pro"/"anti") to the CloudStack
/// group type.
///
/// # Errors
///
/// Returns an error for unknown affinity values.
pub fn affinity_group_type(affinity: &str) -> Result<&'static str, CloudError> {
    match affinity {
        AFFINITY_PRO => Ok(AFFINITY_GROUP_TYPE_PRO),
        AFFINITY_ANTI => Ok(AFFINITY_GROUP_TYPE_ANTI),
        other => Err(CloudError::Api {
            message: format!("unknown affinity intent {other:?}"),
            kind: ErrorKind::Transient,
        }),
    }
}

impl CloudStackManager {
    /// Resolve the affinity group by ID or name, filling in `spec.id`.
    ///
    /// Returns whether the group exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the listing fails or matches are ambiguous.
    pub async fn fetch_affinity_group(
        &self,
        group: &mut CloudStackAffinityGroup,
    ) -> Result<bool, CloudError> {
        let groups = match &group.spec.id {
            Some(id) => self.api().list_affinity_groups(Some(id), None).await?,
            None => {
                self.api()
                    .list_affinity_groups(None, Some(&group.spec.name))
                    .await?
            }
        };
        match groups.len() {
            0 => Ok(false),
            1 => {
                group.spec.id = Some(groups[0].id.clone());
                Ok(true)
            }
            count => Err(CloudError::Ambiguous {
                resource: "affinity group",
                name: group.spec.name.clone(),
                count,
            }),
        }
    }

    /// Resolve the affinity group by name, creating it when absent.
    ///
    /// # Errors
    ///
    /// Returns an error when resolution is ambiguous or creation fails.
    pub async fn get_or_create_affinity_group(
        &self,
        group: &mut CloudStackAffinityGroup,
    ) -> Result<(), CloudError> {
        if self.fetch_affinity_group(group).await? {
            debug!(group = %group.spec.name, id = ?group.spec.id, "resolved affinity group");
            return Ok(());
        }

        let created = self
            .api()
            .create_affinity_group(&group.spec.name, &group.spec.r#type)
            .await?;
        info!(group = %created.name, id = %created.id, "created affinity group");
        group.spec.id = Some(created.id);
        Ok(())
    }

    /// Delete the affinity group; an absent group counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error when deletion fails for any reason other than the
    /// group being absent.
    pub async fn delete_affinity_group(
        &self,
        group: &mut CloudStackAffinityGroup,
    ) -> Result<(), CloudError> {
        if !self.fetch_affinity_group(group).await? {
            return Ok(());
        }
        let Some(id) = group.spec.id.clone() else {
            return Ok(());
        };
        match self.api().delete_affinity_group(&id).await {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Bind an existing VM to an affinity group.
    ///
    /// Association is a separate CloudStack call made after both the VM and
    /// the group exist.
    ///
    /// # Errors
    ///
    /// Returns an error when the group has no resolved ID or the update
    /// call fails.
    pub async fn associate_affinity_group(
        &self,
        instance_id: &str,
        group: &CloudStackAffinityGroup,
    ) -> Result<(), CloudError> {
        let Some(group_id) = group.spec.id.clone() else {
            return Err(CloudError::not_found("affinity group", &group.spec.name));
        };
        self.api()
            .update_vm_affinity_groups(instance_id, &[group_id])
            .await
    }
}

#[cfg(test)]
#[path = "affinity_tests.rs"]
mod affinity_tests;
