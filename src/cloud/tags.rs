// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resource tag helpers and tag-based reference counting.
//!
//! CloudStack has no transactions, so shared resources (networks, public
//! IPs) are reference-counted through tags: each consuming cluster stamps a
//! `CAPC_cluster_<uid>` tag, and CAPC only deletes a resource it created
//! itself (`created_by_CAPC` tag) once no cluster tag from anyone remains.
//! The list-then-decide sequence re-checks after removing its own tag so a
//! concurrent tag add between list and delete keeps the resource alive.

use std::collections::BTreeMap;

use tracing::debug;

use crate::cloud::error::CloudError;
use crate::cloud::CloudStackManager;
use crate::labels::{cluster_tag_key, CLUSTER_TAG_PREFIX, CREATED_BY_CAPC_TAG};

/// CloudStack resource type string for guest networks.
pub const RESOURCE_TYPE_NETWORK: &str = "Network";

/// CloudStack resource type string for public IP addresses.
pub const RESOURCE_TYPE_IP_ADDRESS: &str = "PublicIpAddress";

impl CloudStackManager {
    /// Read the tags of a resource as a map.
    ///
    /// # Errors
    ///
    /// Returns an error when the tag listing fails.
    pub async fn get_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<BTreeMap<String, String>, CloudError> {
        let tags = self.api().list_tags(resource_type, resource_id).await?;
        Ok(tags.into_iter().map(|t| (t.key, t.value)).collect())
    }

    /// Stamp a resource with the usage tag of a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error when tag creation fails.
    pub async fn add_cluster_tag(
        &self,
        resource_type: &str,
        resource_id: &str,
        cluster_uid: &str,
    ) -> Result<(), CloudError> {
        let key = cluster_tag_key(cluster_uid);
        self.api()
            .create_tags(
                resource_type,
                resource_id,
                &[(key, "1".to_string())],
            )
            .await
    }

    /// Mark a resource as created by this provider, making it eligible for
    /// deletion on teardown.
    ///
    /// # Errors
    ///
    /// Returns an error when tag creation fails.
    pub async fn add_created_by_capc_tag(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<(), CloudError> {
        self.api()
            .create_tags(
                resource_type,
                resource_id,
                &[(CREATED_BY_CAPC_TAG.to_string(), "1".to_string())],
            )
            .await
    }

    /// Delete one tag key from a resource.
    ///
    /// # Errors
    ///
    /// Returns an error when tag deletion fails.
    pub async fn delete_tag(
        &self,
        resource_type: &str,
        resource_id: &str,
        key: &str,
    ) -> Result<(), CloudError> {
        self.api()
            .delete_tags(resource_type, resource_id, &[key.to_string()])
            .await
    }

    /// Remove this cluster's usage tag and decide whether the resource may
    /// be deleted.
    ///
    /// Returns `true` only when, after removing our own tag, a fresh tag
    /// listing shows no remaining cluster tags and the created-by-CAPC tag
    /// is present. The fresh listing is what makes a concurrent tag add by
    /// another cluster safe: the late tag is observed and the delete is
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error when tag operations fail.
    pub async fn unreferenced_after_tag_removal(
        &self,
        resource_type: &str,
        resource_id: &str,
        cluster_uid: &str,
    ) -> Result<bool, CloudError> {
        let own_key = cluster_tag_key(cluster_uid);
        self.delete_tag(resource_type, resource_id, &own_key).await?;

        // Re-check: never trust the pre-removal view.
        let remaining = self.get_tags(resource_type, resource_id).await?;
        let still_referenced = remaining.keys().any(|k| k.starts_with(CLUSTER_TAG_PREFIX));
        let capc_created = remaining.contains_key(CREATED_BY_CAPC_TAG);

        debug!(
            resource_type,
            resource_id,
            still_referenced,
            capc_created,
            "evaluated tag-based release"
        );
        Ok(!still_referenced && capc_created)
    }
}

#[cfg(test)]
#[path = "tags_tests.rs"]
mod tags_tests;
