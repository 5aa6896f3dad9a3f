// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone and zone-network resolution.

use tracing::debug;

use crate::cloud::error::CloudError;
use crate::cloud::CloudStackManager;
use crate::crd::ZoneSpec;

impl CloudStackManager {
    /// Resolve a zone by ID or name, filling in the missing identity.
    ///
    /// # Errors
    ///
    /// Returns a not-found error on zero matches and an ambiguity error when
    /// more than one zone carries the requested name.
    pub async fn resolve_zone(&self, zone: &mut ZoneSpec) -> Result<(), CloudError> {
        let zones = match &zone.id {
            Some(id) => self.api().list_zones(Some(id), None).await?,
            None => self.api().list_zones(None, Some(&zone.name)).await?,
        };

        match zones.len() {
            0 => Err(CloudError::not_found("zone", &zone.name)),
            1 => {
                zone.id = Some(zones[0].id.clone());
                zone.name = zones[0].name.clone();
                debug!(zone = %zone.name, id = ?zone.id, "resolved zone");
                Ok(())
            }
            count => Err(CloudError::Ambiguous {
                resource: "zone",
                name: zone.name.clone(),
                count,
            }),
        }
    }

    /// Resolve the guest network of a zone, filling in its ID and type.
    ///
    /// The zone itself must already be resolved. A missing network is
    /// reported as a not-found error; for isolated networks the caller
    /// creates it lazily via the isolated-network reconciler.
    ///
    /// # Errors
    ///
    /// Returns a not-found error when the zone is unresolved or the network
    /// does not exist, and an ambiguity error on duplicate names.
    pub async fn resolve_network_for_zone(&self, zone: &mut ZoneSpec) -> Result<(), CloudError> {
        let Some(zone_id) = zone.id.clone() else {
            return Err(CloudError::not_found("zone", &zone.name));
        };

        let networks = self.api().list_networks(&zone_id).await?;
        let matched: Vec<_> = networks
            .iter()
            .filter(|n| match &zone.network.id {
                Some(id) => &n.id == id,
                None => n.name == zone.network.name,
            })
            .collect();

        match matched.len() {
            0 => Err(CloudError::not_found("network", &zone.network.name)),
            1 => {
                zone.network.id = Some(matched[0].id.clone());
                zone.network.name = matched[0].name.clone();
                zone.network.r#type = matched[0].network_type.clone();
                debug!(
                    network = %zone.network.name,
                    id = ?zone.network.id,
                    r#type = ?zone.network.r#type,
                    "resolved zone network"
                );
                Ok(())
            }
            count => Err(CloudError::Ambiguous {
                resource: "network",
                name: zone.network.name.clone(),
                count,
            }),
        }
    }
}

#[cfg(test)]
#[path = "zone_tests.rs"]
mod zone_tests;
