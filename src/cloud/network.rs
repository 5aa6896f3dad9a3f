// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Isolated network operations: network lifecycle, public IP selection,
//! egress firewall rules and the control-plane load balancer rule.

use tracing::{debug, info};

use crate::cloud::error::{CloudError, ErrorKind};
use crate::cloud::tags::{RESOURCE_TYPE_IP_ADDRESS, RESOURCE_TYPE_NETWORK};
use crate::cloud::types::{CreateLbRuleParams, CreateNetworkParams, PublicIpAddress};
use crate::cloud::CloudStackManager;
use crate::constants::NET_OFFERING_NAME;
use crate::crd::{CloudStackCluster, CloudStackFailureDomain, CloudStackIsolatedNetwork};

/// Name given to the control-plane load balancer rule.
const LB_RULE_NAME: &str = "K8sAPIServer";

/// Egress protocols opened on isolated networks.
const EGRESS_PROTOCOLS: [&str; 3] = ["tcp", "udp", "icmp"];

/// Treat already-exists-class errors as success.
fn ok_if_already_applied(result: Result<(), CloudError>) -> Result<(), CloudError> {
    match result {
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        other => other,
    }
}

/// Treat not-found-class errors as success (resource already gone).
fn ok_if_gone(result: Result<(), CloudError>) -> Result<(), CloudError> {
    match result {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl CloudStackManager {
    /// Ensure the isolated network, its public IP, egress firewall rules and
    /// the control-plane load balancer rule all exist.
    ///
    /// Mutates `iso_net` spec/status with resolved IDs, and fills the
    /// cluster's endpoint host (one-time set) plus its public-IP/LB-rule
    /// status mirrors. Safe to call repeatedly; every step resolves before
    /// creating.
    ///
    /// # Errors
    ///
    /// Returns an error when the failure domain's zone is unresolved, when a
    /// lookup is ambiguous, or when any CloudStack call fails.
    pub async fn get_or_create_isolated_network(
        &self,
        failure_domain: &CloudStackFailureDomain,
        iso_net: &mut CloudStackIsolatedNetwork,
        cluster: &mut CloudStackCluster,
    ) -> Result<(), CloudError> {
        let Some(zone_id) = failure_domain.spec.zone.id.clone() else {
            return Err(CloudError::not_found(
                "zone",
                &failure_domain.spec.zone.name,
            ));
        };
        let cluster_uid = cluster.metadata.uid.clone().unwrap_or_default();

        // Network itself.
        let created = self.ensure_network(&zone_id, iso_net).await?;
        let network_id = iso_net
            .spec
            .id
            .clone()
            .unwrap_or_else(|| unreachable!("ensure_network sets the id"));

        self.add_cluster_tag(RESOURCE_TYPE_NETWORK, &network_id, &cluster_uid)
            .await?;
        if created {
            self.add_created_by_capc_tag(RESOURCE_TYPE_NETWORK, &network_id)
                .await?;
        }

        // Public IP for the control-plane endpoint.
        let requested = match cluster.spec.control_plane_endpoint.host.as_str() {
            "" => None,
            host => Some(host.to_string()),
        };
        let ip = self
            .ensure_public_ip(&zone_id, &network_id, requested.as_deref())
            .await?;
        {
            let status = iso_net.status.get_or_insert_with(Default::default);
            status.public_ip_id = Some(ip.id.clone());
            status.public_ip_network_id = ip.network_id.clone();
        }
        self.add_cluster_tag(RESOURCE_TYPE_IP_ADDRESS, &ip.id, &cluster_uid)
            .await?;
        if requested.is_none() {
            self.add_created_by_capc_tag(RESOURCE_TYPE_IP_ADDRESS, &ip.id)
                .await?;
        }

        // One-time endpoint host assignment.
        if cluster.spec.control_plane_endpoint.host.is_empty() {
            cluster.spec.control_plane_endpoint.host = ip.ip_address.clone();
            info!(host = %ip.ip_address, "assigned control plane endpoint");
        }
        iso_net.spec.control_plane_endpoint = cluster.spec.control_plane_endpoint.clone();

        // Egress firewall; already-open rules are a no-op.
        for protocol in EGRESS_PROTOCOLS {
            ok_if_already_applied(
                self.api()
                    .create_egress_firewall_rule(&network_id, protocol)
                    .await,
            )?;
        }

        // Round-robin load balancer rule on the control-plane port.
        let lb_rule_id = self
            .ensure_lb_rule(
                &ip.id,
                &network_id,
                cluster.spec.control_plane_endpoint.port,
            )
            .await?;
        iso_net
            .status
            .get_or_insert_with(Default::default)
            .lb_rule_id = Some(lb_rule_id.clone());

        let cluster_status = cluster.status.get_or_insert_with(Default::default);
        cluster_status.public_ip_id = Some(ip.id);
        cluster_status.lb_rule_id = Some(lb_rule_id);
        Ok(())
    }

    /// Resolve the network by name, creating it when absent.
    ///
    /// Returns whether the network was created by this call.
    async fn ensure_network(
        &self,
        zone_id: &str,
        iso_net: &mut CloudStackIsolatedNetwork,
    ) -> Result<bool, CloudError> {
        let networks = self.api().list_networks(zone_id).await?;
        if let Some(existing) = networks.iter().find(|n| match &iso_net.spec.id {
            Some(id) => &n.id == id,
            None => n.name == iso_net.spec.name,
        }) {
            iso_net.spec.id = Some(existing.id.clone());
            debug!(network = %existing.name, id = %existing.id, "resolved isolated network");
            return Ok(false);
        }

        let offerings = self.api().list_network_offerings(NET_OFFERING_NAME).await?;
        let offering = match offerings.len() {
            0 => return Err(CloudError::not_found("network offering", NET_OFFERING_NAME)),
            1 => &offerings[0],
            count => {
                return Err(CloudError::Ambiguous {
                    resource: "network offering",
                    name: NET_OFFERING_NAME.to_string(),
                    count,
                })
            }
        };

        let network = self
            .api()
            .create_network(CreateNetworkParams {
                name: iso_net.spec.name.clone(),
                zone_id: zone_id.to_string(),
                network_offering_id: offering.id.clone(),
            })
            .await?;
        info!(network = %network.name, id = %network.id, "created isolated network");
        iso_net.spec.id = Some(network.id);
        Ok(true)
    }

    /// Pick or allocate the public IP fronting the control-plane endpoint.
    ///
    /// An explicitly requested address must already exist and be free or
    /// already bound to this network. Otherwise the address already
    /// associated with the network is reused, then the first unallocated
    /// address; with every address taken the descriptive exhaustion error is
    /// returned and the caller relies on requeue.
    async fn ensure_public_ip(
        &self,
        zone_id: &str,
        network_id: &str,
        requested: Option<&str>,
    ) -> Result<PublicIpAddress, CloudError> {
        let candidates = self
            .api()
            .list_public_ip_addresses(zone_id, requested, false)
            .await?;

        let candidate = if let Some(address) = requested {
            let found = candidates.iter().find(|ip| ip.ip_address == address);
            match found {
                None => return Err(CloudError::not_found("public ip", address)),
                Some(ip)
                    if ip.associated_network_id.is_none()
                        || ip.associated_network_id.as_deref() == Some(network_id) =>
                {
                    ip.clone()
                }
                Some(ip) => {
                    return Err(CloudError::Api {
                        message: format!(
                            "public ip {address} is already allocated to network {:?}",
                            ip.associated_network_id
                        ),
                        kind: ErrorKind::Transient,
                    })
                }
            }
        } else if let Some(ip) = candidates
            .iter()
            .find(|ip| ip.associated_network_id.as_deref() == Some(network_id))
        {
            ip.clone()
        } else if let Some(ip) = candidates
            .iter()
            .find(|ip| ip.associated_network_id.is_none())
        {
            ip.clone()
        } else {
            return Err(CloudError::Api {
                message: format!("all public IP addresses in zone {zone_id} are allocated"),
                kind: ErrorKind::Transient,
            });
        };

        if candidate.associated_network_id.as_deref() == Some(network_id) {
            return Ok(candidate);
        }
        self.api()
            .associate_ip_address(network_id, Some(&candidate.id))
            .await
    }

    /// Resolve the load balancer rule for the control-plane port, creating
    /// it when absent.
    async fn ensure_lb_rule(
        &self,
        public_ip_id: &str,
        network_id: &str,
        port: u16,
    ) -> Result<String, CloudError> {
        let rules = self.api().list_load_balancer_rules(public_ip_id).await?;
        if let Some(rule) = rules.iter().find(|r| r.public_port == port.to_string()) {
            debug!(rule = %rule.id, "reusing load balancer rule");
            return Ok(rule.id.clone());
        }

        let rule = self
            .api()
            .create_load_balancer_rule(CreateLbRuleParams {
                name: LB_RULE_NAME.to_string(),
                public_ip_id: public_ip_id.to_string(),
                network_id: network_id.to_string(),
                port,
                algorithm: "roundrobin".to_string(),
            })
            .await?;
        info!(rule = %rule.id, port, "created load balancer rule");
        Ok(rule.id)
    }

    /// Add a VM to the isolated network's load balancer rule.
    ///
    /// No-op when the instance is already a member.
    ///
    /// # Errors
    ///
    /// Returns an error when the rule is missing from status or a CloudStack
    /// call fails.
    pub async fn assign_vm_to_load_balancer_rule(
        &self,
        iso_net: &CloudStackIsolatedNetwork,
        instance_id: &str,
    ) -> Result<(), CloudError> {
        let Some(rule_id) = iso_net
            .status
            .as_ref()
            .and_then(|s| s.lb_rule_id.clone())
        else {
            return Err(CloudError::not_found("load balancer rule", &iso_net.spec.name));
        };

        let members = self
            .api()
            .list_load_balancer_rule_instances(&rule_id)
            .await?;
        if members.iter().any(|id| id == instance_id) {
            debug!(instance_id, rule = %rule_id, "instance already behind load balancer");
            return Ok(());
        }

        self.api()
            .assign_to_load_balancer_rule(&rule_id, &[instance_id.to_string()])
            .await
    }

    /// Tear down the isolated network's cloud resources, honoring tag-based
    /// reference counting.
    ///
    /// The public IP and the network are each released only when, after
    /// removing this cluster's usage tag, no other cluster tag remains and
    /// the resource was created by CAPC.
    ///
    /// # Errors
    ///
    /// Returns an error when a CloudStack call fails; not-found results are
    /// treated as already-cleaned-up.
    pub async fn dispose_isolated_network_resources(
        &self,
        iso_net: &CloudStackIsolatedNetwork,
        cluster: &CloudStackCluster,
    ) -> Result<(), CloudError> {
        let cluster_uid = cluster.metadata.uid.clone().unwrap_or_default();
        let status = iso_net.status.clone().unwrap_or_default();

        if let Some(ip_id) = &status.public_ip_id {
            if self
                .unreferenced_after_tag_removal(RESOURCE_TYPE_IP_ADDRESS, ip_id, &cluster_uid)
                .await?
            {
                if let Some(rule_id) = &status.lb_rule_id {
                    ok_if_gone(self.api().delete_load_balancer_rule(rule_id).await)?;
                }
                ok_if_gone(self.api().disassociate_ip_address(ip_id).await)?;
                info!(ip = %ip_id, "released public IP");
            }
        }

        if let Some(network_id) = &iso_net.spec.id {
            if self
                .unreferenced_after_tag_removal(RESOURCE_TYPE_NETWORK, network_id, &cluster_uid)
                .await?
            {
                ok_if_gone(self.api().delete_network(network_id).await)?;
                info!(network = %network_id, "deleted isolated network");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod network_tests;
