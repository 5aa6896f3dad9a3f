// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `CloudApi` trait for mocking.
//!
//! This trait abstracts the raw CloudStack API operations to enable mocking
//! in unit tests. The concrete [`super::client::CloudStackClient`] implements
//! it over HTTP; tests use the in-memory [`super::mock::MockCloudApi`].
//!
//! Operations here are raw and non-idempotent; the resolve-or-create
//! semantics live in the [`super::CloudStackManager`] layer on top.

use crate::cloud::error::CloudError;
use crate::cloud::types::*;

/// Raw CloudStack API operations.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait CloudApi: Send + Sync {
    /// The API key this client authenticates with.
    fn api_key(&self) -> &str;

    // Zone / network operations
    async fn list_zones(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Zone>, CloudError>;
    async fn list_networks(&self, zone_id: &str) -> Result<Vec<Network>, CloudError>;
    async fn list_network_offerings(&self, name: &str) -> Result<Vec<NetworkOffering>, CloudError>;
    async fn create_network(&self, params: CreateNetworkParams) -> Result<Network, CloudError>;
    async fn delete_network(&self, id: &str) -> Result<(), CloudError>;
    async fn list_vpcs(
        &self,
        zone_id: &str,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Vpc>, CloudError>;

    // Public IP / firewall / load balancer operations
    async fn list_public_ip_addresses(
        &self,
        zone_id: &str,
        address: Option<&str>,
        allocated_only: bool,
    ) -> Result<Vec<PublicIpAddress>, CloudError>;
    async fn associate_ip_address(
        &self,
        network_id: &str,
        ip_address_id: Option<&str>,
    ) -> Result<PublicIpAddress, CloudError>;
    async fn disassociate_ip_address(&self, id: &str) -> Result<(), CloudError>;
    async fn create_egress_firewall_rule(
        &self,
        network_id: &str,
        protocol: &str,
    ) -> Result<(), CloudError>;
    async fn list_load_balancer_rules(
        &self,
        public_ip_id: &str,
    ) -> Result<Vec<LoadBalancerRule>, CloudError>;
    async fn create_load_balancer_rule(
        &self,
        params: CreateLbRuleParams,
    ) -> Result<LoadBalancerRule, CloudError>;
    async fn delete_load_balancer_rule(&self, id: &str) -> Result<(), CloudError>;
    async fn list_load_balancer_rule_instances(
        &self,
        rule_id: &str,
    ) -> Result<Vec<String>, CloudError>;
    async fn assign_to_load_balancer_rule(
        &self,
        rule_id: &str,
        vm_ids: &[String],
    ) -> Result<(), CloudError>;

    // Offering / template lookups
    async fn list_service_offerings(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<ServiceOffering>, CloudError>;
    async fn list_templates(
        &self,
        id: Option<&str>,
        name: Option<&str>,
        zone_id: &str,
    ) -> Result<Vec<Template>, CloudError>;
    async fn list_disk_offerings(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<DiskOffering>, CloudError>;
    async fn list_ssh_key_pairs(&self, name: &str) -> Result<Vec<SshKeyPair>, CloudError>;

    // Virtual machine operations
    async fn list_virtual_machines(
        &self,
        id: Option<&str>,
        name: Option<&str>,
        network_id: Option<&str>,
    ) -> Result<Vec<VirtualMachine>, CloudError>;
    async fn deploy_virtual_machine(
        &self,
        params: DeployVmParams,
    ) -> Result<VirtualMachine, CloudError>;
    async fn destroy_virtual_machine(&self, id: &str, expunge: bool) -> Result<(), CloudError>;

    // Affinity group operations
    async fn list_affinity_groups(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<AffinityGroup>, CloudError>;
    async fn create_affinity_group(
        &self,
        name: &str,
        group_type: &str,
    ) -> Result<AffinityGroup, CloudError>;
    async fn delete_affinity_group(&self, id: &str) -> Result<(), CloudError>;
    async fn update_vm_affinity_groups(
        &self,
        vm_id: &str,
        group_ids: &[String],
    ) -> Result<(), CloudError>;

    // Resource tag operations
    async fn list_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<ResourceTag>, CloudError>;
    async fn create_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
        tags: &[(String, String)],
    ) -> Result<(), CloudError>;
    async fn delete_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
        keys: &[String],
    ) -> Result<(), CloudError>;

    // Domain / account / user operations
    async fn list_domains(&self, name: &str) -> Result<Vec<Domain>, CloudError>;
    async fn list_accounts(
        &self,
        name: &str,
        domain_id: &str,
    ) -> Result<Vec<Account>, CloudError>;
    async fn list_users(
        &self,
        account: &str,
        domain_id: &str,
    ) -> Result<Vec<User>, CloudError>;
    async fn get_user_keys(&self, user_id: &str) -> Result<UserKeys, CloudError>;

    // CloudStack Kubernetes Service operations
    async fn list_kubernetes_clusters(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<CksCluster>, CloudError>;
    async fn create_kubernetes_cluster(
        &self,
        params: CreateCksClusterParams,
    ) -> Result<CksCluster, CloudError>;
    async fn delete_kubernetes_cluster(&self, id: &str) -> Result<(), CloudError>;
    async fn add_vms_to_kubernetes_cluster(
        &self,
        cluster_id: &str,
        vm_ids: &[String],
    ) -> Result<(), CloudError>;
    async fn remove_vms_from_kubernetes_cluster(
        &self,
        cluster_id: &str,
        vm_ids: &[String],
    ) -> Result<(), CloudError>;
}
