// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Mock CloudStack API for unit testing.
//!
//! This module provides an in-memory implementation of [`CloudApi`] that can
//! be used in unit tests without a running CloudStack instance. Resources
//! live in maps behind a mutex; every operation is counted so tests can
//! assert on how often create-class calls happened, and creates can be made
//! to panic unless a resolve was attempted first.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::cloud::api::CloudApi;
use crate::cloud::error::{classify_api_error, CloudError};
use crate::cloud::types::*;

/// In-memory mock of the CloudStack API.
#[derive(Clone)]
pub struct MockCloudApi {
    api_key: Arc<str>,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockCloudApi {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct MockState {
    zones: Vec<Zone>,
    networks: Vec<Network>,
    network_offerings: Vec<NetworkOffering>,
    vpcs: Vec<Vpc>,
    public_ips: Vec<PublicIpAddress>,
    lb_rules: Vec<LoadBalancerRule>,
    lb_members: HashMap<String, Vec<String>>,
    egress_open_networks: HashSet<String>,
    service_offerings: Vec<ServiceOffering>,
    templates: Vec<Template>,
    disk_offerings: Vec<DiskOffering>,
    ssh_keys: Vec<SshKeyPair>,
    vms: Vec<VirtualMachine>,
    vm_affinity: HashMap<String, Vec<String>>,
    affinity_groups: Vec<AffinityGroup>,
    tags: HashMap<(String, String), BTreeMap<String, String>>,
    domains: Vec<Domain>,
    accounts: HashMap<String, Vec<Account>>,
    users: HashMap<(String, String), Vec<User>>,
    user_keys: HashMap<String, UserKeys>,
    cks_clusters: Vec<CksCluster>,
    cks_members: HashMap<String, Vec<String>>,
    calls: HashMap<&'static str, usize>,
    injected_errors: HashMap<&'static str, Vec<String>>,
    deploy_state: String,
    require_resolve_before_create: bool,
    next_id: u64,
}

impl MockState {
    fn count(&mut self, op: &'static str) -> Result<(), CloudError> {
        *self.calls.entry(op).or_insert(0) += 1;
        if let Some(queue) = self.injected_errors.get_mut(op) {
            if !queue.is_empty() {
                return Err(classify_api_error(queue.remove(0)));
            }
        }
        Ok(())
    }

    fn guard_create(&self, create_op: &'static str, resolve_op: &'static str) {
        if self.require_resolve_before_create
            && self.calls.get(resolve_op).copied().unwrap_or(0) == 0
        {
            panic!("{create_op} called before {resolve_op}");
        }
    }

    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

impl MockCloudApi {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_api_key("mock-api-key")
    }

    /// Create an empty mock reporting the given API key.
    #[must_use]
    pub fn with_api_key(api_key: &str) -> Self {
        let mock = Self {
            api_key: Arc::from(api_key),
            state: Arc::new(Mutex::new(MockState::default())),
        };
        mock.state.lock().unwrap().deploy_state = "Running".to_string();
        mock
    }

    /// How many times the given operation was invoked.
    #[must_use]
    pub fn calls(&self, op: &'static str) -> usize {
        self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    /// Queue an error for the next invocation of the given operation.
    pub fn inject_error(&self, op: &'static str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .injected_errors
            .entry(op)
            .or_default()
            .push(message.to_string());
    }

    /// Make every create-class operation panic unless the matching resolve
    /// operation was called first.
    pub fn require_resolve_before_create(&self) {
        self.state.lock().unwrap().require_resolve_before_create = true;
    }

    /// State newly deployed VMs report (defaults to "Running").
    pub fn set_deploy_state(&self, state: &str) {
        self.state.lock().unwrap().deploy_state = state.to_string();
    }

    /// Seed a zone.
    pub fn add_zone(&self, id: &str, name: &str) {
        self.state.lock().unwrap().zones.push(Zone {
            id: id.to_string(),
            name: name.to_string(),
            network_type: Some("Advanced".to_string()),
        });
    }

    /// Seed a guest network in a zone.
    pub fn add_network(&self, id: &str, name: &str, network_type: &str, zone_id: &str) {
        self.state.lock().unwrap().networks.push(Network {
            id: id.to_string(),
            name: name.to_string(),
            network_type: Some(network_type.to_string()),
            zone_id: Some(zone_id.to_string()),
            vpc_id: None,
        });
    }

    /// Seed a network offering.
    pub fn add_network_offering(&self, id: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .network_offerings
            .push(NetworkOffering {
                id: id.to_string(),
                name: name.to_string(),
            });
    }

    /// Seed a public IP address.
    pub fn add_public_ip(&self, id: &str, address: &str, network_id: &str, associated: Option<&str>) {
        self.state.lock().unwrap().public_ips.push(PublicIpAddress {
            id: id.to_string(),
            ip_address: address.to_string(),
            state: Some(
                if associated.is_some() { "Allocated" } else { "Free" }.to_string(),
            ),
            associated_network_id: associated.map(str::to_string),
            network_id: Some(network_id.to_string()),
            is_source_nat: false,
        });
    }

    /// Seed a service offering.
    pub fn add_service_offering(&self, id: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .service_offerings
            .push(ServiceOffering {
                id: id.to_string(),
                name: name.to_string(),
            });
    }

    /// Seed a template.
    pub fn add_template(&self, id: &str, name: &str) {
        self.state.lock().unwrap().templates.push(Template {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Seed a disk offering.
    pub fn add_disk_offering(&self, id: &str, name: &str, is_customized: bool) {
        self.state.lock().unwrap().disk_offerings.push(DiskOffering {
            id: id.to_string(),
            name: name.to_string(),
            is_customized,
        });
    }

    /// Seed an SSH key pair.
    pub fn add_ssh_key_pair(&self, name: &str) {
        self.state.lock().unwrap().ssh_keys.push(SshKeyPair {
            name: name.to_string(),
        });
    }

    /// Seed a VM instance.
    pub fn add_vm(&self, id: &str, name: &str, state: &str) {
        self.state.lock().unwrap().vms.push(VirtualMachine {
            id: id.to_string(),
            name: name.to_string(),
            state: Some(state.to_string()),
            nics: vec![Nic {
                ip_address: Some("10.0.0.10".to_string()),
                network_id: Some("n-1".to_string()),
            }],
        });
    }

    /// Change the state of a seeded VM.
    pub fn set_vm_state(&self, id: &str, state: &str) {
        let mut guard = self.state.lock().unwrap();
        if let Some(vm) = guard.vms.iter_mut().find(|vm| vm.id == id) {
            vm.state = Some(state.to_string());
        }
    }

    /// Seed a domain.
    pub fn add_domain(&self, id: &str, name: &str, path: &str) {
        self.state.lock().unwrap().domains.push(Domain {
            id: id.to_string(),
            name: name.to_string(),
            path: Some(path.to_string()),
        });
    }

    /// Seed an account under a domain.
    pub fn add_account(&self, domain_id: &str, id: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .entry(domain_id.to_string())
            .or_default()
            .push(Account {
                id: id.to_string(),
                name: name.to_string(),
            });
    }

    /// Seed a user with API keys under an account/domain pair.
    pub fn add_user(&self, account: &str, domain_id: &str, id: &str, username: &str, api_key: &str, secret_key: &str) {
        let mut guard = self.state.lock().unwrap();
        guard
            .users
            .entry((account.to_string(), domain_id.to_string()))
            .or_default()
            .push(User {
                id: id.to_string(),
                username: username.to_string(),
                api_key: Some(api_key.to_string()),
            });
        guard.user_keys.insert(
            id.to_string(),
            UserKeys {
                api_key: api_key.to_string(),
                secret_key: secret_key.to_string(),
            },
        );
    }

    /// The VM ids currently assigned to a load balancer rule.
    #[must_use]
    pub fn lb_members(&self, rule_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .lb_members
            .get(rule_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The VM ids currently attached to a CKS cluster.
    #[must_use]
    pub fn cks_members(&self, cluster_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .cks_members
            .get(cluster_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a network still exists in the mock.
    #[must_use]
    pub fn network_exists(&self, id: &str) -> bool {
        self.state.lock().unwrap().networks.iter().any(|n| n.id == id)
    }

    /// Direct read of the tags on a resource (no call counting).
    #[must_use]
    pub fn tags_of(&self, resource_type: &str, resource_id: &str) -> BTreeMap<String, String> {
        self.state
            .lock()
            .unwrap()
            .tags
            .get(&(resource_type.to_string(), resource_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

fn matches(filter: Option<&str>, value: &str) -> bool {
    filter.is_none_or(|f| f == value)
}

#[async_trait::async_trait]
impl CloudApi for MockCloudApi {
    fn api_key(&self) -> &str {
        &self.api_key
    }

    async fn list_zones(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Zone>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_zones")?;
        Ok(guard
            .zones
            .iter()
            .filter(|z| matches(id, &z.id) && matches(name, &z.name))
            .cloned()
            .collect())
    }

    async fn list_networks(&self, zone_id: &str) -> Result<Vec<Network>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_networks")?;
        Ok(guard
            .networks
            .iter()
            .filter(|n| n.zone_id.as_deref() == Some(zone_id))
            .cloned()
            .collect())
    }

    async fn list_network_offerings(&self, name: &str) -> Result<Vec<NetworkOffering>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_network_offerings")?;
        Ok(guard
            .network_offerings
            .iter()
            .filter(|o| o.name == name)
            .cloned()
            .collect())
    }

    async fn create_network(&self, params: CreateNetworkParams) -> Result<Network, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.guard_create("create_network", "list_networks");
        guard.count("create_network")?;
        let id = guard.fresh_id("net");
        let network = Network {
            id,
            name: params.name,
            network_type: Some("Isolated".to_string()),
            zone_id: Some(params.zone_id),
            vpc_id: None,
        };
        guard.networks.push(network.clone());
        Ok(network)
    }

    async fn delete_network(&self, id: &str) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("delete_network")?;
        let before = guard.networks.len();
        guard.networks.retain(|n| n.id != id);
        if guard.networks.len() == before {
            return Err(CloudError::not_found("network", id));
        }
        Ok(())
    }

    async fn list_vpcs(
        &self,
        zone_id: &str,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Vpc>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_vpcs")?;
        Ok(guard
            .vpcs
            .iter()
            .filter(|v| {
                v.zone_id.as_deref() == Some(zone_id)
                    && matches(id, &v.id)
                    && matches(name, &v.name)
            })
            .cloned()
            .collect())
    }

    async fn list_public_ip_addresses(
        &self,
        _zone_id: &str,
        address: Option<&str>,
        _allocated_only: bool,
    ) -> Result<Vec<PublicIpAddress>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_public_ip_addresses")?;
        Ok(guard
            .public_ips
            .iter()
            .filter(|ip| matches(address, &ip.ip_address))
            .cloned()
            .collect())
    }

    async fn associate_ip_address(
        &self,
        network_id: &str,
        ip_address_id: Option<&str>,
    ) -> Result<PublicIpAddress, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.guard_create("associate_ip_address", "list_public_ip_addresses");
        guard.count("associate_ip_address")?;
        let ip = match ip_address_id {
            Some(id) => guard.public_ips.iter_mut().find(|ip| ip.id == id),
            None => guard
                .public_ips
                .iter_mut()
                .find(|ip| ip.associated_network_id.is_none()),
        };
        let Some(ip) = ip else {
            return Err(CloudError::not_found(
                "public ip",
                ip_address_id.unwrap_or("<any free>"),
            ));
        };
        ip.associated_network_id = Some(network_id.to_string());
        ip.state = Some("Allocated".to_string());
        Ok(ip.clone())
    }

    async fn disassociate_ip_address(&self, id: &str) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("disassociate_ip_address")?;
        let Some(ip) = guard.public_ips.iter_mut().find(|ip| ip.id == id) else {
            return Err(CloudError::not_found("public ip", id));
        };
        ip.associated_network_id = None;
        ip.state = Some("Free".to_string());
        Ok(())
    }

    async fn create_egress_firewall_rule(
        &self,
        network_id: &str,
        _protocol: &str,
    ) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("create_egress_firewall_rule")?;
        if !guard.egress_open_networks.insert(network_id.to_string()) {
            return Err(classify_api_error(format!(
                "there is already a firewall rule for network {network_id}"
            )));
        }
        Ok(())
    }

    async fn list_load_balancer_rules(
        &self,
        public_ip_id: &str,
    ) -> Result<Vec<LoadBalancerRule>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_load_balancer_rules")?;
        Ok(guard
            .lb_rules
            .iter()
            .filter(|r| r.public_ip_id.as_deref() == Some(public_ip_id))
            .cloned()
            .collect())
    }

    async fn create_load_balancer_rule(
        &self,
        params: CreateLbRuleParams,
    ) -> Result<LoadBalancerRule, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.guard_create("create_load_balancer_rule", "list_load_balancer_rules");
        guard.count("create_load_balancer_rule")?;
        let id = guard.fresh_id("lb");
        let rule = LoadBalancerRule {
            id,
            name: params.name,
            public_ip_id: Some(params.public_ip_id),
            public_port: params.port.to_string(),
            algorithm: Some(params.algorithm),
            network_id: Some(params.network_id),
        };
        guard.lb_rules.push(rule.clone());
        Ok(rule)
    }

    async fn delete_load_balancer_rule(&self, id: &str) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("delete_load_balancer_rule")?;
        guard.lb_rules.retain(|r| r.id != id);
        guard.lb_members.remove(id);
        Ok(())
    }

    async fn list_load_balancer_rule_instances(
        &self,
        rule_id: &str,
    ) -> Result<Vec<String>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_load_balancer_rule_instances")?;
        Ok(guard.lb_members.get(rule_id).cloned().unwrap_or_default())
    }

    async fn assign_to_load_balancer_rule(
        &self,
        rule_id: &str,
        vm_ids: &[String],
    ) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("assign_to_load_balancer_rule")?;
        let members = guard.lb_members.entry(rule_id.to_string()).or_default();
        for id in vm_ids {
            if !members.contains(id) {
                members.push(id.clone());
            }
        }
        Ok(())
    }

    async fn list_service_offerings(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<ServiceOffering>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_service_offerings")?;
        Ok(guard
            .service_offerings
            .iter()
            .filter(|o| matches(id, &o.id) && matches(name, &o.name))
            .cloned()
            .collect())
    }

    async fn list_templates(
        &self,
        id: Option<&str>,
        name: Option<&str>,
        _zone_id: &str,
    ) -> Result<Vec<Template>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_templates")?;
        Ok(guard
            .templates
            .iter()
            .filter(|t| matches(id, &t.id) && matches(name, &t.name))
            .cloned()
            .collect())
    }

    async fn list_disk_offerings(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<DiskOffering>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_disk_offerings")?;
        Ok(guard
            .disk_offerings
            .iter()
            .filter(|o| matches(id, &o.id) && matches(name, &o.name))
            .cloned()
            .collect())
    }

    async fn list_ssh_key_pairs(&self, name: &str) -> Result<Vec<SshKeyPair>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_ssh_key_pairs")?;
        Ok(guard
            .ssh_keys
            .iter()
            .filter(|k| k.name == name)
            .cloned()
            .collect())
    }

    async fn list_virtual_machines(
        &self,
        id: Option<&str>,
        name: Option<&str>,
        _network_id: Option<&str>,
    ) -> Result<Vec<VirtualMachine>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_virtual_machines")?;
        Ok(guard
            .vms
            .iter()
            .filter(|vm| matches(id, &vm.id) && matches(name, &vm.name))
            .cloned()
            .collect())
    }

    async fn deploy_virtual_machine(
        &self,
        params: DeployVmParams,
    ) -> Result<VirtualMachine, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.guard_create("deploy_virtual_machine", "list_virtual_machines");
        guard.count("deploy_virtual_machine")?;
        let id = guard.fresh_id("vm");
        let state = guard.deploy_state.clone();
        let vm = VirtualMachine {
            id: id.clone(),
            name: params.name,
            state: Some(state),
            nics: vec![Nic {
                ip_address: Some("10.0.0.10".to_string()),
                network_id: Some(params.network_id),
            }],
        };
        guard.vms.push(vm.clone());
        guard.vm_affinity.insert(id, params.affinity_group_ids);
        Ok(vm)
    }

    async fn destroy_virtual_machine(&self, id: &str, _expunge: bool) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("destroy_virtual_machine")?;
        let before = guard.vms.len();
        guard.vms.retain(|vm| vm.id != id);
        if guard.vms.len() == before {
            return Err(CloudError::not_found("virtual machine", id));
        }
        Ok(())
    }

    async fn list_affinity_groups(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<AffinityGroup>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_affinity_groups")?;
        Ok(guard
            .affinity_groups
            .iter()
            .filter(|g| matches(id, &g.id) && matches(name, &g.name))
            .cloned()
            .collect())
    }

    async fn create_affinity_group(
        &self,
        name: &str,
        group_type: &str,
    ) -> Result<AffinityGroup, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.guard_create("create_affinity_group", "list_affinity_groups");
        guard.count("create_affinity_group")?;
        let id = guard.fresh_id("ag");
        let group = AffinityGroup {
            id,
            name: name.to_string(),
            group_type: group_type.to_string(),
        };
        guard.affinity_groups.push(group.clone());
        Ok(group)
    }

    async fn delete_affinity_group(&self, id: &str) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("delete_affinity_group")?;
        let before = guard.affinity_groups.len();
        guard.affinity_groups.retain(|g| g.id != id);
        if guard.affinity_groups.len() == before {
            return Err(CloudError::not_found("affinity group", id));
        }
        Ok(())
    }

    async fn update_vm_affinity_groups(
        &self,
        vm_id: &str,
        group_ids: &[String],
    ) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("update_vm_affinity_groups")?;
        guard
            .vm_affinity
            .insert(vm_id.to_string(), group_ids.to_vec());
        Ok(())
    }

    async fn list_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<ResourceTag>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_tags")?;
        Ok(guard
            .tags
            .get(&(resource_type.to_string(), resource_id.to_string()))
            .map(|tags| {
                tags.iter()
                    .map(|(k, v)| ResourceTag {
                        key: k.clone(),
                        value: v.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
        tags: &[(String, String)],
    ) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("create_tags")?;
        let entry = guard
            .tags
            .entry((resource_type.to_string(), resource_id.to_string()))
            .or_default();
        for (k, v) in tags {
            entry.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn delete_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
        keys: &[String],
    ) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("delete_tags")?;
        if let Some(entry) = guard
            .tags
            .get_mut(&(resource_type.to_string(), resource_id.to_string()))
        {
            for key in keys {
                entry.remove(key);
            }
        }
        Ok(())
    }

    async fn list_domains(&self, name: &str) -> Result<Vec<Domain>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_domains")?;
        Ok(guard
            .domains
            .iter()
            .filter(|d| d.name == name)
            .cloned()
            .collect())
    }

    async fn list_accounts(
        &self,
        name: &str,
        domain_id: &str,
    ) -> Result<Vec<Account>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_accounts")?;
        Ok(guard
            .accounts
            .get(domain_id)
            .map(|accounts| {
                accounts
                    .iter()
                    .filter(|a| a.name == name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_users(&self, account: &str, domain_id: &str) -> Result<Vec<User>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_users")?;
        Ok(guard
            .users
            .get(&(account.to_string(), domain_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_user_keys(&self, user_id: &str) -> Result<UserKeys, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("get_user_keys")?;
        guard
            .user_keys
            .get(user_id)
            .cloned()
            .ok_or_else(|| CloudError::not_found("user keys", user_id))
    }

    async fn list_kubernetes_clusters(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<CksCluster>, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("list_kubernetes_clusters")?;
        Ok(guard
            .cks_clusters
            .iter()
            .filter(|c| matches(id, &c.id) && matches(name, &c.name))
            .cloned()
            .collect())
    }

    async fn create_kubernetes_cluster(
        &self,
        params: CreateCksClusterParams,
    ) -> Result<CksCluster, CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.guard_create("create_kubernetes_cluster", "list_kubernetes_clusters");
        guard.count("create_kubernetes_cluster")?;
        let id = guard.fresh_id("cks");
        let cluster = CksCluster {
            id,
            name: params.name,
            state: Some("Created".to_string()),
            cluster_type: Some(params.cluster_type),
        };
        guard.cks_clusters.push(cluster.clone());
        Ok(cluster)
    }

    async fn delete_kubernetes_cluster(&self, id: &str) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("delete_kubernetes_cluster")?;
        guard.cks_clusters.retain(|c| c.id != id);
        guard.cks_members.remove(id);
        Ok(())
    }

    async fn add_vms_to_kubernetes_cluster(
        &self,
        cluster_id: &str,
        vm_ids: &[String],
    ) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("add_vms_to_kubernetes_cluster")?;
        let members = guard.cks_members.entry(cluster_id.to_string()).or_default();
        for id in vm_ids {
            if !members.contains(id) {
                members.push(id.clone());
            }
        }
        Ok(())
    }

    async fn remove_vms_from_kubernetes_cluster(
        &self,
        cluster_id: &str,
        vm_ids: &[String],
    ) -> Result<(), CloudError> {
        let mut guard = self.state.lock().unwrap();
        guard.count("remove_vms_from_kubernetes_cluster")?;
        if let Some(members) = guard.cks_members.get_mut(cluster_id) {
            members.retain(|id| !vm_ids.contains(id));
        }
        Ok(())
    }
}
