// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP implementation of the CloudStack API.
//!
//! CloudStack exposes one GET endpoint taking a `command` parameter plus
//! command-specific arguments, authenticated by an HMAC-SHA1 signature over
//! the sorted, lowercased query string. Mutating commands return an async
//! job id which is polled via `queryAsyncJobResult` until completion. Both
//! concerns are handled here so callers only see typed results and
//! classified [`CloudError`]s.

use std::time::{Duration, Instant};

use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha1::Sha1;
use tracing::{debug, trace, warn};

use crate::cloud::api::CloudApi;
use crate::cloud::config::CloudConfig;
use crate::cloud::error::{classify_api_error, CloudError};
use crate::cloud::types::*;
use crate::constants::{
    ASYNC_JOB_POLL_INTERVAL_MILLIS, ASYNC_JOB_TIMEOUT_SECS, CLOUDSTACK_PAGE_SIZE,
};

type HmacSha1 = Hmac<Sha1>;

/// CloudStack API client over HTTP.
#[derive(Clone)]
pub struct CloudStackClient {
    http: reqwest::Client,
    config: CloudConfig,
}

impl std::fmt::Debug for CloudStackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keys stay out of debug output.
        f.debug_struct("CloudStackClient")
            .field("api_url", &self.config.api_url)
            .finish_non_exhaustive()
    }
}

impl CloudStackClient {
    /// Build a client for one CloudStack endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &CloudConfig) -> Result<Self, CloudError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(60));
        if !config.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(Self {
            http: builder.build()?,
            config: config.clone(),
        })
    }

    /// Compute the request signature over sorted, lowercased parameters.
    fn sign(&self, params: &[(String, String)]) -> String {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.to_ascii_lowercase().cmp(&b.0.to_ascii_lowercase()));

        let query = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k.to_ascii_lowercase(), url_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
            .to_ascii_lowercase();

        // HMAC-SHA1 keys of any length are accepted.
        let mut mac = HmacSha1::new_from_slice(self.config.secret_key.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(query.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Execute one API command and return its unwrapped response object.
    async fn call(&self, command: &str, params: &[(&str, &str)]) -> Result<Value, CloudError> {
        let mut all: Vec<(String, String)> = vec![
            ("command".to_string(), command.to_string()),
            ("response".to_string(), "json".to_string()),
            ("apiKey".to_string(), self.config.api_key.clone()),
        ];
        for (k, v) in params {
            if !v.is_empty() {
                all.push(((*k).to_string(), (*v).to_string()));
            }
        }
        let signature = self.sign(&all);
        all.push(("signature".to_string(), signature));

        trace!(command, "calling CloudStack API");
        let response = self
            .http
            .get(&self.config.api_url)
            .query(&all)
            .send()
            .await?;

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(classify_api_error(format!(
                    "CloudStack returned HTTP {status} for {command}"
                )))
            }
        };

        unwrap_response(command, &body)
    }

    /// Execute an async command and wait for its job to finish.
    ///
    /// Returns the final `jobresult` object.
    async fn call_async(&self, command: &str, params: &[(&str, &str)]) -> Result<Value, CloudError> {
        let response = self.call(command, params).await?;
        let Some(job_id) = response.get("jobid").and_then(Value::as_str) else {
            // Synchronous completion; some commands skip the job queue.
            return Ok(response);
        };
        let job_id = job_id.to_string();

        let started = Instant::now();
        loop {
            if started.elapsed() > Duration::from_secs(ASYNC_JOB_TIMEOUT_SECS) {
                return Err(CloudError::JobTimeout { job_id });
            }
            tokio::time::sleep(Duration::from_millis(ASYNC_JOB_POLL_INTERVAL_MILLIS)).await;

            let poll = self
                .call("queryAsyncJobResult", &[("jobid", job_id.as_str())])
                .await?;
            match poll.get("jobstatus").and_then(Value::as_i64) {
                Some(0) | None => {
                    trace!(job_id, "async job still pending");
                }
                Some(1) => {
                    debug!(job_id, command, "async job completed");
                    return Ok(poll.get("jobresult").cloned().unwrap_or(Value::Null));
                }
                Some(_) => {
                    let text = poll
                        .pointer("/jobresult/errortext")
                        .and_then(Value::as_str)
                        .unwrap_or("async job failed without error text");
                    warn!(job_id, command, error = text, "async job failed");
                    return Err(classify_api_error(text.to_string()));
                }
            }
        }
    }

    /// Extract a typed list from a list-command response.
    ///
    /// CloudStack omits the item key entirely when there are no results.
    fn parse_list<T: serde::de::DeserializeOwned>(
        response: &Value,
        key: &str,
    ) -> Result<Vec<T>, CloudError> {
        match response.get(key) {
            None => Ok(Vec::new()),
            Some(items) => Ok(serde_json::from_value(items.clone())?),
        }
    }

    /// Extract one typed object from a response, by key.
    fn parse_object<T: serde::de::DeserializeOwned>(
        response: &Value,
        key: &str,
    ) -> Result<T, CloudError> {
        let Some(obj) = response.get(key) else {
            return Err(classify_api_error(format!(
                "no match found: response missing {key}"
            )));
        };
        Ok(serde_json::from_value(obj.clone())?)
    }
}

/// Unwrap the single `<command>response` envelope of a CloudStack reply and
/// surface embedded errors as classified [`CloudError`]s.
fn unwrap_response(command: &str, body: &Value) -> Result<Value, CloudError> {
    let key = format!("{}response", command.to_ascii_lowercase());
    let inner = body
        .get(&key)
        .or_else(|| body.get("errorresponse"))
        .cloned()
        .unwrap_or_else(|| body.clone());

    if let Some(text) = inner.get("errortext").and_then(Value::as_str) {
        return Err(classify_api_error(text.to_string()));
    }
    Ok(inner)
}

/// Percent-encode one query value the way CloudStack's signature expects.
fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[async_trait::async_trait]
impl CloudApi for CloudStackClient {
    fn api_key(&self) -> &str {
        &self.config.api_key
    }

    async fn list_zones(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Zone>, CloudError> {
        let response = self
            .call(
                "listZones",
                &[("id", id.unwrap_or("")), ("name", name.unwrap_or(""))],
            )
            .await?;
        Self::parse_list(&response, "zone")
    }

    async fn list_networks(&self, zone_id: &str) -> Result<Vec<Network>, CloudError> {
        let pagesize = CLOUDSTACK_PAGE_SIZE.to_string();
        let response = self
            .call(
                "listNetworks",
                &[("zoneid", zone_id), ("pagesize", pagesize.as_str())],
            )
            .await?;
        Self::parse_list(&response, "network")
    }

    async fn list_network_offerings(&self, name: &str) -> Result<Vec<NetworkOffering>, CloudError> {
        let response = self
            .call("listNetworkOfferings", &[("name", name)])
            .await?;
        Self::parse_list(&response, "networkoffering")
    }

    async fn create_network(&self, params: CreateNetworkParams) -> Result<Network, CloudError> {
        let response = self
            .call(
                "createNetwork",
                &[
                    ("name", params.name.as_str()),
                    ("displaytext", params.name.as_str()),
                    ("zoneid", params.zone_id.as_str()),
                    ("networkofferingid", params.network_offering_id.as_str()),
                ],
            )
            .await?;
        Self::parse_object(&response, "network")
    }

    async fn delete_network(&self, id: &str) -> Result<(), CloudError> {
        self.call_async("deleteNetwork", &[("id", id)]).await?;
        Ok(())
    }

    async fn list_vpcs(
        &self,
        zone_id: &str,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Vpc>, CloudError> {
        let response = self
            .call(
                "listVPCs",
                &[
                    ("zoneid", zone_id),
                    ("id", id.unwrap_or("")),
                    ("name", name.unwrap_or("")),
                ],
            )
            .await?;
        Self::parse_list(&response, "vpc")
    }

    async fn list_public_ip_addresses(
        &self,
        zone_id: &str,
        address: Option<&str>,
        allocated_only: bool,
    ) -> Result<Vec<PublicIpAddress>, CloudError> {
        let pagesize = CLOUDSTACK_PAGE_SIZE.to_string();
        let response = self
            .call(
                "listPublicIpAddresses",
                &[
                    ("zoneid", zone_id),
                    ("ipaddress", address.unwrap_or("")),
                    ("allocatedonly", if allocated_only { "true" } else { "false" }),
                    ("pagesize", pagesize.as_str()),
                ],
            )
            .await?;
        Self::parse_list(&response, "publicipaddress")
    }

    async fn associate_ip_address(
        &self,
        network_id: &str,
        ip_address_id: Option<&str>,
    ) -> Result<PublicIpAddress, CloudError> {
        let result = self
            .call_async(
                "associateIpAddress",
                &[
                    ("networkid", network_id),
                    ("ipaddressid", ip_address_id.unwrap_or("")),
                ],
            )
            .await?;
        Self::parse_object(&result, "ipaddress")
    }

    async fn disassociate_ip_address(&self, id: &str) -> Result<(), CloudError> {
        self.call_async("disassociateIpAddress", &[("id", id)])
            .await?;
        Ok(())
    }

    async fn create_egress_firewall_rule(
        &self,
        network_id: &str,
        protocol: &str,
    ) -> Result<(), CloudError> {
        self.call_async(
            "createEgressFirewallRule",
            &[("networkid", network_id), ("protocol", protocol)],
        )
        .await?;
        Ok(())
    }

    async fn list_load_balancer_rules(
        &self,
        public_ip_id: &str,
    ) -> Result<Vec<LoadBalancerRule>, CloudError> {
        let response = self
            .call("listLoadBalancerRules", &[("publicipid", public_ip_id)])
            .await?;
        Self::parse_list(&response, "loadbalancerrule")
    }

    async fn create_load_balancer_rule(
        &self,
        params: CreateLbRuleParams,
    ) -> Result<LoadBalancerRule, CloudError> {
        let port = params.port.to_string();
        let result = self
            .call_async(
                "createLoadBalancerRule",
                &[
                    ("name", params.name.as_str()),
                    ("publicipid", params.public_ip_id.as_str()),
                    ("networkid", params.network_id.as_str()),
                    ("publicport", port.as_str()),
                    ("privateport", port.as_str()),
                    ("algorithm", params.algorithm.as_str()),
                    ("protocol", "tcp"),
                ],
            )
            .await?;
        Self::parse_object(&result, "loadbalancer")
    }

    async fn delete_load_balancer_rule(&self, id: &str) -> Result<(), CloudError> {
        self.call_async("deleteLoadBalancerRule", &[("id", id)])
            .await?;
        Ok(())
    }

    async fn list_load_balancer_rule_instances(
        &self,
        rule_id: &str,
    ) -> Result<Vec<String>, CloudError> {
        let response = self
            .call("listLoadBalancerRuleInstances", &[("id", rule_id)])
            .await?;
        let vms: Vec<VirtualMachine> = Self::parse_list(&response, "loadbalancerruleinstance")?;
        Ok(vms.into_iter().map(|vm| vm.id).collect())
    }

    async fn assign_to_load_balancer_rule(
        &self,
        rule_id: &str,
        vm_ids: &[String],
    ) -> Result<(), CloudError> {
        let ids = vm_ids.join(",");
        self.call_async(
            "assignToLoadBalancerRule",
            &[("id", rule_id), ("virtualmachineids", ids.as_str())],
        )
        .await?;
        Ok(())
    }

    async fn list_service_offerings(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<ServiceOffering>, CloudError> {
        let response = self
            .call(
                "listServiceOfferings",
                &[("id", id.unwrap_or("")), ("name", name.unwrap_or(""))],
            )
            .await?;
        Self::parse_list(&response, "serviceoffering")
    }

    async fn list_templates(
        &self,
        id: Option<&str>,
        name: Option<&str>,
        zone_id: &str,
    ) -> Result<Vec<Template>, CloudError> {
        let response = self
            .call(
                "listTemplates",
                &[
                    ("templatefilter", "executable"),
                    ("id", id.unwrap_or("")),
                    ("name", name.unwrap_or("")),
                    ("zoneid", zone_id),
                ],
            )
            .await?;
        Self::parse_list(&response, "template")
    }

    async fn list_disk_offerings(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<DiskOffering>, CloudError> {
        let response = self
            .call(
                "listDiskOfferings",
                &[("id", id.unwrap_or("")), ("name", name.unwrap_or(""))],
            )
            .await?;
        Self::parse_list(&response, "diskoffering")
    }

    async fn list_ssh_key_pairs(&self, name: &str) -> Result<Vec<SshKeyPair>, CloudError> {
        let response = self.call("listSSHKeyPairs", &[("name", name)]).await?;
        Self::parse_list(&response, "sshkeypair")
    }

    async fn list_virtual_machines(
        &self,
        id: Option<&str>,
        name: Option<&str>,
        network_id: Option<&str>,
    ) -> Result<Vec<VirtualMachine>, CloudError> {
        let response = self
            .call(
                "listVirtualMachines",
                &[
                    ("id", id.unwrap_or("")),
                    ("name", name.unwrap_or("")),
                    ("networkid", network_id.unwrap_or("")),
                ],
            )
            .await?;
        Self::parse_list(&response, "virtualmachine")
    }

    async fn deploy_virtual_machine(
        &self,
        params: DeployVmParams,
    ) -> Result<VirtualMachine, CloudError> {
        let mut args: Vec<(String, String)> = vec![
            ("name".to_string(), params.name.clone()),
            ("displayname".to_string(), params.name.clone()),
            ("zoneid".to_string(), params.zone_id.clone()),
            ("networkids".to_string(), params.network_id.clone()),
            (
                "serviceofferingid".to_string(),
                params.service_offering_id.clone(),
            ),
            ("templateid".to_string(), params.template_id.clone()),
        ];
        if let Some(disk_offering_id) = &params.disk_offering_id {
            args.push(("diskofferingid".to_string(), disk_offering_id.clone()));
        }
        if let Some(size) = params.disk_size_gb {
            args.push(("size".to_string(), size.to_string()));
        }
        if let Some(key) = &params.ssh_key_name {
            args.push(("keypair".to_string(), key.clone()));
        }
        if !params.affinity_group_ids.is_empty() {
            args.push((
                "affinitygroupids".to_string(),
                params.affinity_group_ids.join(","),
            ));
        }
        if let Some(user_data) = &params.user_data {
            args.push(("userdata".to_string(), user_data.clone()));
        }
        for (i, (key, value)) in params.details.iter().enumerate() {
            args.push((format!("details[{i}].{key}"), value.clone()));
        }

        let borrowed: Vec<(&str, &str)> = args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let result = self.call_async("deployVirtualMachine", &borrowed).await?;
        Self::parse_object(&result, "virtualmachine")
    }

    async fn destroy_virtual_machine(&self, id: &str, expunge: bool) -> Result<(), CloudError> {
        self.call_async(
            "destroyVirtualMachine",
            &[("id", id), ("expunge", if expunge { "true" } else { "false" })],
        )
        .await?;
        Ok(())
    }

    async fn list_affinity_groups(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<AffinityGroup>, CloudError> {
        let response = self
            .call(
                "listAffinityGroups",
                &[("id", id.unwrap_or("")), ("name", name.unwrap_or(""))],
            )
            .await?;
        Self::parse_list(&response, "affinitygroup")
    }

    async fn create_affinity_group(
        &self,
        name: &str,
        group_type: &str,
    ) -> Result<AffinityGroup, CloudError> {
        let result = self
            .call_async(
                "createAffinityGroup",
                &[("name", name), ("type", group_type)],
            )
            .await?;
        Self::parse_object(&result, "affinitygroup")
    }

    async fn delete_affinity_group(&self, id: &str) -> Result<(), CloudError> {
        self.call_async("deleteAffinityGroup", &[("id", id)]).await?;
        Ok(())
    }

    async fn update_vm_affinity_groups(
        &self,
        vm_id: &str,
        group_ids: &[String],
    ) -> Result<(), CloudError> {
        let ids = group_ids.join(",");
        self.call_async(
            "updateVMAffinityGroup",
            &[("id", vm_id), ("affinitygroupids", ids.as_str())],
        )
        .await?;
        Ok(())
    }

    async fn list_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<ResourceTag>, CloudError> {
        let response = self
            .call(
                "listTags",
                &[
                    ("resourcetype", resource_type),
                    ("resourceid", resource_id),
                    ("listall", "true"),
                ],
            )
            .await?;
        Self::parse_list(&response, "tag")
    }

    async fn create_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
        tags: &[(String, String)],
    ) -> Result<(), CloudError> {
        let mut args: Vec<(String, String)> = vec![
            ("resourcetype".to_string(), resource_type.to_string()),
            ("resourceids".to_string(), resource_id.to_string()),
        ];
        for (i, (key, value)) in tags.iter().enumerate() {
            args.push((format!("tags[{i}].key"), key.clone()));
            args.push((format!("tags[{i}].value"), value.clone()));
        }
        let borrowed: Vec<(&str, &str)> = args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.call_async("createTags", &borrowed).await?;
        Ok(())
    }

    async fn delete_tags(
        &self,
        resource_type: &str,
        resource_id: &str,
        keys: &[String],
    ) -> Result<(), CloudError> {
        let mut args: Vec<(String, String)> = vec![
            ("resourcetype".to_string(), resource_type.to_string()),
            ("resourceids".to_string(), resource_id.to_string()),
        ];
        for (i, key) in keys.iter().enumerate() {
            args.push((format!("tags[{i}].key"), key.clone()));
        }
        let borrowed: Vec<(&str, &str)> = args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.call_async("deleteTags", &borrowed).await?;
        Ok(())
    }

    async fn list_domains(&self, name: &str) -> Result<Vec<Domain>, CloudError> {
        let response = self
            .call("listDomains", &[("name", name), ("listall", "true")])
            .await?;
        Self::parse_list(&response, "domain")
    }

    async fn list_accounts(
        &self,
        name: &str,
        domain_id: &str,
    ) -> Result<Vec<Account>, CloudError> {
        let response = self
            .call("listAccounts", &[("name", name), ("domainid", domain_id)])
            .await?;
        Self::parse_list(&response, "account")
    }

    async fn list_users(&self, account: &str, domain_id: &str) -> Result<Vec<User>, CloudError> {
        let response = self
            .call("listUsers", &[("account", account), ("domainid", domain_id)])
            .await?;
        Self::parse_list(&response, "user")
    }

    async fn get_user_keys(&self, user_id: &str) -> Result<UserKeys, CloudError> {
        let response = self.call("getUserKeys", &[("id", user_id)]).await?;
        Self::parse_object(&response, "userkeys")
    }

    async fn list_kubernetes_clusters(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<CksCluster>, CloudError> {
        let response = self
            .call(
                "listKubernetesClusters",
                &[
                    ("id", id.unwrap_or("")),
                    ("name", name.unwrap_or("")),
                    ("listall", "true"),
                ],
            )
            .await?;
        Self::parse_list(&response, "kubernetescluster")
    }

    async fn create_kubernetes_cluster(
        &self,
        params: CreateCksClusterParams,
    ) -> Result<CksCluster, CloudError> {
        let result = self
            .call_async(
                "createKubernetesCluster",
                &[
                    ("name", params.name.as_str()),
                    ("description", params.name.as_str()),
                    ("zoneid", params.zone_id.as_str()),
                    ("clustertype", params.cluster_type.as_str()),
                ],
            )
            .await?;
        Self::parse_object(&result, "kubernetescluster")
    }

    async fn delete_kubernetes_cluster(&self, id: &str) -> Result<(), CloudError> {
        self.call_async("deleteKubernetesCluster", &[("id", id)])
            .await?;
        Ok(())
    }

    async fn add_vms_to_kubernetes_cluster(
        &self,
        cluster_id: &str,
        vm_ids: &[String],
    ) -> Result<(), CloudError> {
        let ids = vm_ids.join(",");
        self.call_async(
            "addVirtualMachinesToKubernetesCluster",
            &[("id", cluster_id), ("virtualmachineids", ids.as_str())],
        )
        .await?;
        Ok(())
    }

    async fn remove_vms_from_kubernetes_cluster(
        &self,
        cluster_id: &str,
        vm_ids: &[String],
    ) -> Result<(), CloudError> {
        let ids = vm_ids.join(",");
        self.call_async(
            "removeVirtualMachinesFromKubernetesCluster",
            &[("id", cluster_id), ("virtualmachineids", ids.as_str())],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
