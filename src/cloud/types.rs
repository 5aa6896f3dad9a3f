// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed CloudStack API response objects.
//!
//! CloudStack serializes JSON keys in all-lowercase without separators
//! ("associatednetworkid"); multi-word fields carry explicit renames. Only
//! the fields the operator reads are modeled; unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// A CloudStack zone.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Zone {
    /// Zone UUID.
    pub id: String,

    /// Zone name.
    pub name: String,

    /// Zone network type ("Basic" or "Advanced").
    #[serde(default, rename = "networktype", skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
}

/// A CloudStack guest network.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    /// Network UUID.
    pub id: String,

    /// Network name.
    pub name: String,

    /// Guest network type ("Shared" or "Isolated").
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,

    /// Zone the network lives in.
    #[serde(default, rename = "zoneid", skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,

    /// VPC the network belongs to, if any.
    #[serde(default, rename = "vpcid", skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
}

/// A CloudStack network offering.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkOffering {
    /// Offering UUID.
    pub id: String,

    /// Offering name.
    pub name: String,
}

/// A CloudStack VPC.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vpc {
    /// VPC UUID.
    pub id: String,

    /// VPC name.
    pub name: String,

    /// Zone the VPC lives in.
    #[serde(default, rename = "zoneid", skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
}

/// A public IP address in a zone.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicIpAddress {
    /// Address UUID.
    pub id: String,

    /// Dotted-quad address.
    #[serde(rename = "ipaddress")]
    pub ip_address: String,

    /// Allocation state ("Free", "Allocated", ...).
    #[serde(default, rename = "state", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Isolated network the address is associated with, if any.
    #[serde(
        default,
        rename = "associatednetworkid",
        skip_serializing_if = "Option::is_none"
    )]
    pub associated_network_id: Option<String>,

    /// Network the address itself belongs to.
    #[serde(default, rename = "networkid", skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,

    /// Whether the address is the network's source NAT IP.
    #[serde(default, rename = "issourcenat")]
    pub is_source_nat: bool,
}

/// A load balancer rule fronting the control-plane endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadBalancerRule {
    /// Rule UUID.
    pub id: String,

    /// Rule name.
    pub name: String,

    /// Public IP the rule is bound to.
    #[serde(default, rename = "publicipid", skip_serializing_if = "Option::is_none")]
    pub public_ip_id: Option<String>,

    /// Public-facing port.
    #[serde(rename = "publicport")]
    pub public_port: String,

    /// Balancing algorithm ("roundrobin").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    /// Network the rule belongs to.
    #[serde(default, rename = "networkid", skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

/// A compute service offering.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceOffering {
    /// Offering UUID.
    pub id: String,

    /// Offering name.
    pub name: String,
}

/// A VM template.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
    /// Template UUID.
    pub id: String,

    /// Template name.
    pub name: String,
}

/// A data disk offering.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskOffering {
    /// Offering UUID.
    pub id: String,

    /// Offering name.
    pub name: String,

    /// Whether the offering requires an explicit size.
    #[serde(default, rename = "iscustomized")]
    pub is_customized: bool,
}

/// A registered SSH key pair.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshKeyPair {
    /// Key pair name.
    pub name: String,
}

/// A NIC attached to a virtual machine.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Nic {
    /// Address assigned to the NIC.
    #[serde(default, rename = "ipaddress", skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Network the NIC is attached to.
    #[serde(default, rename = "networkid", skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

/// A CloudStack VM instance.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VirtualMachine {
    /// Instance UUID.
    pub id: String,

    /// Instance name.
    pub name: String,

    /// VM state ("Running", "Stopped", "Error", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Attached NICs.
    #[serde(default, rename = "nic", skip_serializing_if = "Vec::is_empty")]
    pub nics: Vec<Nic>,
}

/// A CloudStack affinity group.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AffinityGroup {
    /// Group UUID.
    pub id: String,

    /// Group name.
    pub name: String,

    /// Group type ("host affinity" or "host anti-affinity").
    #[serde(rename = "type")]
    pub group_type: String,
}

/// A resource tag.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceTag {
    /// Tag key.
    pub key: String,

    /// Tag value.
    pub value: String,
}

/// A CloudStack domain.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Domain {
    /// Domain UUID.
    pub id: String,

    /// Domain short name.
    pub name: String,

    /// Full path from ROOT, e.g. "ROOT/sub1/sub2".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// A CloudStack account.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Account UUID.
    pub id: String,

    /// Account name.
    pub name: String,
}

/// A CloudStack user.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// User UUID.
    pub id: String,

    /// Login name.
    pub username: String,

    /// API key, if one has been generated.
    #[serde(default, rename = "apikey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// API key pair of a user.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserKeys {
    /// API key.
    #[serde(rename = "apikey")]
    pub api_key: String,

    /// Secret key.
    #[serde(rename = "secretkey")]
    pub secret_key: String,
}

/// A CloudStack Kubernetes Service cluster.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CksCluster {
    /// Cluster UUID.
    pub id: String,

    /// Cluster name.
    pub name: String,

    /// Cluster lifecycle state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Management type ("ExternalManaged" for CAPC shadows).
    #[serde(
        default,
        rename = "clustertype",
        skip_serializing_if = "Option::is_none"
    )]
    pub cluster_type: Option<String>,
}

/// Parameters for deploying a VM instance.
#[derive(Clone, Debug, Default)]
pub struct DeployVmParams {
    /// Instance display/host name.
    pub name: String,

    /// Zone to deploy into.
    pub zone_id: String,

    /// Network the primary NIC attaches to.
    pub network_id: String,

    /// Compute offering.
    pub service_offering_id: String,

    /// Boot template.
    pub template_id: String,

    /// Optional data disk offering.
    pub disk_offering_id: Option<String>,

    /// Data disk size in GB for custom-sized offerings.
    pub disk_size_gb: Option<i64>,

    /// SSH key pair name.
    pub ssh_key_name: Option<String>,

    /// Deploy-time detail key/value pairs.
    pub details: Vec<(String, String)>,

    /// Affinity groups the instance joins at deploy time.
    pub affinity_group_ids: Vec<String>,

    /// Base64-encoded (optionally gzip-compressed) cloud-init user data.
    pub user_data: Option<String>,
}

/// Parameters for creating an isolated network.
#[derive(Clone, Debug, Default)]
pub struct CreateNetworkParams {
    /// Network name.
    pub name: String,

    /// Zone the network is created in.
    pub zone_id: String,

    /// Network offering to instantiate.
    pub network_offering_id: String,
}

/// Parameters for creating a load balancer rule.
#[derive(Clone, Debug, Default)]
pub struct CreateLbRuleParams {
    /// Rule name.
    pub name: String,

    /// Public IP the rule binds to.
    pub public_ip_id: String,

    /// Network the rule belongs to.
    pub network_id: String,

    /// Public and private port (the control-plane port).
    pub port: u16,

    /// Balancing algorithm.
    pub algorithm: String,
}

/// Parameters for creating a CKS cluster shadow object.
#[derive(Clone, Debug, Default)]
pub struct CreateCksClusterParams {
    /// Composite cluster name.
    pub name: String,

    /// Zone the cluster is anchored to.
    pub zone_id: String,

    /// Management type; always "ExternalManaged" for CAPC.
    pub cluster_type: String,
}
