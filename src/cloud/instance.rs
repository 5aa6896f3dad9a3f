// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! VM instance operations: deploy, adopt, refresh and destroy.

use std::io::Write;

use base64::Engine;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use crate::cloud::error::{CloudError, ErrorKind};
use crate::cloud::types::{DeployVmParams, VirtualMachine};
use crate::cloud::CloudStackManager;
use crate::constants::{PROVIDER_ID_PREFIX, USER_DATA_COMPRESSION_THRESHOLD};
use crate::crd::{CloudStackFailureDomainSpec, CloudStackMachine, ResourceIdentifier};

/// Encode cloud-init user data for the deploy call.
///
/// Data above the compression threshold is gzip-compressed before base64
/// encoding unless compression is explicitly disabled on the machine spec.
#[must_use]
pub fn encode_user_data(data: &[u8], uncompressed: bool) -> String {
    let engine = &base64::engine::general_purpose::STANDARD;
    if uncompressed || data.len() <= USER_DATA_COMPRESSION_THRESHOLD {
        return engine.encode(data);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    let compressed = encoder
        .write_all(data)
        .and_then(|()| encoder.finish())
        .unwrap_or_else(|_| data.to_vec());
    engine.encode(compressed)
}

impl CloudStackManager {
    /// Fetch the machine's VM by instance ID, then by name, else deploy it.
    ///
    /// On success `machine.spec.instance_id` and `machine.spec.provider_id`
    /// are populated and the status mirrors the observed VM state and
    /// addresses.
    ///
    /// # Errors
    ///
    /// Returns an error when offering/template resolution is ambiguous or
    /// absent, when the deploy fails (terminal deploy errors keep their
    /// classification), or when a stored instance ID no longer resolves.
    pub async fn get_or_create_vm_instance(
        &self,
        machine: &mut CloudStackMachine,
        failure_domain: &CloudStackFailureDomainSpec,
        affinity_group_ids: &[String],
        user_data: &[u8],
    ) -> Result<(), CloudError> {
        let machine_name = machine.metadata.name.clone().unwrap_or_default();

        // Primary key: the stored instance ID.
        if let Some(instance_id) = machine.spec.instance_id.clone() {
            let vms = self
                .api()
                .list_virtual_machines(Some(&instance_id), None, None)
                .await?;
            if let Some(vm) = vms.first() {
                apply_vm(machine, vm);
                return Ok(());
            }
            return Err(CloudError::not_found("virtual machine", &instance_id));
        }

        // Fallback key: the machine name (recovers from a crash between
        // deploy and spec patch).
        let vms = self
            .api()
            .list_virtual_machines(None, Some(&machine_name), None)
            .await?;
        if let Some(vm) = vms.iter().find(|vm| vm.name == machine_name) {
            info!(instance = %vm.id, "adopted existing VM instance");
            apply_vm(machine, vm);
            return Ok(());
        }

        let Some(zone_id) = failure_domain.zone.id.clone() else {
            return Err(CloudError::not_found("zone", &failure_domain.zone.name));
        };
        let Some(network_id) = failure_domain.zone.network.id.clone() else {
            return Err(CloudError::not_found(
                "network",
                &failure_domain.zone.network.name,
            ));
        };

        let service_offering_id = self.resolve_service_offering(&machine.spec.offering).await?;
        let template_id = self
            .resolve_template(&machine.spec.template, &zone_id)
            .await?;
        let (disk_offering_id, disk_size_gb) = match &machine.spec.disk_offering {
            Some(disk) => self.resolve_disk_offering(disk).await?,
            None => (None, None),
        };
        if let Some(key_name) = &machine.spec.ssh_key {
            let keys = self.api().list_ssh_key_pairs(key_name).await?;
            if keys.is_empty() {
                return Err(CloudError::not_found("ssh key pair", key_name));
            }
        }

        let user_data = if user_data.is_empty() {
            None
        } else {
            Some(encode_user_data(
                user_data,
                machine.spec.uncompressed_user_data.unwrap_or(false),
            ))
        };

        let details = machine
            .spec
            .details
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let vm = self
            .api()
            .deploy_virtual_machine(DeployVmParams {
                name: machine_name,
                zone_id,
                network_id,
                service_offering_id,
                template_id,
                disk_offering_id,
                disk_size_gb,
                ssh_key_name: machine.spec.ssh_key.clone(),
                details,
                affinity_group_ids: affinity_group_ids.to_vec(),
                user_data,
            })
            .await?;
        info!(instance = %vm.id, "deployed VM instance");
        apply_vm(machine, &vm);
        Ok(())
    }

    /// Refresh `status.instance_state`, addresses and the state timestamp
    /// for an existing instance.
    ///
    /// # Errors
    ///
    /// Returns a not-found error when the instance no longer exists;
    /// callers treat this as a soft retryable condition.
    pub async fn resolve_vm_instance_details(
        &self,
        machine: &mut CloudStackMachine,
    ) -> Result<(), CloudError> {
        let Some(instance_id) = machine.spec.instance_id.clone() else {
            return Err(CloudError::not_found(
                "virtual machine",
                machine.metadata.name.as_deref().unwrap_or("<unnamed>"),
            ));
        };
        let vms = self
            .api()
            .list_virtual_machines(Some(&instance_id), None, None)
            .await?;
        let Some(vm) = vms.first() else {
            return Err(CloudError::not_found("virtual machine", &instance_id));
        };
        apply_vm(machine, vm);
        Ok(())
    }

    /// Destroy (with expunge) the machine's instance.
    ///
    /// Must be called only after the instance ID is known; a VM that is
    /// already gone counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error when the destroy call fails for any reason other
    /// than the instance being absent.
    pub async fn destroy_vm_instance(
        &self,
        machine: &CloudStackMachine,
    ) -> Result<(), CloudError> {
        let Some(instance_id) = machine.spec.instance_id.clone() else {
            debug!("machine has no instance id, nothing to destroy");
            return Ok(());
        };
        match self.api().destroy_virtual_machine(&instance_id, true).await {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    async fn resolve_service_offering(
        &self,
        offering: &ResourceIdentifier,
    ) -> Result<String, CloudError> {
        let offerings = self
            .api()
            .list_service_offerings(offering.id.as_deref(), offering.name.as_deref())
            .await?;
        let label = offering
            .name
            .clone()
            .or_else(|| offering.id.clone())
            .unwrap_or_default();
        match offerings.len() {
            0 => Err(CloudError::not_found("service offering", &label)),
            1 => Ok(offerings[0].id.clone()),
            count => Err(CloudError::Ambiguous {
                resource: "service offering",
                name: label,
                count,
            }),
        }
    }

    async fn resolve_template(
        &self,
        template: &ResourceIdentifier,
        zone_id: &str,
    ) -> Result<String, CloudError> {
        let templates = self
            .api()
            .list_templates(template.id.as_deref(), template.name.as_deref(), zone_id)
            .await?;
        let label = template
            .name
            .clone()
            .or_else(|| template.id.clone())
            .unwrap_or_default();
        match templates.len() {
            0 => Err(CloudError::not_found("template", &label)),
            1 => Ok(templates[0].id.clone()),
            count => Err(CloudError::Ambiguous {
                resource: "template",
                name: label,
                count,
            }),
        }
    }

    async fn resolve_disk_offering(
        &self,
        disk: &crate::crd::CloudStackMachineDiskOffering,
    ) -> Result<(Option<String>, Option<i64>), CloudError> {
        let offerings = self
            .api()
            .list_disk_offerings(disk.id.as_deref(), disk.name.as_deref())
            .await?;
        let label = disk
            .name
            .clone()
            .or_else(|| disk.id.clone())
            .unwrap_or_default();
        let offering = match offerings.len() {
            0 => return Err(CloudError::not_found("disk offering", &label)),
            1 => &offerings[0],
            count => {
                return Err(CloudError::Ambiguous {
                    resource: "disk offering",
                    name: label,
                    count,
                })
            }
        };
        if offering.is_customized && disk.custom_size_in_gb.is_none() {
            return Err(CloudError::Api {
                message: format!("disk offering {label} requires a custom size"),
                kind: ErrorKind::Transient,
            });
        }
        Ok((Some(offering.id.clone()), disk.custom_size_in_gb))
    }
}

/// Mirror an observed VM into the machine's spec identity and status.
fn apply_vm(machine: &mut CloudStackMachine, vm: &VirtualMachine) {
    machine.spec.instance_id = Some(vm.id.clone());
    machine.spec.provider_id = Some(format!("{PROVIDER_ID_PREFIX}{}", vm.id));

    let status = machine.status.get_or_insert_with(Default::default);
    let new_state = vm.state.clone();
    if status.instance_state != new_state {
        status.instance_state_last_updated = Some(Utc::now());
    }
    status.instance_state = new_state;
    status.addresses = vm
        .nics
        .iter()
        .filter_map(|nic| nic.ip_address.clone())
        .collect();
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod instance_tests;
