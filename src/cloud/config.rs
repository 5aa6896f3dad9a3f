// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStack endpoint configuration.
//!
//! Credentials reach the operator two ways: the mounted cloud-config file
//! (INI with a `[Global]` section) configures the manager-level base client,
//! and per-failure-domain Secrets carry the same keys as flat string data.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use k8s_openapi::api::core::v1::Secret;

use crate::constants::CLOUD_CONFIG_GLOBAL_SECTION;

/// Connection settings for one CloudStack API endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudConfig {
    /// Base URL of the CloudStack API (e.g. `https://acs.example.com/client/api`).
    pub api_url: String,

    /// API key of the acting user.
    pub api_key: String,

    /// Secret key of the acting user.
    pub secret_key: String,

    /// Whether to verify the endpoint's TLS certificate. Defaults to true.
    pub verify_ssl: bool,
}

impl CloudConfig {
    /// Parse a cloud-config file.
    ///
    /// The file is INI-format with a `[Global]` section containing `api-url`,
    /// `api-key`, `secret-key` and optionally `verify-ssl`. A missing section
    /// or unreadable file is fatal at client-construction time.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the `[Global]` section is
    /// absent, or a required key is missing.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cloud-config file {}", path.display()))?;

        let values = parse_ini_section(&contents, CLOUD_CONFIG_GLOBAL_SECTION)
            .with_context(|| format!("cloud-config file {} is invalid", path.display()))?;

        Self::from_pairs(&values)
    }

    /// Build a config from the string data of a credentials Secret.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is absent from the secret.
    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let mut values = BTreeMap::new();
        if let Some(data) = &secret.string_data {
            for (k, v) in data {
                values.insert(k.clone(), v.clone());
            }
        }
        if let Some(data) = &secret.data {
            for (k, v) in data {
                let decoded = String::from_utf8(v.0.clone())
                    .with_context(|| format!("secret key {k} is not valid UTF-8"))?;
                values.insert(k.clone(), decoded);
            }
        }
        Self::from_pairs(&values)
    }

    /// Build a config from flat key/value pairs.
    ///
    /// `verify-ssl` accepts the usual boolean spellings ("true"/"false",
    /// "1"/"0", "yes"/"no") and defaults to true when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or `verify-ssl` is not
    /// a recognizable boolean.
    pub fn from_pairs(values: &BTreeMap<String, String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            values
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("cloud config is missing required key {key}"))
        };

        let verify_ssl = match values.get("verify-ssl").map(|v| v.trim().to_ascii_lowercase()) {
            None => true,
            Some(v) => match v.as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                other => bail!("cloud config key verify-ssl has non-boolean value {other:?}"),
            },
        };

        Ok(Self {
            api_url: required("api-url")?,
            api_key: required("api-key")?,
            secret_key: required("secret-key")?,
            verify_ssl,
        })
    }

    /// Copy of this config acting as a different user.
    #[must_use]
    pub fn with_keys(&self, api_key: &str, secret_key: &str) -> Self {
        Self {
            api_url: self.api_url.clone(),
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            verify_ssl: self.verify_ssl,
        }
    }
}

impl std::fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keys stay out of debug output.
        f.debug_struct("CloudConfig")
            .field("api_url", &self.api_url)
            .field("verify_ssl", &self.verify_ssl)
            .finish_non_exhaustive()
    }
}

/// Extract the key/value pairs of one INI section.
///
/// Only the minimal INI dialect of the cloud-config file is supported:
/// `[section]` headers, `key = value` pairs, `#`/`;` comments and blank
/// lines.
fn parse_ini_section(contents: &str, section: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    let mut in_section = false;
    let mut section_seen = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = header.trim() == section;
            section_seen |= in_section;
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("malformed line in cloud config: {line:?}");
        };
        values.insert(key.trim().to_string(), value.trim().to_string());
    }

    if !section_seen {
        bail!("cloud config has no [{section}] section");
    }
    Ok(values)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
