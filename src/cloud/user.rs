// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain → Account → User credential resolution.
//!
//! A failure domain's secret yields the endpoint credentials. When the
//! owning cluster specifies an Account/Domain, the operator resolves the
//! domain path, the account within it and that account's first user carrying
//! API keys, then rebuilds a client impersonating that user. Every step
//! fails closed; there is no fallback to a default identity.

use tracing::{debug, info};

use crate::cloud::config::CloudConfig;
use crate::cloud::error::{CloudError, ErrorKind};
use crate::cloud::types::UserKeys;
use crate::cloud::{CloudApiFactory, CloudStackManager};

/// Resolved tenant scope: the domain ID and impersonation keys.
#[derive(Clone, Debug)]
pub struct ResolvedUser {
    /// UUID of the resolved domain.
    pub domain_id: String,

    /// API keys of the resolved user.
    pub keys: UserKeys,
}

/// Normalize a domain path: auto-prefix "ROOT" when absent.
fn normalize_domain_path(domain: &str) -> String {
    let trimmed = domain.trim().trim_matches('/');
    if trimmed.is_empty() {
        return "ROOT".to_string();
    }
    if trimmed == "ROOT" || trimmed.starts_with("ROOT/") {
        trimmed.to_string()
    } else {
        format!("ROOT/{trimmed}")
    }
}

impl CloudStackManager {
    /// Resolve a domain by (possibly multi-level) path.
    ///
    /// # Errors
    ///
    /// Fails when no domain on the path matches exactly one entry.
    pub async fn resolve_domain_id(&self, domain: &str) -> Result<String, CloudError> {
        let path = normalize_domain_path(domain);
        let leaf = path
            .rsplit('/')
            .next()
            .unwrap_or(&path)
            .to_string();

        let domains = self.api().list_domains(&leaf).await?;
        let matched: Vec<_> = domains
            .iter()
            .filter(|d| {
                d.path
                    .as_deref()
                    .map(|p| p.trim_matches('/') == path)
                    // Domains without a path (ROOT on some versions) match
                    // by name alone.
                    .unwrap_or(d.name == path)
            })
            .collect();

        match matched.len() {
            0 => Err(CloudError::not_found("domain", &path)),
            1 => {
                debug!(domain = %path, id = %matched[0].id, "resolved domain");
                Ok(matched[0].id.clone())
            }
            count => Err(CloudError::Ambiguous {
                resource: "domain",
                name: path,
                count,
            }),
        }
    }

    /// Resolve the API keys of the user acting for an account in a domain.
    ///
    /// # Errors
    ///
    /// Fails when the domain or account cannot be resolved to exactly one
    /// entry, or when no user of the account carries an API key.
    pub async fn resolve_user(
        &self,
        account: &str,
        domain: &str,
    ) -> Result<ResolvedUser, CloudError> {
        let domain_id = self.resolve_domain_id(domain).await?;

        let accounts = self.api().list_accounts(account, &domain_id).await?;
        match accounts.len() {
            1 => {}
            0 => return Err(CloudError::not_found("account", account)),
            count => {
                return Err(CloudError::Ambiguous {
                    resource: "account",
                    name: account.to_string(),
                    count,
                })
            }
        }

        let users = self.api().list_users(account, &domain_id).await?;
        let Some(user) = users.iter().find(|u| u.api_key.is_some()) else {
            return Err(CloudError::Api {
                message: format!("no user of account {account} has an API key"),
                kind: ErrorKind::NotFound,
            });
        };

        let keys = self.api().get_user_keys(&user.id).await?;
        info!(account, domain, user = %user.username, "resolved acting user");
        Ok(ResolvedUser { domain_id, keys })
    }
}

/// Build the manager acting as a failure domain's tenant.
///
/// Without an account override the endpoint credentials are used directly;
/// with one, a second client impersonating the resolved user is built. The
/// resolved domain ID (when any) is returned alongside for status
/// reporting.
///
/// # Errors
///
/// Fails closed when any resolution step fails: domain not found, account
/// count ≠ 1, or no API key available.
pub async fn failure_domain_manager(
    factory: &CloudApiFactory,
    config: &CloudConfig,
    account: Option<&str>,
    domain: Option<&str>,
) -> Result<(CloudStackManager, Option<String>), CloudError> {
    let base = CloudStackManager::from_api(factory(config)?);

    let Some(account) = account.filter(|a| !a.is_empty()) else {
        return Ok((base, None));
    };
    let domain = domain.unwrap_or("ROOT");

    let resolved = base.resolve_user(account, domain).await?;
    let scoped_config = config.with_keys(&resolved.keys.api_key, &resolved.keys.secret_key);
    let scoped = CloudStackManager::from_api(factory(&scoped_config)?);
    Ok((scoped, Some(resolved.domain_id)))
}

#[cfg(test)]
#[path = "user_tests.rs"]
mod user_tests;
