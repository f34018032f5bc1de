//! Environment-backed account registry.
//!
//! Accounts are declared in `TRADERLOG_ACCOUNTS` as comma-separated
//! entries of the form `ref=provider:external_id[:utc_offset_minutes]`,
//! e.g. `main=bingx:uid-1234:120,alt=bitunix:uid-9`. A multi-tenant host
//! replaces this with a database-backed registry behind the same trait.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::warn;

use crate::domain::entities::provider::Provider;
use crate::domain::errors::SyncError;
use crate::domain::repositories::account_registry::{AccountInfo, AccountRegistry};

#[derive(Debug, Default)]
pub struct EnvAccountRegistry {
    accounts: HashMap<String, AccountInfo>,
}

impl EnvAccountRegistry {
    pub fn from_env() -> Self {
        let raw = std::env::var("TRADERLOG_ACCOUNTS").unwrap_or_default();
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Self {
        let mut accounts = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match Self::parse_entry(entry) {
                Ok(info) => {
                    accounts.insert(info.account_ref.clone(), info);
                }
                Err(reason) => {
                    warn!("Skipping malformed account entry '{}': {}", entry, reason);
                }
            }
        }
        Self { accounts }
    }

    fn parse_entry(entry: &str) -> Result<AccountInfo, String> {
        let (account_ref, rest) = entry
            .split_once('=')
            .ok_or_else(|| "missing '='".to_string())?;

        let mut parts = rest.split(':');
        let provider_name = parts.next().unwrap_or_default();
        let provider = Provider::from_name(provider_name)
            .ok_or_else(|| format!("unknown provider '{}'", provider_name))?;
        let external_id = parts
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "missing external id".to_string())?;
        let utc_offset_minutes = match parts.next() {
            Some(offset) => offset
                .parse::<i32>()
                .map_err(|_| format!("bad offset '{}'", offset))?,
            None => 0,
        };

        Ok(AccountInfo {
            account_ref: account_ref.trim().to_string(),
            external_id: external_id.to_string(),
            provider,
            utc_offset_minutes,
        })
    }
}

#[async_trait]
impl AccountRegistry for EnvAccountRegistry {
    async fn resolve(&self, account_ref: &str) -> Result<AccountInfo, SyncError> {
        self.accounts
            .get(account_ref)
            .cloned()
            .ok_or_else(|| SyncError::UnknownAccount(account_ref.to_string()))
    }
}
