//! Azure Blob Storage store construction
//!
//! Uses object_store::azure::MicrosoftAzure for both authentication paths:
//! - Connection string: account key, SAS token, explicit endpoint or the
//!   local storage emulator
//! - Ambient identity: the builder's default credential chain, which picks up
//!   managed identity (App Service, VMs, containers), workload identity in AKS,
//!   environment variables (AZURE_CLIENT_ID, AZURE_TENANT_ID, ...) and the
//!   Azure CLI

use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{PortalError, Result};
use crate::storage::credentials::{ConnectionStringParts, CredentialStrategy};

/// Build a read-only store handle for one container
pub fn build_store(
    strategy: &CredentialStrategy,
    account_name: &str,
    container_name: &str,
) -> Result<Arc<dyn ObjectStore>> {
    let builder = match strategy {
        CredentialStrategy::ConnectionString(raw) => {
            let parts = ConnectionStringParts::parse(raw).map_err(PortalError::Auth)?;
            debug!(
                account = ?parts.account_name,
                emulator = parts.use_emulator,
                "Building blob store from connection string"
            );
            from_connection_string(&parts, account_name)
        }
        CredentialStrategy::AmbientIdentity { account_url } => {
            debug!(%account_url, "Building blob store with ambient identity");
            // from_env() lets AZURE_* variables feed the default credential chain
            MicrosoftAzureBuilder::from_env().with_account(account_name)
        }
    };

    let store = builder
        .with_container_name(container_name)
        .build()
        .map_err(|e| PortalError::Auth(format!("Failed to configure blob store: {}", e)))?;

    Ok(Arc::new(store))
}

fn from_connection_string(
    parts: &ConnectionStringParts,
    fallback_account: &str,
) -> MicrosoftAzureBuilder {
    let mut builder = MicrosoftAzureBuilder::new()
        .with_account(parts.account_name.as_deref().unwrap_or(fallback_account));

    if parts.use_emulator {
        builder = builder.with_use_emulator(true);
    }

    if let Some(key) = &parts.account_key {
        builder = builder.with_access_key(key);
    }

    // The builder percent-decodes the token itself before signing requests
    if let Some(token) = parts.sas_query() {
        builder = builder.with_config(AzureConfigKey::SasKey, token);
    }

    if let Some(endpoint) = &parts.blob_endpoint {
        builder = builder.with_endpoint(endpoint.trim_end_matches('/').to_string());
    }

    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparseable_connection_string_is_auth_error() {
        let strategy = CredentialStrategy::ConnectionString("garbage".to_string());
        let err = build_store(&strategy, "acct", "data").err().unwrap();
        assert!(matches!(err, PortalError::Auth(_)));
    }

    #[test]
    fn test_account_key_connection_string_builds_without_network() {
        let strategy = CredentialStrategy::ConnectionString(
            "AccountName=acct;AccountKey=c2VjcmV0a2V5".to_string(),
        );
        assert!(build_store(&strategy, "ignored", "data").is_ok());
    }

    #[test]
    fn test_sas_token_reaches_builder_undecoded() {
        let parts = ConnectionStringParts::parse(
            "BlobEndpoint=https://acct.blob.core.windows.net;SharedAccessSignature=?sv=2022-11-02&sig=abc%2Bdef%3D",
        )
        .unwrap();
        let builder = from_connection_string(&parts, "acct");
        assert_eq!(
            builder.get_config_value(&AzureConfigKey::SasKey).as_deref(),
            Some("sv=2022-11-02&sig=abc%2Bdef%3D")
        );
        assert!(builder.with_container_name("data").build().is_ok());
    }
}
