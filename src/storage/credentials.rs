//! Credential resolution for blob storage
//!
//! Picking a strategy is a pure decision over [`StorageConfig`]; nothing here
//! touches the network. A bad secret only shows up when the client first
//! talks to the store.

use std::collections::HashMap;

use crate::config::StorageConfig;

/// How the blob client authenticates
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialStrategy {
    /// Pre-shared connection string (local development or explicit secret)
    ConnectionString(String),
    /// Managed identity / workload identity / CLI, discovered at runtime
    AmbientIdentity { account_url: String },
}

impl std::fmt::Debug for CredentialStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialStrategy::ConnectionString(_) => {
                f.debug_tuple("ConnectionString").field(&"<redacted>").finish()
            }
            CredentialStrategy::AmbientIdentity { account_url } => f
                .debug_struct("AmbientIdentity")
                .field("account_url", account_url)
                .finish(),
        }
    }
}

impl CredentialStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialStrategy::ConnectionString(_) => "connection_string",
            CredentialStrategy::AmbientIdentity { .. } => "ambient_identity",
        }
    }
}

/// Public blob endpoint for an account
pub fn account_url(account_name: &str) -> String {
    format!("https://{}.blob.core.windows.net", account_name)
}

/// Select the authentication strategy for a storage configuration
pub fn resolve(config: &StorageConfig) -> CredentialStrategy {
    match config.connection_string() {
        Some(secret) => CredentialStrategy::ConnectionString(secret.to_string()),
        None => CredentialStrategy::AmbientIdentity {
            account_url: account_url(&config.account_name),
        },
    }
}

/// Fields of an Azure storage connection string that the client understands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStringParts {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub blob_endpoint: Option<String>,
    pub sas_token: Option<String>,
    pub use_emulator: bool,
}

impl ConnectionStringParts {
    /// Parse `Key=Value;Key=Value` pairs. Keys are case-insensitive, values
    /// may themselves contain `=` (base64 keys, SAS tokens).
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut fields: HashMap<String, String> = HashMap::new();
        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                format!(
                    "malformed connection string segment near '{}'",
                    key_of(segment)
                )
            })?;
            fields.insert(key.trim().to_lowercase(), value.trim().to_string());
        }

        let parts = Self {
            account_name: fields.remove("accountname"),
            account_key: fields.remove("accountkey"),
            blob_endpoint: fields.remove("blobendpoint"),
            sas_token: fields.remove("sharedaccesssignature"),
            use_emulator: fields
                .remove("usedevelopmentstorage")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        };

        if parts.account_name.is_none() && parts.blob_endpoint.is_none() && !parts.use_emulator {
            return Err("connection string names no account or endpoint".to_string());
        }
        Ok(parts)
    }

    /// SAS token as a query string, still percent-encoded
    pub fn sas_query(&self) -> Option<&str> {
        self.sas_token
            .as_deref()
            .map(|token| token.trim_start_matches('?'))
            .filter(|token| !token.is_empty())
    }
}

// Never echo a value back into an error message
fn key_of(segment: &str) -> &str {
    segment.split('=').next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(connection_string: Option<&str>) -> StorageConfig {
        StorageConfig {
            account_name: "clinicalmetrics".to_string(),
            container_name: "data".to_string(),
            blob_name: "sample_data.csv".to_string(),
            connection_string: connection_string.map(str::to_string),
        }
    }

    #[test]
    fn test_connection_string_takes_priority() {
        let strategy = resolve(&storage(Some("AccountName=a;AccountKey=k")));
        assert_eq!(
            strategy,
            CredentialStrategy::ConnectionString("AccountName=a;AccountKey=k".to_string())
        );
    }

    #[test]
    fn test_missing_or_blank_secret_uses_ambient_identity() {
        for secret in [None, Some(""), Some("  ")] {
            let strategy = resolve(&storage(secret));
            assert_eq!(
                strategy,
                CredentialStrategy::AmbientIdentity {
                    account_url: "https://clinicalmetrics.blob.core.windows.net".to_string()
                }
            );
            assert_eq!(strategy.kind(), "ambient_identity");
        }
    }

    #[test]
    fn test_strategy_debug_hides_secret() {
        let strategy = resolve(&storage(Some("AccountName=a;AccountKey=topsecret")));
        assert!(!format!("{:?}", strategy).contains("topsecret"));
    }

    #[test]
    fn test_parse_account_key_connection_string() {
        let parts = ConnectionStringParts::parse(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5==;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        assert_eq!(parts.account_name.as_deref(), Some("acct"));
        assert_eq!(parts.account_key.as_deref(), Some("a2V5=="));
        assert!(!parts.use_emulator);
    }

    #[test]
    fn test_parse_emulator_and_sas() {
        let parts = ConnectionStringParts::parse("UseDevelopmentStorage=true").unwrap();
        assert!(parts.use_emulator);

        let parts = ConnectionStringParts::parse(
            "BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=sv=2022-11-02&sig=abc%3D",
        )
        .unwrap();
        assert_eq!(parts.sas_query(), Some("sv=2022-11-02&sig=abc%3D"));

        let parts =
            ConnectionStringParts::parse("AccountName=acct;SharedAccessSignature=?").unwrap();
        assert_eq!(parts.sas_query(), None);
    }

    #[test]
    fn test_parse_rejects_unusable_strings() {
        assert!(ConnectionStringParts::parse("not a connection string").is_err());
        assert!(ConnectionStringParts::parse("AccountKey=only").is_err());
    }
}
