//! Blob storage access layer
//!
//! [`BlobClient`] is the single point of contact with the object store. It
//! resolves credentials once, builds the underlying store handle on first
//! use, and exposes the three read-only operations the portal needs:
//! existence checks, container listing and CSV-to-table downloads.

mod azure;
pub mod credentials;

use futures::stream::StreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::errors::{PortalError, Result};
use crate::metrics::{STORAGE_OPERATIONS, STORAGE_OPERATION_DURATION};
use crate::table::MetricsTable;

pub use credentials::CredentialStrategy;

/// Read-only client for one blob container
pub struct BlobClient {
    config: StorageConfig,
    strategy: CredentialStrategy,
    store: OnceCell<Arc<dyn ObjectStore>>,
}

impl BlobClient {
    /// Create a client; no connection is made until the first operation.
    pub fn new(config: StorageConfig) -> Self {
        let strategy = credentials::resolve(&config);
        info!(
            account = %config.account_name,
            container = %config.container_name,
            auth = strategy.kind(),
            "Blob client configured"
        );
        Self {
            config,
            strategy,
            store: OnceCell::new(),
        }
    }

    #[cfg(test)]
    /// Create a client around an already-built store.
    pub fn with_store(config: StorageConfig, store: Arc<dyn ObjectStore>) -> Self {
        let strategy = credentials::resolve(&config);
        Self {
            config,
            strategy,
            store: OnceCell::new_with(Some(store)),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn strategy(&self) -> &CredentialStrategy {
        &self.strategy
    }

    async fn store(&self) -> Result<&Arc<dyn ObjectStore>> {
        self.store
            .get_or_try_init(|| async {
                azure::build_store(
                    &self.strategy,
                    &self.config.account_name,
                    &self.config.container_name,
                )
            })
            .await
    }

    /// Whether a blob exists. Any failure counts as "no".
    pub async fn exists(&self, name: &str) -> bool {
        let started = Instant::now();
        let found = match self.store().await {
            Ok(store) => match store.head(&Path::from(name)).await {
                Ok(_) => true,
                Err(object_store::Error::NotFound { .. }) => false,
                Err(e) => {
                    warn!(blob = %name, error = %e, "Blob existence check failed");
                    false
                }
            },
            Err(e) => {
                warn!(blob = %name, error = %e, "Blob store unavailable");
                false
            }
        };
        record("exists", if found { "found" } else { "absent" }, started);
        found
    }

    /// Names of every blob in the container.
    pub async fn list(&self) -> Result<Vec<String>> {
        let started = Instant::now();
        let result = async {
            let store = self.store().await?;
            let mut names = vec![];
            let mut stream = store.list(None);
            while let Some(meta) = stream.next().await {
                names.push(meta?.location.to_string());
            }
            Ok(names)
        }
        .await;
        record("list", status_of(&result), started);
        result
    }

    /// Download a blob and parse it as a header-first CSV table. Cells of
    /// `text_columns` are kept as text.
    pub async fn fetch_table(&self, name: &str, text_columns: &[&str]) -> Result<MetricsTable> {
        let started = Instant::now();
        let result = async {
            let store = self.store().await?;
            let data = store.get(&Path::from(name)).await?.bytes().await?;
            debug!(blob = %name, bytes = data.len(), "Blob downloaded");
            MetricsTable::from_csv_with_text_columns(&data, text_columns)
        }
        .await;
        record("fetch_table", status_of(&result), started);
        result
    }
}

fn status_of<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(PortalError::Auth(_)) => "auth_error",
        Err(PortalError::Parse(_)) => "parse_error",
        Err(_) => "storage_error",
    }
}

fn record(operation: &str, status: &str, started: Instant) {
    STORAGE_OPERATIONS.with_label_values(&[operation, status]).inc();
    STORAGE_OPERATION_DURATION.observe(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::memory::InMemory;
    use tokio_test::assert_ok;

    fn storage_config() -> StorageConfig {
        StorageConfig {
            account_name: "acct".to_string(),
            container_name: "data".to_string(),
            blob_name: "sample_data.csv".to_string(),
            connection_string: None,
        }
    }

    async fn client_with(blobs: &[(&str, &[u8])]) -> BlobClient {
        let store = InMemory::new();
        for (name, data) in blobs {
            store
                .put(&Path::from(*name), Bytes::copy_from_slice(data).into())
                .await
                .unwrap();
        }
        BlobClient::with_store(storage_config(), Arc::new(store))
    }

    #[tokio::test]
    async fn test_exists() {
        let client = client_with(&[("sample_data.csv", b"a,b\n1,2\n")]).await;
        assert!(client.exists("sample_data.csv").await);
        assert!(!client.exists("other.csv").await);
    }

    #[tokio::test]
    async fn test_exists_fails_closed_on_auth_error() {
        let config = StorageConfig {
            connection_string: Some("garbage".to_string()),
            ..storage_config()
        };
        let client = BlobClient::new(config);
        assert!(!client.exists("sample_data.csv").await);
    }

    #[tokio::test]
    async fn test_list_returns_all_names() {
        let client = client_with(&[
            ("metrics/saas/current.csv", b"a\n1\n"),
            ("sample_data.csv", b"a\n1\n"),
        ])
        .await;
        let mut names = assert_ok!(client.list().await);
        names.sort();
        assert_eq!(names, vec!["metrics/saas/current.csv", "sample_data.csv"]);
    }

    #[tokio::test]
    async fn test_list_surfaces_auth_error() {
        let config = StorageConfig {
            connection_string: Some("garbage".to_string()),
            ..storage_config()
        };
        let client = BlobClient::new(config);
        assert!(matches!(client.list().await, Err(PortalError::Auth(_))));
    }

    #[tokio::test]
    async fn test_fetch_table_distinguishes_missing_and_corrupt() {
        let client = client_with(&[("bad.csv", b"a,b\n1\n")]).await;

        let missing = client.fetch_table("missing.csv", &[]).await.unwrap_err();
        assert!(matches!(missing, PortalError::Storage(_)));
        assert!(missing.is_retryable());

        let corrupt = client.fetch_table("bad.csv", &[]).await.unwrap_err();
        assert!(matches!(corrupt, PortalError::Parse(_)));
        assert!(!corrupt.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_table() {
        let client = client_with(&[("t.csv", b"TenantId,AssessmentId\nA,01\n")]).await;
        let table = assert_ok!(client.fetch_table("t.csv", &["AssessmentId"]).await);
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.value(0, "AssessmentId").and_then(|c| c.as_text()).as_deref(),
            Some("01")
        );
    }
}
