//! Loads metrics tables from blob storage and prepares them for one identity

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument};
use url::Url;

use crate::cache::{CacheKey, TableLoader};
use crate::errors::{PortalError, Result};
use crate::schema::{
    SchemaRegistry, SourceSchema, ASSESSMENT_COL, FILE_LINK_COL, FILE_NAME_COL,
    IDENTIFIER_COLUMNS, TENANT_COL,
};
use crate::session::Identity;
use crate::storage::BlobClient;
use crate::table::{Cell, MetricsTable};

/// Cache loader backed by the blob client
pub struct MetricsRepository {
    blobs: Arc<BlobClient>,
    schemas: SchemaRegistry,
    metrics_prefix: String,
    feedback_base: Url,
}

impl MetricsRepository {
    pub fn new(
        blobs: Arc<BlobClient>,
        schemas: SchemaRegistry,
        metrics_prefix: &str,
        feedback_base_url: &str,
    ) -> Result<Self> {
        let feedback_base = Url::parse(feedback_base_url)
            .map_err(|e| PortalError::Config(format!("Invalid feedback base URL: {}", e)))?;
        Ok(Self {
            blobs,
            schemas,
            metrics_prefix: metrics_prefix.trim_matches('/').to_string(),
            feedback_base,
        })
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Blob holding the table for `key`
    pub fn blob_path(&self, key: &CacheKey) -> String {
        if self.metrics_prefix.is_empty() {
            format!("{}/{}.csv", key.source, key.version)
        } else {
            format!("{}/{}/{}.csv", self.metrics_prefix, key.source, key.version)
        }
    }

    /// Check the table carries the schema's columns and unique row keys, then
    /// append the identity-specific feedback link column.
    pub fn prepare(
        &self,
        mut table: MetricsTable,
        schema: &SourceSchema,
        identity: &Identity,
    ) -> Result<MetricsTable> {
        let missing: Vec<&str> = schema
            .required_columns
            .iter()
            .filter(|c| !table.has_column(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(PortalError::Parse(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        check_unique_keys(&table)?;

        let tenant = table.column_index(TENANT_COL);
        let assessment = table.column_index(ASSESSMENT_COL);
        let file = table.column_index(FILE_NAME_COL);
        let base = &self.feedback_base;
        table.push_column(FILE_LINK_COL, |row| {
            let text = |idx: Option<usize>| idx.and_then(|i| row[i].as_text());
            Cell::Text(feedback_link(
                base,
                text(tenant),
                text(assessment),
                text(file),
                identity,
            ))
        })?;

        Ok(table)
    }
}

fn check_unique_keys(table: &MetricsTable) -> Result<()> {
    let (Some(tenant), Some(assessment)) = (
        table.column_index(TENANT_COL),
        table.column_index(ASSESSMENT_COL),
    ) else {
        return Ok(());
    };

    let mut seen = HashSet::new();
    for row in table.rows() {
        let key = (row[tenant].as_text(), row[assessment].as_text());
        if !seen.insert(key.clone()) {
            return Err(PortalError::Parse(format!(
                "duplicate row for tenant {} assessment {}",
                key.0.unwrap_or_default(),
                key.1.unwrap_or_default()
            )));
        }
    }
    Ok(())
}

/// Per-row feedback link. Reviewers get their name embedded so feedback is
/// attributed; viewers get a read-only link.
pub fn feedback_link(
    base: &Url,
    tenant: Option<String>,
    assessment: Option<String>,
    file: Option<String>,
    identity: &Identity,
) -> String {
    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        if let Some(tenant) = tenant {
            query.append_pair("tenant", &tenant);
        }
        if let Some(assessment) = assessment {
            query.append_pair("assessment", &assessment);
        }
        if let Some(file) = file {
            query.append_pair("file", &file);
        }
        if identity.can_review() {
            query.append_pair("clinician_name", identity.name());
        } else {
            query.append_pair("mode", "view");
        }
    }
    url.to_string()
}

#[async_trait]
impl TableLoader for MetricsRepository {
    #[instrument(skip(self, identity), fields(identity = %identity.name()))]
    async fn load(&self, key: &CacheKey, identity: &Identity) -> Result<MetricsTable> {
        let path = self.blob_path(key);
        let schema = self.schemas.get(key.source);

        let table = self
            .blobs
            .fetch_table(&path, &IDENTIFIER_COLUMNS)
            .await
            .map_err(|e| {
                error!(blob = %path, error = %e, "Failed to load metrics table");
                e
            })?;
        let table = self.prepare(table, schema, identity).map_err(|e| {
            error!(blob = %path, error = %e, "Metrics table rejected");
            e
        })?;

        info!(blob = %path, rows = table.len(), "Metrics table loaded");
        Ok(table)
    }
}
