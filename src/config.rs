//! Configuration management for the review portal
//!
//! Supports configuration via:
//! - Environment variables (primary)
//! - Optional TOML config file (secondary)
//!
//! Environment variables take precedence over config file values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::schema::SchemaRegistry;

/// Marker set by the managed hosting platform. Only affects labeling.
const HOSTING_MARKER_VAR: &str = "WEBSITE_SITE_NAME";

/// Deployment environment, derived from the hosting marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blob storage location and optional pre-shared secret
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage account name
    pub account_name: String,

    /// Blob container name
    pub container_name: String,

    /// Blob checked by the readiness handler and the environment panel
    pub blob_name: String,

    /// Connection string; when present it takes priority over ambient identity
    #[serde(default, skip_serializing)]
    pub connection_string: Option<String>,
}

impl StorageConfig {
    /// The connection string, ignoring empty or blank values.
    pub fn connection_string(&self) -> Option<&str> {
        self.connection_string
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("account_name", &self.account_name)
            .field("container_name", &self.container_name)
            .field("blob_name", &self.blob_name)
            .field(
                "connection_string",
                &self.connection_string().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Request timeout in seconds (default: 300)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_timeout_secs() -> u64 {
    300
}

/// Portal behaviour: where metrics live, where feedback links point, who may review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Path prefix under which `{source}/{version}.csv` metrics files live
    #[serde(default = "default_metrics_prefix")]
    pub metrics_prefix: String,

    /// Base URL embedded in per-row feedback links
    #[serde(default = "default_feedback_base_url")]
    pub feedback_base_url: String,

    /// Identities allowed to submit feedback
    #[serde(default = "default_reviewers")]
    pub reviewers: Vec<String>,

    /// Browse-only identities; the first one is the session default
    #[serde(default = "default_viewers")]
    pub viewers: Vec<String>,

    /// Sessions unused for this long are dropped with their cached tables
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Upper bound on live sessions; the least recently used goes first
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_metrics_prefix() -> String {
    "metrics".to_string()
}

fn default_feedback_base_url() -> String {
    "http://localhost:8080/feedback".to_string()
}

fn default_reviewers() -> Vec<String> {
    Vec::new()
}

fn default_viewers() -> Vec<String> {
    vec!["Viewer".to_string()]
}

fn default_session_idle_secs() -> u64 {
    3600
}

fn default_max_sessions() -> usize {
    1000
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            metrics_prefix: default_metrics_prefix(),
            feedback_base_url: default_feedback_base_url(),
            reviewers: default_reviewers(),
            viewers: default_viewers(),
            session_idle_secs: default_session_idle_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Blob storage configuration
    pub storage: StorageConfig,

    /// Portal configuration
    #[serde(default)]
    pub portal: PortalConfig,

    /// Per-source column registries
    #[serde(default)]
    pub schemas: SchemaRegistry,

    /// Deployment environment (never read from the file)
    #[serde(skip, default = "default_environment")]
    pub environment: Environment,

    /// Log level (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_environment() -> Environment {
    Environment::Development
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: default_bind_address(),
                timeout_secs: default_timeout_secs(),
            },
            storage: StorageConfig {
                account_name: "storage".to_string(),
                container_name: "data".to_string(),
                blob_name: "sample_data.csv".to_string(),
                connection_string: None,
            },
            portal: PortalConfig::default(),
            schemas: SchemaRegistry::default(),
            environment: default_environment(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - AZURE_STORAGE_CONNECTION_STRING: storage secret (optional)
    /// - PORTAL_STORAGE_ACCOUNT: storage account name (default: storage)
    /// - PORTAL_STORAGE_CONTAINER: container name (default: data)
    /// - PORTAL_BLOB_NAME: blob checked for readiness (default: sample_data.csv)
    /// - PORTAL_METRICS_PREFIX: metrics path prefix (default: metrics)
    /// - PORTAL_FEEDBACK_BASE_URL: base of per-row feedback links
    /// - PORTAL_REVIEWERS / PORTAL_VIEWERS: comma separated rosters
    /// - PORTAL_SESSION_IDLE_SECS: idle session expiry (default: 3600)
    /// - PORTAL_MAX_SESSIONS: live session cap (default: 1000)
    /// - PORTAL_BIND_ADDRESS: server bind address (default: 0.0.0.0:8080)
    /// - PORTAL_TIMEOUT_SECS: request timeout (default: 300)
    /// - PORTAL_LOG_LEVEL: log level (default: info)
    /// - PORTAL_CONFIG_FILE: optional path to TOML config file
    /// - WEBSITE_SITE_NAME: set by the hosting platform, selects production labeling
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match var("PORTAL_CONFIG_FILE") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(secret) = var("AZURE_STORAGE_CONNECTION_STRING") {
            config.storage.connection_string = Some(secret);
        }

        if let Some(account) = var("PORTAL_STORAGE_ACCOUNT") {
            config.storage.account_name = account;
        }

        if let Some(container) = var("PORTAL_STORAGE_CONTAINER") {
            config.storage.container_name = container;
        }

        if let Some(blob) = var("PORTAL_BLOB_NAME") {
            config.storage.blob_name = blob;
        }

        if let Some(prefix) = var("PORTAL_METRICS_PREFIX") {
            config.portal.metrics_prefix = prefix;
        }

        if let Some(base) = var("PORTAL_FEEDBACK_BASE_URL") {
            config.portal.feedback_base_url = base;
        }

        if let Some(reviewers) = var("PORTAL_REVIEWERS") {
            config.portal.reviewers = split_roster(&reviewers);
        }

        if let Some(viewers) = var("PORTAL_VIEWERS") {
            config.portal.viewers = split_roster(&viewers);
        }

        if let Some(idle) = var("PORTAL_SESSION_IDLE_SECS") {
            config.portal.session_idle_secs = idle.parse()?;
        }

        if let Some(max) = var("PORTAL_MAX_SESSIONS") {
            config.portal.max_sessions = max.parse()?;
        }

        if let Some(addr) = var("PORTAL_BIND_ADDRESS") {
            config.server.bind_address = addr.parse()?;
        }

        if let Some(timeout) = var("PORTAL_TIMEOUT_SECS") {
            config.server.timeout_secs = timeout.parse()?;
        }

        if let Some(level) = var("PORTAL_LOG_LEVEL") {
            config.log_level = level;
        }

        config.environment = if var(HOSTING_MARKER_VAR).is_some() {
            Environment::Production
        } else {
            Environment::Development
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.portal.viewers.is_empty() && self.portal.reviewers.is_empty() {
            return Err("at least one viewer or reviewer must be configured".into());
        }
        if self.portal.max_sessions == 0 || self.portal.session_idle_secs == 0 {
            return Err("session limits must be positive".into());
        }
        url::Url::parse(&self.portal.feedback_base_url)?;
        Ok(())
    }
}

fn split_roster(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config.storage.account_name, "storage");
        assert_eq!(config.storage.container_name, "data");
        assert_eq!(config.storage.blob_name, "sample_data.csv");
        assert_eq!(config.storage.connection_string(), None);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.portal.viewers, vec!["Viewer".to_string()]);
    }

    #[test]
    fn test_hosting_marker_selects_production() {
        let config = Config::from_vars(vars(&[("WEBSITE_SITE_NAME", "review-portal")])).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.environment.to_string(), "production");
    }

    #[test]
    fn test_environment_overrides() {
        let config = Config::from_vars(vars(&[
            ("PORTAL_STORAGE_ACCOUNT", "clinicalmetrics"),
            ("PORTAL_REVIEWERS", "Dr. Adams, Dr. Baker ,"),
            ("PORTAL_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.storage.account_name, "clinicalmetrics");
        assert_eq!(config.portal.reviewers, vec!["Dr. Adams", "Dr. Baker"]);
        assert_eq!(config.server.timeout_secs, 30);
    }

    #[test]
    fn test_blank_connection_string_is_absent() {
        let config =
            Config::from_vars(vars(&[("AZURE_STORAGE_CONNECTION_STRING", "   ")])).unwrap();
        assert_eq!(config.storage.connection_string(), None);
    }

    #[test]
    fn test_debug_redacts_connection_string() {
        let config = Config::from_vars(vars(&[(
            "AZURE_STORAGE_CONNECTION_STRING",
            "AccountName=a;AccountKey=c2VjcmV0",
        )]))
        .unwrap();
        let rendered = format!("{:?}", config.storage);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("c2VjcmV0"));
    }

    #[test]
    fn test_session_limits() {
        let config = Config::from_vars(vars(&[
            ("PORTAL_SESSION_IDLE_SECS", "600"),
            ("PORTAL_MAX_SESSIONS", "50"),
        ]))
        .unwrap();
        assert_eq!(config.portal.session_idle_secs, 600);
        assert_eq!(config.portal.max_sessions, 50);

        assert!(Config::from_vars(vars(&[("PORTAL_MAX_SESSIONS", "0")])).is_err());
    }

    #[test]
    fn test_empty_rosters_are_rejected() {
        let result = Config::from_vars(vars(&[("PORTAL_VIEWERS", " , ")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_file_round_trip_of_server_section() {
        let parsed: Config = toml::from_str(
            r#"
            log_level = "debug"

            [server]
            bind_address = "127.0.0.1:9000"

            [storage]
            account_name = "acct"
            container_name = "metrics"
            blob_name = "ready.csv"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.server.bind_address.port(), 9000);
        assert_eq!(parsed.server.timeout_secs, 300);
        assert_eq!(parsed.storage.container_name, "metrics");
        assert_eq!(parsed.portal.metrics_prefix, "metrics");
        assert_eq!(parsed.log_level, "debug");
    }
}
