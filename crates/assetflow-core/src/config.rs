//! Configuration module
//!
//! Everything is read once at startup. Components never touch the environment; the
//! binary converts this struct into the per-component settings they take at
//! construction.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::QueueNames;
use crate::storage_types::StorageMode;

const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_FILE_SIZE_MB: u64 = 50;
const DOWNLOAD_CONNECT_TIMEOUT_SECS: u64 = 10;
const DOWNLOAD_READ_TIMEOUT_SECS: u64 = 60;
const CLAMAV_PORT: u16 = 3310;
const CLAMAV_CONNECT_TIMEOUT_SECS: u64 = 5;
const CLAMAV_READ_TIMEOUT_SECS: u64 = 60;
const MAX_UPLOAD_ATTEMPTS: i32 = 3;
const MAX_DELETE_ATTEMPTS: i32 = 3;
const RETRY_SWEEP_INTERVAL_SECS: u64 = 300;
const QUEUE_MAX_WORKERS: usize = 4;
const QUEUE_POLL_INTERVAL_MS: u64 = 1000;
const QUEUE_VISIBILITY_TIMEOUT_SECS: u64 = 300;
const ASSET_LEASE_SECS: u64 = 600;

/// Server and database settings.
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub environment: String,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub log_format: String,
}

#[derive(Clone, Debug)]
pub struct AssetflowConfig {
    pub base: BaseConfig,
    // Ingestion
    pub max_file_size_bytes: u64,
    pub download_connect_timeout_secs: u64,
    pub download_read_timeout_secs: u64,
    pub url_upload_allowlist: Option<Vec<String>>,
    pub allow_private_origins: bool,
    // Scanner
    pub clamav_enabled: bool,
    pub clamav_host: String,
    pub clamav_port: u16,
    pub clamav_connect_timeout_secs: u64,
    pub clamav_read_timeout_secs: u64,
    // Storage
    pub storage_mode: StorageMode,
    pub remote_storage_url: Option<String>,
    pub local_storage_path: String,
    pub local_storage_base_url: String,
    pub staging_path: PathBuf,
    // Lifecycle
    pub max_upload_attempts: i32,
    pub max_delete_attempts: i32,
    pub upload_queue_name: String,
    pub delete_queue_name: String,
    pub retry_sweep_interval_secs: u64,
    pub queue_max_workers: usize,
    pub queue_poll_interval_ms: u64,
    pub queue_visibility_timeout_secs: u64,
    pub asset_lease_secs: u64,
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_bool_or(value: Option<String>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()) {
        Some(v) if v == "true" || v == "1" || v == "yes" => true,
        Some(v) if v == "false" || v == "0" || v == "no" => false,
        _ => default,
    }
}

impl AssetflowConfig {
    /// Load from the process environment, reading `.env` first when present.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` is this over `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let server_port = match lookup("PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            None => SERVER_PORT,
        };

        let base = BaseConfig {
            server_port,
            environment,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            db_max_connections: parse_or(lookup("DB_MAX_CONNECTIONS"), MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(lookup("DB_TIMEOUT_SECONDS"), CONNECTION_TIMEOUT_SECS),
            log_format: lookup("LOG_FORMAT")
                .unwrap_or_else(|| "text".to_string())
                .to_lowercase(),
        };

        let storage_mode = match lookup("STORAGE_MODE") {
            Some(mode) => mode.parse::<StorageMode>()?,
            None => StorageMode::Local,
        };

        let url_upload_allowlist = lookup("URL_UPLOAD_ALLOWLIST")
            .map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty());

        let staging_path = lookup("STAGING_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("assetflow-staging"));

        let max_file_size_mb = parse_or(lookup("MAX_FILE_SIZE_MB"), MAX_FILE_SIZE_MB);

        Ok(AssetflowConfig {
            base,
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            download_connect_timeout_secs: parse_or(
                lookup("DOWNLOAD_CONNECT_TIMEOUT_SECS"),
                DOWNLOAD_CONNECT_TIMEOUT_SECS,
            ),
            download_read_timeout_secs: parse_or(
                lookup("DOWNLOAD_READ_TIMEOUT_SECS"),
                DOWNLOAD_READ_TIMEOUT_SECS,
            ),
            url_upload_allowlist,
            allow_private_origins: parse_bool_or(lookup("ALLOW_PRIVATE_ORIGINS"), false),
            clamav_enabled: parse_bool_or(lookup("CLAMAV_ENABLED"), true),
            clamav_host: lookup("CLAMAV_HOST").unwrap_or_else(|| "localhost".to_string()),
            clamav_port: parse_or(lookup("CLAMAV_PORT"), CLAMAV_PORT),
            clamav_connect_timeout_secs: parse_or(
                lookup("CLAMAV_CONNECT_TIMEOUT_SECS"),
                CLAMAV_CONNECT_TIMEOUT_SECS,
            ),
            clamav_read_timeout_secs: parse_or(
                lookup("CLAMAV_READ_TIMEOUT_SECS"),
                CLAMAV_READ_TIMEOUT_SECS,
            ),
            storage_mode,
            remote_storage_url: lookup("REMOTE_STORAGE_URL").filter(|u| !u.trim().is_empty()),
            local_storage_path: lookup("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|| "./data/media".to_string()),
            local_storage_base_url: lookup("LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", server_port)),
            staging_path,
            max_upload_attempts: parse_or(lookup("MAX_UPLOAD_ATTEMPTS"), MAX_UPLOAD_ATTEMPTS),
            max_delete_attempts: parse_or(lookup("MAX_DELETE_ATTEMPTS"), MAX_DELETE_ATTEMPTS),
            upload_queue_name: lookup("UPLOAD_QUEUE_NAME")
                .unwrap_or_else(|| "upload-request".to_string()),
            delete_queue_name: lookup("DELETE_QUEUE_NAME")
                .unwrap_or_else(|| "delete-request".to_string()),
            retry_sweep_interval_secs: parse_or(
                lookup("RETRY_SWEEP_INTERVAL_SECS"),
                RETRY_SWEEP_INTERVAL_SECS,
            ),
            queue_max_workers: parse_or(lookup("QUEUE_MAX_WORKERS"), QUEUE_MAX_WORKERS),
            queue_poll_interval_ms: parse_or(
                lookup("QUEUE_POLL_INTERVAL_MS"),
                QUEUE_POLL_INTERVAL_MS,
            ),
            queue_visibility_timeout_secs: parse_or(
                lookup("QUEUE_VISIBILITY_TIMEOUT_SECS"),
                QUEUE_VISIBILITY_TIMEOUT_SECS,
            ),
            asset_lease_secs: parse_or(lookup("ASSET_LEASE_SECS"), ASSET_LEASE_SECS),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }

        if self.max_upload_attempts < 1 || self.max_delete_attempts < 1 {
            return Err(anyhow::anyhow!(
                "MAX_UPLOAD_ATTEMPTS and MAX_DELETE_ATTEMPTS must be at least 1"
            ));
        }

        if self.upload_queue_name.trim().is_empty() || self.delete_queue_name.trim().is_empty() {
            return Err(anyhow::anyhow!("Queue names must not be empty"));
        }

        if self.upload_queue_name == self.delete_queue_name {
            return Err(anyhow::anyhow!(
                "UPLOAD_QUEUE_NAME and DELETE_QUEUE_NAME must differ"
            ));
        }

        if self.queue_max_workers == 0 {
            return Err(anyhow::anyhow!("QUEUE_MAX_WORKERS must be greater than 0"));
        }

        if self.storage_mode == StorageMode::Remote && self.remote_storage_url.is_none() {
            return Err(anyhow::anyhow!(
                "STORAGE_MODE=remote requires REMOTE_STORAGE_URL to be set"
            ));
        }

        if let Some(url) = &self.base.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        Ok(())
    }
}

/// Shared application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<AssetflowConfig>);

impl Config {
    fn inner(&self) -> &AssetflowConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        Ok(Config(Box::new(AssetflowConfig::from_env()?)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment().to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn database_url(&self) -> Option<&str> {
        self.inner().base.database_url.as_deref()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn log_json(&self) -> bool {
        self.inner().base.log_format == "json"
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.inner().max_file_size_bytes
    }

    pub fn download_connect_timeout_secs(&self) -> u64 {
        self.inner().download_connect_timeout_secs
    }

    pub fn download_read_timeout_secs(&self) -> u64 {
        self.inner().download_read_timeout_secs
    }

    pub fn url_upload_allowlist(&self) -> Option<&[String]> {
        self.inner().url_upload_allowlist.as_deref()
    }

    pub fn allow_private_origins(&self) -> bool {
        self.inner().allow_private_origins
    }

    pub fn clamav_enabled(&self) -> bool {
        self.inner().clamav_enabled
    }

    pub fn clamav_host(&self) -> &str {
        &self.inner().clamav_host
    }

    pub fn clamav_port(&self) -> u16 {
        self.inner().clamav_port
    }

    pub fn clamav_connect_timeout_secs(&self) -> u64 {
        self.inner().clamav_connect_timeout_secs
    }

    pub fn clamav_read_timeout_secs(&self) -> u64 {
        self.inner().clamav_read_timeout_secs
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.inner().storage_mode
    }

    pub fn remote_storage_url(&self) -> Option<&str> {
        self.inner().remote_storage_url.as_deref()
    }

    pub fn local_storage_path(&self) -> &str {
        &self.inner().local_storage_path
    }

    pub fn local_storage_base_url(&self) -> &str {
        &self.inner().local_storage_base_url
    }

    pub fn staging_path(&self) -> &PathBuf {
        &self.inner().staging_path
    }

    pub fn max_upload_attempts(&self) -> i32 {
        self.inner().max_upload_attempts
    }

    pub fn max_delete_attempts(&self) -> i32 {
        self.inner().max_delete_attempts
    }

    pub fn queue_names(&self) -> QueueNames {
        QueueNames {
            upload: self.inner().upload_queue_name.clone(),
            delete: self.inner().delete_queue_name.clone(),
        }
    }

    pub fn retry_sweep_interval_secs(&self) -> u64 {
        self.inner().retry_sweep_interval_secs
    }

    pub fn queue_max_workers(&self) -> usize {
        self.inner().queue_max_workers
    }

    pub fn queue_poll_interval_ms(&self) -> u64 {
        self.inner().queue_poll_interval_ms
    }

    pub fn queue_visibility_timeout_secs(&self) -> u64 {
        self.inner().queue_visibility_timeout_secs
    }

    pub fn asset_lease_secs(&self) -> u64 {
        self.inner().asset_lease_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AssetflowConfig, anyhow::Error> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AssetflowConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.base.server_port, 4000);
        assert_eq!(config.base.database_url, None);
        assert_eq!(config.max_file_size_bytes, 50 * 1024 * 1024);
        assert_eq!(config.clamav_port, 3310);
        assert_eq!(config.max_upload_attempts, 3);
        assert_eq!(config.upload_queue_name, "upload-request");
        assert_eq!(config.delete_queue_name, "delete-request");
        assert_eq!(config.storage_mode, StorageMode::Local);
        assert!(config.clamav_enabled);
        assert!(!config.allow_private_origins);
        assert!(config.staging_path.ends_with("assetflow-staging"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("MAX_FILE_SIZE_MB", "2"),
            ("CLAMAV_ENABLED", "false"),
            ("MAX_UPLOAD_ATTEMPTS", "5"),
            ("URL_UPLOAD_ALLOWLIST", "cdn.example.com, Media.Example.org"),
            ("STAGING_PATH", "/var/tmp/staging"),
        ])
        .unwrap();
        assert_eq!(config.base.server_port, 8080);
        assert_eq!(config.max_file_size_bytes, 2 * 1024 * 1024);
        assert!(!config.clamav_enabled);
        assert_eq!(config.max_upload_attempts, 5);
        assert_eq!(
            config.url_upload_allowlist,
            Some(vec![
                "cdn.example.com".to_string(),
                "media.example.org".to_string()
            ])
        );
        assert_eq!(config.staging_path, PathBuf::from("/var/tmp/staging"));
        assert_eq!(config.local_storage_base_url, "http://localhost:8080");
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        assert!(load(&[("PORT", "not-a-port")]).is_err());
    }

    #[test]
    fn test_remote_mode_requires_url() {
        let config = load(&[("STORAGE_MODE", "remote")]).unwrap();
        assert!(config.validate().is_err());

        let config = load(&[
            ("STORAGE_MODE", "remote"),
            ("REMOTE_STORAGE_URL", "http://storage:4000"),
        ])
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_queue_names_must_differ() {
        let config = load(&[
            ("UPLOAD_QUEUE_NAME", "media"),
            ("DELETE_QUEUE_NAME", "media"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_url_must_be_postgres() {
        let config = load(&[("DATABASE_URL", "mysql://localhost/db")]).unwrap();
        assert!(config.validate().is_err());
    }
}
