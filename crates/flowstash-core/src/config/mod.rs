//! Configuration management for flowstash.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults, then overlaid with the deployment environment variables the
//! service has always honoured (`BUCKET_NAME`, `SYNC_SECRET`, ...).

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for flowstash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Ingestion batch settings
    pub ingest: IngestConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Ingestion admission control
    pub rate_limit: RateLimitConfig,

    /// Object store and catalog backend
    pub storage: StorageConfig,

    /// Catalog reconciliation
    pub sync: SyncConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location, then apply environment
    /// overrides.
    ///
    /// Returns default configuration (plus overrides) if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            let mut config = Self::default();
            config.apply_env();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file path, then apply environment
    /// overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.flowstash.flowstash/config.toml
    /// - Linux: ~/.config/flowstash/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\flowstash\config\config.toml
    ///
    /// Falls back to ~/.flowstash/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "flowstash", "flowstash")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".flowstash").join("config.toml")
            })
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("NEXT_PUBLIC_SUPABASE_URL") {
            self.storage.url = Some(v);
        }
        if let Some(v) = get("NEXT_PUBLIC_SUPABASE_KEY") {
            self.storage.anon_key = Some(v);
        }
        if let Some(v) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.storage.service_role_key = Some(v);
        }
        if let Some(v) = get("BUCKET_NAME") {
            self.storage.bucket = v;
        }
        if let Some(v) = get("SYNC_TABLE") {
            self.sync.table = v;
        }
        if let Some(v) = get("SYNC_FOLDER") {
            self.sync.folder = v;
        }
        if let Some(v) = get("SYNC_MAX_OBJECTS") {
            match v.trim().parse::<i64>() {
                // Zero falls back to the default, negatives clamp to one.
                Ok(0) => self.sync.max_objects = SyncConfig::default().max_objects,
                Ok(n) => self.sync.max_objects = n.max(1) as usize,
                Err(_) => tracing::warn!("Ignoring non-numeric SYNC_MAX_OBJECTS={v:?}"),
            }
        }
        if let Some(v) = get("SYNC_SECRET") {
            self.sync.secret = Some(v);
        }
        if let Some(v) = get("ALLOWED_ORIGIN") {
            self.server.allowed_origin = v;
        }
        if let Some(v) = get("FLOWSTASH_BIND") {
            self.server.bind = v;
        }
    }

    /// Copy of this config with keys and secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "********".to_string());
        let mut config = self.clone();
        config.storage.anon_key = mask(&self.storage.anon_key);
        config.storage.service_role_key = mask(&self.storage.service_role_key);
        config.sync.secret = mask(&self.sync.secret);
        config
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ingest.max_batch_size, 50);
        assert_eq!(config.ingest.parallel_workers, 1);
        assert_eq!(config.limits.max_file_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.limits.max_total_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.storage.bucket, "flow-images");
        assert_eq!(config.sync.table, "flow_images");
        assert_eq!(config.sync.max_objects, 2000);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[ingest]"));
        assert!(toml.contains("[storage]"));
        assert!(toml.contains("backend = \"supabase\""));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_with(env(&[
            ("BUCKET_NAME", "other-bucket"),
            ("SYNC_TABLE", "images"),
            ("SYNC_FOLDER", "2024"),
            ("SYNC_SECRET", "s3cret"),
            ("NEXT_PUBLIC_SUPABASE_URL", "https://xyz.supabase.co"),
            ("ALLOWED_ORIGIN", "https://labs.google"),
        ]));
        assert_eq!(config.storage.bucket, "other-bucket");
        assert_eq!(config.sync.table, "images");
        assert_eq!(config.sync.folder, "2024");
        assert_eq!(config.sync.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.storage.url.as_deref(), Some("https://xyz.supabase.co"));
        assert_eq!(config.server.allowed_origin, "https://labs.google");
    }

    #[test]
    fn test_env_max_objects_parsing() {
        let mut config = Config::default();
        config.apply_env_with(env(&[("SYNC_MAX_OBJECTS", "0")]));
        assert_eq!(config.sync.max_objects, 2000);

        config.apply_env_with(env(&[("SYNC_MAX_OBJECTS", "-5")]));
        assert_eq!(config.sync.max_objects, 1);

        config.apply_env_with(env(&[("SYNC_MAX_OBJECTS", "750")]));
        assert_eq!(config.sync.max_objects, 750);

        config.apply_env_with(env(&[("SYNC_MAX_OBJECTS", "lots")]));
        assert_eq!(config.sync.max_objects, 750);
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut config = Config::default();
        config.apply_env_with(env(&[("BUCKET_NAME", "  ")]));
        assert_eq!(config.storage.bucket, "flow-images");
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = Config::default();
        config.storage.service_role_key = Some("service-key".into());
        config.sync.secret = Some("s3cret".into());
        let toml = config.redacted().to_toml().unwrap();
        assert!(!toml.contains("service-key"));
        assert!(!toml.contains("s3cret"));
        assert!(toml.contains("********"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[ingest]\nparallel_workers = 4\n\n[storage]\nbackend = \"memory\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.ingest.parallel_workers, 4);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        // Untouched sections keep their defaults
        assert_eq!(config.limits.fetch_timeout_ms, 30_000);
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ingest]\nmax_batch_size = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("max_batch_size"));
    }
}
