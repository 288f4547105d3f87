//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the server binds to
    pub bind: String,

    /// Value sent as `Access-Control-Allow-Origin`
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            allowed_origin: "*".to_string(),
        }
    }
}

/// Ingestion batch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum number of URLs accepted in one batch
    pub max_batch_size: usize,

    /// Number of items fetched and processed concurrently (1 = sequential)
    pub parallel_workers: usize,

    /// Trusted image hosts; a URL host must equal one of these or be a subdomain
    pub allowed_domains: Vec<String>,

    /// JPEG quality used when the request does not specify one
    pub default_quality: u8,

    /// Bounding box used when the request does not specify one
    pub default_max_width: u32,
    pub default_max_height: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            parallel_workers: 1,
            allowed_domains: vec![
                "storage.googleapis.com".to_string(),
                "ai-sandbox-videofx".to_string(),
                "labs.google".to_string(),
                "googleapis.com".to_string(),
            ],
            default_quality: 85,
            default_max_width: 1920,
            default_max_height: 1920,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Wall-clock budget for one fetch (headers + body), in milliseconds
    pub fetch_timeout_ms: u64,

    /// Budget for decode and for encode, each, in milliseconds
    pub decode_timeout_ms: u64,

    /// Maximum size of one fetched image in megabytes
    pub max_file_size_mb: u64,

    /// Maximum running total of fetched bytes per batch in megabytes
    pub max_total_size_mb: u64,

    /// Maximum decoded image dimension (width or height)
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 30_000,
            decode_timeout_ms: 10_000,
            max_file_size_mb: 10,
            max_total_size_mb: 100,
            max_image_dimension: 20_000,
        }
    }
}

impl LimitsConfig {
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_size_mb * 1024 * 1024
    }
}

/// Sliding-window admission control for the ingestion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in seconds
    pub window_secs: u64,

    /// Admissions allowed per identity inside one window
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 10,
        }
    }
}

/// Which storage backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store; contents vanish on exit
    Memory,
    /// Supabase storage API + PostgREST catalog
    #[default]
    Supabase,
}

/// Object store and catalog connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: Option<String>,

    /// Public (anon) key, used by ingestion
    pub anon_key: Option<String>,

    /// Service role key, used by reconciliation
    pub service_role_key: Option<String>,

    /// Bucket images and sidecars are written to
    pub bucket: String,

    /// Request timeout for storage calls in milliseconds
    pub request_timeout_ms: u64,

    /// Base for public URLs when the memory backend is used
    pub memory_public_base: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            url: None,
            anon_key: None,
            service_role_key: None,
            bucket: "flow-images".to_string(),
            request_timeout_ms: 30_000,
            memory_public_base: "http://localhost:3000/storage".to_string(),
        }
    }
}

/// Catalog reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Catalog table holding one row per storage path
    pub table: String,

    /// Folder prefix inside the bucket ("" = bucket root)
    pub folder: String,

    /// Upper bound on objects scanned per run
    pub max_objects: usize,

    /// Shared secret required by the sync endpoint; unset disables it
    pub secret: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            table: "flow_images".to_string(),
            folder: String::new(),
            max_objects: 2000,
            secret: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
