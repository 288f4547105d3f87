//! Error types for the flowstash ingestion pipeline.
//!
//! Errors are organized by stage so logs carry actionable context (URL, stage,
//! limit that tripped). None of this detail is meant for API callers: every
//! per-item error collapses to a [`FailureReason`] before it leaves the core.

use serde::Serialize;
use thiserror::Error;

/// Top-level error type for flowstash operations.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Object store or catalog errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Reconciliation errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Per-item pipeline errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// URL failed the host/scheme allow-list at processing time
    #[error("URL rejected by validator: {url}")]
    InvalidUrl { url: String },

    /// Network failure while fetching (DNS, connect, TLS, body read)
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Upstream answered with a non-2xx status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// Declared content type is not an image type
    #[error("Invalid content type for {url}: {content_type:?}")]
    ContentType { url: String, content_type: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {url} after {timeout_ms}ms")]
    Timeout {
        url: String,
        stage: String,
        timeout_ms: u64,
    },

    /// Single item exceeds the per-item byte ceiling
    #[error("File too large: {url} ({size} bytes > {max} bytes)")]
    FileTooLarge { url: String, size: u64, max: u64 },

    /// Running batch total exceeds the cross-item byte ceiling
    #[error("Batch size budget exhausted at {url} ({total} bytes > {max} bytes)")]
    BudgetExceeded { url: String, total: u64, max: u64 },

    /// Image decoding failed
    #[error("Decode error for {url}: {message}")]
    Decode { url: String, message: String },

    /// Image dimensions exceed limit
    #[error("Image too large: {url} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        url: String,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Resize or JPEG encoding failed
    #[error("Encode error for {url}: {message}")]
    Encode { url: String, message: String },

    /// Object store rejected the write for a reason other than a conflict
    #[error("Store failed for {url}: {source}")]
    Store {
        url: String,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    /// Collapse this error into the user-safe category reported to callers.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            PipelineError::Timeout { .. } => FailureReason::Timeout,
            PipelineError::FileTooLarge { .. } | PipelineError::BudgetExceeded { .. } => {
                FailureReason::SizeExceeded
            }
            PipelineError::ContentType { .. } => FailureReason::InvalidContentType,
            _ => FailureReason::ProcessingFailed,
        }
    }
}

/// Closed set of failure categories exposed to API callers.
///
/// Serializes as its human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    SizeExceeded,
    InvalidContentType,
    ProcessingFailed,
}

impl FailureReason {
    pub fn message(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "Request timeout",
            FailureReason::SizeExceeded => "File size error",
            FailureReason::InvalidContentType => "Invalid file type",
            FailureReason::ProcessingFailed => "Processing failed",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl Serialize for FailureReason {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.message())
    }
}

/// Whole-batch rejections. No item is processed when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchRejection {
    #[error("At least one image URL is required")]
    Empty,

    #[error("Maximum {max} images allowed per request")]
    TooMany { max: usize },

    #[error("Invalid or unauthorized image URLs detected")]
    InvalidUrls { count: usize },
}

/// Object store and catalog backend errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Request never produced a response (connect, TLS, timeout)
    #[error("storage request failed: {message}")]
    Request { message: String },

    /// Backend answered with an error status
    #[error("storage backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Backend response body could not be interpreted
    #[error("unexpected storage response: {message}")]
    Decode { message: String },

    /// Invalid object path or other local precondition
    #[error("invalid storage request: {message}")]
    Invalid { message: String },
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Decode {
                message: e.to_string(),
            }
        } else {
            StoreError::Request {
                message: e.to_string(),
            }
        }
    }
}

/// Catalog reconciliation errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Listing the object store failed; nothing was inserted
    #[error("listing objects failed: {0}")]
    List(#[source] StoreError),

    /// Looking up existing catalog rows failed; nothing was inserted
    #[error("catalog lookup failed: {0}")]
    Lookup(#[source] StoreError),

    /// A chunked insert failed. Chunks before `failed_chunk` stay committed.
    #[error("insert of chunk {failed_chunk} failed after {committed_rows} committed rows: {source}")]
    Insert {
        failed_chunk: usize,
        committed_rows: usize,
        chunks: Vec<crate::sync::ChunkOutcome>,
        #[source]
        source: StoreError,
    },
}

/// Convenience type alias for flowstash results.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
