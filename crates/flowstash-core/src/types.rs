//! Core data types for the flowstash ingestion pipeline.
//!
//! Field names serialize in camelCase: these structs are both the sidecar JSON
//! written next to every stored image and the body of the ingestion response.

use serde::{Deserialize, Serialize};

use crate::error::FailureReason;

/// Metadata for one stored image. Written once as the `flow_<id>.json` sidecar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Fingerprint of the content key (hex SHA-256)
    pub id: String,

    /// Object name of the stored JPEG
    pub file_name: String,

    /// Publicly reachable URL of the stored JPEG
    pub public_url: String,

    /// URL exactly as submitted
    pub original_url: String,

    /// Content key (`origin + path`) the fingerprint was derived from
    pub source_key: String,

    /// Properties of the original, pre-resize image
    pub dimensions: Dimensions,

    /// Byte accounting for this image
    pub size: SizeAccounting,

    /// Creation time in unix milliseconds
    pub timestamp: i64,

    /// Creation time as RFC 3339
    pub created_at: String,
}

/// Decoded dimensions and format of an original image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    /// Detected format ("jpeg", "png", "webp", etc.)
    pub format: String,
}

/// Original vs. compressed byte counts for one image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SizeAccounting {
    pub original: u64,
    pub compressed: u64,
    /// Negative when recompression grew the image
    pub saved: i64,
    /// Percentage string, e.g. `"42.10%"`
    pub compression_ratio: String,
}

impl SizeAccounting {
    pub fn new(original: u64, compressed: u64) -> Self {
        Self {
            original,
            compressed,
            saved: original as i64 - compressed as i64,
            compression_ratio: format_ratio(compression_ratio(original, compressed)),
        }
    }
}

/// Fraction of bytes saved: `1 - compressed / original`, or zero when there is
/// no original data.
pub fn compression_ratio(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        0.0
    } else {
        1.0 - compressed as f64 / original as f64
    }
}

/// Render a ratio as a percentage with two decimals.
pub fn format_ratio(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

/// A successfully stored (or already present) image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredImage {
    #[serde(flatten)]
    pub record: ImageRecord,

    /// True when the object already existed and this item was a dedup hit
    pub deduplicated: bool,
}

/// A failed item, carrying only the user-safe reason.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub success: bool,
    pub error: FailureReason,
    pub original_url: String,
}

impl FailedItem {
    pub fn new(original_url: impl Into<String>, error: FailureReason) -> Self {
        Self {
            success: false,
            error,
            original_url: original_url.into(),
        }
    }
}

/// Outcome of one item in a batch, in input order.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ItemOutcome {
    Stored(Box<StoredImage>),
    Failed(FailedItem),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Stored(_))
    }

    pub fn original_url(&self) -> &str {
        match self {
            ItemOutcome::Stored(stored) => &stored.record.original_url,
            ItemOutcome::Failed(failed) => &failed.original_url,
        }
    }
}

/// Aggregate byte accounting across the successful items of a batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompressionSummary {
    pub total_original_size: u64,
    pub total_compressed_size: u64,
    pub total_saved: i64,
    pub compression_ratio: String,
    /// Unformatted ratio, for programmatic consumers
    #[serde(skip)]
    pub ratio: f64,
}

impl CompressionSummary {
    pub fn new(total_original_size: u64, total_compressed_size: u64) -> Self {
        let ratio = compression_ratio(total_original_size, total_compressed_size);
        Self {
            total_original_size,
            total_compressed_size,
            total_saved: total_original_size as i64 - total_compressed_size as i64,
            compression_ratio: format_ratio(ratio),
            ratio,
        }
    }
}

/// Result of one ingestion batch. Constructed per invocation, never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub compression: CompressionSummary,
    pub results: Vec<ItemOutcome>,
}

impl BatchResult {
    /// Aggregate per-item outcomes. Byte totals come from stored items only.
    pub fn from_outcomes(results: Vec<ItemOutcome>) -> Self {
        let mut original = 0u64;
        let mut compressed = 0u64;
        let mut successful = 0usize;
        for outcome in &results {
            if let ItemOutcome::Stored(stored) = outcome {
                successful += 1;
                original += stored.record.size.original;
                compressed += stored.record.size.compressed;
            }
        }
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            compression: CompressionSummary::new(original, compressed),
            results,
        }
    }
}
