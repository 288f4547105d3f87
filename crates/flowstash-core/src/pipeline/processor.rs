//! Pipeline orchestration for one URL: fetch, transform, store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{Config, IngestConfig};
use crate::error::{PipelineError, PipelineResult, Result};
use crate::storage::{ObjectStore, PutOutcome};
use crate::types::{Dimensions, ImageRecord, SizeAccounting};

use super::compress::Compressor;
use super::decode::{format_to_string, ImageDecoder};
use super::fetch::{build_fetch_client, Fetcher};
use super::key::ContentKey;
use super::validate::UrlValidator;

/// Upper bound for requested output width and height.
pub const MAX_OUTPUT_DIMENSION: u32 = 4000;

/// Per-batch output options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// JPEG quality, 1..=100
    pub quality: u8,
    /// Bounding box for the resized output
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            quality: 85,
            max_width: 1920,
            max_height: 1920,
        }
    }
}

impl IngestOptions {
    /// Defaults taken from the ingestion config.
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            quality: config.default_quality,
            max_width: config.default_max_width,
            max_height: config.default_max_height,
        }
    }

    /// Clamp caller-supplied values. Absent or zero values take the default
    /// before clamping; negatives clamp to the lower bound.
    pub fn clamped(
        defaults: &Self,
        quality: Option<i64>,
        max_width: Option<i64>,
        max_height: Option<i64>,
    ) -> Self {
        let pick = |value: Option<i64>, default: i64, max: i64| -> i64 {
            match value {
                Some(v) if v != 0 => v.clamp(1, max),
                _ => default.clamp(1, max),
            }
        };
        let max_dim = MAX_OUTPUT_DIMENSION as i64;
        Self {
            quality: pick(quality, defaults.quality as i64, 100) as u8,
            max_width: pick(max_width, defaults.max_width as i64, max_dim) as u32,
            max_height: pick(max_height, defaults.max_height as i64, max_dim) as u32,
        }
    }
}

/// Cross-item byte budget for one batch.
///
/// Items charge their full fetched size once known. A charge that crosses the
/// ceiling fails and stays counted, so every later charge fails too.
#[derive(Debug)]
pub struct ByteBudget {
    used: AtomicU64,
    max: u64,
}

impl ByteBudget {
    pub fn new(max: u64) -> Self {
        Self {
            used: AtomicU64::new(0),
            max,
        }
    }

    /// Add `bytes` to the running total. Returns the new total, or the
    /// over-ceiling total as the error.
    pub fn charge(&self, bytes: u64) -> std::result::Result<u64, u64> {
        let total = self.used.fetch_add(bytes, Ordering::SeqCst) + bytes;
        if total > self.max {
            Err(total)
        } else {
            Ok(total)
        }
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> u64 {
        self.max
    }
}

/// Outcome of one successfully processed URL.
#[derive(Debug, Clone)]
pub struct ProcessedItem {
    pub record: ImageRecord,
    /// True when the image object already existed
    pub deduplicated: bool,
    /// Sidecar write failure, if any. Never fails the item.
    pub sidecar_error: Option<String>,
}

/// The per-URL worker that wires the pipeline stages together.
pub struct ImageProcessor {
    validator: UrlValidator,
    fetcher: Fetcher,
    decoder: ImageDecoder,
    compressor: Compressor,
    store: Arc<dyn ObjectStore>,
}

impl ImageProcessor {
    /// Create a processor with a fresh fetch client.
    pub fn new(config: &Config, store: Arc<dyn ObjectStore>) -> Result<Self> {
        Ok(Self::with_client(
            config,
            store,
            build_fetch_client(&config.ingest)?,
        ))
    }

    /// Create a processor that fetches through `client`.
    pub fn with_client(
        config: &Config,
        store: Arc<dyn ObjectStore>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            validator: UrlValidator::new(&config.ingest),
            fetcher: Fetcher::new(client, &config.limits),
            decoder: ImageDecoder::new(&config.limits),
            compressor: Compressor::new(config.limits.decode_timeout_ms),
            store,
        }
    }

    /// Name of the backing store, for logging.
    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Process one URL through the full pipeline.
    pub async fn process(
        &self,
        url: &str,
        options: &IngestOptions,
        budget: &ByteBudget,
    ) -> PipelineResult<ProcessedItem> {
        let start = std::time::Instant::now();
        tracing::debug!("Processing: {}", truncate_url(url));

        // Validate
        if !self.validator.is_valid(url) {
            return Err(PipelineError::InvalidUrl {
                url: url.to_string(),
            });
        }

        // Fetch
        let fetch_start = std::time::Instant::now();
        let fetched = self.fetcher.fetch(url).await?;
        tracing::trace!("  Fetch: {:?}", fetch_start.elapsed());

        if !UrlValidator::is_valid_image_header(&fetched.bytes) {
            return Err(PipelineError::Decode {
                url: url.to_string(),
                message: format!(
                    "body labelled {} has no image signature",
                    fetched.content_type
                ),
            });
        }

        let original_size = fetched.bytes.len() as u64;
        budget
            .charge(original_size)
            .map_err(|total| PipelineError::BudgetExceeded {
                url: url.to_string(),
                total,
                max: budget.max(),
            })?;

        // Decode
        let decode_start = std::time::Instant::now();
        let decoded = self.decoder.decode_from_bytes(fetched.bytes, url).await?;
        tracing::trace!("  Decode: {:?}", decode_start.elapsed());

        let dimensions = Dimensions {
            width: decoded.width,
            height: decoded.height,
            format: format_to_string(decoded.format),
        };

        // Compress
        let compress_start = std::time::Instant::now();
        let jpeg = self
            .compressor
            .compress(
                decoded.image,
                options.quality,
                options.max_width,
                options.max_height,
                url,
            )
            .await?;
        tracing::trace!("  Compress: {:?}", compress_start.elapsed());

        // Store
        let key = ContentKey::from_url(url);
        let file_name = key.image_object_name();
        let compressed_size = jpeg.len() as u64;
        let outcome = self
            .store
            .put_if_absent(&file_name, jpeg, "image/jpeg")
            .await
            .map_err(|source| PipelineError::Store {
                url: url.to_string(),
                source,
            })?;
        let deduplicated = outcome == PutOutcome::AlreadyExists;
        if deduplicated {
            tracing::debug!("Already stored: {}", file_name);
        }

        let now = chrono::Utc::now();
        let record = ImageRecord {
            id: key.fingerprint.clone(),
            public_url: self.store.public_url(&file_name),
            file_name,
            original_url: url.to_string(),
            source_key: key.key.clone(),
            dimensions,
            size: SizeAccounting::new(original_size, compressed_size),
            timestamp: now.timestamp_millis(),
            created_at: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        };

        let sidecar_error = self.write_sidecar(&key, &record).await;

        tracing::debug!(
            "Processed {} in {:?} ({}x{}, {} -> {} bytes)",
            truncate_url(url),
            start.elapsed(),
            record.dimensions.width,
            record.dimensions.height,
            original_size,
            compressed_size
        );

        Ok(ProcessedItem {
            record,
            deduplicated,
            sidecar_error,
        })
    }

    /// Best-effort sidecar write. An existing sidecar counts as success.
    async fn write_sidecar(&self, key: &ContentKey, record: &ImageRecord) -> Option<String> {
        let body = match serde_json::to_vec_pretty(record) {
            Ok(body) => body,
            Err(e) => return Some(e.to_string()),
        };
        match self
            .store
            .put_if_absent(&key.sidecar_object_name(), body, "application/json")
            .await
        {
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        }
    }
}

/// Shorten a URL for log lines.
pub fn truncate_url(url: &str) -> String {
    const MAX_CHARS: usize = 50;
    if url.chars().count() <= MAX_CHARS {
        url.to_string()
    } else {
        let head: String = url.chars().take(MAX_CHARS).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_defaults_on_absent_and_zero() {
        let defaults = IngestOptions::default();
        assert_eq!(IngestOptions::clamped(&defaults, None, None, None), defaults);
        assert_eq!(
            IngestOptions::clamped(&defaults, Some(0), Some(0), Some(0)),
            defaults
        );
    }

    #[test]
    fn test_clamped_bounds() {
        let defaults = IngestOptions::default();
        let opts = IngestOptions::clamped(&defaults, Some(150), Some(10_000), Some(-3));
        assert_eq!(opts.quality, 100);
        assert_eq!(opts.max_width, 4000);
        assert_eq!(opts.max_height, 1);

        let opts = IngestOptions::clamped(&defaults, Some(-20), Some(640), Some(480));
        assert_eq!(opts.quality, 1);
        assert_eq!((opts.max_width, opts.max_height), (640, 480));
    }

    #[test]
    fn test_budget_overflow_stays_counted() {
        let budget = ByteBudget::new(100);
        assert_eq!(budget.charge(60), Ok(60));
        assert_eq!(budget.charge(50), Err(110));
        // The failed charge is not refunded
        assert_eq!(budget.charge(1), Err(111));
        assert_eq!(budget.used(), 111);
    }

    #[test]
    fn test_budget_exact_fit() {
        let budget = ByteBudget::new(100);
        assert_eq!(budget.charge(100), Ok(100));
        assert!(budget.charge(1).is_err());
    }

    #[test]
    fn test_truncate_url() {
        let short = "https://labs.google/a.png";
        assert_eq!(truncate_url(short), short);

        let long = format!("https://storage.googleapis.com/{}", "x".repeat(100));
        let truncated = truncate_url(&long);
        assert_eq!(truncated.chars().count(), 53);
        assert!(truncated.ends_with("..."));
    }
}
