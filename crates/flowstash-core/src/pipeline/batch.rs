//! Batch orchestration: admission checks, bounded fan-out, aggregation.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::config::Config;
use crate::error::BatchRejection;
use crate::types::{BatchResult, FailedItem, ItemOutcome, StoredImage};

use super::processor::{truncate_url, ByteBudget, ImageProcessor, IngestOptions};
use super::validate::UrlValidator;

/// Runs the per-URL worker over a batch.
///
/// Items are processed by at most `parallel_workers` concurrent workers and
/// reported in input order. One item's failure never aborts the batch.
pub struct BatchOrchestrator {
    processor: Arc<ImageProcessor>,
    validator: UrlValidator,
    max_batch_size: usize,
    parallel_workers: usize,
    max_total_bytes: u64,
    defaults: IngestOptions,
}

impl BatchOrchestrator {
    pub fn new(config: &Config, processor: Arc<ImageProcessor>) -> Self {
        Self {
            processor,
            validator: UrlValidator::new(&config.ingest),
            max_batch_size: config.ingest.max_batch_size,
            parallel_workers: config.ingest.parallel_workers.max(1),
            max_total_bytes: config.limits.max_total_bytes(),
            defaults: IngestOptions::from_config(&config.ingest),
        }
    }

    /// Output options used when a caller supplies none.
    pub fn default_options(&self) -> IngestOptions {
        self.defaults
    }

    /// Whole-batch admission checks. Nothing is fetched when this fails.
    pub fn check_batch<S: AsRef<str>>(&self, urls: &[S]) -> Result<(), BatchRejection> {
        if urls.is_empty() {
            return Err(BatchRejection::Empty);
        }
        if urls.len() > self.max_batch_size {
            return Err(BatchRejection::TooMany {
                max: self.max_batch_size,
            });
        }
        let count = self.validator.count_invalid(urls);
        if count > 0 {
            return Err(BatchRejection::InvalidUrls { count });
        }
        Ok(())
    }

    /// Check and run a batch.
    pub async fn run_batch(
        &self,
        urls: &[String],
        options: &IngestOptions,
    ) -> Result<BatchResult, BatchRejection> {
        self.check_batch(urls)?;

        tracing::info!(
            "Processing {} images ({} workers, store: {})",
            urls.len(),
            self.parallel_workers,
            self.processor.store_name()
        );

        let budget = ByteBudget::new(self.max_total_bytes);
        let budget = &budget;
        let outcomes: Vec<ItemOutcome> = stream::iter(urls.iter().cloned())
            .map(|url| async move { self.run_item(&url, options, budget).await })
            .buffered(self.parallel_workers)
            .collect()
            .await;

        let result = BatchResult::from_outcomes(outcomes);
        tracing::info!(
            "Batch complete: {}/{} succeeded, {} saved",
            result.successful,
            result.total,
            result.compression.compression_ratio
        );
        Ok(result)
    }

    async fn run_item(&self, url: &str, options: &IngestOptions, budget: &ByteBudget) -> ItemOutcome {
        match self.processor.process(url, options, budget).await {
            Ok(item) => {
                if let Some(err) = &item.sidecar_error {
                    tracing::warn!(
                        "Metadata sidecar not written for {}: {}",
                        truncate_url(url),
                        err
                    );
                }
                tracing::info!(
                    "Uploaded: {} ({})",
                    item.record.file_name,
                    item.record.size.compression_ratio
                );
                ItemOutcome::Stored(Box::new(StoredImage {
                    record: item.record,
                    deduplicated: item.deduplicated,
                }))
            }
            Err(e) => {
                tracing::error!("Failed to process {}: {}", truncate_url(url), e);
                ItemOutcome::Failed(FailedItem::new(url, e.failure_reason()))
            }
        }
    }
}
