//! flowstash core - embeddable image ingestion and dedup library.
//!
//! flowstash takes image URLs discovered on a web page, fetches and
//! recompresses the images, and stores each one exactly once per content key.
//! A separate reconciliation pass keeps the relational catalog in step with
//! the object store.
//!
//! # Architecture
//!
//! ```text
//! URLs → Validate → Rate limit → Fetch → Decode → Resize/JPEG → Store-if-absent → Sidecar
//! Bucket listing → Filter .jpg → Catalog diff → Chunked insert
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use flowstash_core::{Config, FlowStash};
//!
//! #[tokio::main]
//! async fn main() -> flowstash_core::Result<()> {
//!     let config = Config::load()?;
//!     let stash = FlowStash::new(config)?;
//!
//!     let urls = vec!["https://storage.googleapis.com/bucket/a.png".to_string()];
//!     let options = stash.default_options();
//!     if let Some(batch) = stash.orchestrator() {
//!         let result = batch.run_batch(&urls, &options).await;
//!         println!("{result:?}");
//!     }
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod storage;
pub mod sync;
pub mod types;

use std::sync::Arc;

// Re-exports for convenient access
pub use config::Config;
pub use error::{
    BatchRejection, ConfigError, FailureReason, FlowError, PipelineError, PipelineResult, Result,
    StoreError, SyncError,
};
pub use output::{BatchEnvelope, OutputFormat, ReportWriter};
pub use pipeline::{BatchOrchestrator, ImageProcessor, IngestOptions, RateLimiter};
pub use storage::{Backends, Catalog, MemoryStore, ObjectStore};
pub use sync::{Reconciler, SyncCredentials, SyncParams, SyncReport};
pub use types::{BatchResult, ImageRecord, ItemOutcome};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// flowstash service - the main entry point.
///
/// Owns the rate limiter and whichever of the ingestion and reconciliation
/// paths the configured credentials allow.
pub struct FlowStash {
    config: Config,
    rate_limiter: RateLimiter,
    orchestrator: Option<BatchOrchestrator>,
    reconciler: Option<Reconciler>,
}

impl FlowStash {
    /// Create a service, connecting storage backends from configuration.
    pub fn new(config: Config) -> Result<Self> {
        tracing::debug!("Initializing flowstash v{}", VERSION);
        let backends = storage::connect(&config.storage, pipeline::build_client()?);
        let fetch_client = pipeline::build_fetch_client(&config.ingest)?;
        Ok(Self::with_backends(config, backends, fetch_client))
    }

    /// Create a service over explicit backends. `client` fetches images.
    pub fn with_backends(config: Config, backends: Backends, client: reqwest::Client) -> Self {
        let orchestrator = backends.ingest.map(|store| {
            let processor = Arc::new(ImageProcessor::with_client(&config, store, client));
            BatchOrchestrator::new(&config, processor)
        });
        let reconciler = backends
            .sync
            .map(|(store, catalog)| Reconciler::new(store, catalog));

        Self {
            rate_limiter: RateLimiter::from_config(&config.rate_limit),
            orchestrator,
            reconciler,
            config,
        }
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Ingestion path, absent when no store credentials are configured.
    pub fn orchestrator(&self) -> Option<&BatchOrchestrator> {
        self.orchestrator.as_ref()
    }

    /// Reconciliation path, absent when no service credentials are configured.
    pub fn reconciler(&self) -> Option<&Reconciler> {
        self.reconciler.as_ref()
    }

    /// Output options from the ingestion defaults.
    pub fn default_options(&self) -> IngestOptions {
        IngestOptions::from_config(&self.config.ingest)
    }

    /// Reconciliation parameters from the configuration.
    pub fn sync_params(&self) -> SyncParams {
        SyncParams::from_config(&self.config)
    }
}
