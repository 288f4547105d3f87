//! Image ingestion pipeline components.
//!
//! This module contains all the stages of the ingestion pipeline:
//! - **validate**: URL allow-list and image signature checks
//! - **rate_limit**: Sliding-window admission per client
//! - **key**: Content keys and fingerprints for dedup
//! - **fetch**: Time- and size-bounded HTTP fetch
//! - **decode**: Format detection and decoding off the async executor
//! - **compress**: Resize and JPEG re-encode
//! - **processor**: Runs one URL through every stage
//! - **batch**: Admission checks and bounded fan-out over a batch

pub mod batch;
pub mod compress;
pub mod decode;
pub mod fetch;
pub mod key;
pub mod processor;
pub mod rate_limit;
pub mod validate;

// Re-exports for convenient access
pub use batch::BatchOrchestrator;
pub use compress::{fit_within, Compressor};
pub use decode::{DecodedImage, ImageDecoder};
pub use fetch::{
    build_client, build_fetch_client, fetch_client_builder, FetchedImage, Fetcher,
};
pub use key::{derive_key, fingerprint, ContentKey};
pub use processor::{ByteBudget, ImageProcessor, IngestOptions, ProcessedItem};
pub use rate_limit::{client_identity, RateLimiter};
pub use validate::UrlValidator;
