//! Object store and catalog seams.
//!
//! The pipeline only needs two capabilities from its backends: an object store
//! with an atomic insert-if-absent, and a relational catalog that can look up
//! and insert rows by storage path. Both are traits so the in-memory backend
//! (tests, local runs) and the Supabase backend are interchangeable.

pub mod memory;
pub mod supabase;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StoreError;

pub use memory::MemoryStore;
pub use supabase::{SupabaseCatalog, SupabaseStore};

/// Result of an insert-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// An object already lives at the path; nothing was written
    AlreadyExists,
}

/// One entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Name relative to the listed folder. Subfolders end in `/`.
    pub name: String,
    /// Backend-reported metadata (size, mimetype, ...), if any
    pub metadata: Option<serde_json::Value>,
}

/// A row of the image catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub storage_path: String,
    pub public_url: String,
    pub metadata: Option<serde_json::Value>,
}

/// Object store with atomic insert-if-absent.
///
/// Uses `async_trait` so backends can be held as `Arc<dyn ObjectStore>`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name for logging (e.g., "memory", "supabase").
    fn name(&self) -> &str;

    /// Write `bytes` at `path` unless an object already exists there.
    async fn put_if_absent(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<PutOutcome, StoreError>;

    /// List one page of `folder` (non-recursive), sorted by name.
    async fn list(
        &self,
        folder: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredObject>, StoreError>;

    /// Public URL of the object at `path`.
    fn public_url(&self, path: &str) -> String;
}

/// Relational catalog of stored images, keyed by storage path.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Subset of `paths` that already have a row in `table`.
    async fn existing_paths(
        &self,
        table: &str,
        paths: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    /// Insert `rows` into `table` as one statement.
    async fn insert_rows(&self, table: &str, rows: &[CatalogRow]) -> Result<(), StoreError>;
}

/// Backends resolved from configuration.
///
/// Either role is `None` when its credentials are missing; callers report a
/// configuration error at request time instead of failing startup.
#[derive(Clone, Default)]
pub struct Backends {
    /// Store used by ingestion (anon key)
    pub ingest: Option<Arc<dyn ObjectStore>>,
    /// Store and catalog used by reconciliation (service role key)
    pub sync: Option<(Arc<dyn ObjectStore>, Arc<dyn Catalog>)>,
}

/// Resolve backends for `config`.
pub fn connect(config: &StorageConfig, client: reqwest::Client) -> Backends {
    match config.backend {
        StorageBackend::Memory => {
            let memory = Arc::new(MemoryStore::new(&config.memory_public_base));
            tracing::debug!("Using in-memory storage backend");
            let store: Arc<dyn ObjectStore> = memory.clone();
            let catalog: Arc<dyn Catalog> = memory;
            Backends {
                ingest: Some(store.clone()),
                sync: Some((store, catalog)),
            }
        }
        StorageBackend::Supabase => {
            let Some(url) = config.url.as_deref() else {
                tracing::warn!("Supabase URL not set; storage endpoints are disabled");
                return Backends::default();
            };

            let ingest = config.anon_key.as_deref().map(|key| {
                Arc::new(SupabaseStore::new(client.clone(), url, key, config)) as Arc<dyn ObjectStore>
            });
            if ingest.is_none() {
                tracing::warn!("NEXT_PUBLIC_SUPABASE_KEY not set; ingestion is disabled");
            }

            let sync = config.service_role_key.as_deref().map(|key| {
                let store: Arc<dyn ObjectStore> =
                    Arc::new(SupabaseStore::new(client.clone(), url, key, config));
                let catalog: Arc<dyn Catalog> =
                    Arc::new(SupabaseCatalog::new(client.clone(), url, key, config));
                (store, catalog)
            });
            if sync.is_none() {
                tracing::warn!("SUPABASE_SERVICE_ROLE_KEY not set; sync is disabled");
            }

            Backends { ingest, sync }
        }
    }
}
