//! Catalog reconciliation against the object store.
//!
//! The ingestion path writes objects but never touches the catalog, so rows
//! drift behind the bucket. [`Reconciler::reconcile`] lists the bucket, keeps
//! the stored JPEGs, and inserts catalog rows for any that are missing.
//!
//! Inserts run in fixed-size chunks with no surrounding transaction. A failed
//! chunk stops the run; chunks before it stay committed and are reported in the
//! error's chunk log. Re-running is safe: committed rows are found by the
//! lookup and skipped.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::SyncError;
use crate::storage::{Catalog, CatalogRow, ObjectStore, StoredObject};

/// Objects requested per listing page.
pub const LIST_PAGE_SIZE: usize = 500;

/// Rows per catalog insert.
pub const INSERT_CHUNK_SIZE: usize = 100;

/// Credentials presented by a sync caller. Empty strings count as absent.
#[derive(Debug, Clone, Default)]
pub struct SyncCredentials {
    /// `X-Sync-Token` header
    pub header: Option<String>,
    /// Token from `Authorization: Bearer <token>`
    pub bearer: Option<String>,
    /// `token` query parameter
    pub query: Option<String>,
}

impl SyncCredentials {
    /// The credential that will be checked: header, then bearer, then query.
    pub fn presented(&self) -> Option<&str> {
        [&self.header, &self.bearer, &self.query]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .find(|v| !v.is_empty())
    }

    /// Compare the presented credential with `secret`. Without a configured
    /// secret nothing is authorized.
    pub fn authorize(&self, secret: Option<&str>) -> bool {
        match (self.presented(), secret) {
            (Some(token), Some(secret)) if !secret.is_empty() => secrets_match(token, secret),
            _ => false,
        }
    }
}

/// Compare SHA-256 digests of both values without early exit, so timing
/// reveals neither the matching prefix nor the secret's length.
fn secrets_match(presented: &str, secret: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(secret.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// Extract the token from an `Authorization` header value.
///
/// Only the exact `Bearer` scheme is recognized.
pub fn bearer_token(authorization: &str) -> Option<String> {
    let mut parts = authorization.split(' ');
    match (parts.next(), parts.next()) {
        (Some("Bearer"), Some(token)) if !token.is_empty() => Some(token.to_string()),
        _ => None,
    }
}

/// Whether a listed object should have a catalog row.
pub fn is_sync_candidate(name: &str) -> bool {
    !name.is_empty() && !name.ends_with('/') && name.to_lowercase().ends_with(".jpg")
}

/// Parameters of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncParams {
    pub bucket: String,
    pub table: String,
    pub folder: String,
    pub max_objects: usize,
}

impl SyncParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            table: config.sync.table.clone(),
            folder: config.sync.folder.trim_matches('/').to_string(),
            max_objects: config.sync.max_objects.max(1),
        }
    }

    fn full_path(&self, name: &str) -> String {
        if self.folder.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.folder, name)
        }
    }
}

/// State of one insert chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Inserted,
    Failed,
    /// Not attempted because an earlier chunk failed
    Skipped,
}

/// Log entry for one insert chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkOutcome {
    pub index: usize,
    pub rows: usize,
    pub status: ChunkStatus,
}

/// Summary of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub bucket: String,
    pub table: String,
    pub folder: String,
    pub dry_run: bool,
    /// Objects listed, after truncation to `max_objects`
    pub scanned: usize,
    /// Listed objects eligible for a catalog row
    pub candidates: usize,
    /// Rows written; always zero on a dry run
    pub inserted: usize,
    /// Rows that were (or on a dry run, would be) inserted
    #[serde(skip)]
    pub would_insert: usize,
    #[serde(skip)]
    pub chunks: Vec<ChunkOutcome>,
}

/// A listed object with its path relative to the bucket root.
struct ListedObject {
    full_path: String,
    object: StoredObject,
}

/// Repairs catalog drift against the object store.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn Catalog>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ObjectStore>, catalog: Arc<dyn Catalog>) -> Self {
        Self { store, catalog }
    }

    /// Run one reconciliation pass.
    pub async fn reconcile(
        &self,
        params: &SyncParams,
        dry_run: bool,
    ) -> Result<SyncReport, SyncError> {
        let objects = self.list_all(params).await?;
        let candidates: Vec<&ListedObject> = objects
            .iter()
            .filter(|o| is_sync_candidate(&o.object.name))
            .collect();
        tracing::debug!(
            scanned = objects.len(),
            candidates = candidates.len(),
            "Listed bucket {}",
            params.bucket
        );

        let paths: Vec<String> = candidates.iter().map(|o| o.full_path.clone()).collect();
        let existing = if paths.is_empty() {
            Default::default()
        } else {
            self.catalog
                .existing_paths(&params.table, &paths)
                .await
                .map_err(SyncError::Lookup)?
        };

        let rows: Vec<CatalogRow> = candidates
            .iter()
            .filter(|o| !existing.contains(&o.full_path))
            .map(|o| CatalogRow {
                storage_path: o.full_path.clone(),
                public_url: self.store.public_url(&o.full_path),
                metadata: o.object.metadata.clone(),
            })
            .collect();

        let chunks = if dry_run || rows.is_empty() {
            Vec::new()
        } else {
            self.insert_chunks(&params.table, &rows).await?
        };

        if dry_run {
            tracing::info!("Dry run: {} rows would be inserted", rows.len());
        } else {
            tracing::info!("Inserted {} rows into {}", rows.len(), params.table);
        }

        Ok(SyncReport {
            bucket: params.bucket.clone(),
            table: params.table.clone(),
            folder: params.folder.clone(),
            dry_run,
            scanned: objects.len(),
            candidates: candidates.len(),
            inserted: if dry_run { 0 } else { rows.len() },
            would_insert: rows.len(),
            chunks,
        })
    }

    /// Page through the folder until a short page or `max_objects`.
    async fn list_all(&self, params: &SyncParams) -> Result<Vec<ListedObject>, SyncError> {
        let mut objects = Vec::new();
        let mut offset = 0;

        while objects.len() < params.max_objects {
            let page = self
                .store
                .list(&params.folder, LIST_PAGE_SIZE, offset)
                .await
                .map_err(SyncError::List)?;
            let page_len = page.len();

            objects.extend(page.into_iter().map(|object| ListedObject {
                full_path: params.full_path(&object.name),
                object,
            }));

            if page_len < LIST_PAGE_SIZE {
                break;
            }
            offset += LIST_PAGE_SIZE;
        }

        objects.truncate(params.max_objects);
        Ok(objects)
    }

    async fn insert_chunks(
        &self,
        table: &str,
        rows: &[CatalogRow],
    ) -> Result<Vec<ChunkOutcome>, SyncError> {
        let mut log: Vec<ChunkOutcome> = rows
            .chunks(INSERT_CHUNK_SIZE)
            .enumerate()
            .map(|(index, chunk)| ChunkOutcome {
                index,
                rows: chunk.len(),
                status: ChunkStatus::Skipped,
            })
            .collect();

        let mut committed = 0;
        for (index, chunk) in rows.chunks(INSERT_CHUNK_SIZE).enumerate() {
            match self.catalog.insert_rows(table, chunk).await {
                Ok(()) => {
                    log[index].status = ChunkStatus::Inserted;
                    committed += chunk.len();
                }
                Err(source) => {
                    log[index].status = ChunkStatus::Failed;
                    tracing::error!(
                        chunk = index,
                        committed,
                        "Catalog insert failed: {source}"
                    );
                    return Err(SyncError::Insert {
                        failed_chunk: index,
                        committed_rows: committed,
                        chunks: log,
                        source,
                    });
                }
            }
        }
        Ok(log)
    }
}
