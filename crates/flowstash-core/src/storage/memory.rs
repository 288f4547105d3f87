//! In-memory object store and catalog.
//!
//! Single-process stand-in for the real backends. Insert-if-absent holds the
//! write lock across the existence check and the insert, so concurrent
//! writers to one path see exactly one `Created`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;

use super::{Catalog, CatalogRow, ObjectStore, PutOutcome, StoredObject};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct MemoryObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Object store and catalog backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    public_base: String,
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    tables: RwLock<HashMap<String, Vec<CatalogRow>>>,
}

impl MemoryStore {
    /// Create an empty store whose public URLs start with `public_base`.
    pub fn new(public_base: &str) -> Self {
        Self {
            public_base: public_base.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Bytes of the object at `path`, if present.
    pub async fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(path).map(|o| o.bytes.clone())
    }

    /// Number of stored objects.
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Snapshot of the rows of `table`.
    pub async fn rows(&self, table: &str) -> Vec<CatalogRow> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Seed `table` with rows, bypassing the catalog interface.
    pub async fn seed_rows(&self, table: &str, rows: Vec<CatalogRow>) {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put_if_absent(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<PutOutcome, StoreError> {
        if path.is_empty() || path.ends_with('/') {
            return Err(StoreError::Invalid {
                message: format!("not an object path: {path:?}"),
            });
        }

        let mut objects = self.objects.write().await;
        if objects.contains_key(path) {
            return Ok(PutOutcome::AlreadyExists);
        }
        objects.insert(
            path.to_string(),
            MemoryObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(PutOutcome::Created)
    }

    async fn list(
        &self,
        folder: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let prefix = match folder.trim_matches('/') {
            "" => String::new(),
            f => format!("{f}/"),
        };

        let objects = self.objects.read().await;
        let mut files = BTreeMap::new();
        let mut folders = BTreeSet::new();
        for (path, object) in objects.range(prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    folders.insert(format!("{dir}/"));
                }
                None => {
                    files.insert(
                        rest.to_string(),
                        json!({
                            "size": object.bytes.len(),
                            "mimetype": object.content_type,
                        }),
                    );
                }
            }
        }

        let mut entries: Vec<StoredObject> = folders
            .into_iter()
            .map(|name| StoredObject {
                name,
                metadata: None,
            })
            .chain(files.into_iter().map(|(name, metadata)| StoredObject {
                name,
                metadata: Some(metadata),
            }))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn existing_paths(
        &self,
        table: &str,
        paths: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        let wanted: HashSet<&str> = paths.iter().map(String::as_str).collect();
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| wanted.contains(r.storage_path.as_str()))
                    .map(|r| r.storage_path.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_rows(&self, table: &str, rows: &[CatalogRow]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let existing = tables.entry(table.to_string()).or_default();
        // Unique on storage_path, like the production table
        if let Some(dup) = rows
            .iter()
            .find(|r| existing.iter().any(|e| e.storage_path == r.storage_path))
        {
            return Err(StoreError::Http {
                status: 409,
                message: format!("duplicate key storage_path={}", dup.storage_path),
            });
        }
        existing.extend_from_slice(rows);
        Ok(())
    }
}
