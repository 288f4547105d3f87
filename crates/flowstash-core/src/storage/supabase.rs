//! Supabase storage and PostgREST backends.
//!
//! Talks to the HTTP APIs directly with `reqwest`:
//! - Storage: `POST /storage/v1/object/{bucket}/{path}` with `x-upsert: false`
//!   for insert-if-absent, `POST /storage/v1/object/list/{bucket}` for listings
//! - Catalog: `GET /rest/v1/{table}?storage_path=in.(...)` and
//!   `POST /rest/v1/{table}`

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Catalog, CatalogRow, ObjectStore, PutOutcome, StoredObject};
use crate::config::StorageConfig;
use crate::error::StoreError;

/// Paths per catalog lookup request, keeping query strings bounded.
const LOOKUP_CHUNK_SIZE: usize = 100;

/// Shared connection details for both Supabase APIs.
#[derive(Debug, Clone)]
struct Endpoint {
    client: reqwest::Client,
    base_url: String,
    key: String,
    timeout: Duration,
}

impl Endpoint {
    fn new(client: reqwest::Client, base_url: &str, key: &str, config: &StorageConfig) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Build `base_url/<segments...>`, percent-encoding each segment.
    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| StoreError::Invalid {
            message: format!("bad storage URL {:?}: {e}", self.base_url),
        })?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Invalid {
                message: format!("storage URL cannot be a base: {:?}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .timeout(self.timeout)
    }
}

/// Read an error response into a [`StoreError::Http`].
async fn http_error(resp: reqwest::Response) -> StoreError {
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    StoreError::Http { status, message }
}

/// Supabase Storage bucket.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    endpoint: Endpoint,
    bucket: String,
}

impl SupabaseStore {
    pub fn new(client: reqwest::Client, base_url: &str, key: &str, config: &StorageConfig) -> Self {
        Self {
            endpoint: Endpoint::new(client, base_url, key, config),
            bucket: config.bucket.clone(),
        }
    }

    fn object_url(&self, kind: &[&str], path: &str) -> Result<Url, StoreError> {
        let mut segments = vec!["storage", "v1", "object"];
        segments.extend_from_slice(kind);
        segments.push(&self.bucket);
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        self.endpoint.url(segments)
    }
}

/// Storage reports "already exists" either as a 409 or as a 400 whose body
/// carries the conflict.
fn is_conflict(status: u16, body: &str) -> bool {
    if status == 409 {
        return true;
    }
    let lower = body.to_ascii_lowercase();
    lower.contains("already exists")
        || lower.contains("duplicate")
        || lower.contains("\"statuscode\":\"409\"")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    sort_by: SortBy,
}

#[derive(Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Deserialize)]
struct ListEntry {
    name: String,
    /// Null for folder placeholders
    id: Option<String>,
    metadata: Option<serde_json::Value>,
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn put_if_absent(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<PutOutcome, StoreError> {
        let url = self.object_url(&[], path)?;
        let resp = self
            .endpoint
            .request(reqwest::Method::POST, url)
            .header("content-type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(PutOutcome::Created);
        }

        let code = status.as_u16();
        let body = resp.text().await.unwrap_or_default();
        if is_conflict(code, &body) {
            tracing::debug!(path, "Object already exists");
            return Ok(PutOutcome::AlreadyExists);
        }
        Err(StoreError::Http {
            status: code,
            message: body,
        })
    }

    async fn list(
        &self,
        folder: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let url = self.object_url(&["list"], "")?;
        let body = ListRequest {
            prefix: folder,
            limit,
            offset,
            sort_by: SortBy {
                column: "name",
                order: "asc",
            },
        };
        let resp = self
            .endpoint
            .request(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }

        let entries: Vec<ListEntry> = resp.json().await?;
        Ok(entries
            .into_iter()
            .map(|e| StoredObject {
                name: if e.id.is_none() && !e.name.ends_with('/') {
                    format!("{}/", e.name)
                } else {
                    e.name
                },
                metadata: e.metadata.filter(|m| !m.is_null()),
            })
            .collect())
    }

    fn public_url(&self, path: &str) -> String {
        match self.object_url(&["public"], path) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}/storage/v1/object/public/{}/{}",
                self.endpoint.base_url, self.bucket, path
            ),
        }
    }
}

/// PostgREST catalog table access.
#[derive(Debug, Clone)]
pub struct SupabaseCatalog {
    endpoint: Endpoint,
}

impl SupabaseCatalog {
    pub fn new(client: reqwest::Client, base_url: &str, key: &str, config: &StorageConfig) -> Self {
        Self {
            endpoint: Endpoint::new(client, base_url, key, config),
        }
    }
}

/// Render a PostgREST `in.(...)` filter with every value quoted.
fn in_filter(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[derive(Deserialize)]
struct PathRow {
    storage_path: String,
}

#[async_trait]
impl Catalog for SupabaseCatalog {
    async fn existing_paths(
        &self,
        table: &str,
        paths: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        let mut found = HashSet::new();
        for chunk in paths.chunks(LOOKUP_CHUNK_SIZE) {
            let url = self.endpoint.url(["rest", "v1", table])?;
            let resp = self
                .endpoint
                .request(reqwest::Method::GET, url)
                .query(&[
                    ("select", "storage_path".to_string()),
                    ("storage_path", in_filter(chunk)),
                ])
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(http_error(resp).await);
            }
            let rows: Vec<PathRow> = resp.json().await?;
            found.extend(rows.into_iter().map(|r| r.storage_path));
        }
        Ok(found)
    }

    async fn insert_rows(&self, table: &str, rows: &[CatalogRow]) -> Result<(), StoreError> {
        let url = self.endpoint.url(["rest", "v1", table])?;
        let resp = self
            .endpoint
            .request(reqwest::Method::POST, url)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> StorageConfig {
        StorageConfig {
            bucket: "flow-images".into(),
            ..StorageConfig::default()
        }
    }

    fn store(server: &MockServer) -> SupabaseStore {
        SupabaseStore::new(reqwest::Client::new(), &server.uri(), "anon-key", &config())
    }

    #[tokio::test]
    async fn test_put_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/flow-images/flow_ab.jpg"))
            .and(header("x-upsert", "false"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "x"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = store(&server)
            .put_if_absent("flow_ab.jpg", vec![1, 2], "image/jpeg")
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::Created);
    }

    #[tokio::test]
    async fn test_put_conflict_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let outcome = store(&server)
            .put_if_absent("flow_ab.jpg", vec![1], "image/jpeg")
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_put_conflict_in_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "statusCode": "409",
                "error": "Duplicate",
                "message": "The resource already exists"
            })))
            .mount(&server)
            .await;

        let outcome = store(&server)
            .put_if_absent("flow_ab.json", vec![1], "application/json")
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_put_other_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("row-level security"))
            .mount(&server)
            .await;

        let err = store(&server)
            .put_if_absent("flow_ab.jpg", vec![1], "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Http { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_list_marks_folders() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/flow-images"))
            .and(body_json(json!({
                "prefix": "2024",
                "limit": 500,
                "offset": 0,
                "sortBy": {"column": "name", "order": "asc"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "a.jpg", "id": "1", "metadata": {"size": 10, "mimetype": "image/jpeg"}},
                {"name": "sub", "id": null, "metadata": null}
            ])))
            .mount(&server)
            .await;

        let entries = store(&server).list("2024", 500, 0).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.jpg");
        assert_eq!(entries[0].metadata.as_ref().unwrap()["size"], 10);
        assert_eq!(entries[1].name, "sub/");
        assert!(entries[1].metadata.is_none());
    }

    #[test]
    fn test_public_url_layout() {
        let store = SupabaseStore::new(
            reqwest::Client::new(),
            "https://xyz.supabase.co/",
            "k",
            &config(),
        );
        assert_eq!(
            store.public_url("2024/flow_ab.jpg"),
            "https://xyz.supabase.co/storage/v1/object/public/flow-images/2024/flow_ab.jpg"
        );
    }

    #[test]
    fn test_in_filter_quotes_values() {
        let values = vec!["a.jpg".to_string(), "we\"ird.jpg".to_string()];
        assert_eq!(in_filter(&values), r#"in.("a.jpg","we\"ird.jpg")"#);
    }

    #[tokio::test]
    async fn test_catalog_lookup_and_insert() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/flow_images"))
            .and(query_param("select", "storage_path"))
            .and(query_param("storage_path", r#"in.("a.jpg","b.jpg")"#))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"storage_path": "a.jpg"}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/flow_images"))
            .and(header("Prefer", "return=minimal"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let catalog =
            SupabaseCatalog::new(reqwest::Client::new(), &server.uri(), "service", &config());
        let found = catalog
            .existing_paths("flow_images", &["a.jpg".to_string(), "b.jpg".to_string()])
            .await
            .unwrap();
        assert_eq!(found, HashSet::from(["a.jpg".to_string()]));

        catalog
            .insert_rows(
                "flow_images",
                &[CatalogRow {
                    storage_path: "b.jpg".into(),
                    public_url: "https://cdn/b.jpg".into(),
                    metadata: None,
                }],
            )
            .await
            .unwrap();
    }
}
