//! End-to-end ingestion against a mock image host and the in-memory store.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use flowstash_core::config::StorageBackend;
use flowstash_core::pipeline::{ByteBudget, ContentKey, ImageProcessor};
use flowstash_core::storage::{Backends, ObjectStore};
use flowstash_core::{
    Catalog, Config, FailureReason, FlowStash, IngestOptions, ItemOutcome, MemoryStore,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PUBLIC_BASE: &str = "http://localhost:3000/storage";

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Pseudo-random pixels so the PNG barely compresses.
fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    let img = image::RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        image::Rgb([next(), next(), next()])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn memory_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Memory;
    config
}

/// Client that sends `storage.googleapis.com` to the mock server.
fn client_for(mock: &MockServer) -> reqwest::Client {
    reqwest::Client::builder()
        .resolve("storage.googleapis.com", *mock.address())
        .no_proxy()
        .build()
        .unwrap()
}

fn url_for(mock: &MockServer, path_and_query: &str) -> String {
    format!(
        "http://storage.googleapis.com:{}{}",
        mock.address().port(),
        path_and_query
    )
}

fn stash_for(config: Config, mock: &MockServer, store: &Arc<MemoryStore>) -> FlowStash {
    let objects: Arc<dyn ObjectStore> = store.clone();
    let catalog: Arc<dyn Catalog> = store.clone();
    let backends = Backends {
        ingest: Some(objects.clone()),
        sync: Some((objects, catalog)),
    };
    FlowStash::with_backends(config, backends, client_for(mock))
}

async fn serve_png(mock: &MockServer, at: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bytes, "image/png"))
        .mount(mock)
        .await;
}

fn failure_of(outcome: &ItemOutcome) -> FailureReason {
    match outcome {
        ItemOutcome::Failed(failed) => failed.error,
        ItemOutcome::Stored(stored) => panic!("expected failure, got {}", stored.record.file_name),
    }
}

#[tokio::test]
async fn test_signed_variants_share_one_object() {
    let mock = MockServer::start().await;
    serve_png(&mock, "/bucket/a.png", png(32, 32)).await;
    let store = Arc::new(MemoryStore::new(PUBLIC_BASE));
    let stash = stash_for(memory_config(), &mock, &store);
    let batch = stash.orchestrator().unwrap();

    let urls = vec![
        url_for(&mock, "/bucket/a.png?X-Goog-Signature=one"),
        url_for(&mock, "/bucket/a.png?X-Goog-Signature=two"),
    ];
    let result = batch.run_batch(&urls, &batch.default_options()).await.unwrap();

    assert_eq!(result.total, 2);
    assert_eq!(result.successful, 2);
    let stored: Vec<_> = result
        .results
        .iter()
        .map(|o| match o {
            ItemOutcome::Stored(s) => s.as_ref(),
            ItemOutcome::Failed(f) => panic!("unexpected failure for {}", f.original_url),
        })
        .collect();
    assert_eq!(stored[0].record.id, stored[1].record.id);
    assert_eq!(stored.iter().filter(|s| s.deduplicated).count(), 1);

    let key = ContentKey::from_url(&urls[0]);
    assert_eq!(
        stored[0].record.public_url,
        format!("{PUBLIC_BASE}/{}", key.image_object_name())
    );
    // image + sidecar
    assert_eq!(store.object_count().await, 2);
}

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let mock = MockServer::start().await;
    serve_png(&mock, "/bucket/a.png", png(16, 16)).await;
    serve_png(&mock, "/bucket/b.png", png(24, 12)).await;
    let store = Arc::new(MemoryStore::new(PUBLIC_BASE));
    let stash = stash_for(memory_config(), &mock, &store);
    let batch = stash.orchestrator().unwrap();
    let urls = vec![
        url_for(&mock, "/bucket/a.png"),
        url_for(&mock, "/bucket/b.png"),
    ];

    let first = batch.run_batch(&urls, &batch.default_options()).await.unwrap();
    assert_eq!(first.successful, 2);
    let sidecar = store
        .object(&ContentKey::from_url(&urls[0]).sidecar_object_name())
        .await
        .unwrap();

    let second = batch.run_batch(&urls, &batch.default_options()).await.unwrap();
    assert_eq!(second.successful, 2);
    for outcome in &second.results {
        match outcome {
            ItemOutcome::Stored(s) => assert!(s.deduplicated),
            ItemOutcome::Failed(f) => panic!("unexpected failure for {}", f.original_url),
        }
    }
    assert_eq!(store.object_count().await, 4);
    // The first sidecar is never overwritten.
    assert_eq!(
        store
            .object(&ContentKey::from_url(&urls[0]).sidecar_object_name())
            .await
            .unwrap(),
        sidecar
    );
}

#[tokio::test]
async fn test_failures_isolated_and_order_preserved() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bucket/slow.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(png(8, 8), "image/png")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/bucket/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/bucket/page.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .mount(&mock)
        .await;
    serve_png(&mock, "/bucket/fast.png", png(8, 8)).await;

    let mut config = memory_config();
    config.ingest.parallel_workers = 4;
    let store = Arc::new(MemoryStore::new(PUBLIC_BASE));
    let stash = stash_for(config, &mock, &store);
    let batch = stash.orchestrator().unwrap();

    let urls = vec![
        url_for(&mock, "/bucket/slow.png"),
        url_for(&mock, "/bucket/missing.png"),
        url_for(&mock, "/bucket/page.png"),
        url_for(&mock, "/bucket/fast.png"),
    ];
    let result = batch.run_batch(&urls, &batch.default_options()).await.unwrap();

    assert_eq!(result.total, 4);
    assert_eq!(result.successful, 2);
    assert_eq!(result.failed, 2);
    let reported: Vec<&str> = result.results.iter().map(|o| o.original_url()).collect();
    assert_eq!(reported, urls.iter().map(String::as_str).collect::<Vec<_>>());

    assert!(result.results[0].is_success());
    assert_eq!(failure_of(&result.results[1]), FailureReason::ProcessingFailed);
    assert_eq!(failure_of(&result.results[2]), FailureReason::InvalidContentType);
    assert!(result.results[3].is_success());
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bucket/stuck.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(png(8, 8), "image/png")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock)
        .await;

    let mut config = memory_config();
    config.limits.fetch_timeout_ms = 200;
    let store = Arc::new(MemoryStore::new(PUBLIC_BASE));
    let stash = stash_for(config, &mock, &store);
    let batch = stash.orchestrator().unwrap();

    let urls = vec![url_for(&mock, "/bucket/stuck.png")];
    let result = batch.run_batch(&urls, &batch.default_options()).await.unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(failure_of(&result.results[0]), FailureReason::Timeout);
    assert_eq!(store.object_count().await, 0);
}

#[tokio::test]
async fn test_item_over_size_ceiling_rejected() {
    let mock = MockServer::start().await;
    let big = noisy_png(700, 700);
    assert!(big.len() > 1024 * 1024);
    serve_png(&mock, "/bucket/big.png", big).await;
    serve_png(&mock, "/bucket/small.png", png(8, 8)).await;

    let mut config = memory_config();
    config.limits.max_file_size_mb = 1;
    let store = Arc::new(MemoryStore::new(PUBLIC_BASE));
    let stash = stash_for(config, &mock, &store);
    let batch = stash.orchestrator().unwrap();

    let urls = vec![
        url_for(&mock, "/bucket/big.png"),
        url_for(&mock, "/bucket/small.png"),
    ];
    let result = batch.run_batch(&urls, &batch.default_options()).await.unwrap();

    assert_eq!(failure_of(&result.results[0]), FailureReason::SizeExceeded);
    assert!(result.results[1].is_success());
}

#[tokio::test]
async fn test_batch_budget_fails_items_past_the_ceiling() {
    let mock = MockServer::start().await;
    let bytes = png(40, 40);
    let size = bytes.len() as u64;
    serve_png(&mock, "/bucket/a.png", bytes.clone()).await;
    serve_png(&mock, "/bucket/b.png", bytes).await;

    let config = memory_config();
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new(PUBLIC_BASE));
    let processor = ImageProcessor::with_client(&config, store, client_for(&mock));
    let budget = ByteBudget::new(size + size / 2);
    let options = IngestOptions::default();

    let first = processor
        .process(&url_for(&mock, "/bucket/a.png"), &options, &budget)
        .await;
    assert!(first.is_ok());

    let err = processor
        .process(&url_for(&mock, "/bucket/b.png"), &options, &budget)
        .await
        .unwrap_err();
    assert_eq!(err.failure_reason(), FailureReason::SizeExceeded);
    assert_eq!(budget.used(), size * 2);
}

#[tokio::test]
async fn test_output_fits_bounding_box() {
    let mock = MockServer::start().await;
    serve_png(&mock, "/bucket/wide.png", png(800, 400)).await;
    let store = Arc::new(MemoryStore::new(PUBLIC_BASE));
    let stash = stash_for(memory_config(), &mock, &store);
    let batch = stash.orchestrator().unwrap();

    let url = url_for(&mock, "/bucket/wide.png");
    let options = IngestOptions {
        quality: 70,
        max_width: 400,
        max_height: 400,
    };
    let result = batch.run_batch(&[url.clone()], &options).await.unwrap();

    let ItemOutcome::Stored(stored) = &result.results[0] else {
        panic!("expected stored item");
    };
    assert_eq!(stored.record.dimensions.width, 800);
    assert_eq!(stored.record.dimensions.height, 400);
    assert_eq!(stored.record.dimensions.format, "png");
    assert_eq!(stored.record.original_url, url);

    let jpeg = store.object(&stored.record.file_name).await.unwrap();
    assert_eq!(
        image::guess_format(&jpeg).unwrap(),
        image::ImageFormat::Jpeg
    );
    let out = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((out.width(), out.height()), (400, 200));
    assert_eq!(stored.record.size.compressed, jpeg.len() as u64);
}
