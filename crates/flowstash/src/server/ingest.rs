//! `POST /api/upload-flow-images`

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use flowstash_core::pipeline::client_identity;
use flowstash_core::{BatchEnvelope, BatchRejection, IngestOptions};
use serde_json::{json, Value};
use tracing::{error, warn};

use super::AppState;

/// `{success: false, error}` with an optional extra field.
fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

/// Parse a numeric option the way lenient form handlers do: numbers are
/// truncated, strings contribute their leading integer, anything else is
/// absent.
pub(crate) fn lenient_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim_start();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

/// Stringify array entries; non-strings keep their JSON text and fail
/// validation downstream.
fn image_urls(images: &[Value]) -> Vec<String> {
    images
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

pub async fn upload_flow_images(
    State(stash): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let identity = client_identity(
        header("x-forwarded-for"),
        header("x-real-ip"),
        connect_info.map(|ConnectInfo(addr)| addr.ip()),
    );
    if !stash.rate_limiter().admit(&identity) {
        warn!(%identity, "Rate limit exceeded");
        return failure(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please try again later.",
        );
    }

    let Some(orchestrator) = stash.orchestrator() else {
        error!("Ingestion requested but no object store is configured");
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error");
    };

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let Some(images) = payload.get("images").and_then(Value::as_array) else {
        return failure(StatusCode::BAD_REQUEST, "Images array required");
    };
    let urls = image_urls(images);

    let options = IngestOptions::clamped(
        &orchestrator.default_options(),
        lenient_int(payload.get("compressQuality")),
        lenient_int(payload.get("maxWidth")),
        lenient_int(payload.get("maxHeight")),
    );

    match orchestrator.run_batch(&urls, &options).await {
        Ok(result) => (StatusCode::OK, Json(BatchEnvelope::new(&result))).into_response(),
        Err(rejection @ BatchRejection::InvalidUrls { count }) => {
            warn!(count, "Rejected batch with invalid URLs");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": rejection.to_string(),
                    "invalidCount": count,
                })),
            )
                .into_response()
        }
        Err(rejection) => failure(StatusCode::BAD_REQUEST, &rejection.to_string()),
    }
}
