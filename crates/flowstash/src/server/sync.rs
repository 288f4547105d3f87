//! `POST /api/sync-storage-to-db`

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use flowstash_core::sync::bearer_token;
use flowstash_core::{SyncCredentials, SyncReport};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::AppState;

#[derive(Serialize)]
struct SyncResponse {
    success: bool,
    #[serde(flatten)]
    report: SyncReport,
}

fn sync_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Sync failed" })),
    )
        .into_response()
}

pub async fn sync_storage_to_db(
    State(stash): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let credentials = SyncCredentials {
        header: headers
            .get("x-sync-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        bearer: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token),
        query: query.get("token").cloned(),
    };
    if !credentials.authorize(stash.config().sync.secret.as_deref()) {
        warn!("Unauthorized sync request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    let dry_run = query.get("dryRun").map(String::as_str) == Some("1");

    let Some(reconciler) = stash.reconciler() else {
        error!("Sync failed: no service-role storage credentials configured");
        return sync_failed();
    };

    match reconciler.reconcile(&stash.sync_params(), dry_run).await {
        Ok(report) => {
            info!(
                scanned = report.scanned,
                candidates = report.candidates,
                inserted = report.inserted,
                dry_run,
                "Sync complete"
            );
            (
                StatusCode::OK,
                Json(SyncResponse {
                    success: true,
                    report,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Sync failed: {e}");
            sync_failed()
        }
    }
}
