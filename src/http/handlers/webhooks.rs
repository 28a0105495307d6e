use crate::service::webhook_ingest::IngestOutcome;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

/// Public endpoint; authenticity is payload-signature-based. The response is
/// always the generic status JSON so providers never see internal detail.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(gateway_slug): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = state
        .webhook_ingest
        .registry
        .resolve(&gateway_slug)
        .and_then(|adapter| adapter.signature_header())
        .and_then(|name| headers.get(name))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state.webhook_ingest.ingest(&gateway_slug, signature, &body).await {
        IngestOutcome::Processed => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({"status": "success"})),
        )
            .into_response(),
        IngestOutcome::Rejected => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"status": "error"})),
        )
            .into_response(),
    }
}

/// Admin read over the webhook audit trail.
pub async fn list_webhook_logs(State(state): State<AppState>) -> impl IntoResponse {
    match state.webhook_log_repo.list_recent(100).await {
        Ok(rows) => (axum::http::StatusCode::OK, Json(rows)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list webhook logs");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}
