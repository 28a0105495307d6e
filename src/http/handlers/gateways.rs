use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

/// Admin view; credentials and webhook secrets never leave the service.
#[derive(Debug, Serialize)]
pub struct GatewayView {
    pub name: String,
    pub slug: String,
    pub adapter_type: String,
    pub is_active: bool,
    pub supports_webhooks: bool,
    pub supported_currencies: Vec<String>,
}

pub async fn list_gateways(State(state): State<AppState>) -> impl IntoResponse {
    match state.gateways_repo.list_all().await {
        Ok(items) => {
            let resp: Vec<GatewayView> = items
                .into_iter()
                .map(|g| GatewayView {
                    name: g.name,
                    slug: g.slug,
                    adapter_type: g.adapter_type,
                    is_active: g.is_active,
                    supports_webhooks: g.supports_webhooks,
                    supported_currencies: g.supported_currencies,
                })
                .collect();
            (axum::http::StatusCode::OK, Json(resp)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to list gateways");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}
