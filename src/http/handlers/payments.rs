use crate::domain::payment::{
    InitiatePaymentRequest, InitiatePaymentResponse, Payment, PaymentView,
};
use crate::domain::refund::{RefundRequest, RefundView};
use crate::error::PaymentError;
use crate::gateways::InitializeOptions;
use crate::service::settlement::status_view;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

fn fail(e: PaymentError) -> Response {
    let (status, envelope) = e.into_parts();
    (status, Json(envelope)).into_response()
}

/// Identity arrives from the upstream platform proxy; auth itself lives
/// outside this service.
fn user_id(headers: &HeaderMap) -> Result<Uuid, PaymentError> {
    headers
        .get("X-User-Id")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(PaymentError::Forbidden)
}

async fn owned_payment(
    state: &AppState,
    payment_id: Uuid,
    payer_id: Uuid,
) -> Result<Payment, PaymentError> {
    let payment = state
        .payments_repo
        .find_by_id(payment_id)
        .await?
        .ok_or(PaymentError::NotFound("payment"))?;
    if payment.payer_id != payer_id {
        return Err(PaymentError::Forbidden);
    }
    Ok(payment)
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InitiatePaymentRequest>,
) -> impl IntoResponse {
    let payer_id = match user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };

    let (payment, _gateway) = match state.ledger.create_payment(payer_id, &req).await {
        Ok(created) => created,
        Err(e) => return fail(e),
    };

    let options = InitializeOptions {
        method: Some(req.payment_method),
        phone: req.payment_phone.clone(),
        card_token: req.card_token.clone(),
        return_url: req.return_url.clone(),
        cancel_url: req.cancel_url.clone(),
    };

    // On failure the engine has already recorded the FAILED state.
    let gateway_data = match state.engine.initiate(&payment, &options).await {
        Ok(data) => data,
        Err(e) => return fail(e),
    };

    let current = match state.payments_repo.find_by_id(payment.id).await {
        Ok(Some(p)) => p,
        Ok(None) => return fail(PaymentError::NotFound("payment")),
        Err(e) => return fail(e.into()),
    };
    let items = match state.payments_repo.items(payment.id).await {
        Ok(items) => items,
        Err(e) => return fail(e.into()),
    };

    (
        axum::http::StatusCode::OK,
        Json(InitiatePaymentResponse {
            payment: PaymentView::from_payment(current, items),
            gateway_data,
        }),
    )
        .into_response()
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let payer_id = match user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    let payment = match owned_payment(&state, payment_id, payer_id).await {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    let items = match state.payments_repo.items(payment.id).await {
        Ok(items) => items,
        Err(e) => return fail(e.into()),
    };

    (
        axum::http::StatusCode::OK,
        Json(PaymentView::from_payment(payment, items)),
    )
        .into_response()
}

pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let payer_id = match user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    match owned_payment(&state, payment_id, payer_id).await {
        Ok(payment) => (axum::http::StatusCode::OK, Json(status_view(&payment))).into_response(),
        Err(e) => fail(e),
    }
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let payer_id = match user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    let payment = match owned_payment(&state, payment_id, payer_id).await {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    match state.engine.verify(&payment).await {
        Ok(view) => (axum::http::StatusCode::OK, Json(view)).into_response(),
        Err(e) => fail(e),
    }
}

/// Admin-only; routed behind the internal API key middleware.
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<RefundRequest>,
) -> impl IntoResponse {
    let actor = match user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };

    let payment = match state.payments_repo.find_by_id(payment_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return fail(PaymentError::NotFound("payment")),
        Err(e) => return fail(e.into()),
    };

    match state.engine.process_refund(&payment, &req, actor).await {
        Ok(refund) => (
            axum::http::StatusCode::OK,
            Json(RefundView::from_refund(refund)),
        )
            .into_response(),
        Err(e) => fail(e),
    }
}
