use crate::{
    errors::ServiceError,
    services::ReconciliationOutcome,
    webhooks::{PaymentEvent, SignatureVerifier},
    ApiResponse, AppState,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use tracing::{info, warn};

/// Signed delivery endpoint for the payment gateway.
///
/// The body stays raw bytes until the signature checks out; parsing first
/// would hand unauthenticated input to serde. A 200 tells the gateway to
/// stop redelivering, so every terminal outcome (including business skips)
/// answers 200 and only transient failures answer 500.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payment",
    summary = "Receive a payment gateway event",
    description = "Verifies the HMAC signature over the raw body, then reconciles \
        checkout.session.completed events into orders. Other event types are \
        acknowledged and ignored.",
    request_body = String,
    responses(
        (status = 200, description = "Event acknowledged; redelivery is unnecessary"),
        (status = 400, description = "Signature verification failed or the payload is not valid JSON", body = crate::errors::ErrorResponse),
        (status = 500, description = "Transient fault; the gateway should redeliver", body = crate::errors::ErrorResponse),
    ),
    tag = "Webhooks"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        SignatureVerifier::new(secret, state.config.webhook_tolerance_secs())
            .verify(&headers, &body)?;
    } else {
        warn!("payment_webhook_secret is not configured; accepting the event unverified");
    }

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|err| ServiceError::BadRequest(format!("invalid webhook payload: {err}")))?;

    if !event.is_checkout_completed() {
        info!(event_type = %event.event_type, "Ignoring unhandled payment webhook type");
        return Ok((StatusCode::OK, "ok"));
    }

    match state.services.reconciliation.process(&event.data.object).await {
        ReconciliationOutcome::Failed { reason } => Err(ServiceError::InternalError(format!(
            "reconciliation failed: {reason}"
        ))),
        outcome => {
            info!(outcome = outcome.as_label(), "Payment webhook handled");
            Ok((StatusCode::OK, "ok"))
        }
    }
}

/// Operator-facing replay of a payment event that was acknowledged but never
/// became an order (lost delivery, bug fixed after the fact).
///
/// Unlike the signed endpoint this one checks for an existing order before
/// doing any work, and it reports every outcome as JSON, `failed` included,
/// so the operator sees the reason instead of a bare 500.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payment/replay",
    summary = "Replay a payment event",
    request_body = PaymentEvent,
    responses(
        (status = 200, description = "Replay outcome", body = ApiResponse<ReconciliationOutcome>),
        (status = 400, description = "Not a checkout.session.completed event", body = crate::errors::ErrorResponse),
    ),
    tag = "Webhooks"
)]
pub async fn replay_payment_event(
    State(state): State<AppState>,
    Json(event): Json<PaymentEvent>,
) -> Result<Json<ApiResponse<ReconciliationOutcome>>, ServiceError> {
    if !event.is_checkout_completed() {
        return Err(ServiceError::ValidationError(format!(
            "cannot replay event type {}",
            event.event_type
        )));
    }

    let session = &event.data.object;
    if let Some(order_id) = state
        .services
        .reconciliation
        .check_existing(&session.id)
        .await?
    {
        info!(
            transaction_id = %session.id,
            order_id,
            "Replay requested for an already reconciled transaction"
        );
        return Ok(Json(ApiResponse::success(
            ReconciliationOutcome::AlreadyProcessed {
                order_id: Some(order_id),
            },
        )));
    }

    let outcome = state.services.reconciliation.process(session).await;
    info!(
        transaction_id = %session.id,
        outcome = outcome.as_label(),
        "Payment event replayed"
    );
    Ok(Json(ApiResponse::success(outcome)))
}
