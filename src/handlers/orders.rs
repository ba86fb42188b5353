use crate::{errors::ServiceError, services::OrderDetail, ApiResponse, AppState};
use axum::{
    extract::{Path, State},
    response::Json,
};

/// Lookup for the post-checkout confirmation page, keyed by the processor
/// transaction id the storefront already holds.
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-transaction/{transaction_id}",
    summary = "Get order by transaction id",
    description = "Returns the order reconciled from a processor transaction, \
        with its customer and items. 404 until the webhook has landed.",
    params(
        ("transaction_id" = String, Path, description = "Processor transaction id"),
    ),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<OrderDetail>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 404, description = "No order for this transaction", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn get_order_by_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    match state
        .services
        .orders
        .find_by_transaction_id(&transaction_id)
        .await?
    {
        Some(detail) => Ok(Json(ApiResponse::success(detail))),
        None => Err(ServiceError::NotFound(format!(
            "No order recorded for transaction {transaction_id}"
        ))),
    }
}
