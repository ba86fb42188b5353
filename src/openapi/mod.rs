use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Payment Reconciliation API

Converts signed payment gateway notifications into persisted orders and
serves the order confirmation lookup.

## Webhook signing

Signed deliveries carry an HMAC-SHA256 signature over `{timestamp}.{body}`.
Either header pair is accepted:

- `x-timestamp` + `x-signature`
- `Stripe-Signature: t=<timestamp>,v1=<signature>`

A rejected signature answers 400 and the event is not processed. Business
skips (unknown customer, empty cart, duplicate delivery) still answer 200 so
the gateway stops redelivering.

## Error Handling

Errors use a consistent response format with appropriate HTTP status codes:

```json
{
  "error": "Bad Request",
  "message": "Invalid signature: webhook signature mismatch",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Webhooks", description = "Payment gateway delivery and replay endpoints"),
        (name = "Orders", description = "Order confirmation lookup")
    ),
    paths(
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::payment_webhooks::replay_payment_event,
        crate::handlers::orders::get_order_by_transaction,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::ResponseMeta,

            // Webhook types
            crate::webhooks::PaymentEvent,
            crate::webhooks::CheckoutSession,
            crate::services::ReconciliationOutcome,

            // Order types
            crate::services::OrderDetail,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_includes_reconciliation_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/webhooks/payment"));
        assert!(json.contains("/api/v1/orders/by-transaction/{transaction_id}"));
    }
}
