use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;
use utoipa::ToSchema;

/// The only event type that drives reconciliation; everything else is
/// acknowledged and ignored.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Pseudo-line the checkout step appends to carry the shipping charge.
/// Recognized by id or name and never resolved as a product.
pub const SHIPPING_SENTINEL_ID: i64 = 0;
pub const SHIPPING_SENTINEL_NAME: &str = "shipping";

/// A payment gateway notification envelope.
///
/// Signed deliveries arrive on the webhook endpoint as raw bytes and are
/// parsed into this shape only after signature verification. The replay
/// endpoint accepts the same shape directly as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentEvent {
    /// Event type, e.g. `checkout.session.completed`
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentEventData {
    pub object: CheckoutSession,
}

/// The completed checkout session as reported by the processor
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSession {
    /// Processor transaction identifier; the idempotency key for order writes
    #[schema(example = "cs_test_abc123")]
    pub id: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    /// Captured total in minor units, as charged by the processor
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    /// String-to-string metadata attached by the checkout-creation step
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentEvent {
    pub fn is_checkout_completed(&self) -> bool {
        self.event_type == CHECKOUT_COMPLETED
    }
}

/// Why the cart metadata could not be decoded at all.
///
/// Per-line problems are not errors; bad lines are logged and dropped so the
/// rest of the cart survives.
#[derive(Debug, Error)]
pub enum CartDecodeError {
    #[error("cart metadata missing")]
    Missing,
    #[error("cart metadata is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cart metadata is not an array")]
    NotAnArray,
}

/// One purchased line as captured at checkout time.
///
/// `price` is the unit price quoted at checkout, never a live catalog read.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
}

impl CartLine {
    /// True for the shipping pseudo-line appended by the checkout step
    pub fn is_shipping_sentinel(&self) -> bool {
        if self.id == Some(SHIPPING_SENTINEL_ID) {
            return true;
        }
        self.name
            .as_deref()
            .map(|n| n.trim().eq_ignore_ascii_case(SHIPPING_SENTINEL_NAME))
            .unwrap_or(false)
    }

    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Decodes a single cart element, or `None` when it is unusable.
    ///
    /// A usable line has some identity (id or name), a positive integer
    /// quantity, and a non-negative price.
    fn from_value(value: &Value) -> Option<CartLine> {
        let obj = value.as_object()?;

        let id = obj.get("id").and_then(i64_from_value);
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        if id.is_none() && name.is_none() {
            return None;
        }

        let quantity = obj.get("quantity").and_then(i64_from_value)?;
        if quantity < 1 || quantity > i32::MAX as i64 {
            return None;
        }

        let price = obj.get("price").and_then(decimal_from_value)?;
        if price < Decimal::ZERO {
            return None;
        }

        Some(CartLine {
            id,
            name,
            quantity: quantity as i32,
            price,
        })
    }
}

impl CheckoutSession {
    /// Decodes the `cart` metadata value into cart lines.
    ///
    /// Missing or structurally broken cart data is an error the caller turns
    /// into a terminal skip. Individually malformed elements are warned about
    /// and dropped here without failing their siblings.
    pub fn decode_cart(&self) -> Result<Vec<CartLine>, CartDecodeError> {
        let raw = self
            .metadata
            .get("cart")
            .ok_or(CartDecodeError::Missing)?;
        let parsed: Value = serde_json::from_str(raw)?;
        let elements = parsed.as_array().ok_or(CartDecodeError::NotAnArray)?;

        let mut lines = Vec::with_capacity(elements.len());
        for element in elements {
            match CartLine::from_value(element) {
                Some(line) => lines.push(line),
                None => warn!(line = %element, "Dropping malformed cart line"),
            }
        }
        Ok(lines)
    }

    pub fn payment_method(&self) -> String {
        self.metadata
            .get("payment_method")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn delivery_type(&self) -> String {
        self.metadata
            .get("delivery_type")
            .cloned()
            .unwrap_or_else(|| "delivery".to_string())
    }

    /// Pickup date exactly as the checkout step recorded it; the format is
    /// owned by the storefront UI, not by this service
    pub fn pickup_date(&self) -> Option<String> {
        self.metadata
            .get("pickup_date")
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
    }

    pub fn shipping_cost(&self) -> Decimal {
        match self.metadata.get("shipping_cost") {
            Some(raw) => Decimal::from_str(raw.trim()).unwrap_or_else(|_| {
                warn!(shipping_cost = %raw, "Unparsable shipping cost, defaulting to zero");
                Decimal::ZERO
            }),
            None => Decimal::ZERO,
        }
    }

    /// Explicit shipping-address reference pinned at checkout, if any
    pub fn address_id(&self) -> Option<i32> {
        let raw = self.metadata.get("address_id")?.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<i32>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(address_id = %raw, "Unparsable address reference, ignoring");
                None
            }
        }
    }
}

fn i64_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}
