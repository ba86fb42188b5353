use crate::{
    db::DbPool,
    entities::{order, order_item},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{customers::CustomerService, products::ProductCatalogService},
    webhooks::{CartLine, CheckoutSession},
};
use chrono::{FixedOffset, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

/// Terminal result of reconciling one payment event.
///
/// Every variant except `Failed` means the event was fully handled and must
/// be acknowledged to the processor; redelivering it would change nothing.
/// `Failed` marks a transient fault (the database was unreachable, the order
/// insert died for a non-duplicate reason) where redelivery can still
/// succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// A new order now exists for this transaction.
    Created {
        order_id: i32,
        items_written: usize,
        lines_skipped: usize,
    },
    /// An order for this transaction already existed; nothing was written.
    AlreadyProcessed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order_id: Option<i32>,
    },
    /// No active customer matched the event's email; acknowledged without an
    /// order.
    SkippedNoCustomer,
    /// The cart metadata was missing, malformed, or empty; acknowledged
    /// without an order.
    SkippedEmptyCart,
    /// A transient fault stopped reconciliation before the order existed.
    Failed { reason: String },
}

impl ReconciliationOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::AlreadyProcessed { .. } => "already_processed",
            Self::SkippedNoCustomer => "skipped_no_customer",
            Self::SkippedEmptyCart => "skipped_empty_cart",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Turns a verified checkout event into exactly one persisted order.
///
/// Idempotency is enforced by the database alone: the UNIQUE constraint on
/// `orders.transaction_id` is the single gate, so concurrent deliveries of
/// the same event race on the insert and the loser reports
/// `AlreadyProcessed`. There is no advisory check-then-insert in this path.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DbPool>,
    customers: CustomerService,
    products: ProductCatalogService,
    event_sender: Arc<EventSender>,
    merchant_tz: FixedOffset,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DbPool>,
        customers: CustomerService,
        products: ProductCatalogService,
        event_sender: Arc<EventSender>,
        merchant_tz: FixedOffset,
    ) -> Self {
        Self {
            db,
            customers,
            products,
            event_sender,
            merchant_tz,
        }
    }

    /// Returns the id of the order already recorded for this transaction, if
    /// any. The replay endpoint consults this before re-running an event.
    pub async fn check_existing(&self, transaction_id: &str) -> Result<Option<i32>, ServiceError> {
        let existing = order::Entity::find()
            .filter(order::Column::TransactionId.eq(transaction_id))
            .one(&*self.db)
            .await?;

        Ok(existing.map(|found| found.id))
    }

    /// Reconciles one checkout session into an order.
    ///
    /// The method never returns an error: business skips and transient
    /// faults are both folded into the outcome so callers decide the
    /// transport status themselves. Item writes happen after the order row
    /// exists and are individually fallible; a line that cannot be resolved
    /// or inserted is skipped with a warning and the order keeps whatever
    /// items were written before it.
    #[instrument(skip(self, session), fields(transaction_id = %session.id))]
    pub async fn process(&self, session: &CheckoutSession) -> ReconciliationOutcome {
        let email = match session
            .customer_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
        {
            Some(email) => email,
            None => {
                warn!("Payment event carries no customer email; acknowledging without an order");
                self.emit_skip(session, "missing customer email").await;
                return self.finish(ReconciliationOutcome::SkippedNoCustomer);
            }
        };

        let customer = match self.customers.find_active_by_email(email).await {
            Ok(Some(customer)) => customer,
            Ok(None) => {
                warn!(
                    email = %email,
                    "No active customer for payment event; acknowledging without an order"
                );
                self.emit_skip(session, "no active customer").await;
                return self.finish(ReconciliationOutcome::SkippedNoCustomer);
            }
            Err(err) => {
                error!(email = %email, error = %err, "Customer lookup failed");
                return self.finish(ReconciliationOutcome::Failed {
                    reason: format!("customer lookup failed: {err}"),
                });
            }
        };

        let lines = match session.decode_cart() {
            Ok(lines) if !lines.is_empty() => lines,
            Ok(_) => {
                warn!(customer_id = customer.id, "Cart metadata is empty; nothing to reconcile");
                self.emit_skip(session, "empty cart").await;
                return self.finish(ReconciliationOutcome::SkippedEmptyCart);
            }
            Err(err) => {
                warn!(
                    customer_id = customer.id,
                    error = %err,
                    cart = session.metadata.get("cart").map(String::as_str).unwrap_or("<missing>"),
                    "Cart metadata is unusable; nothing to reconcile"
                );
                self.emit_skip(session, "missing or malformed cart").await;
                return self.finish(ReconciliationOutcome::SkippedEmptyCart);
            }
        };

        // Explicit address reference wins and is stored verbatim, even when
        // no such address row exists. Only its absence triggers the default
        // lookup, and the default applies to pickup orders too.
        let shipping_address_id = match session.address_id() {
            Some(explicit) => Some(explicit),
            None => match self.customers.default_address_id(customer.id).await {
                Ok(found) => found,
                Err(err) => {
                    error!(customer_id = customer.id, error = %err, "Address lookup failed");
                    return self.finish(ReconciliationOutcome::Failed {
                        reason: format!("address lookup failed: {err}"),
                    });
                }
            },
        };

        let shipping_cost = session.shipping_cost();
        let total_amount = match session.amount_total {
            Some(minor_units) => Decimal::new(minor_units, 2),
            None => {
                warn!(customer_id = customer.id, "Event omits amount_total; summing cart lines");
                let items: Decimal = lines
                    .iter()
                    .filter(|line| !line.is_shipping_sentinel())
                    .map(CartLine::line_total)
                    .sum();
                items + shipping_cost
            }
        };

        let now_local = Utc::now().with_timezone(&self.merchant_tz);
        let new_order = order::ActiveModel {
            customer_id: Set(customer.id),
            status: Set("Pending".to_string()),
            total_amount: Set(total_amount),
            currency: Set(session.currency.clone().unwrap_or_else(|| "usd".to_string())),
            payment_method: Set(session.payment_method()),
            payment_status: Set("Paid".to_string()),
            transaction_id: Set(session.id.clone()),
            delivery_type: Set(session.delivery_type()),
            delivery_cost: Set(shipping_cost),
            shipping_address_id: Set(shipping_address_id),
            pickup_date: Set(session.pickup_date()),
            order_date: Set(now_local),
            payment_date: Set(now_local),
            ..Default::default()
        };

        let created = match new_order.insert(&*self.db).await {
            Ok(created) => created,
            Err(err) if is_duplicate_transaction(&err) => {
                info!("Transaction already reconciled; treating redelivery as a no-op");
                counter!("storefront_duplicate_deliveries_total", 1);
                let order_id = match self.check_existing(&session.id).await {
                    Ok(found) => found,
                    Err(lookup_err) => {
                        warn!(error = %lookup_err, "Could not load the existing order id");
                        None
                    }
                };
                return self.finish(ReconciliationOutcome::AlreadyProcessed { order_id });
            }
            Err(err) => {
                error!(
                    customer_id = customer.id,
                    error = %err,
                    cart = session.metadata.get("cart").map(String::as_str).unwrap_or("<missing>"),
                    "Order insert failed"
                );
                return self.finish(ReconciliationOutcome::Failed {
                    reason: format!("order insert failed: {err}"),
                });
            }
        };

        let mut items_written = 0usize;
        let mut lines_skipped = 0usize;
        for line in &lines {
            // The shipping pseudo-line is costing data, not a product. It is
            // already folded into delivery_cost, so it leaves no item row and
            // no warning.
            if line.is_shipping_sentinel() {
                continue;
            }

            let product = match self.products.resolve_line(line).await {
                Ok(Some(product)) => product,
                Ok(None) => {
                    warn!(
                        order_id = created.id,
                        line_id = ?line.id,
                        line_name = ?line.name,
                        "Cart line matches no catalog product; skipping it"
                    );
                    lines_skipped += 1;
                    continue;
                }
                Err(err) => {
                    error!(
                        order_id = created.id,
                        line_name = ?line.name,
                        error = %err,
                        "Product resolution failed; skipping the line"
                    );
                    lines_skipped += 1;
                    continue;
                }
            };

            let item = order_item::ActiveModel {
                order_id: Set(created.id),
                product_id: Set(product.id),
                quantity: Set(line.quantity),
                price: Set(line.price),
                ..Default::default()
            };
            if let Err(err) = item.insert(&*self.db).await {
                error!(
                    order_id = created.id,
                    product_id = product.id,
                    error = %err,
                    "Item insert failed; the order keeps the items written so far"
                );
                lines_skipped += 1;
                continue;
            }
            items_written += 1;
        }

        counter!("storefront_orders_created_total", 1);
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: created.id,
                transaction_id: created.transaction_id.clone(),
            })
            .await;
        info!(
            order_id = created.id,
            customer_id = customer.id,
            total = %created.total_amount,
            items_written,
            lines_skipped,
            "Reconciled payment into order"
        );

        self.finish(ReconciliationOutcome::Created {
            order_id: created.id,
            items_written,
            lines_skipped,
        })
    }

    async fn emit_skip(&self, session: &CheckoutSession, reason: &str) {
        self.event_sender
            .send_or_log(Event::ReconciliationSkipped {
                transaction_id: session.id.clone(),
                reason: reason.to_string(),
            })
            .await;
    }

    fn finish(&self, outcome: ReconciliationOutcome) -> ReconciliationOutcome {
        counter!("storefront_reconciliation_total", 1, "outcome" => outcome.as_label());
        outcome
    }
}

/// True when the insert died on the `orders.transaction_id` UNIQUE
/// constraint, which is how a redelivered event announces itself.
fn is_duplicate_transaction(err: &DbErr) -> bool {
    if let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err() {
        return message.to_lowercase().contains("transaction_id");
    }

    // Some backends surface constraint failures as plain query errors, so
    // fall back to matching the raw text.
    let text = err.to_string().to_lowercase();
    text.contains("transaction_id")
        && (text.contains("unique constraint") || text.contains("duplicate key"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_detection_matches_sqlite_phrasing() {
        let err = DbErr::Custom("UNIQUE constraint failed: orders.transaction_id".to_string());
        assert!(is_duplicate_transaction(&err));
    }

    #[test]
    fn duplicate_detection_matches_postgres_phrasing() {
        let err = DbErr::Custom(
            "duplicate key value violates unique constraint \"idx_orders_transaction_id\""
                .to_string(),
        );
        assert!(is_duplicate_transaction(&err));
    }

    #[test]
    fn duplicate_detection_ignores_other_constraints() {
        let err = DbErr::Custom("UNIQUE constraint failed: customers.email".to_string());
        assert!(!is_duplicate_transaction(&err));

        let err = DbErr::Custom("connection reset by peer".to_string());
        assert!(!is_duplicate_transaction(&err));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let created = ReconciliationOutcome::Created {
            order_id: 7,
            items_written: 2,
            lines_skipped: 1,
        };
        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            json!({"outcome": "created", "order_id": 7, "items_written": 2, "lines_skipped": 1})
        );

        let duplicate = ReconciliationOutcome::AlreadyProcessed { order_id: None };
        assert_eq!(
            serde_json::to_value(&duplicate).unwrap(),
            json!({"outcome": "already_processed"})
        );
    }

    #[test]
    fn outcome_labels_are_stable() {
        assert_eq!(ReconciliationOutcome::SkippedNoCustomer.as_label(), "skipped_no_customer");
        assert_eq!(ReconciliationOutcome::SkippedEmptyCart.as_label(), "skipped_empty_cart");
        assert_eq!(
            ReconciliationOutcome::Failed { reason: "db down".into() }.as_label(),
            "failed"
        );
    }
}
