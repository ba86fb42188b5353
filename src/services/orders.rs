use crate::{
    db::DbPool,
    entities::{customer, order, order_item},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{instrument, warn};
use utoipa::ToSchema;

/// Read side of reconciliation: order retrieval for the confirmation page.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
}

/// An order joined with its customer and item rows.
///
/// `customer` is optional so a dangling `customer_id` (the account was
/// deleted after the order) degrades to a partial view instead of a 404 on
/// an order that does exist.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    pub order: order::Model,
    pub customer: Option<customer::Model>,
    pub items: Vec<order_item::Model>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Loads the order recorded for a processor transaction, with its
    /// customer and items. The confirmation page polls this right after
    /// checkout, so `None` usually means the webhook has not landed yet.
    #[instrument(skip(self))]
    pub async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<OrderDetail>, ServiceError> {
        let found = order::Entity::find()
            .filter(order::Column::TransactionId.eq(transaction_id))
            .one(&*self.db)
            .await?;

        let order = match found {
            Some(order) => order,
            None => return Ok(None),
        };

        let customer = customer::Entity::find_by_id(order.customer_id)
            .one(&*self.db)
            .await?;
        if customer.is_none() {
            warn!(
                order_id = order.id,
                customer_id = order.customer_id,
                "Order references a customer that no longer exists"
            );
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?;

        Ok(Some(OrderDetail {
            order,
            customer,
            items,
        }))
    }
}
