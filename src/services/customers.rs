use crate::{
    db::DbPool,
    entities::{customer, customer_address, CustomerStatus},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;

/// Read-only customer lookups for the reconciliation pipeline.
///
/// Payment notifications arrive server-to-server with no browser session, so
/// the buyer identity is recovered from the event's email alone. This service
/// never creates or mutates customer data.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DbPool>,
}

impl CustomerService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Finds the active customer with exactly this email, if any.
    ///
    /// Disabled accounts are treated the same as unknown emails: the caller
    /// skips the event instead of attributing an order to a dead account.
    #[instrument(skip(self))]
    pub async fn find_active_by_email(
        &self,
        email: &str,
    ) -> Result<Option<customer::Model>, ServiceError> {
        let found = customer::Entity::find()
            .filter(customer::Column::Email.eq(email))
            .filter(customer::Column::Status.eq(CustomerStatus::Active))
            .one(&*self.db)
            .await?;

        Ok(found)
    }

    /// The customer's default-flagged address id, if one exists.
    ///
    /// When several addresses carry the flag (legacy data), the oldest wins.
    #[instrument(skip(self))]
    pub async fn default_address_id(&self, customer_id: i32) -> Result<Option<i32>, ServiceError> {
        let address = customer_address::Entity::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .filter(customer_address::Column::IsDefault.eq(true))
            .order_by_asc(customer_address::Column::Id)
            .one(&*self.db)
            .await?;

        Ok(address.map(|a| a.id))
    }
}
