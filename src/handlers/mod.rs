pub mod orders;
pub mod payment_webhooks;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    CustomerService, OrderService, ProductCatalogService, ReconciliationService,
};
use std::sync::Arc;

pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub reconciliation: Arc<ReconciliationService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let customers = CustomerService::new(db_pool.clone());
        let products = ProductCatalogService::new(db_pool.clone());
        let reconciliation = Arc::new(ReconciliationService::new(
            db_pool.clone(),
            customers,
            products,
            event_sender,
            config.merchant_tz(),
        ));
        let orders = Arc::new(OrderService::new(db_pool));

        Self {
            reconciliation,
            orders,
        }
    }
}
