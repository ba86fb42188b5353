// Read-side collaborators of the reconciliation pipeline
pub mod customers;
pub mod products;

// The core: payment event -> order records
pub mod reconciliation;

// Downstream read interface
pub mod orders;

pub use customers::CustomerService;
pub use orders::{OrderDetail, OrderService};
pub use products::ProductCatalogService;
pub use reconciliation::{ReconciliationOutcome, ReconciliationService};
