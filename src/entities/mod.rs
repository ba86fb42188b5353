pub mod customer;
pub mod customer_address;
pub mod order;
pub mod order_item;
pub mod product;

// Re-export entities
pub use customer::{CustomerStatus, Entity as Customer, Model as CustomerModel};
pub use customer_address::{Entity as CustomerAddress, Model as CustomerAddressModel};
pub use order::{Entity as Order, Model as OrderModel};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
