pub mod catalog;
pub mod order;
pub mod order_item;

pub use catalog::{Household, Product, Vendor};
pub use order::{Order, OrderNumber, OrderStatus, PaymentMethod, PaymentStatus};
pub use order_item::OrderItem;
