// Pure calculations
pub mod returns;
pub mod totals;

// Order lifecycle
pub mod order_status;
pub mod orders;

// Billing and documents
pub mod billing;
pub mod bulk;
pub mod invoicing;
pub mod reconciliation;
