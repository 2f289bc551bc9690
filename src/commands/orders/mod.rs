pub mod cancel_order_command;
pub mod override_order_status_command;
pub mod reconcile_order_prices_command;
pub mod record_return_command;
pub mod ship_order_command;
pub mod transition_order_command;
pub mod update_delivery_time_command;
pub mod update_item_prices_command;
pub mod update_payment_command;

// Re-export commands for easier access
pub use cancel_order_command::CancelOrderCommand;
pub use override_order_status_command::OverrideOrderStatusCommand;
pub use reconcile_order_prices_command::{ReconcileOrderPricesCommand, ReconcileOutcome};
pub use record_return_command::RecordReturnCommand;
pub use ship_order_command::{FollowUpOutcome, ShipOrderCommand, ShipOrderResult};
pub use transition_order_command::TransitionOrderCommand;
pub use update_delivery_time_command::{UpdateDeliveryTimeCommand, UpdateDeliveryTimeResult};
pub use update_item_prices_command::{PriceChange, UpdateItemPricesCommand};
pub use update_payment_command::UpdatePaymentCommand;
