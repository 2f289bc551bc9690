//! Prometheus counters for order commands.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use tracing::warn;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ORDERS_SHIPPED: IntCounter =
        registered("orders_shipped_total", "Total number of orders shipped");
    pub static ref ORDER_SHIP_FAILURES: IntCounter = registered(
        "order_ship_failures_total",
        "Total number of failed order shipments"
    );
    pub static ref FOLLOW_UP_FAILURES: IntCounter = registered(
        "follow_up_failures_total",
        "Shipped orders whose follow-up order could not be created"
    );
    pub static ref ORDERS_CANCELLED: IntCounter =
        registered("orders_cancelled_total", "Total number of orders cancelled");
    pub static ref RETURNS_RECORDED: IntCounter =
        registered("returns_recorded_total", "Total number of item returns recorded");
    pub static ref ORDERS_REPRICED: IntCounter = registered(
        "orders_repriced_total",
        "Orders rewritten by catalog price reconciliation"
    );
    pub static ref REPRICE_FAILURES: IntCounter = registered(
        "reprice_failures_total",
        "Orders that failed catalog price reconciliation"
    );
}

fn registered(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric can be created");
    if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
        warn!(metric = name, error = %e, "Metric not registered");
    }
    counter
}

/// Current values of every counter in the text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_once_touched() {
        let before = ORDERS_CANCELLED.get();
        ORDERS_CANCELLED.inc();
        assert!(ORDERS_CANCELLED.get() > before);

        let text = render().unwrap();
        assert!(text.contains("# TYPE orders_cancelled_total counter"));
    }
}
