//! Billing aggregation.
//!
//! Billable orders (out for delivery or delivered) are filtered by calendar
//! month, vendor and household, expanded with their virtual returns, and
//! folded into per-household and per-vendor summaries.

use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    currency::{Currency, ExchangeRate},
    errors::ServiceError,
    models::Order,
    services::{
        returns::{expand, BillingEntry},
        totals::{compute_total, TotalPolicy},
    },
    store::{remote_call, Query, RecordStore},
};

/// A calendar month, matched against `updated_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingMonth {
    pub year: i32,
    pub month: u32,
}

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, ServiceError> {
        if !(1..=12).contains(&month) {
            return Err(ServiceError::validation(format!("invalid month {}", month)));
        }
        Ok(Self { year, month })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at.year() == self.year && at.month() == self.month
    }
}

impl FromStr for BillingMonth {
    type Err = ServiceError;

    /// Parses `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ServiceError::validation(format!("expected YYYY-MM, got '{}'", s));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        BillingMonth::new(year, month)
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Which orders a billing view covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingQuery {
    pub month: Option<BillingMonth>,
    pub vendor_id: Option<Uuid>,
    pub household_id: Option<Uuid>,
}

impl BillingQuery {
    pub fn matches(&self, order: &Order) -> bool {
        order.status.is_billable()
            && self.month.map_or(true, |m| m.contains(order.updated_date))
            && self.vendor_id.map_or(true, |v| order.vendor_id == v)
            && self
                .household_id
                .map_or(true, |h| order.household_id == Some(h))
    }

    pub fn to_store_query(&self) -> Query<Order> {
        let query = self.clone();
        Query::filter(move |order: &Order| query.matches(order))
    }
}

/// Where order amounts come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "basis", content = "policy", rename_all = "snake_case")]
pub enum AmountBasis {
    /// The persisted `total_amount` cache.
    #[default]
    CachedTotal,
    /// Recomputed from items under the given policy.
    Computed(TotalPolicy),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortKey {
    #[default]
    CreatedDate,
    UpdatedDate,
    OrderNumber,
    TotalAmount,
    Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySort {
    pub key: SortKey,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingOptions {
    /// Currency every summary amount is expressed in.
    pub currency: Currency,
    pub basis: AmountBasis,
    pub sort: DisplaySort,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HouseholdSummary {
    pub household_id: Option<Uuid>,
    pub total_orders: usize,
    pub orders_with_returns: usize,
    pub total_purchases: Decimal,
    pub total_returns: Decimal,
    pub net_purchases: Decimal,
    pub total_paid: Decimal,
    /// `net_purchases - total_paid`. Goes negative when a paid order later has
    /// returns, because paid is gross and purchases are net.
    pub total_unpaid: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorSummary {
    pub vendor_id: Uuid,
    pub total_orders: usize,
    pub paid_orders: usize,
    pub unpaid_orders: usize,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub unpaid_amount: Decimal,
    /// `paid_amount / total_amount`, zero when nothing was billed.
    pub payment_rate: Decimal,
}

impl VendorSummary {
    fn new(vendor_id: Uuid) -> Self {
        Self {
            vendor_id,
            total_orders: 0,
            paid_orders: 0,
            unpaid_orders: 0,
            total_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            unpaid_amount: Decimal::ZERO,
            payment_rate: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingReport {
    pub query: BillingQuery,
    pub options: BillingOptions,
    /// Orders with each virtual return directly after its parent.
    pub entries: Vec<BillingEntry>,
    pub households: Vec<HouseholdSummary>,
    pub vendors: Vec<VendorSummary>,
}

impl BillingReport {
    pub fn household(&self, household_id: Option<Uuid>) -> Option<&HouseholdSummary> {
        self.households
            .iter()
            .find(|h| h.household_id == household_id)
    }

    pub fn vendor(&self, vendor_id: Uuid) -> Option<&VendorSummary> {
        self.vendors.iter().find(|v| v.vendor_id == vendor_id)
    }
}

/// Amount of `order` under `basis`, converted into `currency`.
fn order_amount(
    order: &Order,
    basis: AmountBasis,
    currency: Currency,
    rate: ExchangeRate,
) -> Result<Decimal, ServiceError> {
    let amount = match basis {
        AmountBasis::CachedTotal => order.total_amount,
        AmountBasis::Computed(policy) => compute_total(order, policy)?,
    };
    Ok(rate.convert(amount, order.order_currency, currency))
}

fn compare_orders(a: (&Order, Decimal), b: (&Order, Decimal), key: SortKey) -> Ordering {
    let ((a, a_amount), (b, b_amount)) = (a, b);
    match key {
        SortKey::CreatedDate => a.created_date.cmp(&b.created_date),
        SortKey::UpdatedDate => a.updated_date.cmp(&b.updated_date),
        SortKey::OrderNumber => a.order_number.cmp(&b.order_number),
        SortKey::TotalAmount => a_amount.cmp(&b_amount),
        SortKey::Status => a.status.to_string().cmp(&b.status.to_string()),
    }
}

/// Flat order-and-return sequence. Orders are sorted by the selected key with
/// the order id as tie-break; a virtual return always follows its parent.
/// `TotalAmount` sorts by the amount the report's basis and currency produce.
pub fn display_sequence(
    orders: &[Order],
    options: BillingOptions,
    rate: ExchangeRate,
) -> Result<Vec<BillingEntry>, ServiceError> {
    let mut parents = orders
        .iter()
        .map(|order| Ok((order, order_amount(order, options.basis, options.currency, rate)?)))
        .collect::<Result<Vec<(&Order, Decimal)>, ServiceError>>()?;
    parents.sort_by(|a, b| {
        let ord = compare_orders(*a, *b, options.sort.key);
        let ord = match options.sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        ord.then_with(|| a.0.id.cmp(&b.0.id))
    });
    Ok(parents
        .into_iter()
        .flat_map(|(order, _)| expand(order))
        .collect())
}

/// Per-household totals over real orders.
pub fn household_summaries(
    orders: &[Order],
    options: BillingOptions,
    rate: ExchangeRate,
) -> Result<Vec<HouseholdSummary>, ServiceError> {
    let mut by_household: BTreeMap<Option<Uuid>, HouseholdSummary> = BTreeMap::new();
    for order in orders {
        let amount = order_amount(order, options.basis, options.currency, rate)?;
        let returns = rate.convert(order.returned_value(), order.order_currency, options.currency);

        let summary = by_household
            .entry(order.household_id)
            .or_insert_with(|| HouseholdSummary {
                household_id: order.household_id,
                ..HouseholdSummary::default()
            });
        summary.total_orders += 1;
        if order.has_credited_returns() {
            summary.orders_with_returns += 1;
        }
        summary.total_purchases += amount;
        summary.total_returns += returns;
        if order.is_paid {
            summary.total_paid += amount;
        }
    }

    Ok(by_household
        .into_values()
        .map(|mut summary| {
            summary.net_purchases = summary.total_purchases - summary.total_returns;
            summary.total_unpaid = summary.net_purchases - summary.total_paid;
            summary
        })
        .collect())
}

/// Per-vendor payment bookkeeping over real orders.
pub fn vendor_summaries(
    orders: &[Order],
    options: BillingOptions,
    rate: ExchangeRate,
) -> Result<Vec<VendorSummary>, ServiceError> {
    let mut by_vendor: BTreeMap<Uuid, VendorSummary> = BTreeMap::new();
    for order in orders {
        let amount = order_amount(order, options.basis, options.currency, rate)?;
        let summary = by_vendor
            .entry(order.vendor_id)
            .or_insert_with(|| VendorSummary::new(order.vendor_id));
        summary.total_orders += 1;
        summary.total_amount += amount;
        if order.is_paid {
            summary.paid_orders += 1;
            summary.paid_amount += amount;
        } else {
            summary.unpaid_orders += 1;
        }
    }

    Ok(by_vendor
        .into_values()
        .map(|mut summary| {
            summary.unpaid_amount = summary.total_amount - summary.paid_amount;
            summary.payment_rate = if summary.total_amount.is_zero() {
                Decimal::ZERO
            } else {
                summary.paid_amount / summary.total_amount
            };
            summary
        })
        .collect())
}

/// Builds the full billing view from an already-loaded order set. Orders that
/// do not match `query` are ignored.
pub fn build_report(
    orders: &[Order],
    query: &BillingQuery,
    options: BillingOptions,
    rate: ExchangeRate,
) -> Result<BillingReport, ServiceError> {
    let billable: Vec<Order> = orders
        .iter()
        .filter(|order| query.matches(order))
        .cloned()
        .collect();

    Ok(BillingReport {
        query: query.clone(),
        options,
        entries: display_sequence(&billable, options, rate)?,
        households: household_summaries(&billable, options, rate)?,
        vendors: vendor_summaries(&billable, options, rate)?,
    })
}

/// Loads billable orders from the store and aggregates them.
#[derive(Clone)]
pub struct BillingService {
    orders: Arc<dyn RecordStore<Order>>,
    rate: ExchangeRate,
    remote_timeout: Duration,
}

impl BillingService {
    pub fn new(
        orders: Arc<dyn RecordStore<Order>>,
        rate: ExchangeRate,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            orders,
            rate,
            remote_timeout,
        }
    }

    pub fn rate(&self) -> ExchangeRate {
        self.rate
    }

    #[instrument(skip(self))]
    pub async fn load_billable(&self, query: &BillingQuery) -> Result<Vec<Order>, ServiceError> {
        let store_query = query.to_store_query();
        let orders = remote_call(
            self.remote_timeout,
            "filter",
            "billable orders",
            self.orders.filter(&store_query),
        )
        .await?;
        debug!(count = orders.len(), "Loaded billable orders");
        Ok(orders)
    }

    #[instrument(skip(self))]
    pub async fn report(
        &self,
        query: &BillingQuery,
        options: BillingOptions,
    ) -> Result<BillingReport, ServiceError> {
        let orders = self.load_billable(query).await?;
        build_report(&orders, query, options, self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderItem, OrderStatus};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn billable(vendor: Uuid, household: Option<Uuid>, total: Decimal) -> Order {
        let mut order = Order::new(vendor, household, "b@b.test");
        order.status = OrderStatus::Delivered;
        order.total_amount = total;
        order
    }

    fn add_return(order: &mut Order, price: Decimal, amount: Decimal) {
        let mut item = OrderItem::new(Uuid::new_v4(), "returned", price, amount);
        item.actual_quantity = Some(amount);
        item.is_returned = true;
        item.amount_returned = amount;
        order.items.push(item);
        order.refresh_return_flag();
    }

    #[test]
    fn month_parsing_and_matching() {
        let month: BillingMonth = "2024-02".parse().unwrap();
        assert_eq!(month, BillingMonth { year: 2024, month: 2 });
        assert_eq!(month.to_string(), "2024-02");
        assert!(month.contains(Utc.with_ymd_and_hms(2024, 2, 29, 23, 0, 0).unwrap()));
        assert!(!month.contains(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
        assert!("2024-13".parse::<BillingMonth>().is_err());
        assert!("202402".parse::<BillingMonth>().is_err());
    }

    #[test]
    fn query_keeps_only_billable_statuses() {
        let vendor = Uuid::new_v4();
        let mut shopping = billable(vendor, None, dec!(10));
        shopping.status = OrderStatus::Shopping;
        let mut delivery = billable(vendor, None, dec!(10));
        delivery.status = OrderStatus::Delivery;
        let query = BillingQuery::default();
        assert!(!query.matches(&shopping));
        assert!(query.matches(&delivery));
    }

    #[test]
    fn household_summary_reproduces_current_formula() {
        let vendor = Uuid::new_v4();
        let household = Some(Uuid::new_v4());
        let mut paid = billable(vendor, household, dec!(100));
        paid.is_paid = true;
        add_return(&mut paid, dec!(10), dec!(2));
        let unpaid = billable(vendor, household, dec!(50));

        let summaries = household_summaries(
            &[paid, unpaid],
            BillingOptions::default(),
            ExchangeRate::default(),
        )
        .unwrap();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.total_orders, 2);
        assert_eq!(s.orders_with_returns, 1);
        assert_eq!(s.total_purchases, dec!(150));
        assert_eq!(s.total_returns, dec!(20));
        assert_eq!(s.net_purchases, dec!(130));
        assert_eq!(s.total_paid, dec!(100));
        assert_eq!(s.total_unpaid, dec!(30));
    }

    #[test]
    fn unpaid_goes_negative_when_fully_paid_order_has_returns() {
        let mut paid = billable(Uuid::new_v4(), Some(Uuid::new_v4()), dec!(100));
        paid.is_paid = true;
        add_return(&mut paid, dec!(10), dec!(2));

        let summaries =
            household_summaries(&[paid], BillingOptions::default(), ExchangeRate::default())
                .unwrap();
        assert_eq!(summaries[0].total_unpaid, dec!(-20));
    }

    #[test]
    fn vendor_summary_payment_rate() {
        let vendor = Uuid::new_v4();
        let mut paid = billable(vendor, None, dec!(30));
        paid.is_paid = true;
        let unpaid = billable(vendor, None, dec!(90));
        let idle = Uuid::new_v4();
        let zero = billable(idle, None, Decimal::ZERO);

        let summaries = vendor_summaries(
            &[paid, unpaid, zero],
            BillingOptions::default(),
            ExchangeRate::default(),
        )
        .unwrap();
        let v = summaries.iter().find(|s| s.vendor_id == vendor).unwrap();
        assert_eq!(v.total_orders, 2);
        assert_eq!(v.paid_orders, 1);
        assert_eq!(v.unpaid_orders, 1);
        assert_eq!(v.total_amount, dec!(120));
        assert_eq!(v.paid_amount, dec!(30));
        assert_eq!(v.unpaid_amount, dec!(90));
        assert_eq!(v.payment_rate, dec!(0.25));

        let z = summaries.iter().find(|s| s.vendor_id == idle).unwrap();
        assert_eq!(z.payment_rate, Decimal::ZERO);
    }

    #[test]
    fn summaries_convert_into_report_currency() {
        let vendor = Uuid::new_v4();
        let mut usd = billable(vendor, None, dec!(10));
        usd.order_currency = Currency::Usd;
        let ils = billable(vendor, None, dec!(7.60));

        let options = BillingOptions {
            currency: Currency::Ils,
            ..BillingOptions::default()
        };
        let summaries = vendor_summaries(&[usd, ils], options, ExchangeRate::default()).unwrap();
        assert_eq!(summaries[0].total_amount, dec!(40.00));
    }

    #[test]
    fn computed_basis_ignores_stale_cache() {
        let vendor = Uuid::new_v4();
        let mut order = billable(vendor, None, dec!(999));
        order.delivery_price = dec!(5);
        order
            .items
            .push(OrderItem::new(Uuid::new_v4(), "x", dec!(10), dec!(2)));

        let options = BillingOptions {
            basis: AmountBasis::Computed(TotalPolicy::AllItems),
            ..BillingOptions::default()
        };
        let summaries = vendor_summaries(&[order], options, ExchangeRate::default()).unwrap();
        assert_eq!(summaries[0].total_amount, dec!(25));
    }

    #[test]
    fn returns_stay_next_to_parent_under_any_sort() {
        let vendor = Uuid::new_v4();
        let mut big = billable(vendor, None, dec!(300));
        add_return(&mut big, dec!(5), dec!(1));
        let small = billable(vendor, None, dec!(10));
        let mut mid = billable(vendor, None, dec!(100));
        add_return(&mut mid, dec!(1), dec!(1));

        let orders = vec![small.clone(), big.clone(), mid.clone()];
        let options = BillingOptions {
            sort: DisplaySort {
                key: SortKey::TotalAmount,
                direction: SortDirection::Asc,
            },
            ..BillingOptions::default()
        };
        let seq: Vec<(Uuid, bool)> = display_sequence(&orders, options, ExchangeRate::default())
            .unwrap()
            .iter()
            .map(|e| (e.parent_id(), e.is_virtual()))
            .collect();
        assert_eq!(
            seq,
            vec![
                (small.id, false),
                (mid.id, false),
                (mid.id, true),
                (big.id, false),
                (big.id, true),
            ]
        );
    }

    #[test]
    fn equal_keys_fall_back_to_order_id() {
        let vendor = Uuid::new_v4();
        let orders: Vec<Order> = (0..4).map(|_| billable(vendor, None, dec!(10))).collect();
        let mut expected: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        expected.sort();

        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let options = BillingOptions {
                sort: DisplaySort {
                    key: SortKey::TotalAmount,
                    direction,
                },
                ..BillingOptions::default()
            };
            let mut reversed = orders.clone();
            reversed.reverse();
            let ids: Vec<Uuid> = display_sequence(&reversed, options, ExchangeRate::default())
                .unwrap()
                .iter()
                .map(BillingEntry::parent_id)
                .collect();
            assert_eq!(ids, expected);
        }
    }

    #[test]
    fn amount_sort_follows_computed_basis() {
        let vendor = Uuid::new_v4();
        // Stale caches point the other way from the items.
        let mut cheap = billable(vendor, None, dec!(500));
        cheap
            .items
            .push(OrderItem::new(Uuid::new_v4(), "salt", dec!(1), dec!(1)));
        let mut dear = billable(vendor, None, dec!(5));
        dear.items
            .push(OrderItem::new(Uuid::new_v4(), "saffron", dec!(90), dec!(1)));

        let options = BillingOptions {
            basis: AmountBasis::Computed(TotalPolicy::AllItems),
            sort: DisplaySort {
                key: SortKey::TotalAmount,
                direction: SortDirection::Asc,
            },
            ..BillingOptions::default()
        };
        let orders = [dear.clone(), cheap.clone()];
        let ids: Vec<Uuid> = display_sequence(&orders, options, ExchangeRate::default())
            .unwrap()
            .iter()
            .map(BillingEntry::parent_id)
            .collect();
        assert_eq!(ids, vec![cheap.id, dear.id]);
    }

    #[test]
    fn stale_return_flag_is_read_consistently() {
        let household = Some(Uuid::new_v4());
        let mut order = billable(Uuid::new_v4(), household, dec!(30));
        add_return(&mut order, dec!(10), dec!(2));
        order.has_returned_item = false;

        let report = build_report(
            &[order],
            &BillingQuery::default(),
            BillingOptions::default(),
            ExchangeRate::default(),
        )
        .unwrap();
        assert_eq!(report.entries.len(), 1);
        let summary = report.household(household).unwrap();
        assert_eq!(summary.orders_with_returns, 0);
        assert_eq!(summary.total_returns, Decimal::ZERO);
    }

    #[test]
    fn report_filters_by_vendor_and_month() {
        let vendor = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut in_month = billable(vendor, None, dec!(10));
        in_month.updated_date = Utc.with_ymd_and_hms(2024, 5, 3, 8, 0, 0).unwrap();
        let mut out_of_month = billable(vendor, None, dec!(20));
        out_of_month.updated_date = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut other_vendor = billable(other, None, dec!(30));
        other_vendor.updated_date = in_month.updated_date;

        let query = BillingQuery {
            month: Some(BillingMonth::new(2024, 5).unwrap()),
            vendor_id: Some(vendor),
            household_id: None,
        };
        let report = build_report(
            &[in_month.clone(), out_of_month, other_vendor],
            &query,
            BillingOptions::default(),
            ExchangeRate::default(),
        )
        .unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].parent_id(), in_month.id);
        assert_eq!(report.vendors.len(), 1);
        assert!(report.vendor(other).is_none());
    }
}
