use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use marketplace_billing::{
    config::{self, AppConfig},
    currency::{round_money, Currency},
    metrics,
    models::{Household, Order, Product, Vendor},
    notifications::LogNotifier,
    services::{
        billing::{
            BillingMonth, BillingOptions, BillingQuery, BillingReport, DisplaySort, SortDirection,
            SortKey,
        },
        invoicing::JsonRenderer,
        order_status::OrderEvent,
        reconciliation::{PriceCatalog, ReconcileScope},
        returns::BillingEntry,
        totals::{compute_total, TotalPolicy},
    },
    store::RecordStore,
    AppServices, Stores,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config().context("failed to load configuration")?;
    // Production always logs JSON.
    config::init_tracing(config.log_level(), config.log_json || config.is_production());
    debug!(environment = %config.environment, "Configuration loaded");

    let outcome = match cli.command {
        Commands::Total(args) => handle_total(args, cli.json),
        Commands::Billing(args) => handle_billing(&config, args, cli.json).await,
        Commands::Reconcile(args) => handle_reconcile(&config, args, cli.json).await,
        Commands::Transition(args) => handle_transition(&config, args, cli.json).await,
        Commands::Invoice(args) => handle_invoice(&config, args, cli.json).await,
    };
    if cli.metrics {
        eprint!("{}", metrics::render().context("failed to render metrics")?);
    }
    outcome
}

#[derive(Parser)]
#[command(
    name = "marketplace-cli",
    about = "Order totals, billing and price reconciliation over JSON fixtures",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Print command counters to stderr on exit"
    )]
    metrics: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute one order's total under a policy
    Total(TotalArgs),
    /// Household and vendor billing summaries
    Billing(BillingArgs),
    /// Re-sync item prices and delivery fees with the catalog
    Reconcile(ReconcileArgs),
    /// Fire a status event on one order
    Transition(TransitionArgs),
    /// Render invoices and credit notes for the billing view
    Invoice(InvoiceArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    All,
    Shopped,
}

impl From<PolicyArg> for TotalPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::All => TotalPolicy::AllItems,
            PolicyArg::Shopped => TotalPolicy::ShoppedOnly,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CurrencyArg {
    Ils,
    Usd,
}

impl From<CurrencyArg> for Currency {
    fn from(value: CurrencyArg) -> Self {
        match value {
            CurrencyArg::Ils => Currency::Ils,
            CurrencyArg::Usd => Currency::Usd,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SortKeyArg {
    Created,
    Updated,
    Number,
    Total,
    Status,
}

impl From<SortKeyArg> for SortKey {
    fn from(value: SortKeyArg) -> Self {
        match value {
            SortKeyArg::Created => SortKey::CreatedDate,
            SortKeyArg::Updated => SortKey::UpdatedDate,
            SortKeyArg::Number => SortKey::OrderNumber,
            SortKeyArg::Total => SortKey::TotalAmount,
            SortKeyArg::Status => SortKey::Status,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SortDirectionArg {
    Asc,
    Desc,
}

impl From<SortDirectionArg> for SortDirection {
    fn from(value: SortDirectionArg) -> Self {
        match value {
            SortDirectionArg::Asc => SortDirection::Asc,
            SortDirectionArg::Desc => SortDirection::Desc,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EventArg {
    Start,
    Ready,
    Ship,
    Delivered,
    Cancel,
    Uncancel,
}

impl From<EventArg> for OrderEvent {
    fn from(value: EventArg) -> Self {
        match value {
            EventArg::Start => OrderEvent::StartProcessing,
            EventArg::Ready => OrderEvent::MarkReady,
            EventArg::Ship => OrderEvent::Ship,
            EventArg::Delivered => OrderEvent::MarkDelivered,
            EventArg::Cancel => OrderEvent::Cancel,
            EventArg::Uncancel => OrderEvent::Uncancel,
        }
    }
}

#[derive(Args)]
struct TotalArgs {
    #[arg(long, help = "JSON file with an array of orders")]
    orders: PathBuf,
    #[arg(long, help = "Order id")]
    id: Uuid,
    #[arg(long, value_enum, default_value = "all")]
    policy: PolicyArg,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long, help = "Only orders of this vendor")]
    vendor: Option<Uuid>,
    #[arg(long, help = "Only orders of this household")]
    household: Option<Uuid>,
}

#[derive(Args)]
struct BillingArgs {
    #[arg(long)]
    orders: PathBuf,
    #[arg(long, help = "Calendar month of the last update, YYYY-MM")]
    month: Option<String>,
    #[command(flatten)]
    filter: FilterArgs,
    #[arg(long, value_enum, default_value = "ils")]
    currency: CurrencyArg,
    #[arg(long, value_enum, default_value = "created")]
    sort: SortKeyArg,
    #[arg(long, value_enum, default_value = "desc")]
    direction: SortDirectionArg,
}

#[derive(Args)]
struct ReconcileArgs {
    #[arg(long)]
    orders: PathBuf,
    #[arg(long)]
    products: PathBuf,
    #[arg(long)]
    vendors: PathBuf,
    #[command(flatten)]
    filter: FilterArgs,
    #[arg(long, action = ArgAction::SetTrue, help = "Write reconciled orders back to the orders file")]
    write: bool,
}

#[derive(Args)]
struct TransitionArgs {
    #[arg(long)]
    orders: PathBuf,
    #[arg(long)]
    id: Uuid,
    #[arg(long, value_enum)]
    event: EventArg,
    #[arg(long, action = ArgAction::SetTrue, help = "Confirm a cancellation")]
    yes: bool,
    #[arg(long, action = ArgAction::SetTrue, help = "Write all orders back to the orders file")]
    write: bool,
}

#[derive(Args)]
struct InvoiceArgs {
    #[arg(long)]
    orders: PathBuf,
    #[arg(long)]
    vendors: Option<PathBuf>,
    #[arg(long)]
    households: Option<PathBuf>,
    #[arg(long, help = "Render only this order and its return")]
    id: Option<Uuid>,
    #[arg(long)]
    month: Option<String>,
    #[arg(long, value_enum, default_value = "ils")]
    currency: CurrencyArg,
    #[arg(long, value_enum, default_value = "all")]
    policy: PolicyArg,
    #[arg(long, help = "Directory the rendered documents are written to")]
    out: PathBuf,
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn read_optional<T: DeserializeOwned>(path: Option<&Path>) -> Result<Vec<T>> {
    path.map_or_else(|| Ok(Vec::new()), |p| read_records(p))
}

fn write_records(path: &Path, orders: &[Order]) -> Result<()> {
    let raw = serde_json::to_string_pretty(orders)?;
    fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))
}

fn parse_month(month: Option<&str>) -> Result<Option<BillingMonth>> {
    month
        .map(|m| m.parse::<BillingMonth>().map_err(|e| anyhow!(e)))
        .transpose()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_services(config: &AppConfig, stores: Stores) -> Result<AppServices> {
    AppServices::new(
        config,
        stores,
        Arc::new(LogNotifier),
        Arc::new(JsonRenderer),
    )
    .context("failed to assemble services")
}

fn handle_total(args: TotalArgs, json: bool) -> Result<()> {
    let orders: Vec<Order> = read_records(&args.orders)?;
    let order = orders
        .iter()
        .find(|o| o.id == args.id)
        .ok_or_else(|| anyhow!("order {} not found", args.id))?;
    let policy = TotalPolicy::from(args.policy);
    let total = compute_total(order, policy)?;

    if json {
        print_json(&serde_json::json!({
            "order_id": order.id,
            "policy": policy,
            "currency": order.order_currency,
            "total": round_money(total),
            "cached_total": order.total_amount,
        }))?;
    } else {
        println!(
            "Order {} total ({}): {} {}",
            order.order_number,
            policy,
            round_money(total),
            order.order_currency
        );
        if total != order.total_amount {
            println!("  cached total_amount is {}", order.total_amount);
        }
    }
    Ok(())
}

async fn handle_billing(config: &AppConfig, args: BillingArgs, json: bool) -> Result<()> {
    let orders: Vec<Order> = read_records(&args.orders)?;
    let services = build_services(config, Stores::in_memory(orders, vec![], vec![], vec![]))?;

    let query = BillingQuery {
        month: parse_month(args.month.as_deref())?,
        vendor_id: args.filter.vendor,
        household_id: args.filter.household,
    };
    let options = BillingOptions {
        currency: args.currency.into(),
        sort: DisplaySort {
            key: args.sort.into(),
            direction: args.direction.into(),
        },
        ..BillingOptions::default()
    };
    let report = services
        .billing
        .report(&query, options)
        .await
        .context("failed to build billing report")?;

    if json {
        print_json(&report)
    } else {
        render_report(&report);
        Ok(())
    }
}

fn render_entry(entry: &BillingEntry) {
    let paid = match entry.is_paid() {
        Some(true) => "paid",
        Some(false) => "unpaid",
        None => "-",
    };
    println!(
        "  {:<44} {:<20} {:>12} {} {}",
        entry.display_id(),
        entry.status_label(),
        round_money(entry.total_amount()),
        entry.currency(),
        paid
    );
}

fn render_report(report: &BillingReport) {
    let currency = report.options.currency;
    println!("Orders ({} entries):", report.entries.len());
    for entry in &report.entries {
        render_entry(entry);
    }

    println!("Households:");
    for h in &report.households {
        let label = h
            .household_id
            .map_or_else(|| "(none)".to_string(), |id| id.to_string());
        println!(
            "  {} orders {} (with returns {}) purchases {} returns {} net {} paid {} unpaid {} {}",
            label,
            h.total_orders,
            h.orders_with_returns,
            round_money(h.total_purchases),
            round_money(h.total_returns),
            round_money(h.net_purchases),
            round_money(h.total_paid),
            round_money(h.total_unpaid),
            currency
        );
    }

    println!("Vendors:");
    for v in &report.vendors {
        println!(
            "  {} orders {} paid {}/{} amount {} paid {} unpaid {} {} rate {}%",
            v.vendor_id,
            v.total_orders,
            v.paid_orders,
            v.total_orders,
            round_money(v.total_amount),
            round_money(v.paid_amount),
            round_money(v.unpaid_amount),
            currency,
            round_money(v.payment_rate * rust_decimal::Decimal::ONE_HUNDRED)
        );
    }
}

async fn handle_reconcile(config: &AppConfig, args: ReconcileArgs, json: bool) -> Result<()> {
    let orders: Vec<Order> = read_records(&args.orders)?;
    let products: Vec<Product> = read_records(&args.products)?;
    let vendors: Vec<Vendor> = read_records(&args.vendors)?;
    let catalog = Arc::new(PriceCatalog::new(&products, &vendors));
    let stores = Stores::in_memory(orders, vec![], vendors, products);
    let orders_store = stores.orders.clone();
    let services = build_services(config, stores)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight orders");
            interrupt.cancel();
        }
    });

    let scope = ReconcileScope {
        vendor_id: args.filter.vendor,
        household_id: args.filter.household,
    };
    let tally = services
        .reconciliation
        .reconcile_bulk(scope, catalog, &cancel)
        .await
        .context("failed to load orders for reconciliation")?;

    if json {
        print_json(&tally)?;
    } else {
        println!(
            "Reconciled: {} updated, {} unchanged, {} failed, {} not attempted",
            tally.updated,
            tally.skipped,
            tally.failed_count(),
            tally.not_attempted
        );
        for failure in &tally.failed {
            println!("  {} [{}]: {}", failure.order_id, failure.category, failure.error);
        }
    }

    if args.write {
        let orders = orders_store.list().await?;
        write_records(&args.orders, &orders)?;
    }
    Ok(())
}

async fn handle_transition(config: &AppConfig, args: TransitionArgs, json: bool) -> Result<()> {
    let orders: Vec<Order> = read_records(&args.orders)?;
    let stores = Stores::in_memory(orders, vec![], vec![], vec![]);
    let orders_store = stores.orders.clone();
    let services = build_services(config, stores)?;
    let service = &services.order_status;

    let event = OrderEvent::from(args.event);
    let order = match event {
        OrderEvent::StartProcessing => service.start_processing(args.id).await?,
        OrderEvent::MarkReady => service.mark_ready(args.id).await?,
        OrderEvent::Ship => {
            let result = service.ship(args.id).await?;
            if json {
                print_json(&result)?;
            } else {
                println!(
                    "Customer notified: {}; follow-up: {:?}",
                    result.customer_notified, result.follow_up
                );
            }
            result.order
        }
        OrderEvent::MarkDelivered => service.mark_delivered(args.id).await?,
        OrderEvent::Cancel => service.cancel(args.id, args.yes).await?,
        OrderEvent::Uncancel => service.uncancel(args.id).await?,
    };

    if json && event != OrderEvent::Ship {
        print_json(&order)?;
    } else if !json {
        println!("Order {} is now {}", order.order_number, order.status);
    }

    if args.write {
        let orders = orders_store.list().await?;
        write_records(&args.orders, &orders)?;
    }
    Ok(())
}

async fn handle_invoice(config: &AppConfig, args: InvoiceArgs, json: bool) -> Result<()> {
    let orders: Vec<Order> = read_records(&args.orders)?;
    let vendors: Vec<Vendor> = read_optional(args.vendors.as_deref())?;
    let households: Vec<Household> = read_optional(args.households.as_deref())?;
    let services = build_services(
        config,
        Stores::in_memory(orders, households, vendors, vec![]),
    )?;

    let query = BillingQuery {
        month: parse_month(args.month.as_deref())?,
        ..BillingQuery::default()
    };
    let report = services
        .billing
        .report(&query, BillingOptions::default())
        .await?;
    let entries: Vec<BillingEntry> = report
        .entries
        .into_iter()
        .filter(|e| args.id.map_or(true, |id| e.parent_id() == id))
        .collect();

    let tally = services
        .invoicing
        .export_all(
            &entries,
            args.currency.into(),
            args.policy.into(),
            &CancellationToken::new(),
        )
        .await;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    for doc in &tally.rendered {
        let path = args.out.join(format!("{}.json", doc.display_id));
        fs::write(&path, &doc.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if json {
        print_json(&tally)?;
    } else {
        println!(
            "Rendered {} documents into {}, {} failed",
            tally.rendered.len(),
            args.out.display(),
            tally.failed.len()
        );
    }
    Ok(())
}
