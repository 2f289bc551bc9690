//! Invoice and credit-note documents.
//!
//! Amounts are converted from the order's currency into the document currency
//! and rounded to cents here, at the presentation boundary. The document
//! language follows the currency (USD in English, ILS in Hebrew) and cannot be
//! chosen separately.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    currency::{round_money, Currency, DocumentLanguage, ExchangeRate},
    errors::{BatchFailure, ServiceError},
    models::{Household, Order, Vendor},
    services::{
        bulk::{paced, BulkSettings},
        returns::{BillingEntry, VirtualReturn},
        totals::{compute_total, TotalPolicy},
    },
    store::{remote_call, RecordStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    CreditNote,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: Option<String>,
    pub unit: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDocument {
    pub kind: DocumentKind,
    /// Order id, or `<order id>-return` for a credit note.
    pub display_id: String,
    pub order_id: Uuid,
    pub order_number: String,
    pub currency: Currency,
    pub language: DocumentLanguage,
    /// Rate the amounts were converted at.
    pub ils_per_usd: Decimal,
    pub policy: TotalPolicy,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub issued_at: DateTime<Utc>,
}

/// Builds the invoice for a real order. Only items contributing under
/// `policy` are listed.
pub fn invoice_document(
    order: &Order,
    currency: Currency,
    policy: TotalPolicy,
    rate: ExchangeRate,
) -> Result<InvoiceDocument, ServiceError> {
    // Validates amounts and bounds every line product.
    compute_total(order, policy)?;
    let convert = |amount| round_money(rate.convert(amount, order.order_currency, currency));

    let lines: Vec<InvoiceLine> = order
        .items
        .iter()
        .filter_map(|item| {
            policy.billed_quantity(item).map(|quantity| InvoiceLine {
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                sku: item.sku.clone(),
                unit: item.unit.clone(),
                quantity,
                unit_price: convert(item.price),
                line_total: convert(item.price * quantity),
            })
        })
        .collect();
    let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();
    let delivery_fee = convert(order.delivery_price);

    Ok(InvoiceDocument {
        kind: DocumentKind::Invoice,
        display_id: order.id.to_string(),
        order_id: order.id,
        order_number: order.order_number.clone(),
        currency,
        language: currency.document_language(),
        ils_per_usd: rate.ils_per_usd(),
        policy,
        lines,
        subtotal,
        delivery_fee,
        total: subtotal + delivery_fee,
        issued_at: order.updated_date,
    })
}

/// Builds the credit note for a virtual return. Lines are negative and no
/// delivery fee is charged.
pub fn credit_note_document(
    ret: &VirtualReturn,
    currency: Currency,
    rate: ExchangeRate,
) -> InvoiceDocument {
    let convert = |amount| round_money(rate.convert(amount, ret.order_currency, currency));

    let lines: Vec<InvoiceLine> = ret
        .lines
        .iter()
        .map(|line| InvoiceLine {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            sku: line.sku.clone(),
            unit: line.unit.clone(),
            quantity: line.amount_returned,
            unit_price: convert(line.price),
            line_total: convert(line.credit),
        })
        .collect();
    let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();

    InvoiceDocument {
        kind: DocumentKind::CreditNote,
        display_id: ret.display_id(),
        order_id: ret.parent_id,
        order_number: ret.parent_order_number.clone(),
        currency,
        language: currency.document_language(),
        ils_per_usd: rate.ils_per_usd(),
        policy: TotalPolicy::AllItems,
        lines,
        subtotal,
        delivery_fee: Decimal::ZERO,
        total: subtotal,
        issued_at: ret.updated_date,
    }
}

/// Everything the renderer receives for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRequest {
    pub document: InvoiceDocument,
    pub vendor: Option<Vendor>,
    pub household: Option<Household>,
    pub language: DocumentLanguage,
}

#[derive(Error, Debug)]
pub enum RenderFailure {
    #[error("Template error: {0}")]
    Template(String),
    #[error("Renderer unavailable: {0}")]
    Unavailable(String),
}

/// Turns a document into HTML or PDF bytes. The output is opaque here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderFailure>;
}

/// Renders the request as pretty-printed JSON.
#[derive(Debug, Default, Clone)]
pub struct JsonRenderer;

#[async_trait]
impl DocumentRenderer for JsonRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderFailure> {
        serde_json::to_vec_pretty(request).map_err(|e| RenderFailure::Template(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedDocument {
    pub display_id: String,
    pub order_id: Uuid,
    pub kind: DocumentKind,
    pub language: DocumentLanguage,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Outcome of a bulk export.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportTally {
    pub rendered: Vec<RenderedDocument>,
    pub failed: Vec<BatchFailure>,
    pub not_attempted: usize,
}

#[derive(Clone)]
pub struct InvoiceService {
    renderer: Arc<dyn DocumentRenderer>,
    vendors: Arc<dyn RecordStore<Vendor>>,
    households: Arc<dyn RecordStore<Household>>,
    rate: ExchangeRate,
    remote_timeout: Duration,
    settings: BulkSettings,
}

impl InvoiceService {
    pub fn new(
        renderer: Arc<dyn DocumentRenderer>,
        vendors: Arc<dyn RecordStore<Vendor>>,
        households: Arc<dyn RecordStore<Household>>,
        rate: ExchangeRate,
        remote_timeout: Duration,
        settings: BulkSettings,
    ) -> Self {
        Self {
            renderer,
            vendors,
            households,
            rate,
            remote_timeout,
            settings,
        }
    }

    pub fn document_for(
        &self,
        entry: &BillingEntry,
        currency: Currency,
        policy: TotalPolicy,
    ) -> Result<InvoiceDocument, ServiceError> {
        match entry {
            BillingEntry::Order(order) => invoice_document(order, currency, policy, self.rate),
            BillingEntry::Return(ret) => Ok(credit_note_document(ret, currency, self.rate)),
        }
    }

    /// Missing reference records are tolerated; the document renders without
    /// them.
    async fn lookup<R: crate::store::Record>(
        &self,
        store: &dyn RecordStore<R>,
        id: Uuid,
    ) -> Result<Option<R>, ServiceError> {
        match remote_call(self.remote_timeout, "get", id, store.get(id)).await {
            Ok(record) => Ok(Some(record)),
            Err(ServiceError::NotFound(what)) => {
                warn!(record = %what, "Reference record missing; rendering without it");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, entry), fields(display_id = %entry.display_id()))]
    pub async fn render_entry(
        &self,
        entry: &BillingEntry,
        currency: Currency,
        policy: TotalPolicy,
    ) -> Result<RenderedDocument, ServiceError> {
        let document = self.document_for(entry, currency, policy)?;
        let vendor = self.lookup(self.vendors.as_ref(), entry.vendor_id()).await?;
        let household = match entry.household_id() {
            Some(id) => self.lookup(self.households.as_ref(), id).await?,
            None => None,
        };

        let request = RenderRequest {
            language: document.language,
            document,
            vendor,
            household,
        };
        let bytes = match tokio::time::timeout(self.remote_timeout, self.renderer.render(&request))
            .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(ServiceError::RenderError(format!(
                    "{}: {}",
                    request.document.display_id, e
                )))
            }
            Err(_) => {
                return Err(ServiceError::Timeout {
                    operation: "render",
                    record_id: request.document.display_id,
                })
            }
        };

        Ok(RenderedDocument {
            display_id: request.document.display_id,
            order_id: request.document.order_id,
            kind: request.document.kind,
            language: request.language,
            bytes,
        })
    }

    /// Renders every entry, continuing past individual failures. Output keeps
    /// the order of `entries`.
    #[instrument(skip(self, entries, cancel), fields(count = entries.len()))]
    pub async fn export_all(
        &self,
        entries: &[BillingEntry],
        currency: Currency,
        policy: TotalPolicy,
        cancel: &CancellationToken,
    ) -> ExportTally {
        let pacing = self.settings.pacing;
        let results: Vec<(usize, Result<RenderedDocument, ServiceError>)> =
            stream::iter(entries.iter().enumerate())
                .map(|(index, entry)| async move {
                    let result =
                        paced(index, pacing, cancel, self.render_entry(entry, currency, policy))
                            .await;
                    (index, result)
                })
                .buffer_unordered(self.settings.concurrency())
                .collect()
                .await;

        let mut ordered = results;
        ordered.sort_by_key(|(index, _)| *index);

        let mut tally = ExportTally::default();
        for (index, result) in ordered {
            match result {
                Ok(doc) => tally.rendered.push(doc),
                Err(ServiceError::Cancelled) => tally.not_attempted += 1,
                Err(e) => {
                    let entry = &entries[index];
                    error!(display_id = %entry.display_id(), error = %e, "Failed to export document");
                    tally.failed.push(BatchFailure::new(entry.parent_id(), &e));
                }
            }
        }

        info!(
            rendered = tally.rendered.len(),
            failed = tally.failed.len(),
            not_attempted = tally.not_attempted,
            "Document export finished"
        );
        tally
    }
}
