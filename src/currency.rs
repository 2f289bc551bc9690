//! Currency conversion between the two settlement currencies.
//!
//! Amounts are converted at a single process-wide rate expressed as shekels per
//! dollar. Nothing here rounds; rounding to cents happens only when a document
//! or report is built (see [`round_money`]).

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Rate observed in production: ILS per 1 USD.
pub const DEFAULT_ILS_PER_USD: Decimal = dec!(3.24);

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Currency {
    #[default]
    Ils,
    Usd,
}

/// Language a rendered document is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DocumentLanguage {
    English,
    Hebrew,
}

impl Currency {
    /// Invoices in dollars are always English and invoices in shekels always
    /// Hebrew. This pairing is a product rule and has no configuration knob.
    pub fn document_language(self) -> DocumentLanguage {
        match self {
            Currency::Usd => DocumentLanguage::English,
            Currency::Ils => DocumentLanguage::Hebrew,
        }
    }
}

/// Shekels per dollar. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct ExchangeRate(Decimal);

impl ExchangeRate {
    pub fn new(ils_per_usd: Decimal) -> Result<Self, ServiceError> {
        if ils_per_usd <= Decimal::ZERO {
            return Err(ServiceError::validation(format!(
                "exchange rate must be positive, got {}",
                ils_per_usd
            )));
        }
        Ok(Self(ils_per_usd))
    }

    pub fn ils_per_usd(&self) -> Decimal {
        self.0
    }

    pub fn convert(&self, amount: Decimal, from: Currency, to: Currency) -> Decimal {
        convert(amount, from, to, *self)
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self(DEFAULT_ILS_PER_USD)
    }
}

impl TryFrom<Decimal> for ExchangeRate {
    type Error = ServiceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        ExchangeRate::new(value)
    }
}

impl From<ExchangeRate> for Decimal {
    fn from(rate: ExchangeRate) -> Self {
        rate.0
    }
}

/// Converts `amount` from one currency into another. Same-currency conversion
/// is the identity.
pub fn convert(amount: Decimal, from: Currency, to: Currency, rate: ExchangeRate) -> Decimal {
    match (from, to) {
        (Currency::Usd, Currency::Ils) => amount * rate.0,
        (Currency::Ils, Currency::Usd) => amount / rate.0,
        _ => amount,
    }
}

/// Two-decimal rounding used at presentation and export boundaries. The result
/// always carries exactly two decimal places.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}
