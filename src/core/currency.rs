//! Currency conversion - supported currencies, rate tables and formatting.
//!
//! Rates are expressed per unit of the table's base currency, so converting goes
//! through the base: `amount / rate[from] * rate[to]`. A code missing from the
//! live table is looked up in the built-in fallback table; conversion never fails,
//! it only loses precision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Display information for a supported currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyInfo {
    /// ISO-style three-letter code
    pub code: &'static str,
    /// Display symbol
    pub symbol: &'static str,
    /// English name
    pub name: &'static str,
}

/// Currencies accounts may be opened in.
pub const CURRENCIES: [CurrencyInfo; 8] = [
    CurrencyInfo { code: "USD", symbol: "$", name: "US Dollar" },
    CurrencyInfo { code: "EUR", symbol: "€", name: "Euro" },
    CurrencyInfo { code: "GBP", symbol: "£", name: "British Pound" },
    CurrencyInfo { code: "JPY", symbol: "¥", name: "Japanese Yen" },
    CurrencyInfo { code: "CNY", symbol: "¥", name: "Chinese Yuan" },
    CurrencyInfo { code: "SEK", symbol: "kr", name: "Swedish Krona" },
    CurrencyInfo { code: "AUD", symbol: "A$", name: "Australian Dollar" },
    CurrencyInfo { code: "CAD", symbol: "C$", name: "Canadian Dollar" },
];

/// Built-in USD-based rates used when no live rate is available.
pub const FALLBACK_RATES: [(&str, f64); 8] = [
    ("USD", 1.0),
    ("EUR", 0.85),
    ("GBP", 0.73),
    ("JPY", 110.0),
    ("CNY", 6.5),
    ("SEK", 10.87),
    ("AUD", 1.35),
    ("CAD", 1.25),
];

/// Base currency of the built-in table.
pub const FALLBACK_BASE: &str = "USD";

/// Looks up a supported currency by code.
#[must_use]
pub fn currency_info(code: &str) -> Option<&'static CurrencyInfo> {
    CURRENCIES.iter().find(|c| c.code == code)
}

/// Whether `code` is one of the supported currencies.
#[must_use]
pub fn is_supported_currency(code: &str) -> bool {
    currency_info(code).is_some()
}

fn fallback_rate(code: &str) -> Option<f64> {
    FALLBACK_RATES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, rate)| *rate)
}

/// Snapshot mapping currency codes to a rate per unit of `base`.
///
/// The base currency is always present with rate 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    base: String,
    rates: HashMap<String, f64>,
    last_updated: DateTime<Utc>,
}

impl RateTable {
    /// Builds a table, dropping non-finite or non-positive rates and forcing
    /// `rate[base] = 1`.
    pub fn new(
        base: impl Into<String>,
        rates: HashMap<String, f64>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        let base = base.into();
        let mut rates: HashMap<String, f64> = rates
            .into_iter()
            .filter(|(_, rate)| rate.is_finite() && *rate > 0.0)
            .collect();
        rates.insert(base.clone(), 1.0);
        Self {
            base,
            rates,
            last_updated,
        }
    }

    /// The static built-in table.
    #[must_use]
    pub fn fallback() -> Self {
        let rates = FALLBACK_RATES
            .iter()
            .map(|(code, rate)| ((*code).to_string(), *rate))
            .collect();
        Self::new(FALLBACK_BASE, rates, DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Base currency code.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Every known rate.
    #[must_use]
    pub const fn rates(&self) -> &HashMap<String, f64> {
        &self.rates
    }

    /// When the snapshot was taken.
    #[must_use]
    pub const fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Rate for `code` in this table, without fallback.
    #[must_use]
    pub fn rate(&self, code: &str) -> Option<f64> {
        self.rates.get(code).copied()
    }

    /// Rate for `code`, falling back to the built-in table, then to 1.
    fn rate_or_fallback(&self, code: &str) -> f64 {
        if let Some(rate) = self.rate(code) {
            return rate;
        }
        // The built-in table is USD-based; only usable as-is when we are too.
        if self.base == FALLBACK_BASE {
            if let Some(rate) = fallback_rate(code) {
                return rate;
            }
        } else if let (Some(rate), Some(base_in_usd)) =
            (fallback_rate(code), fallback_rate(&self.base))
        {
            return rate / base_in_usd;
        }
        warn!("No exchange rate known for {}, treating as 1:1", code);
        1.0
    }
}

/// Converts `amount` from one currency to another through the table's base.
///
/// Equal codes return `amount` untouched.
#[must_use]
pub fn convert(amount: f64, from: &str, to: &str, rates: &RateTable) -> f64 {
    if from == to {
        return amount;
    }
    let from_rate = rates.rate_or_fallback(from);
    let to_rate = rates.rate_or_fallback(to);
    amount / from_rate * to_rate
}

/// Formats the absolute value of `amount` with two decimals, thousands
/// separators and the currency symbol (or the raw code when unknown).
///
/// The sign is left to the caller.
#[must_use]
pub fn format_currency(amount: f64, code: &str) -> String {
    let symbol = currency_info(code).map_or(code, |c| c.symbol);
    format!("{symbol}{}", group_thousands(amount.abs()))
}

fn group_thousands(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let digits = whole.as_bytes();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(char::from(*digit));
    }
    format!("{grouped}.{fraction}")
}
