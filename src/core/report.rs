//! Report generation business logic.
//!
//! This module turns the ledger's accounts and transactions into display-currency
//! aggregates: total balance, monthly income and expenses, savings rate, the
//! expense category breakdown and the month-by-month trend. Every amount is
//! converted from its own currency with the shared rate table before it is summed.
//! All functions are pure and return structured data for the presentation layer.

use crate::{
    core::{
        currency::{RateTable, convert, format_currency},
        ledger::Ledger,
        preferences::Preferences,
    },
    entities::{Category, TransactionKind, account, transaction},
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Shown in place of an amount while balances are hidden.
pub const MASKED_AMOUNT: &str = "••••••";

/// Income and expenses for one calendar month, in the display currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MonthlyTotals {
    /// Sum of income
    pub income: f64,
    /// Sum of expenses, as a positive number
    pub expenses: f64,
}

impl MonthlyTotals {
    /// Income minus expenses.
    #[must_use]
    pub fn net(&self) -> f64 {
        self.income - self.expenses
    }

    /// See [`savings_rate`].
    #[must_use]
    pub fn savings_rate(&self) -> f64 {
        savings_rate(self.income, self.expenses)
    }
}

/// One expense category's share of spending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpend {
    /// Expense category
    pub category: Category,
    /// Total spent, in the display currency
    pub amount: f64,
    /// Share of all expenses in the breakdown (0-100)
    pub percentage: f64,
    /// Number of transactions
    pub count: usize,
}

/// Totals for one month of the trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthTrend {
    /// Calendar year
    pub year: i32,
    /// Calendar month (1-12)
    pub month: u32,
    /// Sum of income
    pub income: f64,
    /// Sum of expenses, as a positive number
    pub expenses: f64,
    /// Income minus expenses
    pub net: f64,
}

/// Headline figures for the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    /// Currency every amount below is expressed in
    pub display_currency: String,
    /// Sum of all account balances
    pub total_balance: f64,
    /// Current month's totals
    pub this_month: MonthlyTotals,
    /// Current month's savings rate
    pub savings_rate: f64,
    /// Number of accounts
    pub account_count: usize,
    /// Number of transactions
    pub transaction_count: usize,
    /// When the rates used were fetched
    pub rates_as_of: DateTime<Utc>,
}

fn in_display(transaction: &transaction::Model, display: &str, rates: &RateTable) -> f64 {
    convert(transaction.amount, &transaction.currency, display, rates)
}

/// Sums every account balance converted into `display`.
#[must_use]
pub fn total_balance(accounts: &[account::Model], display: &str, rates: &RateTable) -> f64 {
    accounts
        .iter()
        .map(|a| convert(a.balance, &a.currency, display, rates))
        .sum()
}

/// Income and expenses dated in the given month.
#[must_use]
pub fn monthly_totals(
    transactions: &[transaction::Model],
    year: i32,
    month: u32,
    display: &str,
    rates: &RateTable,
) -> MonthlyTotals {
    transactions
        .iter()
        .filter(|t| t.date.year() == year && t.date.month() == month)
        .fold(MonthlyTotals::default(), |mut totals, t| {
            let amount = in_display(t, display, rates);
            match t.kind {
                TransactionKind::Income => totals.income += amount,
                TransactionKind::Expense => totals.expenses += amount,
            }
            totals
        })
}

/// Calculates the share of income that was not spent, as a percentage.
///
/// Returns 0 when there was no income, and goes negative when expenses
/// exceed income.
///
/// # Arguments
/// * `income` - Total income for the period
/// * `expenses` - Total expenses for the period, as a positive number
#[must_use]
pub fn savings_rate(income: f64, expenses: f64) -> f64 {
    if income <= 0.0 {
        return 0.0;
    }
    (income - expenses) / income * 100.0
}

/// Breaks expenses down by category, largest first.
///
/// Only expenses dated within `range` (inclusive) are counted when one is given.
#[must_use]
pub fn category_breakdown(
    transactions: &[transaction::Model],
    display: &str,
    rates: &RateTable,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Vec<CategorySpend> {
    let mut by_category: HashMap<Category, (f64, usize)> = HashMap::new();
    for t in transactions
        .iter()
        .filter(|t| t.kind == TransactionKind::Expense)
        .filter(|t| range.is_none_or(|(from, to)| t.date >= from && t.date <= to))
    {
        let entry = by_category.entry(t.category).or_default();
        entry.0 += in_display(t, display, rates);
        entry.1 += 1;
    }

    let total: f64 = by_category.values().map(|(amount, _)| amount).sum();
    let mut breakdown: Vec<CategorySpend> = by_category
        .into_iter()
        .map(|(category, (amount, count))| CategorySpend {
            category,
            amount,
            percentage: if total > 0.0 { amount / total * 100.0 } else { 0.0 },
            count,
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.category.label().cmp(b.category.label()))
    });
    breakdown
}

/// Month-by-month income, expenses and net, oldest month first.
#[must_use]
pub fn monthly_trend(
    transactions: &[transaction::Model],
    display: &str,
    rates: &RateTable,
) -> Vec<MonthTrend> {
    let mut months: BTreeMap<(i32, u32), MonthlyTotals> = BTreeMap::new();
    for t in transactions {
        let totals = months.entry((t.date.year(), t.date.month())).or_default();
        let amount = in_display(t, display, rates);
        match t.kind {
            TransactionKind::Income => totals.income += amount,
            TransactionKind::Expense => totals.expenses += amount,
        }
    }

    months
        .into_iter()
        .map(|((year, month), totals)| MonthTrend {
            year,
            month,
            income: totals.income,
            expenses: totals.expenses,
            net: totals.net(),
        })
        .collect()
}

/// Formats a transaction amount with its sign and currency.
///
/// # Returns
/// Formatted string like "+$50.00" or "-$25.50"
#[must_use]
pub fn format_signed_amount(amount: f64, kind: TransactionKind, currency: &str) -> String {
    let sign = match kind {
        TransactionKind::Income => '+',
        TransactionKind::Expense => '-',
    };
    format!("{sign}{}", format_currency(amount, currency))
}

/// Formats a balance, or masks it when balances are hidden.
#[must_use]
pub fn display_balance(amount: f64, currency: &str, visible: bool) -> String {
    if !visible {
        return MASKED_AMOUNT.to_string();
    }
    if amount < 0.0 {
        format!("-{}", format_currency(amount, currency))
    } else {
        format_currency(amount, currency)
    }
}

/// Generates a summary line for a transaction.
#[must_use]
pub fn format_transaction_summary(transaction: &transaction::Model) -> String {
    let amount = format_signed_amount(transaction.amount, transaction.kind, &transaction.currency);
    format!(
        "{amount} | {} | {} | {}",
        transaction.category.label(),
        transaction.date,
        transaction.description
    )
}

/// Builds the dashboard headline figures for `today`'s month.
#[must_use]
pub fn dashboard_summary(
    ledger: &Ledger,
    preferences: &Preferences,
    rates: &RateTable,
    today: NaiveDate,
) -> DashboardSummary {
    let display = preferences.display_currency.as_str();
    let this_month = monthly_totals(
        ledger.transactions(),
        today.year(),
        today.month(),
        display,
        rates,
    );

    DashboardSummary {
        display_currency: display.to_string(),
        total_balance: total_balance(ledger.accounts(), display, rates),
        this_month,
        savings_rate: this_month.savings_rate(),
        account_count: ledger.accounts().len(),
        transaction_count: ledger.transactions().len(),
        rates_as_of: rates.last_updated(),
    }
}
