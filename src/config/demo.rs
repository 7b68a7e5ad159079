//! Demo dataset configuration.
//!
//! Demo mode runs the whole core against a private in-memory store seeded from
//! the `[demo]` section of config.toml, or from a built-in dataset when that
//! section lists no accounts.

use crate::entities::{AccountKind, Category, TransactionKind};
use serde::Deserialize;

/// The `[demo]` section of config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Start in demo mode instead of contacting the store
    pub enabled: bool,
    /// Accounts to seed; empty means the built-in dataset
    pub accounts: Vec<DemoAccount>,
}

/// One seeded account
#[derive(Debug, Clone, Deserialize)]
pub struct DemoAccount {
    /// Account name
    pub name: String,
    /// Account kind
    pub kind: AccountKind,
    /// Opening balance
    pub balance: f64,
    /// Currency code
    pub currency: String,
    /// Transactions posted to this account after creation, in order
    #[serde(default)]
    pub transactions: Vec<DemoTransaction>,
}

/// One seeded transaction
#[derive(Debug, Clone, Deserialize)]
pub struct DemoTransaction {
    /// Description
    pub description: String,
    /// Positive magnitude
    pub amount: f64,
    /// Income or expense
    pub kind: TransactionKind,
    /// Category
    pub category: Category,
    /// How many days before today the transaction is dated
    #[serde(default)]
    pub days_ago: i64,
}

impl DemoConfig {
    /// Accounts to seed: the configured ones, or the built-in dataset.
    #[must_use]
    pub fn dataset(&self) -> Vec<DemoAccount> {
        if self.accounts.is_empty() {
            builtin_dataset()
        } else {
            self.accounts.clone()
        }
    }
}

fn tx(
    description: &str,
    amount: f64,
    kind: TransactionKind,
    category: Category,
    days_ago: i64,
) -> DemoTransaction {
    DemoTransaction {
        description: description.to_string(),
        amount,
        kind,
        category,
        days_ago,
    }
}

fn builtin_dataset() -> Vec<DemoAccount> {
    vec![
        DemoAccount {
            name: "Main Checking".to_string(),
            kind: AccountKind::Bank,
            balance: 2500.0,
            currency: "USD".to_string(),
            transactions: vec![
                tx("Monthly salary", 4200.0, TransactionKind::Income, Category::Salary, 3),
                tx("Rent", 1450.0, TransactionKind::Expense, Category::BillsAndUtilities, 2),
                tx("Groceries", 86.4, TransactionKind::Expense, Category::FoodAndDining, 1),
            ],
        },
        DemoAccount {
            name: "Travel Card".to_string(),
            kind: AccountKind::Card,
            balance: 800.0,
            currency: "EUR".to_string(),
            transactions: vec![
                tx("Train tickets", 64.0, TransactionKind::Expense, Category::Transportation, 5),
                tx("Museum", 18.5, TransactionKind::Expense, Category::Entertainment, 4),
            ],
        },
        DemoAccount {
            name: "Pocket Cash".to_string(),
            kind: AccountKind::Cash,
            balance: 120.0,
            currency: "USD".to_string(),
            transactions: vec![tx(
                "Coffee",
                4.75,
                TransactionKind::Expense,
                Category::FoodAndDining,
                0,
            )],
        },
    ]
}
