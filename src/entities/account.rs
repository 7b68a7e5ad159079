//! Account entity - A named store of money in one currency, owned by a user.
//!
//! The `balance` column is a cache of `initial_balance` plus the signed sum of the
//! account's transactions. Only the reconciliation engine writes it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Closed set of account kinds
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum AccountKind {
    /// Physical cash
    #[sea_orm(string_value = "Cash")]
    Cash,
    /// Debit or credit card
    #[sea_orm(string_value = "Card")]
    Card,
    /// Bank account
    #[sea_orm(string_value = "Bank")]
    Bank,
    /// Digital wallet
    #[sea_orm(string_value = "Wallet")]
    Wallet,
}

/// Account database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Unique identifier for the account
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Identity of the owning user
    pub user_id: String,
    /// Display name (e.g., "Everyday Checking")
    pub name: String,
    /// Kind of account
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub kind: AccountKind,
    /// Current balance in the account's currency; may be negative
    pub balance: f64,
    /// Balance the account was created with
    pub initial_balance: f64,
    /// Three-letter currency code
    pub currency: String,
    /// Optional bank name
    pub bank_name: Option<String>,
    /// Optional account number
    pub account_number: Option<String>,
    /// Optional account holder name
    pub account_holder: Option<String>,
    /// Free-text notes
    pub notes: Option<String>,
    /// When the account was created
    pub created_at: DateTimeUtc,
    /// When the account row was last written
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Account and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One account has many transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
