//! Transaction entity - A dated, categorized income or expense posted to one account.
//!
//! Amounts are stored as positive magnitudes; `kind` carries the sign. `currency`
//! is copied from the account when the row is written and is never edited on its own.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether a transaction adds to or removes from its account
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money coming in
    #[sea_orm(string_value = "income")]
    Income,
    /// Money going out
    #[sea_orm(string_value = "expense")]
    Expense,
}

impl TransactionKind {
    /// Signed effect of posting `amount` with this kind: `+amount` for income,
    /// `-amount` for expenses.
    #[must_use]
    pub fn signed(self, amount: f64) -> f64 {
        match self {
            Self::Income => amount,
            Self::Expense => -amount,
        }
    }
}

/// Closed set of transaction categories
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Category {
    /// Groceries and eating out
    #[sea_orm(string_value = "Food & Dining")]
    #[serde(rename = "Food & Dining")]
    FoodAndDining,
    /// Getting around
    #[sea_orm(string_value = "Transportation")]
    Transportation,
    /// General purchases
    #[sea_orm(string_value = "Shopping")]
    Shopping,
    /// Rent and recurring bills
    #[sea_orm(string_value = "Bills & Utilities")]
    #[serde(rename = "Bills & Utilities")]
    BillsAndUtilities,
    /// Leisure and events
    #[sea_orm(string_value = "Entertainment")]
    Entertainment,
    /// Medical costs and fitness
    #[sea_orm(string_value = "Health & Fitness")]
    #[serde(rename = "Health & Fitness")]
    HealthAndFitness,
    /// Courses and tuition
    #[sea_orm(string_value = "Education")]
    Education,
    /// Employment income
    #[sea_orm(string_value = "Salary")]
    Salary,
    /// Contract and gig income
    #[sea_orm(string_value = "Freelance")]
    Freelance,
    /// Returns on investments
    #[sea_orm(string_value = "Investment")]
    Investment,
    /// Anything else; valid for both kinds
    #[sea_orm(string_value = "Other")]
    Other,
}

impl Category {
    /// Categories valid for income transactions
    pub const INCOME: [Self; 4] = [Self::Salary, Self::Freelance, Self::Investment, Self::Other];

    /// Categories valid for expense transactions
    pub const EXPENSE: [Self; 8] = [
        Self::FoodAndDining,
        Self::Transportation,
        Self::Shopping,
        Self::BillsAndUtilities,
        Self::Entertainment,
        Self::HealthAndFitness,
        Self::Education,
        Self::Other,
    ];

    /// Whether this category may be used with the given transaction kind.
    #[must_use]
    pub fn allows(self, kind: TransactionKind) -> bool {
        match kind {
            TransactionKind::Income => Self::INCOME.contains(&self),
            TransactionKind::Expense => Self::EXPENSE.contains(&self),
        }
    }

    /// Display label, identical to the stored value.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FoodAndDining => "Food & Dining",
            Self::Transportation => "Transportation",
            Self::Shopping => "Shopping",
            Self::BillsAndUtilities => "Bills & Utilities",
            Self::Entertainment => "Entertainment",
            Self::HealthAndFitness => "Health & Fitness",
            Self::Education => "Education",
            Self::Salary => "Salary",
            Self::Freelance => "Freelance",
            Self::Investment => "Investment",
            Self::Other => "Other",
        }
    }
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Identity of the owning user
    pub user_id: String,
    /// ID of the account this transaction is posted to
    pub account_id: i64,
    /// Positive magnitude of the transaction
    pub amount: f64,
    /// Human-readable description (never empty)
    pub description: String,
    /// Category, from the partition matching `kind`
    pub category: Category,
    /// `income` or `expense`
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Currency of the account at the time the row was written
    pub currency: String,
    /// Calendar date of the transaction
    pub date: Date,
    /// When the transaction was created
    pub created_at: DateTimeUtc,
    /// When the row was last written
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Signed effect this transaction has on its account's balance.
    #[must_use]
    pub fn effect(&self) -> f64 {
        self.kind.signed(self.amount)
    }
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one account
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
