//! Account business logic - creating, reading and editing accounts.
//!
//! Every query is scoped to the owning user. The balance column is never written
//! here after creation; see [`crate::core::reconcile`] for the only code that moves it.
//! Deleting an account lives in the reconciliation engine as well, because it
//! cascades to the account's transactions.

use crate::{
    core::validation::validate_account,
    entities::{Account, AccountKind, Transaction, account, transaction},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{PaginatorTrait, QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// The user-editable part of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDetails {
    /// Display name
    pub name: String,
    /// Kind of account
    pub kind: AccountKind,
    /// Currency code; only changeable while the account has no transactions
    pub currency: String,
    /// Optional bank name
    pub bank_name: Option<String>,
    /// Optional account number
    pub account_number: Option<String>,
    /// Optional account holder
    pub account_holder: Option<String>,
    /// Optional free-text notes
    pub notes: Option<String>,
}

impl AccountDetails {
    /// Minimal details with no bank metadata.
    pub fn new(name: impl Into<String>, kind: AccountKind, currency: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            currency: currency.into(),
            bank_name: None,
            account_number: None,
            account_holder: None,
            notes: None,
        }
    }

    /// Trims text fields and turns blank optional fields into `None`.
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            name: self.name.trim().to_string(),
            kind: self.kind,
            currency: self.currency.trim().to_uppercase(),
            bank_name: clean(self.bank_name),
            account_number: clean(self.account_number),
            account_holder: clean(self.account_holder),
            notes: clean(self.notes),
        }
    }
}

/// Input for opening a new account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    /// Editable details
    pub details: AccountDetails,
    /// Opening balance; may be negative for credit accounts
    pub initial_balance: f64,
}

/// Creates an account for `owner` with an explicit opening balance.
pub async fn create_account<C>(db: &C, owner: &str, input: &NewAccount) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    let details = input.details.clone().normalized();
    validate_account(&details, Some(input.initial_balance))?;

    let now = Utc::now();
    let account = account::ActiveModel {
        user_id: Set(owner.to_string()),
        name: Set(details.name),
        kind: Set(details.kind),
        balance: Set(input.initial_balance),
        initial_balance: Set(input.initial_balance),
        currency: Set(details.currency),
        bank_name: Set(details.bank_name),
        account_number: Set(details.account_number),
        account_holder: Set(details.account_holder),
        notes: Set(details.notes),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let result = account.insert(db).await?;
    info!(account_id = result.id, owner, "Account created");
    Ok(result)
}

/// Retrieves all of `owner`'s accounts, newest first.
pub async fn get_accounts_for_user<C>(db: &C, owner: &str) -> Result<Vec<account::Model>>
where
    C: ConnectionTrait,
{
    Account::find()
        .filter(account::Column::UserId.eq(owner))
        .order_by_desc(account::Column::CreatedAt)
        .order_by_desc(account::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds one of `owner`'s accounts by id, returning None if absent.
pub async fn get_account_by_id<C>(db: &C, owner: &str, id: i64) -> Result<Option<account::Model>>
where
    C: ConnectionTrait,
{
    Account::find_by_id(id)
        .filter(account::Column::UserId.eq(owner))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Like [`get_account_by_id`] but a missing account is an error.
pub async fn require_account<C>(db: &C, owner: &str, id: i64) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    get_account_by_id(db, owner, id)
        .await?
        .ok_or(Error::AccountNotFound { id })
}

/// Replaces an account's editable details.
///
/// The currency may only change while no transaction references the account,
/// since every transaction carries a copy of it.
pub async fn update_account_details<C>(
    db: &C,
    owner: &str,
    id: i64,
    details: &AccountDetails,
) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    let details = details.clone().normalized();
    validate_account(&details, None)?;

    let existing = require_account(db, owner, id).await?;

    if existing.currency != details.currency {
        let posted = Transaction::find()
            .filter(transaction::Column::AccountId.eq(id))
            .count(db)
            .await?;
        if posted > 0 {
            return Err(Error::invalid(
                "currency",
                "cannot change the currency of an account with transactions",
            ));
        }
    }

    let mut active_model: account::ActiveModel = existing.into();
    active_model.name = Set(details.name);
    active_model.kind = Set(details.kind);
    active_model.currency = Set(details.currency);
    active_model.bank_name = Set(details.bank_name);
    active_model.account_number = Set(details.account_number);
    active_model.account_holder = Set(details.account_holder);
    active_model.notes = Set(details.notes);
    active_model.updated_at = Set(Utc::now());

    let updated = active_model.update(db).await?;
    debug!(account_id = id, "Account details updated");
    Ok(updated)
}
