//! Balance reconciliation - the only code that moves an account's balance.
//!
//! Every operation runs inside a single store transaction: the balance increment
//! is applied first, then the transaction row is written, and both commit together.
//! An error at any step drops the store transaction uncommitted, so readers never
//! see one write without the other.
//!
//! Expense sufficiency is checked in the account's own currency: an expense whose
//! amount exceeds the balance available to it is rejected before anything is
//! written. The increment itself is guarded by the same condition so a concurrent
//! writer cannot slip past the check.

use crate::{
    core::{
        account::require_account, transaction::NewTransaction,
        transaction::require_transaction, validation::validate_transaction,
    },
    entities::{Account, Transaction, TransactionKind, account, transaction},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

const AUDIT_TOLERANCE: f64 = 1e-6;

/// Result of creating or editing a transaction: the written row plus every account
/// whose balance moved, as read back inside the same store transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// The transaction as stored
    pub transaction: transaction::Model,
    /// Touched accounts; two when an edit moved the transaction between accounts
    pub accounts: Vec<account::Model>,
}

/// Result of deleting a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Reversal {
    /// Id of the removed transaction
    pub transaction_id: i64,
    /// Account after the reversal was applied
    pub account: account::Model,
}

/// Result of deleting an account together with its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRemoval {
    /// Id of the removed account
    pub account_id: i64,
    /// Ids of the transactions removed with it
    pub transaction_ids: Vec<i64>,
}

/// Comparison of an account's stored balance against its transaction history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalanceAudit {
    /// Audited account
    pub account_id: i64,
    /// Balance column as stored
    pub recorded: f64,
    /// Initial balance plus the signed sum of all transactions
    pub expected: f64,
}

impl BalanceAudit {
    /// Difference between the recorded and expected balances.
    #[must_use]
    pub fn drift(&self) -> f64 {
        self.recorded - self.expected
    }

    /// Whether the balance matches the history within floating tolerance.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.drift().abs() < AUDIT_TOLERANCE
    }
}

fn ensure_available(available: f64, draft: &NewTransaction) -> Result<()> {
    if draft.kind == TransactionKind::Expense && draft.amount > available {
        return Err(Error::InsufficientBalance {
            available,
            requested: draft.amount,
        });
    }
    Ok(())
}

/// Adds `delta` to an account's balance in one statement.
///
/// With `guarded` set the row is only touched when the result stays at or above
/// zero; a guarded miss is reported as [`Error::InsufficientBalance`].
async fn apply_delta<C>(
    db: &C,
    owner: &str,
    account_id: i64,
    delta: f64,
    guarded: bool,
) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    let mut update = Account::update_many()
        .col_expr(
            account::Column::Balance,
            Expr::col(account::Column::Balance).add(delta),
        )
        .col_expr(account::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(account::Column::Id.eq(account_id))
        .filter(account::Column::UserId.eq(owner));
    if guarded {
        update = update.filter(account::Column::Balance.gte(-delta));
    }

    let result = update.exec(db).await?;
    let account = require_account(db, owner, account_id).await?;

    if result.rows_affected == 0 {
        warn!(account_id, delta, "Guarded balance update matched no row");
        return Err(Error::InsufficientBalance {
            available: account.balance,
            requested: -delta,
        });
    }

    debug!(account_id, delta, balance = account.balance, "Balance adjusted");
    Ok(account)
}

/// Posts a new transaction and applies its effect to the account.
#[instrument(skip(db, draft), fields(account_id = draft.account_id))]
pub async fn create_transaction(
    db: &DatabaseConnection,
    owner: &str,
    draft: &NewTransaction,
) -> Result<Posting> {
    validate_transaction(draft)?;

    let txn = db.begin().await?;

    let account = require_account(&txn, owner, draft.account_id).await?;
    ensure_available(account.balance, draft)?;

    let account = apply_delta(
        &txn,
        owner,
        account.id,
        draft.effect(),
        draft.kind == TransactionKind::Expense,
    )
    .await?;

    let now = Utc::now();
    let inserted = transaction::ActiveModel {
        user_id: Set(owner.to_string()),
        account_id: Set(account.id),
        amount: Set(draft.amount),
        description: Set(draft.description.trim().to_string()),
        category: Set(draft.category),
        kind: Set(draft.kind),
        currency: Set(account.currency.clone()),
        date: Set(draft.date),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    info!(
        transaction_id = inserted.id,
        balance = account.balance,
        "Transaction created"
    );
    Ok(Posting {
        transaction: inserted,
        accounts: vec![account],
    })
}

/// Replaces a transaction with `draft`, reversing the old effect and applying the new.
///
/// On the same account both deltas are combined into one net adjustment, and the
/// balance available to the new expense includes the reversal. When the account
/// changes, the reversal lands on the old account and the application on the new
/// one; nothing is written unless both succeed.
#[instrument(skip(db, draft), fields(account_id = draft.account_id))]
pub async fn update_transaction(
    db: &DatabaseConnection,
    owner: &str,
    id: i64,
    draft: &NewTransaction,
) -> Result<Posting> {
    validate_transaction(draft)?;

    let txn = db.begin().await?;

    let existing = require_transaction(&txn, owner, id).await?;
    let target = require_account(&txn, owner, draft.account_id).await?;
    let reversal = -existing.effect();
    let guarded = draft.kind == TransactionKind::Expense;

    let accounts = if existing.account_id == target.id {
        ensure_available(target.balance + reversal, draft)?;
        let net = reversal + draft.effect();
        vec![apply_delta(&txn, owner, target.id, net, guarded && net < 0.0).await?]
    } else {
        ensure_available(target.balance, draft)?;
        let previous = apply_delta(&txn, owner, existing.account_id, reversal, false).await?;
        let current = apply_delta(&txn, owner, target.id, draft.effect(), guarded).await?;
        vec![previous, current]
    };

    let mut active_model: transaction::ActiveModel = existing.into();
    active_model.account_id = Set(target.id);
    active_model.amount = Set(draft.amount);
    active_model.description = Set(draft.description.trim().to_string());
    active_model.category = Set(draft.category);
    active_model.kind = Set(draft.kind);
    active_model.currency = Set(target.currency.clone());
    active_model.date = Set(draft.date);
    active_model.updated_at = Set(Utc::now());
    let updated = active_model.update(&txn).await?;

    txn.commit().await?;

    info!(transaction_id = id, "Transaction updated");
    Ok(Posting {
        transaction: updated,
        accounts,
    })
}

/// Removes a transaction and reverses its effect on the account.
#[instrument(skip(db))]
pub async fn delete_transaction(db: &DatabaseConnection, owner: &str, id: i64) -> Result<Reversal> {
    let txn = db.begin().await?;

    let existing = require_transaction(&txn, owner, id).await?;
    let account_id = existing.account_id;
    let reversal = -existing.effect();

    let account = apply_delta(&txn, owner, account_id, reversal, false).await?;
    existing.delete(&txn).await?;

    txn.commit().await?;

    info!(transaction_id = id, balance = account.balance, "Transaction deleted");
    Ok(Reversal {
        transaction_id: id,
        account,
    })
}

/// Deletes an account and every transaction posted to it.
///
/// Transactions go first so no row ever references a missing account; the
/// balance is not recomputed since the account row is removed next.
#[instrument(skip(db))]
pub async fn delete_account(db: &DatabaseConnection, owner: &str, id: i64) -> Result<AccountRemoval> {
    let txn = db.begin().await?;

    let account = require_account(&txn, owner, id).await?;

    let transaction_ids: Vec<i64> = Transaction::find()
        .filter(transaction::Column::AccountId.eq(id))
        .filter(transaction::Column::UserId.eq(owner))
        .all(&txn)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();

    Transaction::delete_many()
        .filter(transaction::Column::AccountId.eq(id))
        .exec(&txn)
        .await?;
    account.delete(&txn).await?;

    txn.commit().await?;

    info!(
        account_id = id,
        removed_transactions = transaction_ids.len(),
        "Account deleted"
    );
    Ok(AccountRemoval {
        account_id: id,
        transaction_ids,
    })
}

/// Recomputes an account's balance from its history and compares it with the
/// stored value. Read-only.
pub async fn audit_account<C>(db: &C, owner: &str, id: i64) -> Result<BalanceAudit>
where
    C: ConnectionTrait,
{
    let account = require_account(db, owner, id).await?;
    let posted = Transaction::find()
        .filter(transaction::Column::AccountId.eq(id))
        .all(db)
        .await?;

    let expected = account.initial_balance + posted.iter().map(transaction::Model::effect).sum::<f64>();
    let audit = BalanceAudit {
        account_id: id,
        recorded: account.balance,
        expected,
    };

    if !audit.is_consistent() {
        warn!(
            account_id = id,
            drift = audit.drift(),
            "Account balance drifted from its transactions"
        );
    }
    Ok(audit)
}
