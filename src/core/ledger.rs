//! Ledger store - the current user's accounts and transactions held in memory.
//!
//! The ledger is only ever changed by rows the store returned: a full reload
//! replaces a collection wholesale, and [`Ledger::apply`] swaps in the rows a
//! committed write read back. Balances are never recomputed here.

use crate::{
    core::{
        account::get_accounts_for_user,
        reconcile::{AccountRemoval, Posting, Reversal},
        transaction::{TransactionFilter, list_transactions},
    },
    entities::{account, transaction},
    errors::Result,
};
use sea_orm::ConnectionTrait;
use std::cmp::Reverse;
use tracing::{debug, info};

/// A write the store confirmed, carrying the rows it returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    /// An account was created or its details edited
    AccountSaved(account::Model),
    /// An account and its transactions were deleted
    AccountRemoved(AccountRemoval),
    /// A transaction was created or edited
    TransactionSaved(Posting),
    /// A transaction was deleted
    TransactionRemoved(Reversal),
}

impl From<account::Model> for Commit {
    fn from(account: account::Model) -> Self {
        Self::AccountSaved(account)
    }
}

impl From<AccountRemoval> for Commit {
    fn from(removal: AccountRemoval) -> Self {
        Self::AccountRemoved(removal)
    }
}

impl From<Posting> for Commit {
    fn from(posting: Posting) -> Self {
        Self::TransactionSaved(posting)
    }
}

impl From<Reversal> for Commit {
    fn from(reversal: Reversal) -> Self {
        Self::TransactionRemoved(reversal)
    }
}

/// Per-session collections of accounts and transactions for one owner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    owner: Option<String>,
    accounts: Vec<account::Model>,
    transactions: Vec<transaction::Model>,
}

impl Ledger {
    /// An empty ledger bound to no one.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty ledger bound to `owner`, used until the store can be read.
    #[must_use]
    pub fn empty_for(owner: &str) -> Self {
        Self {
            owner: Some(owner.to_string()),
            ..Self::default()
        }
    }

    /// Loads both collections for `owner` from the store.
    pub async fn load<C>(db: &C, owner: &str) -> Result<Self>
    where
        C: ConnectionTrait,
    {
        let mut ledger = Self::empty_for(owner);
        ledger.reload_accounts(db).await?;
        ledger.reload_transactions(db).await?;
        info!(
            owner,
            accounts = ledger.accounts.len(),
            transactions = ledger.transactions.len(),
            "Ledger loaded"
        );
        Ok(ledger)
    }

    /// Replaces the account collection with the store's current rows.
    pub async fn reload_accounts<C>(&mut self, db: &C) -> Result<()>
    where
        C: ConnectionTrait,
    {
        let Some(owner) = self.owner.as_deref() else {
            return Ok(());
        };
        let accounts = get_accounts_for_user(db, owner).await?;
        self.replace_accounts(accounts);
        Ok(())
    }

    /// Replaces the transaction collection with the store's current rows.
    pub async fn reload_transactions<C>(&mut self, db: &C) -> Result<()>
    where
        C: ConnectionTrait,
    {
        let Some(owner) = self.owner.as_deref() else {
            return Ok(());
        };
        let transactions = list_transactions(db, owner, &TransactionFilter::new()).await?;
        self.replace_transactions(transactions);
        Ok(())
    }

    /// Swaps in an account collection read from the store.
    pub fn replace_accounts(&mut self, accounts: Vec<account::Model>) {
        debug!("Reloaded {} accounts", accounts.len());
        self.accounts = accounts;
    }

    /// Swaps in a transaction collection read from the store.
    pub fn replace_transactions(&mut self, transactions: Vec<transaction::Model>) {
        debug!("Reloaded {} transactions", transactions.len());
        self.transactions = transactions;
    }

    /// Reloads both collections.
    pub async fn reload<C>(&mut self, db: &C) -> Result<()>
    where
        C: ConnectionTrait,
    {
        self.reload_accounts(db).await?;
        self.reload_transactions(db).await
    }

    /// Drops all rows and the owner binding.
    pub fn clear(&mut self) {
        self.owner = None;
        self.accounts.clear();
        self.transactions.clear();
    }

    /// Folds a confirmed write into the collections, replacing rows by id.
    pub fn apply(&mut self, commit: &Commit) {
        match commit {
            Commit::AccountSaved(account) => self.upsert_account(account.clone()),
            Commit::AccountRemoved(removal) => {
                self.accounts.retain(|a| a.id != removal.account_id);
                self.transactions
                    .retain(|t| t.account_id != removal.account_id);
            }
            Commit::TransactionSaved(posting) => {
                for account in &posting.accounts {
                    self.upsert_account(account.clone());
                }
                self.upsert_transaction(posting.transaction.clone());
            }
            Commit::TransactionRemoved(reversal) => {
                self.transactions.retain(|t| t.id != reversal.transaction_id);
                self.upsert_account(reversal.account.clone());
            }
        }
    }

    fn upsert_account(&mut self, account: account::Model) {
        match self.accounts.iter_mut().find(|a| a.id == account.id) {
            Some(slot) => *slot = account,
            None => {
                self.accounts.push(account);
                self.accounts
                    .sort_by_key(|a| Reverse((a.created_at, a.id)));
            }
        }
    }

    fn upsert_transaction(&mut self, transaction: transaction::Model) {
        self.transactions.retain(|t| t.id != transaction.id);
        self.transactions.push(transaction);
        self.transactions
            .sort_by_key(|t| Reverse((t.date, t.created_at, t.id)));
    }

    /// Owner the ledger is scoped to, if any.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Accounts, newest first.
    #[must_use]
    pub fn accounts(&self) -> &[account::Model] {
        &self.accounts
    }

    /// Transactions, newest date first.
    #[must_use]
    pub fn transactions(&self) -> &[transaction::Model] {
        &self.transactions
    }

    /// Looks up an account by id.
    #[must_use]
    pub fn account(&self, id: i64) -> Option<&account::Model> {
        self.accounts.iter().find(|a| a.id == id)
    }

    /// Looks up a transaction by id.
    #[must_use]
    pub fn transaction(&self, id: i64) -> Option<&transaction::Model> {
        self.transactions.iter().find(|t| t.id == id)
    }

    /// Transactions posted to one account.
    pub fn transactions_for(&self, account_id: i64) -> impl Iterator<Item = &transaction::Model> {
        self.transactions
            .iter()
            .filter(move |t| t.account_id == account_id)
    }
}
