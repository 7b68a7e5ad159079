//! Shared test utilities for the finance tracker.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    cache::FxSource,
    core::{
        account::{self, AccountDetails, NewAccount},
        currency::RateTable,
        local_state::LocalStorage,
        reconcile,
        transaction::NewTransaction,
    },
    entities::{self, AccountKind, Category, TransactionKind},
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Owner identity used by every test helper.
pub const TEST_OWNER: &str = "test_user";

/// Creates an in-memory `SQLite` store with all row-store tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Same as [`setup_test_db`], for components that hold a shared connection.
pub async fn setup_shared_db() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Creates an in-memory local state store.
pub async fn setup_local_storage() -> Result<LocalStorage> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_local_tables(&db).await?;
    Ok(LocalStorage::new(db))
}

/// Creates a test account with sensible defaults.
///
/// # Defaults
/// * `kind`: Bank
/// * `currency`: USD
/// * owner: [`TEST_OWNER`]
pub async fn create_test_account(
    db: &DatabaseConnection,
    name: &str,
    balance: f64,
) -> Result<entities::account::Model> {
    account::create_account(
        db,
        TEST_OWNER,
        &NewAccount {
            details: AccountDetails::new(name, AccountKind::Bank, "USD"),
            initial_balance: balance,
        },
    )
    .await
}

/// Sets up a complete test environment with one account.
/// Returns (db, account) for common test scenarios.
pub async fn setup_with_account(
    balance: f64,
) -> Result<(DatabaseConnection, entities::account::Model)> {
    let db = setup_test_db().await?;
    let account = create_test_account(&db, "Test Account", balance).await?;
    Ok((db, account))
}

/// [`setup_with_account`] over a shared connection.
pub async fn setup_shared_with_account(
    balance: f64,
) -> Result<(Arc<DatabaseConnection>, entities::account::Model)> {
    let (db, account) = setup_with_account(balance).await?;
    Ok((Arc::new(db), account))
}

/// Draft with sensible defaults: description `"Test transaction"`, category
/// Other, dated today.
pub fn test_draft(account_id: i64, amount: f64, kind: TransactionKind) -> NewTransaction {
    NewTransaction {
        account_id,
        amount,
        description: "Test transaction".to_string(),
        category: Category::Other,
        kind,
        date: Utc::now().date_naive(),
    }
}

/// Posts a test transaction through the reconciliation engine.
pub async fn create_test_transaction(
    db: &DatabaseConnection,
    account_id: i64,
    amount: f64,
    kind: TransactionKind,
) -> Result<entities::transaction::Model> {
    let posting =
        reconcile::create_transaction(db, TEST_OWNER, &test_draft(account_id, amount, kind))
            .await?;
    Ok(posting.transaction)
}

/// Posts a test transaction with custom parameters.
pub async fn create_dated_transaction(
    db: &DatabaseConnection,
    account_id: i64,
    amount: f64,
    kind: TransactionKind,
    category: Category,
    description: &str,
    date: NaiveDate,
) -> Result<entities::transaction::Model> {
    let draft = NewTransaction {
        account_id,
        amount,
        description: description.to_string(),
        category,
        kind,
        date,
    };
    Ok(reconcile::create_transaction(db, TEST_OWNER, &draft)
        .await?
        .transaction)
}

/// Routes tracing output through the test harness; safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Scripted FX source: hands out queued responses in order, then fails.
#[derive(Debug, Default)]
pub struct ScriptedFxSource {
    responses: Mutex<Vec<Result<RateTable>>>,
    calls: AtomicUsize,
}

impl ScriptedFxSource {
    /// Source whose fetches answer with `responses` in order.
    pub fn new(mut responses: Vec<Result<RateTable>>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        }
    }

    /// Source that always fails.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Number of fetches made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FxSource for ScriptedFxSource {
    async fn fetch(&self, base: &str) -> Result<RateTable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .map_err(|_| Error::RateSource {
                message: "poisoned".to_string(),
            })?
            .pop();
        next.unwrap_or_else(|| {
            Err(Error::RateSource {
                message: format!("no scripted response for base {base}"),
            })
        })
    }
}

/// A USD-based live table for tests.
pub fn test_rates(eur: f64, gbp: f64) -> RateTable {
    RateTable::new(
        "USD",
        HashMap::from([("EUR".to_string(), eur), ("GBP".to_string(), gbp)]),
        Utc::now(),
    )
}
