//! Transaction queries - lookups, filtered listings and pagination.
//!
//! Writes go through [`crate::core::reconcile`], which keeps account balances in
//! step with the rows read here.

use crate::{
    entities::{Category, Transaction, TransactionKind, transaction},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{PaginatorTrait, QueryOrder, QuerySelect, prelude::*};
use serde::{Deserialize, Serialize};

/// Input for creating a transaction, and the full replacement used when editing one.
///
/// `currency` is deliberately absent: it is copied from the account on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Account to post to
    pub account_id: i64,
    /// Positive magnitude
    pub amount: f64,
    /// Human-readable description
    pub description: String,
    /// Category from the partition matching `kind`
    pub category: Category,
    /// Income or expense
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Calendar date of the transaction
    pub date: NaiveDate,
}

impl NewTransaction {
    /// Signed effect this draft would have on its account.
    #[must_use]
    pub fn effect(&self) -> f64 {
        self.kind.signed(self.amount)
    }
}

/// Composable filter for listing transactions.
///
/// All set criteria must hold for a transaction to match.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionFilter {
    /// Income or expense only
    pub kind: Option<TransactionKind>,
    /// A single category
    pub category: Option<Category>,
    /// A single account
    pub account_id: Option<i64>,
    /// Start date (inclusive)
    pub date_from: Option<NaiveDate>,
    /// End date (inclusive)
    pub date_to: Option<NaiveDate>,
    /// Case-insensitive substring of the description
    pub search: Option<String>,
}

impl TransactionFilter {
    /// Creates an empty filter that matches all transactions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one transaction kind.
    #[must_use]
    pub const fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restricts to one category.
    #[must_use]
    pub const fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Restricts to one account.
    #[must_use]
    pub const fn account(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Restricts to an inclusive date range.
    #[must_use]
    pub const fn date_range(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    /// Restricts to descriptions containing `text`.
    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    fn apply(&self, mut query: Select<Transaction>) -> Select<Transaction> {
        if let Some(kind) = self.kind {
            query = query.filter(transaction::Column::Kind.eq(kind));
        }
        if let Some(category) = self.category {
            query = query.filter(transaction::Column::Category.eq(category));
        }
        if let Some(account_id) = self.account_id {
            query = query.filter(transaction::Column::AccountId.eq(account_id));
        }
        if let Some(from) = self.date_from {
            query = query.filter(transaction::Column::Date.gte(from));
        }
        if let Some(to) = self.date_to {
            query = query.filter(transaction::Column::Date.lte(to));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(transaction::Column::Description.contains(search));
        }
        query
    }
}

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1
    pub page: u64,
    /// Page size
    pub limit: u64,
}

/// A page of transactions plus the totals needed to render paging controls.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPage {
    /// Rows on this page
    pub transactions: Vec<transaction::Model>,
    /// Number of rows matching the filter across all pages
    pub count: u64,
    /// Page number returned
    pub page: u64,
    /// Page size used
    pub limit: u64,
    /// Number of pages at this size
    pub total_pages: u64,
}

/// Retrieves one of `owner`'s transactions by id.
pub async fn get_transaction_by_id<C>(
    db: &C,
    owner: &str,
    id: i64,
) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(id)
        .filter(transaction::Column::UserId.eq(owner))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Like [`get_transaction_by_id`] but a missing transaction is an error.
pub async fn require_transaction<C>(db: &C, owner: &str, id: i64) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    get_transaction_by_id(db, owner, id)
        .await?
        .ok_or(Error::TransactionNotFound { id })
}

/// Retrieves all transactions posted to an account, newest first.
pub async fn get_transactions_for_account<C>(
    db: &C,
    owner: &str,
    account_id: i64,
) -> Result<Vec<transaction::Model>>
where
    C: ConnectionTrait,
{
    list_transactions(db, owner, &TransactionFilter::new().account(account_id)).await
}

fn owned_and_ordered(owner: &str, filter: &TransactionFilter) -> Select<Transaction> {
    filter
        .apply(Transaction::find().filter(transaction::Column::UserId.eq(owner)))
        .order_by_desc(transaction::Column::Date)
        .order_by_desc(transaction::Column::CreatedAt)
        .order_by_desc(transaction::Column::Id)
}

/// Retrieves every transaction of `owner` matching `filter`, ordered by date then
/// creation time, newest first.
pub async fn list_transactions<C>(
    db: &C,
    owner: &str,
    filter: &TransactionFilter,
) -> Result<Vec<transaction::Model>>
where
    C: ConnectionTrait,
{
    owned_and_ordered(owner, filter)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves one page of `owner`'s transactions matching `filter`.
pub async fn page_transactions<C>(
    db: &C,
    owner: &str,
    filter: &TransactionFilter,
    request: PageRequest,
) -> Result<TransactionPage>
where
    C: ConnectionTrait,
{
    if request.page == 0 {
        return Err(Error::invalid("page", "pages start at 1"));
    }
    if request.limit == 0 {
        return Err(Error::invalid("limit", "must be at least 1"));
    }

    let count = filter
        .apply(Transaction::find().filter(transaction::Column::UserId.eq(owner)))
        .count(db)
        .await?;

    let transactions = owned_and_ordered(owner, filter)
        .offset((request.page - 1) * request.limit)
        .limit(request.limit)
        .all(db)
        .await?;

    Ok(TransactionPage {
        transactions,
        count,
        page: request.page,
        limit: request.limit,
        total_pages: count.div_ceil(request.limit),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_get_transaction_by_id_not_found() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<transaction::Model>::new()])
            .into_connection();

        let transaction = get_transaction_by_id(&db, TEST_OWNER, 999).await?;
        assert!(transaction.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_require_transaction_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        let result = require_transaction(&db, TEST_OWNER, 42).await;
        assert!(matches!(result, Err(Error::TransactionNotFound { id: 42 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_transactions_for_account_only_its_own() -> Result<()> {
        let db = setup_test_db().await?;
        let first = create_test_account(&db, "First", 100.0).await?;
        let second = create_test_account(&db, "Second", 100.0).await?;

        let t1 = create_test_transaction(&db, first.id, 10.0, TransactionKind::Expense).await?;
        let t2 = create_test_transaction(&db, second.id, 20.0, TransactionKind::Income).await?;

        assert_eq!(
            get_transactions_for_account(&db, TEST_OWNER, first.id).await?,
            vec![t1]
        );
        assert_eq!(
            get_transactions_for_account(&db, TEST_OWNER, second.id).await?,
            vec![t2]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_filters_combine() -> Result<()> {
        let (db, account) = setup_with_account(1000.0).await?;
        let day = |d| NaiveDate::from_ymd_opt(2026, 5, d).unwrap();

        create_dated_transaction(&db, account.id, 30.0, TransactionKind::Expense, Category::Shopping, "New shoes", day(2)).await?;
        create_dated_transaction(&db, account.id, 12.0, TransactionKind::Expense, Category::FoodAndDining, "Pizza night", day(10)).await?;
        create_dated_transaction(&db, account.id, 800.0, TransactionKind::Income, Category::Salary, "Salary May", day(15)).await?;
        create_dated_transaction(&db, account.id, 9.0, TransactionKind::Expense, Category::FoodAndDining, "PIZZA slice", day(20)).await?;

        let expenses = list_transactions(
            &db,
            TEST_OWNER,
            &TransactionFilter::new().kind(TransactionKind::Expense),
        )
        .await?;
        assert_eq!(expenses.len(), 3);
        // Newest date first
        assert_eq!(expenses[0].date, day(20));

        let pizza = list_transactions(&db, TEST_OWNER, &TransactionFilter::new().search("pizza")).await?;
        assert_eq!(pizza.len(), 2);

        let ranged_food = list_transactions(
            &db,
            TEST_OWNER,
            &TransactionFilter::new()
                .category(Category::FoodAndDining)
                .date_range(day(1), day(15)),
        )
        .await?;
        assert_eq!(ranged_food.len(), 1);
        assert_eq!(ranged_food[0].description, "Pizza night");
        Ok(())
    }

    #[tokio::test]
    async fn test_pagination() -> Result<()> {
        let (db, account) = setup_with_account(0.0).await?;
        for _ in 0..5 {
            create_test_transaction(&db, account.id, 1.0, TransactionKind::Income).await?;
        }

        let request = PageRequest { page: 2, limit: 2 };
        let page = page_transactions(&db, TEST_OWNER, &TransactionFilter::new(), request).await?;
        assert_eq!(page.count, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.transactions.len(), 2);

        let last = page_transactions(
            &db,
            TEST_OWNER,
            &TransactionFilter::new(),
            PageRequest { page: 3, limit: 2 },
        )
        .await?;
        assert_eq!(last.transactions.len(), 1);

        let bad = page_transactions(
            &db,
            TEST_OWNER,
            &TransactionFilter::new(),
            PageRequest { page: 0, limit: 2 },
        )
        .await;
        assert!(matches!(bad, Err(Error::Validation { .. })));
        Ok(())
    }
}
