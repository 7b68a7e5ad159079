//! Sync/offline coordination for every mutating ledger call.
//!
//! While online, mutations go straight to the store and the rows it returns are
//! folded into the [`Ledger`]. While offline, or when the store turns out to be
//! unreachable mid-call, they are appended to a persisted FIFO queue and the
//! caller gets [`MutationOutcome::Deferred`]. Going back online drains the queue
//! strictly in order through the same reconciliation path, skipping entries that
//! fail, then reloads the ledger from the store.
//!
//! Rows created while offline have no store id yet. Later queued mutations refer
//! to them with [`EntityRef::Queued`], which is resolved during the drain.

use crate::{
    core::{
        account::{AccountDetails, NewAccount, create_account, update_account_details},
        feed::{ChangeFeed, ChangedTable},
        ledger::{Commit, Ledger},
        local_state::{LocalStorage, QUEUE_KEY},
        reconcile,
        transaction::NewTransaction,
        validation::{validate_account, validate_transaction},
    },
    errors::{Error, Result},
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Whether the store of record is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    /// Mutations reach the store immediately
    Online,
    /// Mutations are queued
    Offline,
}

/// Reference to a row that may not exist in the store yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    /// A row with a store id
    Stored(i64),
    /// The row created by the queued entry with this sequence number
    Queued(u64),
}

impl From<i64> for EntityRef {
    fn from(id: i64) -> Self {
        Self::Stored(id)
    }
}

/// A mutating ledger operation, as captured for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Open an account
    CreateAccount {
        /// Account to create
        account: NewAccount,
    },
    /// Edit an account's details
    UpdateAccount {
        /// Target account
        account: EntityRef,
        /// Replacement details
        details: AccountDetails,
    },
    /// Delete an account and its transactions
    DeleteAccount {
        /// Target account
        account: EntityRef,
    },
    /// Post a transaction
    CreateTransaction {
        /// Account to post to; overrides `draft.account_id`
        account: EntityRef,
        /// Transaction contents
        draft: NewTransaction,
    },
    /// Replace a transaction
    UpdateTransaction {
        /// Target transaction
        transaction: EntityRef,
        /// Account to post to; overrides `draft.account_id`
        account: EntityRef,
        /// Replacement contents
        draft: NewTransaction,
    },
    /// Delete a transaction
    DeleteTransaction {
        /// Target transaction
        transaction: EntityRef,
    },
}

impl Mutation {
    /// Local checks that must pass before a mutation is sent or queued.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::CreateAccount { account } => validate_account(
                &account.details.clone().normalized(),
                Some(account.initial_balance),
            ),
            Self::UpdateAccount { details, .. } => {
                validate_account(&details.clone().normalized(), None)
            }
            Self::CreateTransaction { draft, .. } | Self::UpdateTransaction { draft, .. } => {
                validate_transaction(draft)
            }
            Self::DeleteAccount { .. } | Self::DeleteTransaction { .. } => Ok(()),
        }
    }

    fn touches(&self) -> &'static [ChangedTable] {
        match self {
            Self::CreateAccount { .. } | Self::UpdateAccount { .. } => &[ChangedTable::Accounts],
            _ => &[ChangedTable::Accounts, ChangedTable::Transactions],
        }
    }
}

/// One entry of the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Position in the queue; never reused
    pub sequence: u64,
    /// Captured operation
    pub mutation: Mutation,
}

/// The persisted offline queue for one owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingQueue {
    owner: String,
    next_sequence: u64,
    entries: VecDeque<QueuedMutation>,
    /// Store ids of rows created by already-replayed entries
    resolved: HashMap<u64, i64>,
}

impl PendingQueue {
    fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            next_sequence: 1,
            ..Self::default()
        }
    }

    /// Entries still waiting, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &QueuedMutation> {
        self.entries.iter()
    }

    /// Number of waiting entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolve(&self, reference: EntityRef) -> Result<i64> {
        match reference {
            EntityRef::Stored(id) => Ok(id),
            EntityRef::Queued(sequence) => {
                self.resolved
                    .get(&sequence)
                    .copied()
                    .ok_or_else(|| Error::PartialSyncFailure {
                        sequence,
                        reason: "depends on an entry that was never committed".to_string(),
                    })
            }
        }
    }
}

/// What the caller's mutation turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Written to the store; the ledger already reflects it
    Committed(Commit),
    /// Accepted into the offline queue
    Deferred {
        /// Queue position, usable as [`EntityRef::Queued`]
        sequence: u64,
    },
}

/// An entry the drain gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Queue position of the entry
    pub sequence: u64,
    /// Why it failed
    pub reason: String,
}

/// Summary of one queue drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries written to the store
    pub replayed: usize,
    /// Entries logged and skipped
    pub skipped: Vec<SkippedEntry>,
    /// Whether the store became unreachable and entries are still waiting
    pub interrupted: bool,
}

/// Routes mutations to the store or the offline queue for one signed-in owner.
#[derive(Debug)]
pub struct SyncCoordinator {
    db: Arc<DatabaseConnection>,
    local: LocalStorage,
    ledger: Arc<RwLock<Ledger>>,
    feed: ChangeFeed,
    owner: String,
    connectivity: Connectivity,
    queue: PendingQueue,
}

impl SyncCoordinator {
    /// Restores `owner`'s queue from local storage.
    ///
    /// A queue left behind by a different owner is discarded, never replayed.
    /// With entries still waiting the coordinator starts offline, so nothing
    /// overtakes them; switch it online to replay.
    pub async fn open(
        db: Arc<DatabaseConnection>,
        local: LocalStorage,
        ledger: Arc<RwLock<Ledger>>,
        feed: ChangeFeed,
        owner: &str,
    ) -> Result<Self> {
        let queue = match local.load::<PendingQueue>(QUEUE_KEY).await? {
            Some(queue) if queue.owner == owner => {
                if !queue.is_empty() {
                    info!("Restored {} pending offline mutations", queue.len());
                }
                queue
            }
            Some(stale) => {
                warn!(
                    "Discarding {} offline mutations queued by a different user",
                    stale.len()
                );
                local.remove(QUEUE_KEY).await?;
                PendingQueue::new(owner)
            }
            None => PendingQueue::new(owner),
        };

        let connectivity = if queue.is_empty() {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        Ok(Self {
            db,
            local,
            ledger,
            feed,
            owner: owner.to_string(),
            connectivity,
            queue,
        })
    }

    /// Current connectivity state.
    #[must_use]
    pub const fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// The offline queue.
    #[must_use]
    pub const fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    /// Owner this coordinator writes for.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Validates and routes a mutation.
    ///
    /// Validation and balance-sufficiency failures are returned to the caller and
    /// never queued. A store that cannot be reached switches the coordinator
    /// offline and queues the mutation instead of failing.
    #[instrument(skip(self, mutation), fields(owner = %self.owner))]
    pub async fn submit(&mut self, mutation: Mutation) -> Result<MutationOutcome> {
        mutation.validate()?;

        // Queued entries always reach the store first
        if self.connectivity == Connectivity::Offline || !self.queue.is_empty() {
            return self.enqueue(mutation).await;
        }

        match self.execute(&mutation).await {
            Ok(commit) => {
                self.record(&commit, &mutation).await;
                Ok(MutationOutcome::Committed(commit))
            }
            Err(e) if e.is_unavailable() => {
                warn!("Store unreachable, going offline: {}", e);
                self.connectivity = Connectivity::Offline;
                self.enqueue(mutation).await
            }
            Err(e) => Err(e),
        }
    }

    /// Applies a connectivity signal. Coming back online drains the queue.
    pub async fn set_connectivity(&mut self, connectivity: Connectivity) -> Result<Option<DrainReport>> {
        let previous = self.connectivity;
        self.connectivity = connectivity;
        match (previous, connectivity) {
            (Connectivity::Offline, Connectivity::Online) => {
                info!("Back online with {} pending mutations", self.queue.len());
                self.drain().await.map(Some)
            }
            (Connectivity::Online, Connectivity::Offline) => {
                info!("Offline, mutations will be queued");
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Replays the queue in FIFO order, then reloads the ledger from the store.
    ///
    /// An entry that fails is logged and skipped. If the store becomes
    /// unreachable the drain stops, the coordinator goes offline and the
    /// remaining entries stay queued. A completed drain leaves it online.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn drain(&mut self) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        while let Some(entry) = self.queue.entries.front().cloned() {
            match self.execute(&entry.mutation).await {
                Ok(commit) => {
                    if let Some(id) = created_id(&commit) {
                        self.queue.resolved.insert(entry.sequence, id);
                    }
                    report.replayed += 1;
                    debug!("Replayed offline entry #{}", entry.sequence);
                }
                Err(e) if e.is_unavailable() => {
                    warn!("Store unreachable during replay, staying offline: {}", e);
                    self.connectivity = Connectivity::Offline;
                    report.interrupted = true;
                    self.persist_queue().await?;
                    return Ok(report);
                }
                Err(e) => {
                    let failure = Error::PartialSyncFailure {
                        sequence: entry.sequence,
                        reason: e.to_string(),
                    };
                    warn!("{}", failure);
                    report.skipped.push(SkippedEntry {
                        sequence: entry.sequence,
                        reason: e.to_string(),
                    });
                }
            }
            self.queue.entries.pop_front();
            self.persist_queue().await?;
        }

        // No entry is left to refer to a created row
        if !self.queue.resolved.is_empty() {
            self.queue.resolved.clear();
            self.persist_queue().await?;
        }
        self.connectivity = Connectivity::Online;

        if report.replayed > 0 || !report.skipped.is_empty() {
            self.ledger.write().await.reload(self.db.as_ref()).await?;
            self.feed.publish(ChangedTable::Accounts, &self.owner);
            self.feed.publish(ChangedTable::Transactions, &self.owner);
            info!(
                replayed = report.replayed,
                skipped = report.skipped.len(),
                "Offline queue drained"
            );
        }
        Ok(report)
    }

    async fn enqueue(&mut self, mutation: Mutation) -> Result<MutationOutcome> {
        let sequence = self.queue.next_sequence;
        self.queue.next_sequence += 1;
        self.queue.entries.push_back(QueuedMutation { sequence, mutation });

        if let Err(e) = self.persist_queue().await {
            self.queue.entries.pop_back();
            self.queue.next_sequence -= 1;
            return Err(e);
        }

        info!("Queued offline mutation #{}", sequence);
        Ok(MutationOutcome::Deferred { sequence })
    }

    async fn persist_queue(&self) -> Result<()> {
        self.local.store(QUEUE_KEY, &self.queue).await
    }

    /// Folds a live commit into the ledger and announces it.
    async fn record(&self, commit: &Commit, mutation: &Mutation) {
        self.ledger.write().await.apply(commit);
        for table in mutation.touches() {
            self.feed.publish(*table, &self.owner);
        }
    }

    async fn execute(&self, mutation: &Mutation) -> Result<Commit> {
        let db = self.db.as_ref();
        let owner = self.owner.as_str();
        let commit = match mutation {
            Mutation::CreateAccount { account } => create_account(db, owner, account).await?.into(),
            Mutation::UpdateAccount { account, details } => {
                let id = self.queue.resolve(*account)?;
                update_account_details(db, owner, id, details).await?.into()
            }
            Mutation::DeleteAccount { account } => {
                let id = self.queue.resolve(*account)?;
                reconcile::delete_account(db, owner, id).await?.into()
            }
            Mutation::CreateTransaction { account, draft } => {
                let draft = NewTransaction {
                    account_id: self.queue.resolve(*account)?,
                    ..draft.clone()
                };
                reconcile::create_transaction(db, owner, &draft).await?.into()
            }
            Mutation::UpdateTransaction {
                transaction,
                account,
                draft,
            } => {
                let id = self.queue.resolve(*transaction)?;
                let draft = NewTransaction {
                    account_id: self.queue.resolve(*account)?,
                    ..draft.clone()
                };
                reconcile::update_transaction(db, owner, id, &draft).await?.into()
            }
            Mutation::DeleteTransaction { transaction } => {
                let id = self.queue.resolve(*transaction)?;
                reconcile::delete_transaction(db, owner, id).await?.into()
            }
        };
        Ok(commit)
    }
}

fn created_id(commit: &Commit) -> Option<i64> {
    match commit {
        Commit::AccountSaved(account) => Some(account.id),
        Commit::TransactionSaved(posting) => Some(posting.transaction.id),
        Commit::AccountRemoved(_) | Commit::TransactionRemoved(_) => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::{
        core::{
            account::get_account_by_id,
            transaction::{TransactionFilter, list_transactions},
        },
        entities::{AccountKind, Category, TransactionKind, account},
        test_utils::*,
    };
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, RuntimeErr};

    async fn coordinator(
        db: &Arc<DatabaseConnection>,
        local: &LocalStorage,
    ) -> Result<SyncCoordinator> {
        let ledger = Arc::new(RwLock::new(Ledger::load(db.as_ref(), TEST_OWNER).await?));
        SyncCoordinator::open(
            Arc::clone(db),
            local.clone(),
            ledger,
            ChangeFeed::new(),
            TEST_OWNER,
        )
        .await
    }

    async fn balance_of(db: &DatabaseConnection, id: i64) -> Result<f64> {
        Ok(get_account_by_id(db, TEST_OWNER, id).await?.unwrap().balance)
    }

    fn create(account: EntityRef, amount: f64, kind: TransactionKind) -> Mutation {
        Mutation::CreateTransaction {
            account,
            draft: test_draft(0, amount, kind),
        }
    }

    #[tokio::test]
    async fn test_online_commits_and_updates_ledger() -> Result<()> {
        let (db, account) = setup_shared_with_account(200.0).await?;
        let local = setup_local_storage().await?;
        let mut sync = coordinator(&db, &local).await?;

        let outcome = sync
            .submit(create(account.id.into(), 50.0, TransactionKind::Expense))
            .await?;
        assert!(matches!(outcome, MutationOutcome::Committed(Commit::TransactionSaved(_))));

        let ledger = sync.ledger.read().await;
        assert_eq!(ledger.account(account.id).unwrap().balance, 150.0);
        assert_eq!(ledger.transactions().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_rejections_are_not_queued() -> Result<()> {
        let (db, account) = setup_shared_with_account(10.0).await?;
        let local = setup_local_storage().await?;
        let mut sync = coordinator(&db, &local).await?;

        let result = sync
            .submit(create(account.id.into(), 50.0, TransactionKind::Expense))
            .await;
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
        assert!(sync.queue().is_empty());
        assert_eq!(sync.connectivity(), Connectivity::Online);
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_errors_never_queued_offline() -> Result<()> {
        let (db, account) = setup_shared_with_account(10.0).await?;
        let local = setup_local_storage().await?;
        let mut sync = coordinator(&db, &local).await?;
        sync.set_connectivity(Connectivity::Offline).await?;

        let result = sync
            .submit(create(account.id.into(), -5.0, TransactionKind::Expense))
            .await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        assert!(sync.queue().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_create_update_delete_replay_in_order() -> Result<()> {
        init_test_tracing();
        let (db, account) = setup_shared_with_account(500.0).await?;
        let local = setup_local_storage().await?;
        let mut sync = coordinator(&db, &local).await?;

        sync.set_connectivity(Connectivity::Offline).await?;

        let MutationOutcome::Deferred { sequence } = sync
            .submit(create(account.id.into(), 50.0, TransactionKind::Expense))
            .await?
        else {
            panic!("expected a deferred create");
        };
        let queued = EntityRef::Queued(sequence);

        let outcome = sync
            .submit(Mutation::UpdateTransaction {
                transaction: queued,
                account: account.id.into(),
                draft: test_draft(0, 80.0, TransactionKind::Expense),
            })
            .await?;
        assert!(matches!(outcome, MutationOutcome::Deferred { .. }));
        sync.submit(Mutation::DeleteTransaction { transaction: queued })
            .await?;

        assert_eq!(sync.queue().len(), 3);
        let sequences: Vec<u64> = sync.queue().entries().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        // Nothing reached the store yet
        assert_eq!(balance_of(&db, account.id).await?, 500.0);

        let report = sync.set_connectivity(Connectivity::Online).await?.unwrap();
        assert_eq!(report.replayed, 3);
        assert!(report.skipped.is_empty());
        assert!(sync.queue().is_empty());

        // Same end state as applying the three live
        let audit = reconcile::audit_account(db.as_ref(), TEST_OWNER, account.id).await?;
        assert!(audit.is_consistent());
        assert_eq!(audit.recorded, 500.0);
        assert!(
            list_transactions(db.as_ref(), TEST_OWNER, &TransactionFilter::new())
                .await?
                .is_empty()
        );
        assert_eq!(sync.ledger.read().await.account(account.id).unwrap().balance, 500.0);

        // Drained queue is persisted empty
        let stored: PendingQueue = local.load(QUEUE_KEY).await?.unwrap();
        assert!(stored.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_account_referenced_by_queued_transaction() -> Result<()> {
        let db = setup_shared_db().await?;
        let local = setup_local_storage().await?;
        let mut sync = coordinator(&db, &local).await?;
        sync.set_connectivity(Connectivity::Offline).await?;

        let MutationOutcome::Deferred { sequence } = sync
            .submit(Mutation::CreateAccount {
                account: NewAccount {
                    details: AccountDetails::new("Trip Wallet", AccountKind::Wallet, "EUR"),
                    initial_balance: 40.0,
                },
            })
            .await?
        else {
            panic!("expected a deferred create");
        };

        let mut income = test_draft(0, 60.0, TransactionKind::Income);
        income.category = Category::Freelance;
        sync.submit(Mutation::CreateTransaction {
            account: EntityRef::Queued(sequence),
            draft: income,
        })
        .await?;

        let report = sync.set_connectivity(Connectivity::Online).await?.unwrap();
        assert_eq!(report.replayed, 2);

        let ledger = sync.ledger.read().await;
        assert_eq!(ledger.accounts().len(), 1);
        assert_eq!(ledger.accounts()[0].balance, 100.0);
        assert_eq!(ledger.transactions()[0].currency, "EUR");
        Ok(())
    }

    #[tokio::test]
    async fn test_created_ids_forgotten_once_drained() -> Result<()> {
        let db = setup_shared_db().await?;
        let local = setup_local_storage().await?;
        let mut sync = coordinator(&db, &local).await?;

        for round in 0..3 {
            sync.set_connectivity(Connectivity::Offline).await?;
            sync.submit(Mutation::CreateAccount {
                account: NewAccount {
                    details: AccountDetails::new(
                        format!("Wallet {round}"),
                        AccountKind::Wallet,
                        "USD",
                    ),
                    initial_balance: 10.0,
                },
            })
            .await?;
            let report = sync.set_connectivity(Connectivity::Online).await?.unwrap();
            assert_eq!(report.replayed, 1);

            let stored: PendingQueue = local.load(QUEUE_KEY).await?.unwrap();
            assert!(stored.is_empty());
            assert!(stored.resolved.is_empty());
        }
        assert!(sync.queue().resolved.is_empty());
        assert_eq!(sync.ledger.read().await.accounts().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_entry_is_skipped() -> Result<()> {
        let (db, account) = setup_shared_with_account(20.0).await?;
        let local = setup_local_storage().await?;
        let mut sync = coordinator(&db, &local).await?;
        sync.set_connectivity(Connectivity::Offline).await?;

        sync.submit(create(account.id.into(), 500.0, TransactionKind::Expense))
            .await?;
        sync.submit(create(EntityRef::Queued(1), 1.0, TransactionKind::Income))
            .await?;
        sync.submit(create(account.id.into(), 5.0, TransactionKind::Income))
            .await?;

        let report = sync.set_connectivity(Connectivity::Online).await?.unwrap();
        assert_eq!(report.replayed, 1);
        let skipped: Vec<u64> = report.skipped.iter().map(|s| s.sequence).collect();
        assert_eq!(skipped, vec![1, 2]);
        assert_eq!(balance_of(&db, account.id).await?, 25.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_store_goes_offline() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_errors([DbErr::Conn(RuntimeErr::Internal(
                "connection refused".to_string(),
            ))])
            .into_connection();
        let local = setup_local_storage().await?;
        let mut sync = SyncCoordinator::open(
            Arc::new(db),
            local.clone(),
            Arc::new(RwLock::new(Ledger::new())),
            ChangeFeed::new(),
            TEST_OWNER,
        )
        .await?;

        let outcome = sync
            .submit(create(EntityRef::Stored(1), 10.0, TransactionKind::Expense))
            .await?;
        assert_eq!(outcome, MutationOutcome::Deferred { sequence: 1 });
        assert_eq!(sync.connectivity(), Connectivity::Offline);

        let stored: PendingQueue = local.load(QUEUE_KEY).await?.unwrap();
        assert_eq!(stored.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_restored_queue_is_not_overtaken() -> Result<()> {
        let (db, account) = setup_shared_with_account(100.0).await?;
        let local = setup_local_storage().await?;

        {
            let mut sync = coordinator(&db, &local).await?;
            sync.set_connectivity(Connectivity::Offline).await?;
            sync.submit(create(account.id.into(), 30.0, TransactionKind::Expense))
                .await?;
        }

        // Restarted with the expense still waiting
        let mut sync = coordinator(&db, &local).await?;
        assert_eq!(sync.connectivity(), Connectivity::Offline);

        let outcome = sync
            .submit(Mutation::DeleteAccount {
                account: account.id.into(),
            })
            .await?;
        assert_eq!(outcome, MutationOutcome::Deferred { sequence: 2 });
        assert_eq!(balance_of(&db, account.id).await?, 100.0);

        let report = sync.set_connectivity(Connectivity::Online).await?.unwrap();
        assert_eq!(report.replayed, 2);
        assert!(report.skipped.is_empty());
        assert_eq!(sync.connectivity(), Connectivity::Online);
        assert!(get_account_by_id(db.as_ref(), TEST_OWNER, account.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_queue_survives_restart_and_other_owner_discarded() -> Result<()> {
        let (db, account) = setup_shared_with_account(100.0).await?;
        let local = setup_local_storage().await?;

        {
            let mut sync = coordinator(&db, &local).await?;
            sync.set_connectivity(Connectivity::Offline).await?;
            sync.submit(create(account.id.into(), 10.0, TransactionKind::Expense))
                .await?;
        }

        // Same owner picks the queue back up
        let mut sync = coordinator(&db, &local).await?;
        assert_eq!(sync.queue().len(), 1);
        let report = sync.drain().await?;
        assert_eq!(report.replayed, 1);
        assert_eq!(sync.connectivity(), Connectivity::Online);
        assert_eq!(balance_of(&db, account.id).await?, 90.0);

        // A different owner never sees it
        sync.set_connectivity(Connectivity::Offline).await?;
        sync.submit(create(account.id.into(), 10.0, TransactionKind::Expense))
            .await?;
        let other = SyncCoordinator::open(
            Arc::clone(&db),
            local.clone(),
            Arc::new(RwLock::new(Ledger::new())),
            ChangeFeed::new(),
            "intruder",
        )
        .await?;
        assert!(other.queue().is_empty());
        assert_eq!(other.connectivity(), Connectivity::Online);
        assert!(local.load::<PendingQueue>(QUEUE_KEY).await?.is_none());

        let unchanged: account::Model =
            get_account_by_id(db.as_ref(), TEST_OWNER, account.id).await?.unwrap();
        assert_eq!(unchanged.balance, 90.0);
        Ok(())
    }
}
