//! Change feed - owner-scoped "something changed" notices for the row store.
//!
//! Notices carry no rows. A subscriber reacts by reloading the affected
//! collection, so a notice for a write the ledger already applied is harmless.

use crate::core::{
    account::get_accounts_for_user,
    ledger::Ledger,
    transaction::{TransactionFilter, list_transactions},
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{RwLock, broadcast},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

const FEED_CAPACITY: usize = 64;

/// Table a notice refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangedTable {
    /// The accounts table
    Accounts,
    /// The transactions table
    Transactions,
}

/// Something changed in `table` for `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    /// Table touched
    pub table: ChangedTable,
    /// Owner whose rows changed
    pub owner: String,
}

/// Broadcast channel of change notices.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeNotice>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    /// Creates a feed with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    /// Announces a change. Having nobody listening is not an error.
    pub fn publish(&self, table: ChangedTable, owner: &str) {
        let notice = ChangeNotice {
            table,
            owner: owner.to_string(),
        };
        if self.sender.send(notice).is_err() {
            debug!("Change notice for {:?} dropped, no subscribers", table);
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscribes to notices about `owner`'s rows.
    #[must_use]
    pub fn subscribe(&self, owner: &str) -> Subscription {
        Subscription {
            owner: owner.to_string(),
            receiver: self.sender.subscribe(),
        }
    }
}

/// Set of tables touched since the last reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    /// Accounts need reloading
    pub accounts: bool,
    /// Transactions need reloading
    pub transactions: bool,
}

impl Changes {
    fn mark(&mut self, table: ChangedTable) {
        match table {
            ChangedTable::Accounts => self.accounts = true,
            ChangedTable::Transactions => self.transactions = true,
        }
    }

    const fn everything() -> Self {
        Self {
            accounts: true,
            transactions: true,
        }
    }
}

/// One owner's view of the feed.
#[derive(Debug)]
pub struct Subscription {
    owner: String,
    receiver: broadcast::Receiver<ChangeNotice>,
}

impl Subscription {
    /// Waits for the next notice about this owner. `None` once the feed is gone.
    ///
    /// Lagging behind the channel is reported as a change to both tables.
    pub async fn next(&mut self) -> Option<Changes> {
        loop {
            match self.receiver.recv().await {
                Ok(notice) if notice.owner == self.owner => {
                    let mut changes = Changes::default();
                    changes.mark(notice.table);
                    return Some(changes);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Change feed lagged by {} notices", skipped);
                    return Some(Changes::everything());
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Folds every notice already waiting into `changes` without blocking.
    fn drain_into(&mut self, changes: &mut Changes) {
        loop {
            match self.receiver.try_recv() {
                Ok(notice) if notice.owner == self.owner => changes.mark(notice.table),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(_)) => *changes = Changes::everything(),
                Err(_) => break,
            }
        }
    }
}

/// Spawns the task that reloads `ledger` whenever the feed reports a change.
///
/// Each burst of notices is debounced: the task waits `debounce` after the first
/// one, folds in whatever else arrived, then reads the touched collections once.
/// The ledger lock is only taken to swap the fresh rows in, never across a store
/// round-trip. Read failures are logged and the task keeps listening. Abort the
/// returned handle to tear the subscription down.
pub fn spawn_reload_listener(
    db: Arc<DatabaseConnection>,
    ledger: Arc<RwLock<Ledger>>,
    mut subscription: Subscription,
    debounce: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Change listener started for {}", subscription.owner);
        while let Some(mut changes) = subscription.next().await {
            tokio::time::sleep(debounce).await;
            subscription.drain_into(&mut changes);

            let owner = subscription.owner.as_str();
            if ledger.read().await.owner() != Some(owner) {
                debug!("Ledger no longer belongs to {}, ignoring change", owner);
                continue;
            }

            let accounts = if changes.accounts {
                get_accounts_for_user(db.as_ref(), owner)
                    .await
                    .inspect_err(|e| warn!("Failed to reload accounts after change notice: {}", e))
                    .ok()
            } else {
                None
            };
            let transactions = if changes.transactions {
                list_transactions(db.as_ref(), owner, &TransactionFilter::new())
                    .await
                    .inspect_err(|e| {
                        warn!("Failed to reload transactions after change notice: {}", e);
                    })
                    .ok()
            } else {
                None
            };

            let mut guard = ledger.write().await;
            // Sign-out may have happened while reading
            if guard.owner() != Some(owner) {
                continue;
            }
            if let Some(rows) = accounts {
                guard.replace_accounts(rows);
            }
            if let Some(rows) = transactions {
                guard.replace_transactions(rows);
            }
        }
        debug!("Change feed closed, listener exiting");
    })
}
