//! Session context - who is signed in, and everything scoped to them.
//!
//! A [`Session`] owns the per-user ledger, offline coordinator, preferences and
//! change-feed listener. Signing in builds them for the new identity; signing out
//! tears them down. Identity changes arrive as [`SessionEvent`]s from an
//! [`IdentityProvider`].
//!
//! Demo mode runs the same machinery against a private in-memory store seeded
//! with a fixed dataset. It never touches the configured store or the FX source.

use crate::{
    cache::RateCache,
    config::{AppConfig, DemoAccount, RatesConfig, database},
    core::{
        account::{AccountDetails, NewAccount, create_account},
        feed::{ChangeFeed, spawn_reload_listener},
        ledger::Ledger,
        local_state::LocalStorage,
        preferences::{self, Preferences},
        reconcile,
        report::{DashboardSummary, dashboard_summary},
        sync::{Connectivity, DrainReport, Mutation, MutationOutcome, SyncCoordinator},
        transaction::NewTransaction,
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, RwLock, broadcast},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// Owner id the demo dataset is seeded under.
pub const DEMO_USER_ID: &str = "demo-user";

const IN_MEMORY_URL: &str = "sqlite::memory:";

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable id every row is scoped by
    pub user_id: String,
    /// Email address, when known
    pub email: Option<String>,
}

impl Identity {
    fn demo() -> Self {
        Self {
            user_id: DEMO_USER_ID.to_string(),
            email: None,
        }
    }
}

/// Identity transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A user signed in
    SignedIn(Identity),
    /// The current user signed out
    SignedOut,
}

/// Source of the current identity and of identity transitions.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, if any.
    async fn current_user(&self) -> Option<Identity>;

    /// Signs `identity` in and announces it.
    async fn sign_in(&self, identity: Identity) -> Result<()>;

    /// Signs the current user out and announces it.
    async fn sign_out(&self) -> Result<()>;

    /// Stream of future transitions.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

/// In-process [`IdentityProvider`] for a runner with no interactive sign-in.
#[derive(Debug)]
pub struct LocalIdentityProvider {
    current: RwLock<Option<Identity>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalIdentityProvider {
    /// A provider with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            current: RwLock::new(None),
            events,
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn current_user(&self) -> Option<Identity> {
        self.current.read().await.clone()
    }

    async fn sign_in(&self, identity: Identity) -> Result<()> {
        *self.current.write().await = Some(identity.clone());
        let _ = self.events.send(SessionEvent::SignedIn(identity));
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        if self.current.write().await.take().is_some() {
            let _ = self.events.send(SessionEvent::SignedOut);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// Whether the session talks to the real store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionMode {
    /// Configured store and FX source
    Live,
    /// Private in-memory store, static rates
    Demo,
}

/// State scoped to the signed-in identity.
#[derive(Debug)]
struct Active {
    identity: Identity,
    preferences: Preferences,
    sync: SyncCoordinator,
    listener: JoinHandle<()>,
}

/// The explicit per-session context every ledger operation goes through.
#[derive(Debug)]
pub struct Session {
    mode: SessionMode,
    db: Arc<DatabaseConnection>,
    local: LocalStorage,
    rates: Arc<RateCache>,
    feed: ChangeFeed,
    debounce: Duration,
    ledger: Arc<RwLock<Ledger>>,
    active: Option<Active>,
}

impl Session {
    /// A signed-out session over the configured store.
    #[must_use]
    pub fn live(
        db: Arc<DatabaseConnection>,
        local: LocalStorage,
        rates: Arc<RateCache>,
        debounce: Duration,
    ) -> Self {
        Self {
            mode: SessionMode::Live,
            db,
            local,
            rates,
            feed: ChangeFeed::new(),
            debounce,
            ledger: Arc::new(RwLock::new(Ledger::new())),
            active: None,
        }
    }

    /// A demo session, already signed in, over a private in-memory store seeded
    /// from the configured (or built-in) dataset.
    pub async fn demo(config: &AppConfig) -> Result<Self> {
        let db = Arc::new(database::open_store(IN_MEMORY_URL).await?);
        let local = LocalStorage::new(database::open_local(IN_MEMORY_URL).await?);
        seed_demo(&db, &config.demo.dataset()).await?;

        let rates = RatesConfig {
            base_currency: crate::core::currency::FALLBACK_BASE.to_string(),
            ..config.rates.clone()
        };
        let mut session = Self {
            mode: SessionMode::Demo,
            db,
            local,
            rates: Arc::new(RateCache::new(&rates)),
            feed: ChangeFeed::new(),
            debounce: config.sync.change_debounce(),
            ledger: Arc::new(RwLock::new(Ledger::new())),
            active: None,
        };
        session.sign_in(Identity::demo()).await?;
        info!("Demo session ready");
        Ok(session)
    }

    /// Reacts to an identity transition.
    pub async fn handle(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::SignedIn(identity) => self.sign_in(identity).await,
            SessionEvent::SignedOut => {
                self.sign_out().await;
                Ok(())
            }
        }
    }

    /// Scopes the session to `identity`: loads the ledger and preferences,
    /// restores the offline queue and starts listening for changes.
    ///
    /// An unreachable store leaves the ledger empty and the session offline.
    pub async fn sign_in(&mut self, identity: Identity) -> Result<()> {
        if self.active.is_some() {
            self.sign_out().await;
        }
        let owner = identity.user_id.clone();
        info!("Signing in {}", owner);

        let (ledger, reachable) = match Ledger::load(self.db.as_ref(), &owner).await {
            Ok(ledger) => (ledger, true),
            Err(e) if e.is_unavailable() => {
                warn!("Store unreachable at sign-in, starting offline: {}", e);
                (Ledger::empty_for(&owner), false)
            }
            Err(e) => return Err(e),
        };
        *self.ledger.write().await = ledger;

        let preferences = preferences::load_with_fallback(self.db.as_ref(), &self.local, &owner).await?;

        let mut sync = SyncCoordinator::open(
            Arc::clone(&self.db),
            self.local.clone(),
            Arc::clone(&self.ledger),
            self.feed.clone(),
            &owner,
        )
        .await?;
        if !reachable {
            sync.set_connectivity(Connectivity::Offline).await?;
        } else if let Some(report) = sync.set_connectivity(Connectivity::Online).await? {
            debug!("Sign-in drain: {:?}", report);
        }

        let listener = spawn_reload_listener(
            Arc::clone(&self.db),
            Arc::clone(&self.ledger),
            self.feed.subscribe(&owner),
            self.debounce,
        );

        self.active = Some(Active {
            identity,
            preferences,
            sync,
            listener,
        });
        Ok(())
    }

    /// Clears the ledger and tears down everything scoped to the identity.
    pub async fn sign_out(&mut self) {
        if let Some(active) = self.active.take() {
            active.listener.abort();
            // Resolves once the task, and with it the subscription, is dropped
            let _ = active.listener.await;
            info!("Signed out {}", active.identity.user_id);
        }
        self.ledger.write().await.clear();
    }

    fn active(&self) -> Result<&Active> {
        self.active.as_ref().ok_or(Error::NotSignedIn)
    }

    fn active_mut(&mut self) -> Result<&mut Active> {
        self.active.as_mut().ok_or(Error::NotSignedIn)
    }

    /// Whether this is a live or demo session.
    #[must_use]
    pub const fn mode(&self) -> SessionMode {
        self.mode
    }

    /// The signed-in identity.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.active.as_ref().map(|a| &a.identity)
    }

    /// Current preferences; defaults while signed out.
    #[must_use]
    pub fn preferences(&self) -> Preferences {
        self.active
            .as_ref()
            .map(|a| a.preferences.clone())
            .unwrap_or_default()
    }

    /// Shared handle to the ledger.
    #[must_use]
    pub fn ledger(&self) -> Arc<RwLock<Ledger>> {
        Arc::clone(&self.ledger)
    }

    /// The rate cache in use.
    #[must_use]
    pub fn rates(&self) -> Arc<RateCache> {
        Arc::clone(&self.rates)
    }

    /// Current connectivity state.
    pub fn connectivity(&self) -> Result<Connectivity> {
        Ok(self.active()?.sync.connectivity())
    }

    /// Sends a mutation through the offline coordinator.
    pub async fn submit(&mut self, mutation: Mutation) -> Result<MutationOutcome> {
        self.active_mut()?.sync.submit(mutation).await
    }

    /// Opens an account.
    pub async fn create_account(&mut self, account: NewAccount) -> Result<MutationOutcome> {
        self.submit(Mutation::CreateAccount { account }).await
    }

    /// Posts a transaction to `draft.account_id`.
    pub async fn create_transaction(&mut self, draft: NewTransaction) -> Result<MutationOutcome> {
        self.submit(Mutation::CreateTransaction {
            account: draft.account_id.into(),
            draft,
        })
        .await
    }

    /// Replaces transaction `id` with `draft`.
    pub async fn update_transaction(
        &mut self,
        id: i64,
        draft: NewTransaction,
    ) -> Result<MutationOutcome> {
        self.submit(Mutation::UpdateTransaction {
            transaction: id.into(),
            account: draft.account_id.into(),
            draft,
        })
        .await
    }

    /// Deletes transaction `id`.
    pub async fn delete_transaction(&mut self, id: i64) -> Result<MutationOutcome> {
        self.submit(Mutation::DeleteTransaction {
            transaction: id.into(),
        })
        .await
    }

    /// Deletes account `id` and its transactions.
    pub async fn delete_account(&mut self, id: i64) -> Result<MutationOutcome> {
        self.submit(Mutation::DeleteAccount { account: id.into() })
            .await
    }

    /// Forwards a connectivity signal.
    pub async fn set_connectivity(&mut self, connectivity: Connectivity) -> Result<Option<DrainReport>> {
        self.active_mut()?.sync.set_connectivity(connectivity).await
    }

    /// Changes the display currency.
    pub async fn set_display_currency(&mut self, code: &str) -> Result<Preferences> {
        let owner = self.active()?.identity.user_id.clone();
        let saved = Preferences::from(preferences::set_display_currency(self.db.as_ref(), &owner, code).await?);
        self.store_preferences(saved).await
    }

    /// Shows or hides balances.
    pub async fn toggle_balance_visibility(&mut self) -> Result<Preferences> {
        let owner = self.active()?.identity.user_id.clone();
        let saved = Preferences::from(preferences::toggle_balance_visibility(self.db.as_ref(), &owner).await?);
        self.store_preferences(saved).await
    }

    async fn store_preferences(&mut self, saved: Preferences) -> Result<Preferences> {
        if let Err(e) = preferences::mirror(&self.local, &saved).await {
            warn!("Failed to mirror preferences locally: {}", e);
        }
        self.active_mut()?.preferences = saved.clone();
        Ok(saved)
    }

    /// Headline figures in the display currency.
    pub async fn summary(&self) -> Result<DashboardSummary> {
        let preferences = self.active()?.preferences.clone();
        let (rates, _) = self.rates.get_rates().await;
        let ledger = self.ledger.read().await;
        Ok(dashboard_summary(
            &ledger,
            &preferences,
            &rates,
            Utc::now().date_naive(),
        ))
    }

    /// Spawns a task applying `events` to `session` until the provider goes away.
    pub fn follow(
        session: Arc<Mutex<Self>>,
        mut events: broadcast::Receiver<SessionEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = session.lock().await.handle(event).await {
                            error!("Failed to apply session event: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Missed {} session events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Identity provider closed, no longer following");
        })
    }
}

async fn seed_demo(db: &DatabaseConnection, dataset: &[DemoAccount]) -> Result<()> {
    let today = Utc::now().date_naive();
    for demo in dataset {
        let account = create_account(
            db,
            DEMO_USER_ID,
            &NewAccount {
                details: AccountDetails::new(demo.name.as_str(), demo.kind, demo.currency.as_str()),
                initial_balance: demo.balance,
            },
        )
        .await?;

        for tx in &demo.transactions {
            let draft = NewTransaction {
                account_id: account.id,
                amount: tx.amount,
                description: tx.description.clone(),
                category: tx.category,
                kind: tx.kind,
                date: today - ChronoDuration::days(tx.days_ago),
            };
            reconcile::create_transaction(db, DEMO_USER_ID, &draft).await?;
        }
    }
    info!("Seeded {} demo accounts", dataset.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::{
        core::{feed::ChangedTable, sync::EntityRef},
        entities::{AccountKind, TransactionKind},
        test_utils::*,
    };

    fn identity(user_id: &str) -> Identity {
        Identity {
            user_id: user_id.to_string(),
            email: None,
        }
    }

    async fn live_session() -> Result<(Session, Arc<DatabaseConnection>, LocalStorage)> {
        let db = setup_shared_db().await?;
        let local = setup_local_storage().await?;
        let rates = Arc::new(RateCache::new(&RatesConfig::default()));
        let session = Session::live(Arc::clone(&db), local.clone(), rates, Duration::from_millis(5));
        Ok((session, db, local))
    }

    #[tokio::test]
    async fn test_operations_require_sign_in() -> Result<()> {
        let (mut session, _, _) = live_session().await?;
        let result = session
            .create_transaction(test_draft(1, 5.0, TransactionKind::Expense))
            .await;
        assert!(matches!(result, Err(Error::NotSignedIn)));
        assert!(matches!(session.summary().await, Err(Error::NotSignedIn)));
        Ok(())
    }

    #[tokio::test]
    async fn test_sign_in_loads_and_sign_out_clears() -> Result<()> {
        let (mut session, db, _) = live_session().await?;
        let account = create_test_account(&db, "Checking", 250.0).await?;

        session.handle(SessionEvent::SignedIn(identity(TEST_OWNER))).await?;
        assert_eq!(session.identity().unwrap().user_id, TEST_OWNER);
        {
            let ledger = session.ledger();
            let ledger = ledger.read().await;
            assert_eq!(ledger.accounts().len(), 1);
        }

        session
            .create_transaction(test_draft(account.id, 50.0, TransactionKind::Expense))
            .await?;
        let summary = session.summary().await?;
        assert_eq!(summary.total_balance, 200.0);
        assert_eq!(summary.display_currency, "USD");

        session.handle(SessionEvent::SignedOut).await?;
        assert!(session.identity().is_none());
        let ledger = session.ledger();
        let ledger = ledger.read().await;
        assert!(ledger.accounts().is_empty());
        assert!(ledger.owner().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_switching_users_discards_foreign_queue() -> Result<()> {
        let (mut session, db, _) = live_session().await?;
        let account = create_test_account(&db, "Checking", 100.0).await?;

        session.sign_in(identity(TEST_OWNER)).await?;
        session.set_connectivity(Connectivity::Offline).await?;
        let outcome = session
            .create_transaction(test_draft(account.id, 10.0, TransactionKind::Expense))
            .await?;
        assert!(matches!(outcome, MutationOutcome::Deferred { .. }));

        // A different user signs in on the same device
        session.sign_in(identity("second_user")).await?;
        assert_eq!(session.connectivity()?, Connectivity::Online);

        // The original owner's balance was never touched
        session.sign_in(identity(TEST_OWNER)).await?;
        let ledger = session.ledger();
        assert_eq!(ledger.read().await.account(account.id).unwrap().balance, 100.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_sign_out_stops_listening() -> Result<()> {
        let (mut session, db, _) = live_session().await?;
        let account = create_test_account(&db, "Checking", 80.0).await?;

        session.sign_in(identity(TEST_OWNER)).await?;
        session.sign_in(identity(TEST_OWNER)).await?;
        assert_eq!(session.feed.subscriber_count(), 1);

        session.sign_out().await;
        assert_eq!(session.feed.subscriber_count(), 0);

        // A change for the old owner no longer reaches the ledger
        create_test_transaction(&db, account.id, 5.0, TransactionKind::Income).await?;
        session.feed.publish(ChangedTable::Transactions, TEST_OWNER);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let ledger = session.ledger();
        let ledger = ledger.read().await;
        assert!(ledger.owner().is_none());
        assert!(ledger.transactions().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_sign_in_replays_earlier_queue() -> Result<()> {
        let (mut session, db, _) = live_session().await?;
        let account = create_test_account(&db, "Checking", 60.0).await?;

        session.sign_in(identity(TEST_OWNER)).await?;
        session.set_connectivity(Connectivity::Offline).await?;
        session
            .create_transaction(test_draft(account.id, 15.0, TransactionKind::Expense))
            .await?;
        session.sign_out().await;

        session.sign_in(identity(TEST_OWNER)).await?;
        assert_eq!(session.connectivity()?, Connectivity::Online);
        let ledger = session.ledger();
        assert_eq!(ledger.read().await.account(account.id).unwrap().balance, 45.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_preferences_flow() -> Result<()> {
        let (mut session, _, _) = live_session().await?;
        session.sign_in(identity(TEST_OWNER)).await?;
        assert!(session.preferences().balance_visible);

        let updated = session.toggle_balance_visibility().await?;
        assert!(!updated.balance_visible);
        assert_eq!(session.set_display_currency("gbp").await?.display_currency, "GBP");
        assert_eq!(session.summary().await?.display_currency, "GBP");
        Ok(())
    }

    #[tokio::test]
    async fn test_follow_provider_events() -> Result<()> {
        let (session, db, _) = live_session().await?;
        create_test_account(&db, "Checking", 10.0).await?;
        let session = Arc::new(Mutex::new(session));
        let provider = LocalIdentityProvider::new();

        let handle = Session::follow(Arc::clone(&session), provider.subscribe());
        provider.sign_in(identity(TEST_OWNER)).await?;
        assert_eq!(provider.current_user().await.unwrap().user_id, TEST_OWNER);

        let mut signed_in = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if session.lock().await.identity().is_some() {
                signed_in = true;
                break;
            }
        }
        assert!(signed_in, "session never saw the sign-in");

        provider.sign_out().await?;
        let mut signed_out = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if session.lock().await.identity().is_none() {
                signed_out = true;
                break;
            }
        }
        handle.abort();
        assert!(signed_out, "session never saw the sign-out");
        Ok(())
    }

    #[tokio::test]
    async fn test_demo_session_is_self_contained() -> Result<()> {
        let session = Session::demo(&AppConfig::default()).await?;
        assert_eq!(session.mode(), SessionMode::Demo);
        assert_eq!(session.identity().unwrap().user_id, DEMO_USER_ID);

        let ledger = session.ledger();
        {
            let ledger = ledger.read().await;
            assert_eq!(ledger.accounts().len(), 3);
            assert_eq!(ledger.transactions().len(), 6);
            for account in ledger.accounts() {
                let audit = reconcile::audit_account(session.db.as_ref(), DEMO_USER_ID, account.id).await?;
                assert!(audit.is_consistent());
            }
        }

        // Static rates only; there is nowhere to fetch from
        assert!(session.rates().refresh().await.is_err());
        let (rates, as_of) = session.rates().get_rates().await;
        assert_eq!(rates.rate("EUR"), Some(0.85));
        assert!(as_of.is_none());

        let summary = session.summary().await?;
        assert_eq!(summary.account_count, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_created_account_usable_by_reference() -> Result<()> {
        let (mut session, _, _) = live_session().await?;
        session.sign_in(identity(TEST_OWNER)).await?;
        session.set_connectivity(Connectivity::Offline).await?;

        let MutationOutcome::Deferred { sequence } = session
            .create_account(NewAccount {
                details: AccountDetails::new("Cash", AccountKind::Cash, "USD"),
                initial_balance: 20.0,
            })
            .await?
        else {
            panic!("expected deferral");
        };
        session
            .submit(Mutation::CreateTransaction {
                account: EntityRef::Queued(sequence),
                draft: test_draft(0, 5.0, TransactionKind::Expense),
            })
            .await?;

        let report = session.set_connectivity(Connectivity::Online).await?.unwrap();
        assert_eq!(report.replayed, 2);
        let ledger = session.ledger();
        assert_eq!(ledger.read().await.accounts()[0].balance, 15.0);
        Ok(())
    }
}
