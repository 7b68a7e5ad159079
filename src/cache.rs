//! Exchange-rate cache.
//!
//! Holds the last fetched [`RateTable`] and when it was fetched. The table is
//! persisted to the store's `currency_rates` row and to local storage so it
//! survives restarts. Refresh failures never take a working table away: the
//! previous table, or the built-in one if nothing was ever cached, stays in effect.

use crate::{
    config::RatesConfig,
    core::{
        currency::RateTable,
        local_state::{LocalStorage, RATES_KEY},
    },
    entities::{CurrencyRates, currency_rates},
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use sea_orm::{DatabaseConnection, Set, prelude::*};
use serde::Deserialize;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, error, info, trace, warn};

const MIN_REFRESH_PERIOD: Duration = Duration::from_secs(1);

/// Somewhere to fetch the latest rates from.
#[async_trait]
pub trait FxSource: Send + Sync {
    /// Fetches a fresh table with rates per unit of `base`.
    async fn fetch(&self, base: &str) -> Result<RateTable>;
}

/// Response body of the exchange-rate endpoint.
#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    #[serde(default)]
    success: Option<bool>,
    base: Option<String>,
    rates: Option<HashMap<String, f64>>,
}

/// [`FxSource`] backed by an HTTP endpoint answering `GET {url}?base=USD`.
#[derive(Debug, Clone)]
pub struct HttpFxSource {
    client: Client,
    api_url: String,
}

impl HttpFxSource {
    /// Creates a source for `api_url`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl FxSource for HttpFxSource {
    async fn fetch(&self, base: &str) -> Result<RateTable> {
        debug!("Fetching exchange rates from {} for base {}", self.api_url, base);
        let response: ExchangeRateResponse = self
            .client
            .get(&self.api_url)
            .query(&[("base", base)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_response(response, base)
    }
}

fn parse_response(response: ExchangeRateResponse, requested_base: &str) -> Result<RateTable> {
    if response.success == Some(false) {
        return Err(Error::RateSource {
            message: "source reported failure".to_string(),
        });
    }
    let rates = response
        .rates
        .filter(|rates| !rates.is_empty())
        .ok_or_else(|| Error::RateSource {
            message: "response contained no rates".to_string(),
        })?;
    let base = response.base.unwrap_or_else(|| requested_base.to_string());
    Ok(RateTable::new(base, rates, Utc::now()))
}

/// Cached exchange rates plus the policy for refreshing them.
pub struct RateCache {
    source: Option<Arc<dyn FxSource>>,
    store: Option<Arc<DatabaseConnection>>,
    local: Option<LocalStorage>,
    base: String,
    staleness: chrono::Duration,
    table: RwLock<Option<RateTable>>,
    refreshing: AtomicBool,
}

impl std::fmt::Debug for RateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateCache")
            .field("base", &self.base)
            .field("staleness", &self.staleness)
            .field("has_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

/// Clears the in-flight flag when a refresh ends, however it ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RateCache {
    /// An empty cache with the configured base and staleness and nowhere to
    /// fetch from or persist to.
    #[must_use]
    pub fn new(config: &RatesConfig) -> Self {
        Self {
            source: None,
            store: None,
            local: None,
            base: config.base_currency.clone(),
            staleness: config.staleness(),
            table: RwLock::new(None),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Fetches from `source` on refresh.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn FxSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Persists to, and restores from, the store's shared rate row.
    #[must_use]
    pub fn with_store(mut self, db: Arc<DatabaseConnection>) -> Self {
        self.store = Some(db);
        self
    }

    /// Persists to, and restores from, local storage.
    #[must_use]
    pub fn with_local(mut self, local: LocalStorage) -> Self {
        self.local = Some(local);
        self
    }

    /// The table in effect and when it was fetched.
    ///
    /// When nothing was ever cached this is the built-in table and `None`.
    pub async fn get_rates(&self) -> (RateTable, Option<DateTime<Utc>>) {
        match self.table.read().await.as_ref() {
            Some(table) => (table.clone(), Some(table.last_updated())),
            None => (RateTable::fallback(), None),
        }
    }

    /// Whether the cached table is missing or older than the staleness threshold.
    pub async fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.table
            .read()
            .await
            .as_ref()
            .is_none_or(|table| now - table.last_updated() > self.staleness)
    }

    /// Whether a refresh is in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    /// Fetches a new table, replaces the cached one and persists it.
    ///
    /// On failure the cached table is left untouched and the error is returned
    /// so a manual refresh can report it.
    pub async fn refresh(&self) -> Result<RateTable> {
        let Some(source) = self.source.as_ref() else {
            return Err(Error::RateSource {
                message: "no exchange-rate source configured".to_string(),
            });
        };

        self.refreshing.store(true, Ordering::SeqCst);
        let _guard = RefreshGuard(&self.refreshing);

        let table = source.fetch(&self.base).await.inspect_err(|e| {
            warn!("Exchange rate refresh failed, keeping previous rates: {}", e);
        })?;

        *self.table.write().await = Some(table.clone());
        info!(
            "Exchange rates refreshed: {} currencies against {}",
            table.rates().len(),
            table.base()
        );

        self.persist(&table).await;
        Ok(table)
    }

    /// Restores the newest persisted table, then refreshes if it is missing or
    /// stale. A failed refresh is logged and the restored table kept.
    pub async fn load(&self) -> RateTable {
        let local = match self.load_local().await {
            Ok(table) => table,
            Err(e) => {
                warn!("Could not read locally cached rates: {}", e);
                None
            }
        };
        let stored = match self.load_stored().await {
            Ok(table) => table,
            Err(e) => {
                warn!("Could not read stored rates: {}", e);
                None
            }
        };

        let newest = match (local, stored) {
            (Some(a), Some(b)) => Some(if a.last_updated() >= b.last_updated() { a } else { b }),
            (a, b) => a.or(b),
        };
        if let Some(table) = newest {
            debug!("Restored exchange rates from {}", table.last_updated());
            *self.table.write().await = Some(table);
        }

        if self.is_stale(Utc::now()).await && self.source.is_some() {
            // Failure already logged; the restored table stays in effect
            let _ = self.refresh().await;
        }
        self.get_rates().await.0
    }

    /// Spawns a task refreshing every `period`. Failures are logged only.
    /// A zero `period` is raised to one second.
    pub fn spawn_periodic_refresh(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = self;
        let period = period.max(MIN_REFRESH_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; load() already covered it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                trace!("Periodic exchange rate refresh");
                let _ = cache.refresh().await;
            }
        })
    }

    async fn persist(&self, table: &RateTable) {
        if let Some(local) = &self.local {
            if let Err(e) = local.store(RATES_KEY, table).await {
                error!("Failed to cache rates locally: {}", e);
            }
        }
        if let Some(db) = &self.store {
            if let Err(e) = upsert_stored(db, table).await {
                warn!("Failed to save rates to the store: {}", e);
            }
        }
    }

    async fn load_local(&self) -> Result<Option<RateTable>> {
        match &self.local {
            Some(local) => Ok(local
                .load::<RateTable>(RATES_KEY)
                .await?
                .filter(|table| table.base() == self.base)),
            None => Ok(None),
        }
    }

    async fn load_stored(&self) -> Result<Option<RateTable>> {
        let Some(db) = &self.store else {
            return Ok(None);
        };
        let row = CurrencyRates::find()
            .filter(currency_rates::Column::BaseCurrency.eq(self.base.as_str()))
            .one(db.as_ref())
            .await?;
        match row {
            Some(row) => {
                let rates: HashMap<String, f64> = serde_json::from_str(&row.rates)?;
                Ok(Some(RateTable::new(row.base_currency, rates, row.last_updated)))
            }
            None => Ok(None),
        }
    }
}

/// Writes `table` to the store's row for its base currency.
async fn upsert_stored(db: &DatabaseConnection, table: &RateTable) -> Result<()> {
    let rates = serde_json::to_string(table.rates())?;
    let existing = CurrencyRates::find()
        .filter(currency_rates::Column::BaseCurrency.eq(table.base()))
        .one(db)
        .await?;

    if let Some(row) = existing {
        let mut active_model: currency_rates::ActiveModel = row.into();
        active_model.rates = Set(rates);
        active_model.last_updated = Set(table.last_updated());
        active_model.update(db).await?;
    } else {
        currency_rates::ActiveModel {
            base_currency: Set(table.base().to_string()),
            rates: Set(rates),
            last_updated: Set(table.last_updated()),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}
