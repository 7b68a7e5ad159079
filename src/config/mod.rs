//! Application configuration loaded from `config.toml`, with environment overrides.

/// Database configuration and connection management
pub mod database;

/// Demo dataset used when no backend is available
pub mod demo;

/// Signed-in user configuration from environment variables
pub mod users;

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

pub use demo::{DemoAccount, DemoConfig, DemoTransaction};

/// Default location of the row store of record
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/finance_tracker.sqlite?mode=rwc";
/// Default location of the device-local state
pub const DEFAULT_LOCAL_DATABASE_URL: &str = "sqlite://data/finance_tracker_local.sqlite?mode=rwc";
/// Accepted range of `[rates] staleness_hours`
pub const STALENESS_HOURS_RANGE: std::ops::RangeInclusive<i64> = 1..=6;
/// Accepted range of `[rates] refresh_interval_hours` (up to a week)
pub const REFRESH_INTERVAL_HOURS_RANGE: std::ops::RangeInclusive<u64> = 1..=168;
/// Default exchange-rate endpoint
pub const DEFAULT_CURRENCY_API_URL: &str = "https://api.exchangerate.host/latest";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Row store of record
    pub store: StoreConfig,
    /// Device-local durable state
    pub local: LocalConfig,
    /// Exchange-rate source and cache policy
    pub rates: RatesConfig,
    /// Offline queue and change-feed settings
    pub sync: SyncConfig,
    /// Demo mode dataset
    pub demo: DemoConfig,
}

/// Where the row store of record lives
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `SeaORM` connection URL
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

/// Where device-local state lives
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// `SeaORM` connection URL
    pub database_url: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_LOCAL_DATABASE_URL.to_string(),
        }
    }
}

/// Exchange-rate source and staleness policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    /// Endpoint queried as `GET {api_url}?base={base_currency}`
    pub api_url: String,
    /// Base currency of the rate table
    pub base_currency: String,
    /// Cached rates older than this are refreshed on load
    pub staleness_hours: i64,
    /// Period of the background refresh task
    pub refresh_interval_hours: u64,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_CURRENCY_API_URL.to_string(),
            base_currency: "USD".to_string(),
            staleness_hours: 6,
            refresh_interval_hours: 6,
        }
    }
}

impl RatesConfig {
    /// Checks the staleness threshold and refresh period are in range.
    pub fn validate(&self) -> Result<()> {
        if !STALENESS_HOURS_RANGE.contains(&self.staleness_hours) {
            return Err(Error::Config {
                message: format!(
                    "rates.staleness_hours must be between {} and {}, got {}",
                    STALENESS_HOURS_RANGE.start(),
                    STALENESS_HOURS_RANGE.end(),
                    self.staleness_hours
                ),
            });
        }
        if !REFRESH_INTERVAL_HOURS_RANGE.contains(&self.refresh_interval_hours) {
            return Err(Error::Config {
                message: format!(
                    "rates.refresh_interval_hours must be between {} and {}, got {}",
                    REFRESH_INTERVAL_HOURS_RANGE.start(),
                    REFRESH_INTERVAL_HOURS_RANGE.end(),
                    self.refresh_interval_hours
                ),
            });
        }
        Ok(())
    }

    /// Staleness threshold as a `chrono` duration, clamped to the accepted range.
    #[must_use]
    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::hours(
            self.staleness_hours
                .clamp(*STALENESS_HOURS_RANGE.start(), *STALENESS_HOURS_RANGE.end()),
        )
    }

    /// Refresh period as a `std` duration, clamped to the accepted range.
    #[must_use]
    pub fn refresh_interval(&self) -> std::time::Duration {
        let hours = self.refresh_interval_hours.clamp(
            *REFRESH_INTERVAL_HOURS_RANGE.start(),
            *REFRESH_INTERVAL_HOURS_RANGE.end(),
        );
        std::time::Duration::from_secs(hours * 60 * 60)
    }
}

/// Change-feed settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay before a change notice triggers a reload
    pub change_debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            change_debounce_ms: 250,
        }
    }
}

impl SyncConfig {
    /// Debounce delay as a `std` duration.
    #[must_use]
    pub const fn change_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.change_debounce_ms)
    }
}

impl AppConfig {
    /// Applies `DATABASE_URL`, `LOCAL_DATABASE_URL`, `CURRENCY_API_URL` and
    /// `FINANCE_DEMO` from the environment on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.store.database_url = url;
        }
        if let Ok(url) = std::env::var("LOCAL_DATABASE_URL") {
            self.local.database_url = url;
        }
        if let Ok(url) = std::env::var("CURRENCY_API_URL") {
            self.rates.api_url = url;
        }
        if let Ok(flag) = std::env::var("FINANCE_DEMO") {
            self.demo.enabled = matches!(flag.as_str(), "1" | "true" | "yes");
        }
    }
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    parse_config(&contents)
}

/// Parses configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.rates.validate()?;
    Ok(config)
}

/// Loads configuration from `./config.toml` if present, defaults otherwise,
/// then applies environment overrides.
pub fn load_default_config() -> Result<AppConfig> {
    let path = Path::new("config.toml");
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        tracing::info!("No config.toml found, using defaults");
        AppConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}
