//! User preferences - display currency, balance visibility and budget alerts.
//!
//! One row per user, created with defaults on first load. Every write is mirrored
//! to local storage so the last known settings survive an unreachable store.

use crate::{
    core::{
        currency::is_supported_currency,
        local_state::{LocalStorage, PREFERENCES_KEY},
    },
    entities::{UserPreferences, user_preferences},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Currency aggregates are shown in until the user picks another.
pub const DEFAULT_DISPLAY_CURRENCY: &str = "USD";

/// The settings a session works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Currency for cross-account aggregates
    pub display_currency: String,
    /// Whether balances are shown or masked
    pub balance_visible: bool,
    /// Whether budget alerts are enabled
    pub budget_alerts: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            display_currency: DEFAULT_DISPLAY_CURRENCY.to_string(),
            balance_visible: true,
            budget_alerts: true,
        }
    }
}

impl From<user_preferences::Model> for Preferences {
    fn from(model: user_preferences::Model) -> Self {
        Self {
            display_currency: model.display_currency,
            balance_visible: model.balance_visible,
            budget_alerts: model.budget_alerts,
        }
    }
}

/// Reads `owner`'s preferences, creating the default row on first use.
pub async fn load_or_create<C>(db: &C, owner: &str) -> Result<user_preferences::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = UserPreferences::find_by_id(owner.to_string()).one(db).await? {
        return Ok(existing);
    }

    let defaults = Preferences::default();
    let now = Utc::now();
    let created = user_preferences::ActiveModel {
        user_id: Set(owner.to_string()),
        display_currency: Set(defaults.display_currency),
        balance_visible: Set(defaults.balance_visible),
        budget_alerts: Set(defaults.budget_alerts),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    info!(owner, "Created default preferences");
    Ok(created)
}

async fn save<C>(
    db: &C,
    owner: &str,
    change: impl FnOnce(&mut user_preferences::ActiveModel),
) -> Result<user_preferences::Model>
where
    C: ConnectionTrait,
{
    let current = load_or_create(db, owner).await?;
    let mut active_model: user_preferences::ActiveModel = current.into();
    change(&mut active_model);
    active_model.updated_at = Set(Utc::now());
    active_model.update(db).await.map_err(Into::into)
}

/// Changes the display currency; it must be a supported currency.
pub async fn set_display_currency<C>(
    db: &C,
    owner: &str,
    code: &str,
) -> Result<user_preferences::Model>
where
    C: ConnectionTrait,
{
    let code = code.trim().to_uppercase();
    if !is_supported_currency(&code) {
        return Err(Error::invalid(
            "display_currency",
            format!("unsupported currency code '{code}'"),
        ));
    }
    debug!(owner, code = %code, "Setting display currency");
    save(db, owner, |p| p.display_currency = Set(code)).await
}

/// Shows or masks balances.
pub async fn set_balance_visible<C>(
    db: &C,
    owner: &str,
    visible: bool,
) -> Result<user_preferences::Model>
where
    C: ConnectionTrait,
{
    save(db, owner, |p| p.balance_visible = Set(visible)).await
}

/// Flips balance visibility and returns the new row.
pub async fn toggle_balance_visibility<C>(db: &C, owner: &str) -> Result<user_preferences::Model>
where
    C: ConnectionTrait,
{
    let current = load_or_create(db, owner).await?;
    set_balance_visible(db, owner, !current.balance_visible).await
}

/// Enables or disables budget alerts.
pub async fn set_budget_alerts<C>(
    db: &C,
    owner: &str,
    enabled: bool,
) -> Result<user_preferences::Model>
where
    C: ConnectionTrait,
{
    save(db, owner, |p| p.budget_alerts = Set(enabled)).await
}

/// Copies preferences into local storage.
pub async fn mirror(local: &LocalStorage, preferences: &Preferences) -> Result<()> {
    local.store(PREFERENCES_KEY, preferences).await
}

/// Loads preferences from the store, mirroring them locally.
///
/// When the store cannot be reached the local mirror is used, then defaults.
pub async fn load_with_fallback<C>(db: &C, local: &LocalStorage, owner: &str) -> Result<Preferences>
where
    C: ConnectionTrait,
{
    match load_or_create(db, owner).await {
        Ok(model) => {
            let preferences = Preferences::from(model);
            if let Err(e) = mirror(local, &preferences).await {
                warn!("Failed to mirror preferences locally: {}", e);
            }
            Ok(preferences)
        }
        Err(e) if e.is_unavailable() => {
            warn!("Store unreachable, using locally mirrored preferences: {}", e);
            Ok(local
                .load::<Preferences>(PREFERENCES_KEY)
                .await?
                .unwrap_or_default())
        }
        Err(e) => Err(e),
    }
}
