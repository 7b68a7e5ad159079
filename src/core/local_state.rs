//! Device-local durable state.
//!
//! A small key-value store, separate from the row store of record, that keeps
//! what the app needs to resume without connectivity: the last rate table, the
//! pending-mutation queue and a mirror of the user's preferences. Keys are
//! namespaced and values are JSON documents.

use crate::{
    entities::{LocalState, local_state},
    errors::Result,
};
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::trace;

const NAMESPACE: &str = "finance_tracker";

/// Key of the cached exchange-rate table
pub const RATES_KEY: &str = "rates";
/// Key of the pending offline mutation queue
pub const QUEUE_KEY: &str = "pending_mutations";
/// Key of the mirrored user preferences
pub const PREFERENCES_KEY: &str = "preferences";

fn namespaced(key: &str) -> String {
    format!("{NAMESPACE}:{key}")
}

/// Handle to the local state database.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    db: Arc<DatabaseConnection>,
}

impl LocalStorage {
    /// Wraps a connection whose `local_state` table already exists.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    /// Reads and decodes the value stored under `key`.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let row = LocalState::find()
            .filter(local_state::Column::Key.eq(namespaced(key)))
            .one(self.db.as_ref())
            .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.value)?)),
            None => Ok(None),
        }
    }

    /// Encodes `value` and stores it under `key`, replacing any previous value.
    pub async fn store<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let key = namespaced(key);
        let json = serde_json::to_string(value)?;
        let now = Utc::now();

        let existing = LocalState::find()
            .filter(local_state::Column::Key.eq(key.as_str()))
            .one(self.db.as_ref())
            .await?;

        if let Some(row) = existing {
            let mut active_model: local_state::ActiveModel = row.into();
            active_model.value = Set(json);
            active_model.updated_at = Set(now);
            active_model.update(self.db.as_ref()).await?;
        } else {
            local_state::ActiveModel {
                key: Set(key.clone()),
                value: Set(json),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(self.db.as_ref())
            .await?;
        }
        trace!("Stored local state under {}", key);
        Ok(())
    }

    /// Removes the value stored under `key`, if any.
    pub async fn remove(&self, key: &str) -> Result<()> {
        LocalState::delete_many()
            .filter(local_state::Column::Key.eq(namespaced(key)))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_local_storage;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_missing_key_is_none() -> Result<()> {
        let local = setup_local_storage().await?;
        let value: Option<Sample> = local.load("nothing").await?;
        assert!(value.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_store_then_overwrite() -> Result<()> {
        let local = setup_local_storage().await?;
        let first = Sample {
            name: "a".to_string(),
            count: 1,
        };
        let second = Sample {
            name: "b".to_string(),
            count: 2,
        };

        local.store("sample", &first).await?;
        local.store("sample", &second).await?;

        let loaded: Option<Sample> = local.load("sample").await?;
        assert_eq!(loaded, Some(second));

        // Exactly one row for the key
        let rows = LocalState::find().all(local.db.as_ref()).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "finance_tracker:sample");
        Ok(())
    }

    #[tokio::test]
    async fn test_remove() -> Result<()> {
        let local = setup_local_storage().await?;
        local.store("gone", &42_u32).await?;
        local.remove("gone").await?;
        let value: Option<u32> = local.load("gone").await?;
        assert!(value.is_none());
        Ok(())
    }
}
