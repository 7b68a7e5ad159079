//! Local state entity - Durable key-value pairs kept on the device.
//!
//! Holds the last-known rate table, the pending-mutation queue and a mirror of
//! the user's preferences so the app can start without reaching the store.
//! Keys are namespaced and values are JSON documents.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Local state database model - stores namespaced key-value pairs
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "local_state")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Namespaced key (e.g., `"finance_tracker:rates"`)
    #[sea_orm(unique)]
    pub key: String,
    /// JSON-encoded value
    pub value: String,
    /// When this value was last written
    pub updated_at: DateTimeUtc,
}

/// `LocalState` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
