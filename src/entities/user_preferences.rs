//! User preferences entity - One row per user holding display settings.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User preferences database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_preferences")]
pub struct Model {
    /// Owning user; one row per user
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Currency all cross-account aggregates are shown in
    pub display_currency: String,
    /// Whether balances are shown or masked
    pub balance_visible: bool,
    /// Whether budget alerts are enabled
    pub budget_alerts: bool,
    /// When the row was created
    pub created_at: DateTimeUtc,
    /// When the row was last written
    pub updated_at: DateTimeUtc,
}

/// `UserPreferences` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
