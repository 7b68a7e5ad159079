//! Currency rates entity - The shared exchange-rate snapshot, one row per base currency.
//!
//! `rates` holds a JSON object mapping currency code to rate-per-base-unit.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Currency rates database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "currency_rates")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Base currency code; unique key for upserts
    #[sea_orm(unique)]
    pub base_currency: String,
    /// JSON-encoded `{code: rate}` map
    pub rates: String,
    /// When the snapshot was fetched
    pub last_updated: DateTimeUtc,
}

/// `CurrencyRates` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
