//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities are the typed row model: rows from the store are decoded into
//! them before anything enters the ledger.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod account;
pub mod currency_rates;
pub mod local_state;
pub mod transaction;
pub mod user_preferences;

// Re-export specific types to avoid conflicts
pub use account::{AccountKind, Column as AccountColumn, Entity as Account, Model as AccountModel};
pub use currency_rates::{
    Column as CurrencyRatesColumn, Entity as CurrencyRates, Model as CurrencyRatesModel,
};
pub use local_state::{Column as LocalStateColumn, Entity as LocalState, Model as LocalStateModel};
pub use transaction::{
    Category, Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
    TransactionKind,
};
pub use user_preferences::{
    Column as UserPreferencesColumn, Entity as UserPreferences, Model as UserPreferencesModel,
};
