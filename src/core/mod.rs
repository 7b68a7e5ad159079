//! Core business logic - storage-agnostic ledger, reconciliation, currency and
//! session operations. Nothing in here knows how it is presented.

/// Account creation, lookup and detail edits
pub mod account;
/// Currency catalogue, rate tables and conversion
pub mod currency;
/// Store change notifications and the ledger reload listener
pub mod feed;
/// In-memory per-session ledger
pub mod ledger;
/// Device-local key/value persistence
pub mod local_state;
/// Per-user display preferences
pub mod preferences;
/// Balance reconciliation for transaction and account writes
pub mod reconcile;
/// Aggregations and formatting for the dashboard
pub mod report;
/// Identity and the per-session context
pub mod session;
/// Offline queue and connectivity coordination
pub mod sync;
/// Transaction types, filtering and pagination
pub mod transaction;
/// Input validation
pub mod validation;
