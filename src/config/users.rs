//! Signed-in user configuration from environment variables.
//!
//! The runner has no interactive sign-in flow; it picks up the identity to
//! sign in as from `FINANCE_USER_ID` and `FINANCE_USER_EMAIL` (see `.env`).

use crate::core::session::Identity;

/// Reads the configured identity, if `FINANCE_USER_ID` is set and non-empty.
#[must_use]
pub fn configured_identity() -> Option<Identity> {
    let user_id = std::env::var("FINANCE_USER_ID").ok()?;
    identity_from_parts(&user_id, std::env::var("FINANCE_USER_EMAIL").ok())
}

fn identity_from_parts(user_id: &str, email: Option<String>) -> Option<Identity> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return None;
    }
    Some(Identity {
        user_id: user_id.to_string(),
        email: email.filter(|e| !e.trim().is_empty()),
    })
}
