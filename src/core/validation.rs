//! Input validation for account and transaction writes.
//!
//! Every check runs locally before the store is contacted; failures are collected
//! field by field so a form can show all of them at once.

use crate::{
    core::{account::AccountDetails, currency::is_supported_currency, transaction::NewTransaction},
    errors::{Error, FieldError, Result},
};

const MAX_ACCOUNT_NAME: usize = 100;
const MAX_BANK_NAME: usize = 100;
const MAX_ACCOUNT_NUMBER: usize = 50;
const MAX_ACCOUNT_HOLDER: usize = 100;
const MAX_NOTES: usize = 500;
const MAX_DESCRIPTION: usize = 200;

fn check_len(errors: &mut Vec<FieldError>, field: &'static str, value: Option<&str>, max: usize) {
    if let Some(value) = value {
        if value.chars().count() > max {
            errors.push(FieldError::new(
                field,
                format!("must be at most {max} characters"),
            ));
        }
    }
}

fn check_currency(errors: &mut Vec<FieldError>, code: &str) {
    if !is_supported_currency(code) {
        errors.push(FieldError::new(
            "currency",
            format!("unsupported currency code '{code}'"),
        ));
    }
}

fn finish(errors: Vec<FieldError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation { errors })
    }
}

/// Validates account details, and the opening balance when one is given.
pub fn validate_account(details: &AccountDetails, initial_balance: Option<f64>) -> Result<()> {
    let mut errors = Vec::new();

    let name = details.name.trim();
    if name.is_empty() {
        errors.push(FieldError::new("name", "account name is required"));
    }
    check_len(&mut errors, "name", Some(name), MAX_ACCOUNT_NAME);
    check_currency(&mut errors, &details.currency);
    check_len(&mut errors, "bank_name", details.bank_name.as_deref(), MAX_BANK_NAME);
    check_len(
        &mut errors,
        "account_number",
        details.account_number.as_deref(),
        MAX_ACCOUNT_NUMBER,
    );
    check_len(
        &mut errors,
        "account_holder",
        details.account_holder.as_deref(),
        MAX_ACCOUNT_HOLDER,
    );
    check_len(&mut errors, "notes", details.notes.as_deref(), MAX_NOTES);

    if let Some(balance) = initial_balance {
        if !balance.is_finite() {
            errors.push(FieldError::new("balance", "must be a valid number"));
        }
    }

    finish(errors)
}

/// Validates a transaction draft: positive amount, non-empty description,
/// category from the partition matching the transaction kind.
pub fn validate_transaction(draft: &NewTransaction) -> Result<()> {
    let mut errors = Vec::new();

    if !draft.amount.is_finite() {
        errors.push(FieldError::new("amount", "must be a valid number"));
    } else if draft.amount <= 0.0 {
        errors.push(FieldError::new("amount", "must be greater than 0"));
    }

    let description = draft.description.trim();
    if description.is_empty() {
        errors.push(FieldError::new("description", "description is required"));
    }
    check_len(&mut errors, "description", Some(description), MAX_DESCRIPTION);

    if !draft.category.allows(draft.kind) {
        errors.push(FieldError::new(
            "category",
            format!(
                "'{}' is not a valid {:?} category",
                draft.category.label(),
                draft.kind
            ),
        ));
    }

    finish(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AccountKind, Category, TransactionKind};
    use chrono::NaiveDate;

    fn details() -> AccountDetails {
        AccountDetails {
            name: "Checking".to_string(),
            kind: AccountKind::Bank,
            currency: "USD".to_string(),
            bank_name: None,
            account_number: None,
            account_holder: None,
            notes: None,
        }
    }

    fn draft() -> NewTransaction {
        NewTransaction {
            account_id: 1,
            amount: 10.0,
            description: "Lunch".to_string(),
            category: Category::FoodAndDining,
            kind: TransactionKind::Expense,
            date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap_or_default(),
        }
    }

    fn fields(result: Result<()>) -> Vec<&'static str> {
        match result {
            Err(Error::Validation { errors }) => errors.iter().map(|e| e.field).collect(),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(()) => Vec::new(),
        }
    }

    #[test]
    fn test_valid_account() {
        assert!(validate_account(&details(), Some(100.0)).is_ok());
        // Negative opening balances are allowed (credit cards)
        assert!(validate_account(&details(), Some(-250.0)).is_ok());
    }

    #[test]
    fn test_account_errors_are_collected() {
        let mut bad = details();
        bad.name = "   ".to_string();
        bad.currency = "XYZ".to_string();
        bad.notes = Some("n".repeat(501));
        assert_eq!(
            fields(validate_account(&bad, Some(f64::NAN))),
            vec!["name", "currency", "notes", "balance"]
        );
    }

    #[test]
    fn test_valid_transaction() {
        assert!(validate_transaction(&draft()).is_ok());
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let mut bad = draft();
            bad.amount = amount;
            assert_eq!(fields(validate_transaction(&bad)), vec!["amount"]);
        }
    }

    #[test]
    fn test_empty_description_rejected() {
        let mut bad = draft();
        bad.description = "  ".to_string();
        assert_eq!(fields(validate_transaction(&bad)), vec!["description"]);
    }

    #[test]
    fn test_category_must_match_kind() {
        let mut bad = draft();
        bad.category = Category::Salary;
        assert_eq!(fields(validate_transaction(&bad)), vec!["category"]);

        // "Other" is valid on both sides
        let mut other = draft();
        other.category = Category::Other;
        assert!(validate_transaction(&other).is_ok());
        other.kind = TransactionKind::Income;
        assert!(validate_transaction(&other).is_ok());
    }
}
