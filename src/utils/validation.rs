//! Validation utilities

use crate::types::*;
use bigdecimal::BigDecimal;

/// Validate that an amount is positive
pub fn validate_positive_amount(field: &str, amount: &BigDecimal) -> BooksResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(BooksError::validation(field, "amount must be positive"))
    } else {
        Ok(())
    }
}

/// Validate an account code: non-empty, bounded, alphanumeric plus
/// dashes and underscores.
pub fn validate_account_code(code: &str) -> BooksResult<()> {
    if code.trim().is_empty() {
        return Err(BooksError::validation("code", "account code cannot be empty"));
    }

    if code.len() > 50 {
        return Err(BooksError::validation(
            "code",
            "account code cannot exceed 50 characters",
        ));
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(BooksError::validation(
            "code",
            "account code can only contain alphanumeric characters, dashes, and underscores",
        ));
    }

    Ok(())
}

/// Validate an account name: non-empty and bounded.
pub fn validate_account_name(name: &str) -> BooksResult<()> {
    if name.trim().is_empty() {
        return Err(BooksError::validation("name", "account name cannot be empty"));
    }

    if name.len() > 100 {
        return Err(BooksError::validation(
            "name",
            "account name cannot exceed 100 characters",
        ));
    }

    Ok(())
}

/// Validate a narration or description: non-empty and bounded.
pub fn validate_narration(narration: &str) -> BooksResult<()> {
    if narration.trim().is_empty() {
        return Err(BooksError::validation(
            "narration",
            "narration cannot be empty",
        ));
    }

    if narration.len() > 500 {
        return Err(BooksError::validation(
            "narration",
            "narration cannot exceed 500 characters",
        ));
    }

    Ok(())
}
