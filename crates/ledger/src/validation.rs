//! Request validation rules
//!
//! Shape checks collect every failing field before returning. Account checks
//! run afterwards, in a fixed order: existence, ownership, currency.

use crate::account::{Account, NewAccount};
use crate::error::{LedgerError, ValidationErrors};
use crate::transaction::PostTransaction;
use agentpay_core::{exceeds_money_scale, CurrencyCode};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Validation result with detailed error
pub type ValidationResult = Result<(), LedgerError>;

/// Field-level checks on a post request: presence, non-zero 2dp amounts,
/// exact zero sum and well-formed currency codes.
pub fn validate_post_request(request: &PostTransaction) -> ValidationResult {
    let mut errors = ValidationErrors::new();

    if request.agent_id.trim().is_empty() {
        errors.push("agent_id", "is required");
    }
    if request.description.trim().is_empty() {
        errors.push("description", "is required");
    }

    if request.postings.is_empty() {
        errors.push("postings", "must contain at least one posting");
        return errors.into_result();
    }

    for (i, posting) in request.postings.iter().enumerate() {
        if posting.account_id.trim().is_empty() {
            errors.push(format!("postings[{}].account_id", i), "is required");
        }
        if posting.amount.is_zero() {
            errors.push(format!("postings[{}].amount", i), "must not be zero");
        } else if exceeds_money_scale(posting.amount) {
            errors.push(
                format!("postings[{}].amount", i),
                format!("{} has more than 2 decimal places", posting.amount),
            );
        }
        if let Some(code) = &posting.currency {
            if let Err(e) = code.parse::<CurrencyCode>() {
                errors.push(format!("postings[{}].currency", i), e.to_string());
            }
        }
    }

    let sum: Decimal = request.postings.iter().map(|p| p.amount).sum();
    if !sum.is_zero() {
        errors.push("postings", format!("amounts must sum to 0, got {}", sum));
    }

    errors.into_result()
}

/// Field-level checks on an account request. Returns the resolved currency.
pub fn validate_new_account(request: &NewAccount) -> Result<CurrencyCode, LedgerError> {
    let mut errors = ValidationErrors::new();

    if request.agent_id.trim().is_empty() {
        errors.push("agent_id", "is required");
    }
    if request.name.trim().is_empty() {
        errors.push("name", "is required");
    }

    let currency = match request.currency.as_deref() {
        None => CurrencyCode::default(),
        Some(code) => match code.parse::<CurrencyCode>() {
            Ok(c) => c,
            Err(e) => {
                errors.push("currency", e.to_string());
                CurrencyCode::default()
            }
        },
    };

    errors.into_result()?;
    Ok(currency)
}

/// An account may only be soft-deleted once its balance is zero, so reports
/// that skip deleted accounts still foot.
pub fn validate_account_closable(account: &Account) -> ValidationResult {
    if account.balance.is_zero() {
        return Ok(());
    }
    Err(LedgerError::Validation(ValidationErrors::single(
        "balance",
        format!("must be zero to delete account {}, is {}", account.id, account.balance),
    )))
}

/// Checks a validated request against the accounts it references.
///
/// `accounts` holds whatever the store returned for the referenced ids.
/// Returns the single transaction currency and each posting's resolved currency.
pub fn validate_against_accounts(
    request: &PostTransaction,
    accounts: &HashMap<String, Account>,
) -> Result<(CurrencyCode, Vec<CurrencyCode>), LedgerError> {
    let mut referenced = Vec::with_capacity(request.postings.len());
    for posting in &request.postings {
        match accounts.get(&posting.account_id) {
            Some(account) if account.is_active() => referenced.push(account),
            _ => return Err(LedgerError::account_not_found(&posting.account_id)),
        }
    }

    for account in &referenced {
        if account.agent_id != request.agent_id {
            return Err(LedgerError::Ownership {
                account_id: account.id.clone(),
                agent_id: request.agent_id.clone(),
                owner_id: account.agent_id.clone(),
            });
        }
    }

    let mut errors = ValidationErrors::new();
    let mut resolved = Vec::with_capacity(request.postings.len());

    for (i, (posting, account)) in request.postings.iter().zip(&referenced).enumerate() {
        let currency = match posting.currency.as_deref() {
            Some(code) => code.parse::<CurrencyCode>().unwrap_or(account.currency),
            None => account.currency,
        };
        if currency != account.currency {
            errors.push(
                format!("postings[{}].currency", i),
                format!("{} does not match account currency {}", currency, account.currency),
            );
        }
        resolved.push(currency);
    }

    let transaction_currency = resolved.first().copied().unwrap_or_default();
    if resolved.iter().any(|c| *c != transaction_currency) {
        errors.push("postings", "all postings must share one currency");
    }

    errors.into_result()?;
    Ok((transaction_currency, resolved))
}
