//! Money helpers - canonical 2-decimal handling of signed amounts
//!
//! Ledger amounts are signed `Decimal`s (positive = debit, negative = credit).
//! Everything that is hashed or compared "to the cent" goes through here so
//! that formatting is byte-stable across the workspace.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places money is carried with
pub const MONEY_SCALE: u32 = 2;

/// Round to cents, half away from zero.
///
/// # Example
/// ```
/// use agentpay_core::round_cents;
/// use rust_decimal::Decimal;
///
/// assert_eq!(round_cents(Decimal::new(10005, 3)), Decimal::new(1001, 2));
/// ```
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Canonical string form used in hashes: always exactly two decimals.
///
/// # Example
/// ```
/// use agentpay_core::format_cents;
/// use rust_decimal::Decimal;
///
/// assert_eq!(format_cents(Decimal::new(100, 0)), "100.00");
/// assert_eq!(format_cents(Decimal::new(-995, 1)), "-99.50");
/// ```
pub fn format_cents(value: Decimal) -> String {
    let mut rounded = round_cents(value);
    rounded.rescale(MONEY_SCALE);
    rounded.to_string()
}

/// Compare two amounts to the cent
pub fn eq_to_cent(a: Decimal, b: Decimal) -> bool {
    round_cents(a) == round_cents(b)
}

/// True if the value carries significant digits beyond the cent
pub fn exceeds_money_scale(value: Decimal) -> bool {
    value.normalize().scale() > MONEY_SCALE
}
