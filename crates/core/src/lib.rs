//! AgentPay Core - Domain primitives
//!
//! This crate contains the small value types shared by every other crate:
//! - `money`: 2-decimal canonical formatting and cent-level comparison
//! - `CurrencyCode`: validated 3-letter currency code
//! - `new_id`: random identifiers for accounts, transactions, events

pub mod currency;
pub mod id;
pub mod money;

pub use currency::{CurrencyCode, CurrencyError};
pub use id::new_id;
pub use money::{eq_to_cent, exceeds_money_scale, format_cents, round_cents, MONEY_SCALE};
