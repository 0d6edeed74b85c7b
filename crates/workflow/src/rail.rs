//! Payment rails and their limits

use agentpay_core::round_cents;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Network a payment settles over
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Rail {
    Ach,
    Card,
    Wire,
    Check,
}

/// Fee schedule: fixed + percent of amount, clamped to [min, max]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub fixed: Decimal,
    pub percent: Decimal,
    pub min: Decimal,
    pub max: Decimal,
}

impl Rail {
    /// Smallest amount the rail accepts
    pub fn min_amount(&self) -> Decimal {
        match self {
            Rail::Ach => Decimal::new(1, 2),
            Rail::Card => Decimal::new(50, 2),
            Rail::Wire | Rail::Check => Decimal::ONE,
        }
    }

    /// Largest amount the rail accepts
    pub fn max_amount(&self) -> Decimal {
        match self {
            Rail::Ach | Rail::Check => Decimal::new(100_000, 0),
            Rail::Card => Decimal::new(10_000, 0),
            Rail::Wire => Decimal::new(10_000_000, 0),
        }
    }

    pub fn accepts(&self, amount: Decimal) -> bool {
        amount >= self.min_amount() && amount <= self.max_amount()
    }

    /// Time until the rail acknowledges the payment
    pub fn processing_time(&self) -> Duration {
        match self {
            Rail::Ach => Duration::from_secs(HOUR),
            Rail::Card => Duration::from_secs(5 * 60),
            Rail::Wire => Duration::from_secs(30 * 60),
            Rail::Check => Duration::from_secs(DAY),
        }
    }

    /// Time until funds settle; wires settle in real time
    pub fn settlement_time(&self) -> Duration {
        match self {
            Rail::Ach => Duration::from_secs(DAY),
            Rail::Card => Duration::from_secs(2 * DAY),
            Rail::Wire => Duration::ZERO,
            Rail::Check => Duration::from_secs(7 * DAY),
        }
    }

    /// Higher is safer. ACH and wire are low risk, card and check medium.
    pub fn security_rank(&self) -> u8 {
        match self {
            Rail::Ach | Rail::Wire => 2,
            Rail::Card | Rail::Check => 1,
        }
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        match self {
            Rail::Ach => FeeSchedule {
                fixed: Decimal::new(50, 2),
                percent: Decimal::new(1, 3),
                min: Decimal::new(50, 2),
                max: Decimal::new(10, 0),
            },
            Rail::Card => FeeSchedule {
                fixed: Decimal::new(30, 2),
                percent: Decimal::new(29, 3),
                min: Decimal::new(30, 2),
                max: Decimal::new(50, 0),
            },
            Rail::Wire => FeeSchedule {
                fixed: Decimal::new(25, 0),
                percent: Decimal::new(1, 3),
                min: Decimal::new(25, 0),
                max: Decimal::new(100, 0),
            },
            Rail::Check => FeeSchedule {
                fixed: Decimal::ONE,
                percent: Decimal::new(5, 3),
                min: Decimal::ONE,
                max: Decimal::new(25, 0),
            },
        }
    }

    /// Fee for sending `amount`, rounded to the cent
    pub fn fee(&self, amount: Decimal) -> Decimal {
        let schedule = self.fee_schedule();
        let raw = schedule.fixed + amount * schedule.percent;
        round_cents(raw.clamp(schedule.min, schedule.max))
    }
}
