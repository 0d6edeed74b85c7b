//! Automatic rail selection
//!
//! Candidates are the rails whose limits accept the amount. Exclusions are
//! binding. Preferred rails and timing limits only narrow the candidates when
//! at least one rail survives them. The priority then picks one rail.

use crate::error::{WorkflowError, WorkflowResult};
use crate::rail::Rail;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::time::Duration;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPriority {
    /// ACH under 100, card from 100 to 1,000, wire above 10,000
    #[default]
    Optimal,
    /// Shortest processing time
    Speed,
    /// Lowest fee for the amount
    Cost,
    /// Lowest risk rail
    Security,
}

/// Caller preferences for automatic selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailPreferences {
    #[serde(default)]
    pub priority: SelectionPriority,
    #[serde(default)]
    pub preferred: Vec<Rail>,
    #[serde(default)]
    pub excluded: Vec<Rail>,
    #[serde(default)]
    pub max_processing_time: Option<Duration>,
    #[serde(default)]
    pub max_settlement_time: Option<Duration>,
}

impl RailPreferences {
    pub fn priority(mut self, priority: SelectionPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn prefer(mut self, rail: Rail) -> Self {
        self.preferred.push(rail);
        self
    }

    pub fn exclude(mut self, rail: Rail) -> Self {
        self.excluded.push(rail);
        self
    }

    pub fn max_processing_time(mut self, limit: Duration) -> Self {
        self.max_processing_time = Some(limit);
        self
    }

    pub fn max_settlement_time(mut self, limit: Duration) -> Self {
        self.max_settlement_time = Some(limit);
        self
    }
}

/// Picks a rail for requests that do not name one
#[derive(Debug, Clone)]
pub struct RailSelector {
    rails: Vec<Rail>,
}

impl Default for RailSelector {
    fn default() -> Self {
        Self::new(Rail::iter())
    }
}

impl RailSelector {
    /// Selector over `rails`; ties go to the earlier rail
    pub fn new(rails: impl IntoIterator<Item = Rail>) -> Self {
        Self {
            rails: rails.into_iter().collect(),
        }
    }

    pub fn select(&self, amount: Decimal, preferences: Option<&RailPreferences>) -> WorkflowResult<Rail> {
        let candidates: Vec<Rail> = self.rails.iter().copied().filter(|r| r.accepts(amount)).collect();
        if candidates.is_empty() {
            return Err(no_rail(amount));
        }

        let Some(prefs) = preferences else {
            return optimal(&candidates, amount).ok_or_else(|| no_rail(amount));
        };

        let allowed: Vec<Rail> = candidates.into_iter().filter(|r| !prefs.excluded.contains(r)).collect();
        if allowed.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "every rail that accepts {} USD is excluded",
                amount
            )));
        }

        let mut pool = narrow(allowed, |r| prefs.preferred.contains(r));
        if let Some(limit) = prefs.max_processing_time {
            pool = narrow(pool, |r| r.processing_time() <= limit);
        }
        if let Some(limit) = prefs.max_settlement_time {
            pool = narrow(pool, |r| r.settlement_time() <= limit);
        }

        let chosen = match prefs.priority {
            SelectionPriority::Optimal => optimal(&pool, amount),
            SelectionPriority::Speed => pool.iter().copied().min_by_key(|r| r.processing_time()),
            SelectionPriority::Cost => pool.iter().copied().min_by_key(|r| r.fee(amount)),
            SelectionPriority::Security => pool.iter().copied().min_by_key(|r| Reverse(r.security_rank())),
        };
        chosen.ok_or_else(|| no_rail(amount))
    }
}

fn no_rail(amount: Decimal) -> WorkflowError {
    WorkflowError::Validation(format!("no rail accepts {} USD", amount))
}

/// Keep the rails matching `keep`, or all of them if none match
fn narrow(rails: Vec<Rail>, keep: impl Fn(&Rail) -> bool) -> Vec<Rail> {
    let kept: Vec<Rail> = rails.iter().copied().filter(|r| keep(r)).collect();
    if kept.is_empty() {
        rails
    } else {
        kept
    }
}

fn optimal(candidates: &[Rail], amount: Decimal) -> Option<Rail> {
    let banded = if amount < Decimal::ONE_HUNDRED {
        Some(Rail::Ach)
    } else if amount <= Decimal::ONE_THOUSAND {
        Some(Rail::Card)
    } else if amount > Decimal::new(10_000, 0) {
        Some(Rail::Wire)
    } else {
        None
    };

    banded
        .filter(|rail| candidates.contains(rail))
        .or_else(|| candidates.first().copied())
}
