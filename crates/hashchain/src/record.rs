//! Chained records - one verification routine for every granularity
//!
//! Blocks in a `HashChain` and transactions in an agent's ledger both link to
//! their predecessor by hash. Both implement `ChainedRecord`, and
//! `verify_records` walks either kind.

use serde::{Deserialize, Serialize};

/// A record that commits to its predecessor's hash
pub trait ChainedRecord {
    /// Position in the chain, starting at 0
    fn index(&self) -> u64;

    /// Hash of the preceding record (sentinel for the first one)
    fn previous_hash(&self) -> &str;

    /// Hash stored on the record
    fn current_hash(&self) -> &str;

    /// Human-readable payload the hash covers
    fn payload(&self) -> String;

    /// Recompute the hash from the record's content
    fn compute_hash(&self) -> String;
}

/// What went wrong at a chain break
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// Stored hash differs from the recomputed one
    InvalidHash,
    /// previous_hash does not match the prior record's hash
    BrokenLink,
    /// Index is not the expected position
    InvalidIndex,
}

/// First detected break
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub index: u64,
    pub kind: BreakKind,
    pub expected: String,
    pub actual: String,
}

impl std::fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            BreakKind::InvalidHash => write!(
                f,
                "Invalid hash at index {}: expected '{}', got '{}'",
                self.index, self.expected, self.actual
            ),
            BreakKind::BrokenLink => write!(
                f,
                "Broken link at index {}: expected previous hash '{}', got '{}'",
                self.index, self.expected, self.actual
            ),
            BreakKind::InvalidIndex => write!(
                f,
                "Invalid index: expected {}, got {}",
                self.expected, self.actual
            ),
        }
    }
}

/// Outcome of a chain walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    /// Records examined before stopping
    pub checked: usize,
    pub first_break: Option<ChainBreak>,
}

impl ChainVerification {
    fn ok(checked: usize) -> Self {
        Self {
            valid: true,
            checked,
            first_break: None,
        }
    }

    fn broken(checked: usize, brk: ChainBreak) -> Self {
        Self {
            valid: false,
            checked,
            first_break: Some(brk),
        }
    }
}

/// Walk `records` in order and stop at the first break.
///
/// The first record must link to `first_previous_hash`. Every record has its
/// index, link, and hash checked, the first one included.
pub fn verify_records<R: ChainedRecord>(records: &[R], first_previous_hash: &str) -> ChainVerification {
    let mut expected_prev = first_previous_hash.to_string();

    for (position, record) in records.iter().enumerate() {
        let checked = position + 1;

        if record.index() != position as u64 {
            return ChainVerification::broken(
                checked,
                ChainBreak {
                    index: record.index(),
                    kind: BreakKind::InvalidIndex,
                    expected: position.to_string(),
                    actual: record.index().to_string(),
                },
            );
        }

        let recomputed = record.compute_hash();
        if record.current_hash() != recomputed {
            return ChainVerification::broken(
                checked,
                ChainBreak {
                    index: record.index(),
                    kind: BreakKind::InvalidHash,
                    expected: recomputed,
                    actual: record.current_hash().to_string(),
                },
            );
        }

        if record.previous_hash() != expected_prev {
            return ChainVerification::broken(
                checked,
                ChainBreak {
                    index: record.index(),
                    kind: BreakKind::BrokenLink,
                    expected: expected_prev,
                    actual: record.previous_hash().to_string(),
                },
            );
        }

        expected_prev = record.current_hash().to_string();
    }

    ChainVerification::ok(records.len())
}
