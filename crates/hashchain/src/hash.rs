//! Hash engine - deterministic SHA-256 fingerprints
//!
//! Every digest is computed over a canonical `|`-separated string. Decimals are
//! rendered with exactly two places and timestamps with a fixed RFC3339 layout,
//! so identical logical data always hashes to identical bytes.

use agentpay_core::{format_cents, CurrencyCode};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SEPARATOR: &str = "|";

/// Hex-encoded SHA-256 of arbitrary bytes
pub fn sha256_hex(input: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_ref());
    hex::encode(hasher.finalize())
}

/// Timestamp layout for block hashes (microsecond precision, `Z` suffix)
pub(crate) fn block_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Hash of `index | timestamp | previous_hash | data`
pub fn hash_block(index: u64, timestamp: &DateTime<Utc>, previous_hash: &str, data: &str) -> String {
    let canonical = [
        index.to_string(),
        block_timestamp(timestamp),
        previous_hash.to_string(),
        data.to_string(),
    ]
    .join(SEPARATOR);
    sha256_hex(canonical)
}

/// One posting leg as seen by the hash engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingHashData {
    pub account_id: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

/// Fields of a transaction that its hash commits to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHashData {
    pub id: String,
    pub agent_id: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub postings: Vec<PostingHashData>,
}

/// Fields of a payment that its hash commits to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentHashData {
    pub id: String,
    pub agent_id: String,
    pub amount: Decimal,
    pub counterparty: String,
    pub rail: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

/// Hash a transaction.
///
/// Postings are sorted by account id (then amount, then currency) before
/// rendering, so submission order never changes the digest.
pub fn hash_transaction(data: &TransactionHashData) -> String {
    let mut postings: Vec<&PostingHashData> = data.postings.iter().collect();
    postings.sort_by(|a, b| {
        a.account_id
            .cmp(&b.account_id)
            .then(a.amount.cmp(&b.amount))
            .then(a.currency.cmp(&b.currency))
    });

    let rendered: Vec<String> = postings
        .iter()
        .map(|p| format!("{}:{}:{}", p.account_id, format_cents(p.amount), p.currency))
        .collect();

    let canonical = [
        data.id.clone(),
        data.agent_id.clone(),
        data.description.clone(),
        format_cents(data.amount),
        data.currency.to_string(),
        data.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        rendered.join(","),
        data.previous_hash.clone(),
    ]
    .join(SEPARATOR);

    sha256_hex(canonical)
}

/// Hash a payment
pub fn hash_payment(data: &PaymentHashData) -> String {
    let canonical = [
        data.id.clone(),
        data.agent_id.clone(),
        format_cents(data.amount),
        data.counterparty.clone(),
        data.rail.clone(),
        data.description.clone(),
        data.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        data.status.clone(),
    ]
    .join(SEPARATOR);

    sha256_hex(canonical)
}

/// Anything the hash engine knows how to fingerprint
pub trait Digestible {
    fn digest(&self) -> String;
}

impl Digestible for TransactionHashData {
    fn digest(&self) -> String {
        hash_transaction(self)
    }
}

impl Digestible for PaymentHashData {
    fn digest(&self) -> String {
        hash_payment(self)
    }
}

/// Recompute and compare. A mismatch is a normal outcome, not an error.
pub fn verify_hash<T: Digestible + ?Sized>(data: &T, expected_hash: &str) -> bool {
    data.digest() == expected_hash
}
