//! AgentPay Ledger - Double-entry accounting core
//!
//! All balance changes go through `PostingEngine::post_transaction`.
//!
//! # Key Types
//! - `Account`: a ledger bucket owned by one agent
//! - `Transaction`: an atomic set of postings that sums to zero, chained by hash
//!   to the agent's previous transaction
//! - `Posting`: a signed leg (positive = debit, negative = credit)
//! - `LedgerStore`: storage port with in-memory and SQLite implementations
//! - `Anchorer`: batches transaction hashes into Merkle-rooted blocks

pub mod account;
pub mod anchor;
pub mod error;
pub mod locks;
pub mod memory;
pub mod posting;
pub mod sqlite;
pub mod store;
pub mod transaction;
pub mod validation;

pub use account::{Account, AccountType, NewAccount, NormalSide};
pub use anchor::{AnchorRecord, AnchoredBatch, Anchorer};
pub use error::{FieldError, LedgerError, LedgerResult, ValidationErrors};
pub use locks::AgentLocks;
pub use memory::InMemoryLedgerStore;
pub use posting::PostingEngine;
pub use sqlite::SqliteLedgerStore;
pub use store::{CommitBatch, LedgerStore, PostingQuery, SharedLedgerStore};
pub use transaction::{PostTransaction, Posting, PostingInput, Transaction, TransactionStatus};
