//! AgentPay Hash Chain - integrity primitives
//!
//! # Key Types
//! - `hash`: deterministic SHA-256 digests for blocks, transactions, payments
//! - `MerkleTree`: batch commitment with inclusion proofs
//! - `ChainedRecord`: one interface for anything linked by previous/current hash
//! - `HashChain`: append-only block chain with serialized appends
//! - `BlockJournal`: JSONL persistence for blocks

pub mod chain;
pub mod error;
pub mod hash;
pub mod journal;
pub mod merkle;
pub mod record;

pub use chain::{Block, ChainState, HashChain, GENESIS_DATA, GENESIS_PREVIOUS_HASH};
pub use error::ChainError;
pub use hash::{
    hash_block, hash_payment, hash_transaction, sha256_hex, verify_hash, Digestible, PaymentHashData,
    PostingHashData, TransactionHashData,
};
pub use journal::BlockJournal;
pub use merkle::{build_merkle_tree, verify_merkle_proof, MerkleTree, ProofPosition, ProofStep};
pub use record::{verify_records, BreakKind, ChainBreak, ChainVerification, ChainedRecord};
