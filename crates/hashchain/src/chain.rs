//! Hash chain manager - append-only sequence of blocks
//!
//! Appends read the tail and write the new block inside one write-lock
//! section, so two concurrent `add_block` calls can never claim the same
//! previous hash. `add_block` blocks on the journal write; async callers go
//! through `append`, which runs it on the blocking pool.

use crate::error::ChainError;
use crate::hash::hash_block;
use crate::journal::BlockJournal;
use crate::record::{verify_records, ChainVerification, ChainedRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use strum_macros::Display;

/// previous_hash of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Fixed payload of the genesis block
pub const GENESIS_DATA: &str = "Genesis Block - Agent Payments Platform";

/// A chained integrity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub data: String,
    pub hash: String,
}

impl Block {
    /// The genesis block, stamped now
    pub fn genesis() -> Self {
        Self::sealed(0, Utc::now(), GENESIS_PREVIOUS_HASH.to_string(), GENESIS_DATA.to_string())
    }

    /// The block following `prev`, stamped now
    pub fn next(prev: &Block, data: impl Into<String>) -> Self {
        Self::sealed(prev.index + 1, Utc::now(), prev.hash.clone(), data.into())
    }

    fn sealed(index: u64, timestamp: DateTime<Utc>, previous_hash: String, data: String) -> Self {
        let hash = hash_block(index, &timestamp, &previous_hash, &data);
        Self {
            index,
            timestamp,
            previous_hash,
            data,
            hash,
        }
    }
}

impl ChainedRecord for Block {
    fn index(&self) -> u64 {
        self.index
    }

    fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    fn current_hash(&self) -> &str {
        &self.hash
    }

    fn payload(&self) -> String {
        self.data.clone()
    }

    fn compute_hash(&self) -> String {
        hash_block(self.index, &self.timestamp, &self.previous_hash, &self.data)
    }
}

/// Lifecycle of a chain. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChainState {
    Empty,
    Initialized,
    Extended,
}

/// Append-only block chain.
///
/// Shared as `Arc<HashChain>`; every method takes `&self`.
pub struct HashChain {
    blocks: RwLock<Vec<Block>>,
    journal: Option<Mutex<BlockJournal>>,
}

impl HashChain {
    /// A chain holding only the genesis block
    pub fn new() -> Self {
        Self::from_blocks(vec![Block::genesis()])
    }

    /// A chain with no genesis yet
    pub fn empty() -> Self {
        Self::from_blocks(Vec::new())
    }

    /// Wrap already-persisted blocks. Nothing is verified or repaired here.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks: RwLock::new(blocks),
            journal: None,
        }
    }

    /// Open a journal-backed chain, writing genesis if the journal is new
    pub fn with_journal(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let mut journal = BlockJournal::open(path)?;
        let mut blocks = journal.read_all()?;

        if blocks.is_empty() {
            let genesis = Block::genesis();
            journal.append(&genesis)?;
            blocks.push(genesis);
        } else {
            let report = verify_records(&blocks, GENESIS_PREVIOUS_HASH);
            if let Some(brk) = report.first_break {
                tracing::warn!(
                    journal = %journal.path().display(),
                    "Loaded chain fails verification: {}",
                    brk
                );
            }
        }

        tracing::debug!(blocks = blocks.len(), "Hash chain loaded");

        Ok(Self {
            blocks: RwLock::new(blocks),
            journal: Some(Mutex::new(journal)),
        })
    }

    // Poisoning is recovered: the vector is only ever pushed to.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Block>> {
        self.blocks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Block>> {
        self.blocks.write().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, block: &Block) -> Result<(), ChainError> {
        if let Some(ref journal) = self.journal {
            let mut journal = journal.lock().unwrap_or_else(|e| e.into_inner());
            journal.append(block)?;
        }
        Ok(())
    }

    /// Append the genesis block to an empty chain
    pub fn initialize(&self) -> Result<Block, ChainError> {
        let mut blocks = self.write();
        if !blocks.is_empty() {
            return Err(ChainError::AlreadyInitialized(blocks.len()));
        }

        let genesis = Block::genesis();
        self.persist(&genesis)?;
        blocks.push(genesis.clone());
        Ok(genesis)
    }

    /// Append a block carrying `data` and return it
    pub fn add_block(&self, data: impl Into<String>) -> Result<Block, ChainError> {
        let mut blocks = self.write();
        let block = {
            let last = blocks.last().ok_or(ChainError::NotInitialized)?;
            Block::next(last, data)
        };

        self.persist(&block)?;
        blocks.push(block.clone());

        tracing::debug!(index = block.index, hash = %block.hash, "Block appended");
        Ok(block)
    }

    /// `add_block` off the async runtime's worker threads
    pub async fn append(self: Arc<Self>, data: String) -> Result<Block, ChainError> {
        tokio::task::spawn_blocking(move || self.add_block(data))
            .await
            .map_err(|e| ChainError::Task(e.to_string()))?
    }

    /// Fail-fast verification of every block, genesis included
    pub fn verify_chain(&self) -> bool {
        self.audit().valid
    }

    /// Verification with the position and kind of the first break
    pub fn audit(&self) -> ChainVerification {
        verify_records(&self.read(), GENESIS_PREVIOUS_HASH)
    }

    pub fn state(&self) -> ChainState {
        match self.read().len() {
            0 => ChainState::Empty,
            1 => ChainState::Initialized,
            _ => ChainState::Extended,
        }
    }

    pub fn latest_block(&self) -> Option<Block> {
        self.read().last().cloned()
    }

    pub fn block_by_index(&self, index: u64) -> Option<Block> {
        let blocks = self.read();
        usize::try_from(index).ok().and_then(|i| blocks.get(i)).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot of all blocks
    pub fn blocks(&self) -> Vec<Block> {
        self.read().clone()
    }
}

impl Default for HashChain {
    fn default() -> Self {
        Self::new()
    }
}
