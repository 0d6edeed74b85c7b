//! Merkle anchoring of transaction batches into the block chain

use crate::error::LedgerResult;
use crate::store::SharedLedgerStore;
use agentpay_audit::{AuditEntry, AuditEventType, AuditSeverity, AuditTrail};
use agentpay_hashchain::{verify_merkle_proof, Block, HashChain, MerkleTree, ProofStep};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const ANCHOR_KIND: &str = "ledger_anchor";

/// Block payload of an anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub kind: String,
    pub agent_id: String,
    pub merkle_root: String,
    pub transaction_ids: Vec<String>,
    pub first_block_index: u64,
    pub last_block_index: u64,
}

impl AnchorRecord {
    /// Parse a block payload; `None` if it is not an anchor
    pub fn from_block(block: &Block) -> Option<Self> {
        serde_json::from_str::<AnchorRecord>(&block.data)
            .ok()
            .filter(|r| r.kind == ANCHOR_KIND)
    }
}

/// A batch of transactions committed to one block by Merkle root
#[derive(Debug, Clone)]
pub struct AnchoredBatch {
    pub agent_id: String,
    pub block: Block,
    pub tree: MerkleTree,
    pub transaction_ids: Vec<String>,
}

impl AnchoredBatch {
    pub fn merkle_root(&self) -> &str {
        &self.tree.root
    }

    /// Proof that `transaction_id` is in this batch
    pub fn inclusion_proof(&self, transaction_id: &str) -> Option<Vec<ProofStep>> {
        let position = self.transaction_ids.iter().position(|id| id == transaction_id)?;
        self.tree.proof(position)
    }

    /// Check a transaction hash and proof against the anchored root
    pub fn verify_inclusion(&self, transaction_hash: &str, proof: &[ProofStep]) -> bool {
        verify_merkle_proof(transaction_hash, proof, &self.tree.root)
    }
}

/// Anchors each agent's new transactions into a shared `HashChain`
pub struct Anchorer {
    store: SharedLedgerStore,
    chain: Arc<HashChain>,
    audit: Arc<AuditTrail>,
    /// agent_id -> first block_index not yet anchored
    next_index: Mutex<HashMap<String, u64>>,
}

impl Anchorer {
    pub fn new(store: SharedLedgerStore, chain: Arc<HashChain>, audit: Arc<AuditTrail>) -> Self {
        Self {
            store,
            chain,
            audit,
            next_index: Mutex::new(HashMap::new()),
        }
    }

    pub fn chain(&self) -> &Arc<HashChain> {
        &self.chain
    }

    /// First unanchored index for an agent, from the anchors already in the chain
    fn recover_next_index(&self, agent_id: &str) -> u64 {
        self.chain
            .blocks()
            .iter()
            .filter_map(AnchorRecord::from_block)
            .filter(|r| r.agent_id == agent_id)
            .map(|r| r.last_block_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Anchor everything the agent posted since its last anchor.
    ///
    /// Returns `None` when there is nothing new.
    pub async fn anchor_agent(&self, agent_id: &str) -> LedgerResult<Option<AnchoredBatch>> {
        let mut next_index = self.next_index.lock().await;
        let from = match next_index.get(agent_id) {
            Some(index) => *index,
            None => self.recover_next_index(agent_id),
        };

        let pending: Vec<_> = self
            .store
            .list_transactions(agent_id)
            .await?
            .into_iter()
            .filter(|tx| tx.block_index >= from)
            .collect();

        let (first, last) = match (pending.first(), pending.last()) {
            (Some(first), Some(last)) => (first.block_index, last.block_index),
            _ => return Ok(None),
        };

        let leaves: Vec<String> = pending.iter().map(|tx| tx.current_hash.clone()).collect();
        let transaction_ids: Vec<String> = pending.iter().map(|tx| tx.id.clone()).collect();
        let tree = MerkleTree::new(&leaves);

        let record = AnchorRecord {
            kind: ANCHOR_KIND.to_string(),
            agent_id: agent_id.to_string(),
            merkle_root: tree.root.clone(),
            transaction_ids: transaction_ids.clone(),
            first_block_index: first,
            last_block_index: last,
        };
        let block = self.chain.clone().append(serde_json::to_string(&record)?).await?;
        next_index.insert(agent_id.to_string(), last + 1);

        tracing::info!(
            agent_id,
            block_index = block.index,
            transactions = transaction_ids.len(),
            merkle_root = %tree.root,
            "Ledger batch anchored"
        );

        let entry = AuditEntry::new(
            AuditEventType::LedgerAnchored,
            format!("Anchored transactions {}..={} in block {}", first, last, block.index),
        )
        .agent(agent_id)
        .resource("block", block.index.to_string())
        .severity(AuditSeverity::Low)
        .metadata(serde_json::json!({ "merkle_root": tree.root, "transactions": transaction_ids.len() }));
        if let Err(e) = self.audit.log_event(entry).await {
            tracing::warn!(agent_id, error = %e, "Failed to audit anchor");
        }

        Ok(Some(AnchoredBatch {
            agent_id: agent_id.to_string(),
            block,
            tree,
            transaction_ids,
        }))
    }
}
