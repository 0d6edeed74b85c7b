//! Merkle tree over hex-encoded hashes
//!
//! Parents are `sha256(left_hex + right_hex)`. At every level an odd trailing
//! node is paired with itself, so the tree stays binary for any leaf count.

use crate::hash::sha256_hex;
use serde::{Deserialize, Serialize};

/// Side on which a proof sibling sits relative to the running hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofPosition {
    Left,
    Right,
}

/// One step of an inclusion proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: String,
    pub position: ProofPosition,
}

/// A fully materialized Merkle tree.
///
/// `levels[0]` are the leaves, the last level holds only the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTree {
    pub root: String,
    pub leaves: Vec<String>,
    pub levels: Vec<Vec<String>>,
}

fn hash_pair(left: &str, right: &str) -> String {
    sha256_hex(format!("{}{}", left, right))
}

/// Build a tree from leaf hashes. Empty input gives an empty tree.
pub fn build_merkle_tree(leaves: &[String]) -> MerkleTree {
    if leaves.is_empty() {
        return MerkleTree::default();
    }

    let mut levels = vec![leaves.to_vec()];

    while levels.last().map_or(0, Vec::len) > 1 {
        let current = &levels[levels.len() - 1];
        let next: Vec<String> = current
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                hash_pair(left, right)
            })
            .collect();
        levels.push(next);
    }

    let root = levels
        .last()
        .and_then(|level| level.first())
        .cloned()
        .unwrap_or_default();

    MerkleTree {
        root,
        leaves: leaves.to_vec(),
        levels,
    }
}

impl MerkleTree {
    /// Build from leaf hashes
    pub fn new(leaves: &[String]) -> Self {
        build_merkle_tree(leaves)
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Inclusion proof for the leaf at `index`, bottom-up.
    ///
    /// Returns `None` if the index is out of range.
    pub fn proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaves.len() {
            return None;
        }

        let mut steps = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut position = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let step = if position % 2 == 0 {
                // Odd trailing node was paired with itself
                let sibling = level.get(position + 1).unwrap_or(&level[position]);
                ProofStep {
                    hash: sibling.clone(),
                    position: ProofPosition::Right,
                }
            } else {
                ProofStep {
                    hash: level[position - 1].clone(),
                    position: ProofPosition::Left,
                }
            };
            steps.push(step);
            position /= 2;
        }

        Some(steps)
    }

    /// Index of a leaf hash, if present
    pub fn position_of(&self, leaf: &str) -> Option<usize> {
        self.leaves.iter().position(|l| l == leaf)
    }

    /// Verify a proof against this tree's root
    pub fn verify_proof(&self, leaf: &str, proof: &[ProofStep]) -> bool {
        verify_merkle_proof(leaf, proof, &self.root)
    }
}

/// Fold the proof steps over `leaf` and compare to `root`
pub fn verify_merkle_proof(leaf: &str, proof: &[ProofStep], root: &str) -> bool {
    if root.is_empty() {
        return false;
    }

    let computed = proof.iter().fold(leaf.to_string(), |current, step| match step.position {
        ProofPosition::Right => hash_pair(&current, &step.hash),
        ProofPosition::Left => hash_pair(&step.hash, &current),
    });

    computed == root
}
