//! Merkle anchoring.
//!
//! Binary BLAKE3 Merkle tree over leaf digests:
//! - An odd node at any level is paired with itself (self-mirrored), so every
//!   level above the leaves has exactly `ceil(n / 2)` nodes
//! - The empty tree has a fixed sentinel root derived from
//!   [`EMPTY_ROOT_DOMAIN`], which is distinct from the hash of empty input
//! - Leaf order matters; reordering leaves changes the root
//! - Leaves are hashed under a `0x00` prefix and interior nodes under `0x01`,
//!   so an interior node can never be presented as a leaf

use crate::hash::{hash, hex_digest, Digest};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain string hashed to produce the empty-tree sentinel root.
pub const EMPTY_ROOT_DOMAIN: &[u8] = b"sovereign-trust-kernel/merkle/empty-root";

/// Merkle errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Invalid leaf index: {index} (tree has {count} leaves)")]
    InvalidLeafIndex { index: usize, count: usize },

    #[error("Invalid proof: {0}")]
    InvalidProof(String),
}

fn empty_root() -> Digest {
    hash(EMPTY_ROOT_DOMAIN)
}

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Level-0 node for a leaf digest: H(0x00 || leaf)
fn hash_leaf(leaf: &Digest) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(leaf);
    *hasher.finalize().as_bytes()
}

/// Hash a pair of nodes: H(0x01 || left || right)
fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

fn next_level(level: &[Digest]) -> Vec<Digest> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            // Odd node out - mirror it
            [single] => hash_pair(single, single),
            _ => unreachable!("chunks(2) yields one or two elements"),
        })
        .collect()
}

/// Merkle root over leaf digests.
pub fn merkle_root(leaves: &[Digest]) -> Digest {
    if leaves.is_empty() {
        return empty_root();
    }

    let mut level: Vec<Digest> = leaves.iter().map(hash_leaf).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Merkle root over raw leaf bytes; each leaf is hashed first.
pub fn merkle_root_of<T: AsRef<[u8]>>(leaves: &[T]) -> Digest {
    let digests: Vec<Digest> = leaves.iter().map(|l| hash(l.as_ref())).collect();
    merkle_root(&digests)
}

/// Inclusion proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    #[serde(with = "hex_digest")]
    pub leaf_hash: Digest,
    pub leaf_index: usize,
    /// Sibling hashes along the path to root (bottom-up)
    pub sibling_hashes: Vec<String>,
    /// true = sibling is on the right
    pub direction_bits: Vec<bool>,
    #[serde(with = "hex_digest")]
    pub root_hash: Digest,
}

/// Merkle tree that retains every level for proof generation.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    leaves: Vec<Digest>,
    /// Level 0 is the hashed leaves, the last level is the root
    levels: Vec<Vec<Digest>>,
    root: Digest,
}

impl MerkleTree {
    pub fn new(leaves: Vec<Digest>) -> Self {
        if leaves.is_empty() {
            return Self {
                leaves,
                levels: vec![Vec::new()],
                root: empty_root(),
            };
        }

        let mut levels = vec![leaves.iter().map(hash_leaf).collect::<Vec<_>>()];
        while let Some(top) = levels.last() {
            if top.len() <= 1 {
                break;
            }
            let next = next_level(top);
            levels.push(next);
        }

        let root = levels
            .last()
            .and_then(|top| top.first().copied())
            .unwrap_or_else(empty_root);

        Self {
            leaves,
            levels,
            root,
        }
    }

    pub fn root(&self) -> Digest {
        self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Generate an inclusion proof for the leaf at `leaf_index`.
    pub fn generate_proof(&self, leaf_index: usize) -> Result<MerkleProof, MerkleError> {
        let count = self.leaf_count();
        if leaf_index >= count {
            return Err(MerkleError::InvalidLeafIndex {
                index: leaf_index,
                count,
            });
        }

        let mut sibling_hashes = Vec::new();
        let mut direction_bits = Vec::new();
        let mut index = leaf_index;

        for level in &self.levels[..self.levels.len() - 1] {
            let is_right_child = index % 2 == 1;
            let sibling = if is_right_child {
                level[index - 1]
            } else {
                // Mirrored when there is no right neighbour
                level.get(index + 1).copied().unwrap_or(level[index])
            };
            sibling_hashes.push(hex::encode(sibling));
            direction_bits.push(!is_right_child);
            index /= 2;
        }

        Ok(MerkleProof {
            leaf_hash: self.leaves[leaf_index],
            leaf_index,
            sibling_hashes,
            direction_bits,
            root_hash: self.root,
        })
    }

    /// Verify an inclusion proof against the root it carries.
    pub fn verify_proof(proof: &MerkleProof) -> Result<bool, MerkleError> {
        if proof.sibling_hashes.len() != proof.direction_bits.len() {
            return Err(MerkleError::InvalidProof(
                "Sibling hashes and direction bits length mismatch".to_string(),
            ));
        }

        let mut current = hash_leaf(&proof.leaf_hash);
        for (sibling_hex, &sibling_on_right) in
            proof.sibling_hashes.iter().zip(proof.direction_bits.iter())
        {
            let sibling: Digest = hex::decode(sibling_hex)
                .ok()
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| {
                    MerkleError::InvalidProof(format!("malformed sibling hash {sibling_hex}"))
                })?;
            current = if sibling_on_right {
                hash_pair(&current, &sibling)
            } else {
                hash_pair(&sibling, &current)
            };
        }

        Ok(current == proof.root_hash)
    }
}
