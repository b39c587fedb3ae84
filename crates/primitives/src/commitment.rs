//! Client commitments and the Merkle structure that summarises them.
//!
//! A [`Commitment`] is an ordered list of per-slot leaf hashes, one per client
//! position. The Merkle root over those leaves is the value anchored into the
//! parent chain; per-slot proofs let a client show its leaf is covered by a
//! given root.

use bitcoin::hashes::{sha256d, Hash, HashEngine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hash type used for commitment leaves and Merkle roots.
pub type CommitmentHash = sha256d::Hash;

/// Error type for commitment construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommitmentError {
    /// A commitment must cover at least one client slot.
    #[error("commitment requires at least one leaf")]
    Empty,
}

/// An ordered set of client leaf hashes summarised by a Merkle root.
///
/// Leaves are ordered by client position and never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    leaves: Vec<CommitmentHash>,
}

impl Commitment {
    /// Creates a commitment from per-slot leaves ordered by client position.
    pub fn new(leaves: Vec<CommitmentHash>) -> Result<Self, CommitmentError> {
        if leaves.is_empty() {
            return Err(CommitmentError::Empty);
        }
        Ok(Commitment { leaves })
    }

    /// The per-slot leaf hashes, ordered by client position.
    pub fn leaves(&self) -> &[CommitmentHash] {
        &self.leaves
    }

    /// The Merkle root over the leaves.
    pub fn commitment_hash(&self) -> CommitmentHash {
        merkle_root(&self.leaves)
    }

    /// Builds one inclusion proof per client slot.
    pub fn proofs(&self) -> Vec<MerkleProof> {
        let root = self.commitment_hash();
        (0..self.leaves.len())
            .map(|pos| MerkleProof {
                merkle_root: root,
                client_position: pos as u32,
                commitment: self.leaves[pos],
                ops: proof_ops(&self.leaves, pos),
            })
            .collect()
    }
}

/// A single sibling step in a Merkle inclusion proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOp {
    /// Whether the sibling is appended to the right of the running hash.
    pub append: bool,

    /// The sibling hash.
    pub commitment: CommitmentHash,
}

/// Merkle inclusion proof for one client slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Root the proof commits to.
    pub merkle_root: CommitmentHash,

    /// Client slot the proven leaf belongs to.
    pub client_position: u32,

    /// The proven leaf hash.
    pub commitment: CommitmentHash,

    /// Sibling steps from leaf to root.
    pub ops: Vec<ProofOp>,
}

impl MerkleProof {
    /// Recomputes the root from the leaf and sibling steps and compares it
    /// against the claimed root.
    pub fn verify(&self) -> bool {
        let mut acc = self.commitment;
        for op in &self.ops {
            acc = if op.append {
                merkle_node(&acc, &op.commitment)
            } else {
                merkle_node(&op.commitment, &acc)
            };
        }
        acc == self.merkle_root
    }
}

fn merkle_node(left: &CommitmentHash, right: &CommitmentHash) -> CommitmentHash {
    let mut engine = CommitmentHash::engine();
    engine.input(left.as_byte_array());
    engine.input(right.as_byte_array());
    CommitmentHash::from_engine(engine)
}

/// Computes the Merkle root over `leaves`, duplicating the last node of an
/// odd level, as the parent chain does for its transaction trees. A single
/// leaf is its own root.
pub fn merkle_root(leaves: &[CommitmentHash]) -> CommitmentHash {
    if leaves.is_empty() {
        return CommitmentHash::all_zeros();
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| merkle_node(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    level[0]
}

fn proof_ops(leaves: &[CommitmentHash], position: usize) -> Vec<ProofOp> {
    let mut ops = Vec::new();
    let mut level = leaves.to_vec();
    let mut index = position;
    while level.len() > 1 {
        let sibling = if index % 2 == 0 {
            // Odd levels duplicate their last node.
            let sib = *level.get(index + 1).unwrap_or(&level[index]);
            ProofOp {
                append: true,
                commitment: sib,
            }
        } else {
            ProofOp {
                append: false,
                commitment: level[index - 1],
            }
        };
        ops.push(sibling);
        level = level
            .chunks(2)
            .map(|pair| merkle_node(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
        index /= 2;
    }
    ops
}
