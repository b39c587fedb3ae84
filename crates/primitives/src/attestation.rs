//! The attestation model: one parent-chain transaction committing a Merkle
//! root to the parent ledger.

use bitcoin::{absolute::LockTime, hashes::Hash, transaction, BlockHash, Transaction, Txid};
use serde::{Deserialize, Serialize};

use crate::commitment::{Commitment, CommitmentHash};

/// Block inclusion metadata recorded once an attestation confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Hash of the block the attestation was mined in.
    pub block_hash: BlockHash,

    /// Timestamp of that block.
    pub block_time: u64,
}

/// One attestation transaction together with the commitment it attests.
///
/// The txid equals the hash of the raw transaction once the transaction has
/// been signed; `confirmed` implies the block info is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Transaction id on the parent chain.
    pub txid: Txid,

    /// The raw attestation transaction.
    pub tx: Transaction,

    /// Whether the transaction has been mined.
    pub confirmed: bool,

    /// Block inclusion metadata, set when confirmed.
    pub block_info: Option<BlockInfo>,

    commitment: Option<Commitment>,
}

impl Attestation {
    /// Creates an attestation for a known txid and commitment, with the raw
    /// transaction still to be populated.
    pub fn new(txid: Txid, commitment: Commitment) -> Self {
        Attestation {
            txid,
            commitment: Some(commitment),
            ..Default::default()
        }
    }

    /// Creates an attestation bound to a commitment with no transaction yet.
    pub fn with_commitment(commitment: Commitment) -> Self {
        Attestation {
            commitment: Some(commitment),
            ..Default::default()
        }
    }

    /// The commitment attested by this transaction, if any.
    pub fn commitment(&self) -> Option<&Commitment> {
        self.commitment.as_ref()
    }

    /// Binds this attestation to a commitment.
    pub fn set_commitment(&mut self, commitment: Commitment) {
        self.commitment = Some(commitment);
    }

    /// The Merkle root being attested; all-zero before any commitment is
    /// bound (the state of a staychain seeded from the initial funding
    /// output).
    pub fn commitment_hash(&self) -> CommitmentHash {
        self.commitment
            .as_ref()
            .map(Commitment::commitment_hash)
            .unwrap_or_else(CommitmentHash::all_zeros)
    }

    /// Marks the attestation confirmed and records its block metadata.
    pub fn mark_confirmed(&mut self, block_hash: BlockHash, block_time: u64) {
        self.confirmed = true;
        self.block_info = Some(BlockInfo {
            block_hash,
            block_time,
        });
    }
}

impl Default for Attestation {
    fn default() -> Self {
        Attestation {
            txid: Txid::all_zeros(),
            tx: Transaction {
                version: transaction::Version::TWO,
                lock_time: LockTime::ZERO,
                input: vec![],
                output: vec![],
            },
            confirmed: false,
            block_info: None,
            commitment: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::Commitment;

    #[test]
    fn default_attestation_has_zero_commitment_hash() {
        let attestation = Attestation::default();
        assert_eq!(attestation.commitment_hash(), CommitmentHash::all_zeros());
        assert!(!attestation.confirmed);
        assert!(attestation.block_info.is_none());
    }

    #[test]
    fn confirmation_records_block_info() {
        let commitment =
            Commitment::new(vec![CommitmentHash::from_byte_array([3; 32])]).unwrap();
        let mut attestation = Attestation::with_commitment(commitment);
        assert_eq!(
            attestation.commitment_hash(),
            CommitmentHash::from_byte_array([3; 32])
        );

        attestation.mark_confirmed(BlockHash::all_zeros(), 1_700_000_000);
        assert!(attestation.confirmed);
        assert_eq!(
            attestation.block_info.as_ref().unwrap().block_time,
            1_700_000_000
        );
    }
}
