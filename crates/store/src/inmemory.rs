//! In-memory [`Store`] backend.
//!
//! Collections mirror the document layout of the production store:
//! Attestation, MerkleCommitment, MerkleProof and LatestCommitment, each
//! keyed as upsertable documents.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use bitcoin::{hashes::Hash, Txid};
use staychain_primitives::{
    attestation::Attestation,
    commitment::{Commitment, CommitmentHash, MerkleProof},
};
use tokio::sync::RwLock;
use tracing::trace;

use crate::{Store, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct AttestationRow {
    txid: Txid,
    merkle_root: CommitmentHash,
    confirmed: bool,
    inserted_at: u64,
}

/// In-memory store, shareable between the driver and external readers.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    seq: Arc<AtomicU64>,

    /// (txid, merkle_root) -> attestation row
    attestations: Arc<RwLock<HashMap<(Txid, CommitmentHash), AttestationRow>>>,

    /// merkle_root -> full commitment
    commitments: Arc<RwLock<HashMap<CommitmentHash, Commitment>>>,

    /// (merkle_root, client_position) -> leaf commitment
    merkle_commitments: Arc<RwLock<HashMap<(CommitmentHash, u32), CommitmentHash>>>,

    /// (merkle_root, client_position) -> proof
    merkle_proofs: Arc<RwLock<HashMap<(CommitmentHash, u32), MerkleProof>>>,

    /// per-slot tips making up the next client commitment
    latest_commitment: Arc<RwLock<Vec<CommitmentHash>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the per-slot tips that make up the next client commitment.
    pub async fn set_client_commitment(&self, leaves: Vec<CommitmentHash>) {
        *self.latest_commitment.write().await = leaves;
    }

    /// Returns the stored proof for a slot under the given root, if any.
    pub async fn merkle_proof(
        &self,
        merkle_root: CommitmentHash,
        client_position: u32,
    ) -> Option<MerkleProof> {
        self.merkle_proofs
            .read()
            .await
            .get(&(merkle_root, client_position))
            .cloned()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn client_commitment(&self) -> StoreResult<Commitment> {
        let leaves = self.latest_commitment.read().await.clone();
        if leaves.is_empty() {
            return Err(StoreError::NoClientCommitment);
        }
        Commitment::new(leaves).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn attestation_commitment(&self, txid: Txid) -> StoreResult<Option<Commitment>> {
        let row = {
            let attestations = self.attestations.read().await;
            attestations.values().find(|row| row.txid == txid).cloned()
        };
        let Some(row) = row else {
            return Ok(None);
        };
        self.commitments
            .read()
            .await
            .get(&row.merkle_root)
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                StoreError::Corrupt(format!("attestation {txid} has no stored commitment"))
            })
    }

    async fn latest_commitment_hash(&self) -> StoreResult<CommitmentHash> {
        let attestations = self.attestations.read().await;
        Ok(attestations
            .values()
            .filter(|row| row.confirmed)
            .max_by_key(|row| row.inserted_at)
            .map(|row| row.merkle_root)
            .unwrap_or_else(CommitmentHash::all_zeros))
    }

    async fn update_latest(&self, attestation: &Attestation) -> StoreResult<()> {
        let merkle_root = attestation.commitment_hash();
        let key = (attestation.txid, merkle_root);
        let inserted_at = self.seq.fetch_add(1, Ordering::SeqCst);

        trace!(txid = %attestation.txid, %merkle_root, confirmed = attestation.confirmed,
            "upserting attestation");
        self.attestations.write().await.insert(
            key,
            AttestationRow {
                txid: attestation.txid,
                merkle_root,
                confirmed: attestation.confirmed,
                inserted_at,
            },
        );

        let Some(commitment) = attestation.commitment() else {
            return Ok(());
        };
        self.commitments
            .write()
            .await
            .insert(merkle_root, commitment.clone());

        if attestation.confirmed {
            let mut merkle_commitments = self.merkle_commitments.write().await;
            for (position, leaf) in commitment.leaves().iter().enumerate() {
                merkle_commitments.insert((merkle_root, position as u32), *leaf);
            }
            let mut merkle_proofs = self.merkle_proofs.write().await;
            for proof in commitment.proofs() {
                merkle_proofs.insert((merkle_root, proof.client_position), proof);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> CommitmentHash {
        CommitmentHash::from_byte_array([byte; 32])
    }

    fn txid(byte: u8) -> Txid {
        Txid::from_byte_array([byte; 32])
    }

    fn attestation(tx_byte: u8, leaf_byte: u8, confirmed: bool) -> Attestation {
        let commitment = Commitment::new(vec![leaf(leaf_byte)]).unwrap();
        let mut attestation = Attestation::new(txid(tx_byte), commitment);
        attestation.confirmed = confirmed;
        attestation
    }

    #[tokio::test]
    async fn client_commitment_requires_slots() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.client_commitment().await,
            Err(StoreError::NoClientCommitment)
        ));

        store.set_client_commitment(vec![leaf(1), leaf(2)]).await;
        let commitment = store.client_commitment().await.unwrap();
        assert_eq!(commitment.leaves(), &[leaf(1), leaf(2)]);
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_txid_and_root() {
        let store = InMemoryStore::new();
        let unconfirmed = attestation(1, 9, false);
        store.update_latest(&unconfirmed).await.unwrap();
        store.update_latest(&unconfirmed).await.unwrap();

        assert_eq!(store.attestations.read().await.len(), 1);
        let found = store.attestation_commitment(txid(1)).await.unwrap();
        assert_eq!(found.unwrap().commitment_hash(), leaf(9));
    }

    #[tokio::test]
    async fn latest_hash_only_tracks_confirmed() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.latest_commitment_hash().await.unwrap(),
            CommitmentHash::all_zeros()
        );

        store.update_latest(&attestation(1, 3, true)).await.unwrap();
        store.update_latest(&attestation(2, 4, false)).await.unwrap();
        assert_eq!(store.latest_commitment_hash().await.unwrap(), leaf(3));

        // confirming the pending attestation moves the tip
        store.update_latest(&attestation(2, 4, true)).await.unwrap();
        assert_eq!(store.latest_commitment_hash().await.unwrap(), leaf(4));
    }

    #[tokio::test]
    async fn proofs_persisted_on_confirmation_only() {
        let store = InMemoryStore::new();
        let pending = attestation(5, 6, false);
        let root = pending.commitment_hash();

        store.update_latest(&pending).await.unwrap();
        assert!(store.merkle_proof(root, 0).await.is_none());

        let confirmed = attestation(5, 6, true);
        store.update_latest(&confirmed).await.unwrap();
        let proof = store.merkle_proof(root, 0).await.unwrap();
        assert!(proof.verify());
    }
}
