//! Persistence contract for attestations, commitments and proofs.
//!
//! The driver writes through the [`Store`] trait; external readers (the
//! historical-proof service) only read. Backends must provide atomic
//! upsert-by-key semantics per collection.
pub mod inmemory;

use async_trait::async_trait;
use bitcoin::Txid;
use staychain_primitives::{
    attestation::Attestation,
    commitment::{Commitment, CommitmentHash},
};
use thiserror::Error;

/// Error type for the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No client slots have produced a commitment yet.
    #[error("no client commitment available")]
    NoClientCommitment,

    /// A stored record could not be interpreted.
    #[error("invalid stored data: {0}")]
    Corrupt(String),

    /// Error originating from the persistence backend.
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Wrapper type for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent record of attestations and the commitments they attest.
#[async_trait]
pub trait Store: Send + Sync {
    /// The next commitment to attest, assembled from the current tip of
    /// every client slot.
    async fn client_commitment(&self) -> StoreResult<Commitment>;

    /// The commitment attested by the given transaction, if one was stored.
    async fn attestation_commitment(&self, txid: Txid) -> StoreResult<Option<Commitment>>;

    /// Root of the most recently confirmed attestation; all-zero while the
    /// staychain has no confirmed attestations.
    async fn latest_commitment_hash(&self) -> StoreResult<CommitmentHash>;

    /// Upserts the attestation keyed by (txid, commitment root). Merkle
    /// commitments and per-slot proofs are persisted once the attestation is
    /// confirmed.
    async fn update_latest(&self, attestation: &Attestation) -> StoreResult<()>;
}
