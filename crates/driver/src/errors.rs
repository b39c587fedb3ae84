//! Error types for the attestation driver.

use bitcoin::Txid;
use staychain_client::ClientError;
use staychain_signer::SignerError;
use staychain_store::StoreError;
use staychain_wallet::WalletError;
use thiserror::Error;

/// Unified error type for everything that can fail while advancing an
/// attestation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Errors from attestation construction and signing.
    #[error("attest client: {0}")]
    Client(#[from] ClientError),

    /// Errors from the persistence layer.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Errors from the wallet adapter.
    #[error("wallet rpc: {0}")]
    Wallet(#[from] WalletError),

    /// Errors from the signer transport.
    #[error("signer transport: {0}")]
    Signer(#[from] SignerError),

    /// The staychain tip could not be located among the wallet unspents.
    #[error("no valid unspent found")]
    UnspentNotFound,

    /// A mempool attestation has no commitment on record.
    #[error("no stored commitment for attestation {0}")]
    CommitmentNotFound(Txid),
}
