//! Parent-chain wallet adapter.
//!
//! The attestation service talks to its parent-chain wallet through the
//! [`WalletRpc`] trait; [`bitcoind::BitcoindWallet`] implements it against a
//! Bitcoin Core node. All driver-visible blocking I/O lives behind this
//! boundary.
pub mod bitcoind;

use async_trait::async_trait;
use bitcoin::{Address, Amount, BlockHash, OutPoint, Transaction, Txid};
use thiserror::Error;

/// Error type for wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Errors related to calling Bitcoin Core's RPC interface.
    #[error("bitcoin core rpc call failed with: {0}")]
    Rpc(#[from] bitcoind_async_client::error::ClientError),

    /// The wallet refused to import an address.
    #[error("wallet refused to import address: {0}")]
    ImportFailed(String),

    /// An RPC response could not be decoded.
    #[error("malformed rpc response: {0}")]
    MalformedResponse(String),
}

/// Wrapper type for wallet results.
pub type WalletResult<T> = Result<T, WalletError>;

/// A spendable output owned by the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unspent {
    /// Transaction that created the output.
    pub txid: Txid,

    /// Output index within that transaction.
    pub vout: u32,

    /// Output value.
    pub amount: Amount,
}

impl Unspent {
    /// The outpoint this unspent refers to.
    pub const fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid,
            vout: self.vout,
        }
    }
}

/// Chain status of a transaction as seen by the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxStatus {
    /// Number of confirmations; zero while in the mempool.
    pub confirmations: u64,

    /// Hash of the including block, once mined.
    pub block_hash: Option<BlockHash>,

    /// Timestamp of the including block, once mined.
    pub block_time: Option<u64>,
}

/// Interface to the parent-chain wallet consumed by the attestation core.
#[async_trait]
pub trait WalletRpc: Send + Sync {
    /// Lists the wallet's spendable outputs.
    async fn list_unspent(&self) -> WalletResult<Vec<Unspent>>;

    /// Lists the txids currently in the node's mempool.
    async fn mempool(&self) -> WalletResult<Vec<Txid>>;

    /// Fetches a raw transaction by txid.
    async fn raw_transaction(&self, txid: &Txid) -> WalletResult<Transaction>;

    /// Fetches the chain status of a transaction.
    async fn tx_status(&self, txid: &Txid) -> WalletResult<TxStatus>;

    /// Broadcasts a signed transaction, returning its txid.
    async fn broadcast(&self, tx: &Transaction) -> WalletResult<Txid>;

    /// Registers an address with the wallet so its outputs are tracked.
    async fn import_address(&self, address: &Address) -> WalletResult<()>;

    /// Signs whatever inputs the wallet holds keys for.
    async fn sign_with_wallet(&self, tx: &Transaction) -> WalletResult<Transaction>;
}
