//! [`WalletRpc`] implementation backed by a Bitcoin Core node.
//!
//! Requires the node to run with `-txindex=1` so staychain ancestry can be
//! walked through transactions the wallet does not own.

use async_trait::async_trait;
use bitcoin::{consensus, Address, Transaction, Txid};
use bitcoind_async_client::{
    traits::{Broadcaster, Reader, Signer, Wallet},
    types::ImportDescriptor,
    Client,
};
use miniscript::descriptor::checksum::desc_checksum;
use tracing::debug;

use crate::{TxStatus, Unspent, WalletError, WalletResult, WalletRpc};

/// Wallet adapter over Bitcoin Core's JSON-RPC interface.
#[derive(Debug)]
pub struct BitcoindWallet {
    client: Client,
    wallet_name: String,
}

impl BitcoindWallet {
    /// Creates a new adapter for the given node and wallet.
    pub fn new(
        url: String,
        user: String,
        pass: String,
        retry_count: Option<u8>,
        retry_interval: Option<u64>,
        wallet_name: String,
    ) -> WalletResult<Self> {
        let client = Client::new(url, user, pass, retry_count, retry_interval)?;
        Ok(BitcoindWallet {
            client,
            wallet_name,
        })
    }
}

#[async_trait]
impl WalletRpc for BitcoindWallet {
    async fn list_unspent(&self) -> WalletResult<Vec<Unspent>> {
        let utxos = self.client.get_utxos().await?;
        Ok(utxos
            .into_iter()
            .map(|utxo| Unspent {
                txid: utxo.txid,
                vout: utxo.vout,
                amount: utxo.amount,
            })
            .collect())
    }

    async fn mempool(&self) -> WalletResult<Vec<Txid>> {
        Ok(self.client.get_raw_mempool().await?)
    }

    async fn raw_transaction(&self, txid: &Txid) -> WalletResult<Transaction> {
        let raw = self.client.get_raw_transaction_verbosity_zero(txid).await?;
        raw.transaction()
            .map_err(|e| WalletError::MalformedResponse(e.to_string()))
    }

    async fn tx_status(&self, txid: &Txid) -> WalletResult<TxStatus> {
        let info = self.client.get_raw_transaction_verbosity_one(txid).await?;
        let block_hash = info.blockhash;
        let block_time = match &block_hash {
            Some(hash) => Some(u64::from(self.client.get_block(hash).await?.header.time)),
            None => None,
        };
        Ok(TxStatus {
            confirmations: u64::from(info.confirmations.unwrap_or(0)),
            block_hash,
            block_time,
        })
    }

    async fn broadcast(&self, tx: &Transaction) -> WalletResult<Txid> {
        Ok(self.client.send_raw_transaction(tx).await?)
    }

    async fn import_address(&self, address: &Address) -> WalletResult<()> {
        let descriptor = format!("addr({address})");
        let checksum = desc_checksum(&descriptor)
            .map_err(|e| WalletError::ImportFailed(e.to_string()))?;
        let request = ImportDescriptor {
            desc: format!("{descriptor}#{checksum}"),
            active: Some(false),
            // timestamp "now" skips rescanning; attestation outputs only
            // appear after the import
            timestamp: "now".to_string(),
        };

        debug!(%address, "importing address");
        let results = self
            .client
            .import_descriptors(vec![request], self.wallet_name.clone())
            .await?;
        if results.iter().all(|result| result.success) {
            Ok(())
        } else {
            Err(WalletError::ImportFailed(address.to_string()))
        }
    }

    async fn sign_with_wallet(&self, tx: &Transaction) -> WalletResult<Transaction> {
        let signed = self.client.sign_raw_transaction_with_wallet(tx, None).await?;
        consensus::encode::deserialize_hex(&signed.hex)
            .map_err(|e| WalletError::MalformedResponse(e.to_string()))
    }
}
