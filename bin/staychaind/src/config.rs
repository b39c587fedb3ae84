//! Configuration surface of the attestation daemon.

use bitcoin::{Address, Network, PrivateKey, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};
use staychain_client::{ClientConfig, FeesConfig};
use staychain_driver::TimingConfig;
use staychain_signer::config::SignerConfig;
use thiserror::Error;

/// The configuration values that dictate the behavior of the attestation
/// daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// Connection parameters for the parent-chain node.
    pub main: MainConfig,

    /// Staychain funding transaction, scripts and keys.
    pub staychain: StaychainConfig,

    /// Attestation timing overrides.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Fee policy bounds.
    #[serde(default)]
    pub fees: FeesConfig,

    /// Signer quorum peers.
    pub signer: SignerConfig,
}

/// Connection parameters for the parent-chain node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MainConfig {
    /// RPC url of the node.
    pub url: String,

    /// RPC user.
    pub user: String,

    /// RPC password.
    pub pass: String,

    /// Parent-chain network.
    pub network: Network,

    /// Wallet to import attestation addresses into.
    pub wallet: Option<String>,

    pub retry_count: Option<u8>,
    pub retry_interval: Option<u64>,
}

/// Staychain parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StaychainConfig {
    /// Hex txid of the funding transaction that seeds the staychain.
    pub init_tx: String,

    /// Hex m-of-n redeem script locking the staychain outputs; omit for a
    /// single-sig chain.
    pub init_script: Option<String>,

    /// WIF base key, tweaked once per commitment.
    pub base_key: String,

    /// Address holding topup funds.
    pub topup_address: Option<String>,

    /// Hex redeem script locking the topup output.
    pub topup_script: Option<String>,

    /// WIF key for signing topup inputs locally.
    pub topup_key: Option<String>,

    /// Regtest mode: short tick delays and a higher fee baseline.
    #[serde(default)]
    pub regtest: bool,
}

/// Error raised while validating staychain parameters.
#[derive(Debug, Error)]
pub(crate) enum ParamsError {
    /// The funding txid does not parse as a 32-byte hash.
    #[error("incorrect initial transaction id {0}")]
    InvalidInitTx(String),

    /// The init script is not valid hex.
    #[error("invalid init script: {0}")]
    InvalidInitScript(String),

    /// The base key is not valid WIF.
    #[error("invalid base key: {0}")]
    InvalidBaseKey(String),

    /// The topup address does not parse for the configured network.
    #[error("invalid topup address: {0}")]
    InvalidTopupAddress(String),

    /// The topup script is not valid hex.
    #[error("invalid topup script: {0}")]
    InvalidTopupScript(String),

    /// The topup key is not valid WIF.
    #[error("invalid topup key: {0}")]
    InvalidTopupKey(String),
}

/// Validates the staychain section into the attest client's config.
pub(crate) fn client_config(config: &Config) -> Result<ClientConfig, ParamsError> {
    let staychain = &config.staychain;
    let network = config.main.network;

    let init_txid = staychain
        .init_tx
        .parse::<Txid>()
        .map_err(|_| ParamsError::InvalidInitTx(staychain.init_tx.clone()))?;

    let init_script = staychain
        .init_script
        .as_deref()
        .map(ScriptBuf::from_hex)
        .transpose()
        .map_err(|e| ParamsError::InvalidInitScript(e.to_string()))?;

    let base_key = PrivateKey::from_wif(&staychain.base_key)
        .map_err(|e| ParamsError::InvalidBaseKey(e.to_string()))?
        .inner;

    let topup_address = staychain
        .topup_address
        .as_deref()
        .map(|address| {
            address
                .parse::<Address<_>>()
                .map_err(|e| ParamsError::InvalidTopupAddress(e.to_string()))?
                .require_network(network)
                .map_err(|e| ParamsError::InvalidTopupAddress(e.to_string()))
        })
        .transpose()?;

    let topup_script = staychain
        .topup_script
        .as_deref()
        .map(ScriptBuf::from_hex)
        .transpose()
        .map_err(|e| ParamsError::InvalidTopupScript(e.to_string()))?;

    let topup_key = staychain
        .topup_key
        .as_deref()
        .map(PrivateKey::from_wif)
        .transpose()
        .map_err(|e| ParamsError::InvalidTopupKey(e.to_string()))?
        .map(|key| key.inner);

    Ok(ClientConfig {
        network,
        init_txid,
        init_script,
        base_key,
        topup_address,
        topup_script,
        topup_key,
        fees: config.fees,
    })
}
