//! Attestation transaction construction.
//!
//! The [`AttestClient`] derives per-commitment keys and addresses, builds the
//! transaction that spends the staychain tip, combines remote signer
//! signatures with its own, and handles broadcast and replace-by-fee bumps.
//! It owns the process-lifetime [`FeePolicy`] and holds a handle to the
//! wallet adapter for chain access.
pub mod fees;

use bitcoin::{
    absolute::LockTime,
    hashes::Hash,
    opcodes::OP_0,
    script::{Builder, PushBytesBuf},
    secp256k1::{All, Message, Secp256k1, SecretKey},
    sighash::SighashCache,
    transaction, Address, Amount, EcdsaSighashType, Network, Script, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use staychain_primitives::{
    commitment::CommitmentHash,
    scripts::{self, ScriptError},
};
use staychain_signer::{InputSig, SigBags};
use staychain_wallet::{Unspent, WalletError, WalletRpc};
use thiserror::Error;
use tracing::debug;

pub use crate::fees::{FeePolicy, FeesConfig};

/// Error type for attestation construction and signing.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Errors from the wallet adapter.
    #[error("wallet rpc: {0}")]
    Wallet(#[from] WalletError),

    /// Errors deriving scripts or tweaked keys.
    #[error("script derivation: {0}")]
    Script(#[from] ScriptError),

    /// Key arithmetic failed.
    #[error("secp256k1: {0}")]
    Secp(#[from] bitcoin::secp256k1::Error),

    /// The legacy sighash could not be computed.
    #[error("sighash computation: {0}")]
    Sighash(String),

    /// No valid unspent found.
    #[error("no valid unspent found")]
    UnspentNotFound,

    /// The selected unspents cannot cover the fee.
    #[error("unspents worth {total} cannot cover fee {fee}")]
    InsufficientFunds {
        /// Sum of the selected unspents.
        total: Amount,
        /// Fee that was required.
        fee: Amount,
    },

    /// Not enough signatures were collected for an input.
    #[error("missing signatures for input {0}")]
    MissingSignatures(u32),

    /// A scriptSig element exceeded the script push limit.
    #[error("scriptSig element exceeds push limit")]
    OversizedPush,

    /// The transaction has no output to carry the attested value.
    #[error("attestation transaction has no outputs")]
    NoOutputs,

    /// The network returned a different txid than locally computed.
    #[error("broadcast returned txid {returned}, expected {expected}")]
    TxidMismatch {
        /// Locally computed txid.
        expected: Txid,
        /// Txid reported by the node.
        returned: Txid,
    },
}

/// Wrapper type for client results.
pub type ClientResult<T> = Result<T, ClientError>;

/// Key material and chain parameters for the attest client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Parent-chain network.
    pub network: Network,

    /// Funding transaction that seeded the staychain.
    pub init_txid: Txid,

    /// m-of-n redeem script locking the staychain outputs; absent for
    /// single-sig chains.
    pub init_script: Option<ScriptBuf>,

    /// Base secret key, tweaked once per commitment.
    pub base_key: SecretKey,

    /// Address holding topup funds.
    pub topup_address: Option<Address>,

    /// Redeem script locking the topup output.
    pub topup_script: Option<ScriptBuf>,

    /// Key for signing topup inputs locally; the wallet signs them when
    /// absent.
    pub topup_key: Option<SecretKey>,

    /// Fee policy bounds.
    pub fees: FeesConfig,
}

/// Builds, signs and publishes attestation transactions.
#[derive(Debug)]
pub struct AttestClient<W> {
    wallet: W,
    secp: Secp256k1<All>,
    config: ClientConfig,
    input_script_sig_size: usize,

    /// Fee policy owned by the client for the process lifetime.
    pub fees: FeePolicy,
}

impl<W: WalletRpc> AttestClient<W> {
    /// Creates a client over the given wallet adapter, validating the
    /// configured scripts.
    pub fn new(wallet: W, config: ClientConfig) -> ClientResult<Self> {
        let input_script_sig_size = match &config.init_script {
            Some(script) => {
                let (required, _) = scripts::parse_multisig(script)?;
                scripts::multisig_script_sig_size(required, script.len())
            }
            None => scripts::P2PKH_SCRIPT_SIG_SIZE,
        };
        if let Some(script) = &config.topup_script {
            scripts::parse_multisig(script)?;
        }
        let fees = FeePolicy::new(&config.fees);
        Ok(AttestClient {
            wallet,
            secp: Secp256k1::new(),
            config,
            input_script_sig_size,
            fees,
        })
    }

    /// The wallet adapter this client operates through.
    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    /// Derives the signing key for the next attestation by tweaking the base
    /// key with the commitment root.
    pub fn next_attestation_key(&self, root: &CommitmentHash) -> ClientResult<SecretKey> {
        Ok(scripts::tweak_secret_key(&self.config.base_key, root)?)
    }

    /// Derives the pay-to address for the next attestation: the P2SH of the
    /// tweaked redeem script, or the P2PKH of the tweaked key on single-sig
    /// chains.
    pub fn next_attestation_addr(
        &self,
        key: &SecretKey,
        root: &CommitmentHash,
    ) -> ClientResult<Address> {
        match &self.config.init_script {
            Some(script) => {
                let redeem = scripts::tweak_multisig_script(&self.secp, script, root)?;
                Ok(scripts::p2sh_address(&redeem, self.config.network)?)
            }
            None => {
                let pubkey = key.public_key(&self.secp);
                Ok(scripts::p2pkh_address(&pubkey, self.config.network))
            }
        }
    }

    /// Registers the next attestation address with the wallet so it will
    /// recognise its own outputs.
    pub async fn import_attestation_addr(&self, address: &Address) -> ClientResult<()> {
        Ok(self.wallet.import_address(address).await?)
    }

    /// Locates the staychain tip among the wallet's unspents.
    pub async fn find_last_unspent(&self) -> ClientResult<Option<Unspent>> {
        for unspent in self.wallet.list_unspent().await? {
            if self.on_staychain(unspent.txid).await {
                return Ok(Some(unspent));
            }
        }
        Ok(None)
    }

    /// Finds the auxiliary topup output, if one is configured and funded.
    pub async fn find_topup_unspent(&self) -> ClientResult<Option<Unspent>> {
        let Some(address) = &self.config.topup_address else {
            return Ok(None);
        };
        let script = address.script_pubkey();
        for unspent in self.wallet.list_unspent().await? {
            let Ok(tx) = self.wallet.raw_transaction(&unspent.txid).await else {
                continue;
            };
            let Some(output) = tx.output.get(unspent.vout as usize) else {
                continue;
            };
            if output.script_pubkey == script {
                return Ok(Some(unspent));
            }
        }
        Ok(None)
    }

    /// Scans the mempool for a previously broadcast attestation still
    /// awaiting its first confirmation.
    pub async fn unconfirmed_tx(&self) -> ClientResult<Option<Txid>> {
        for txid in self.wallet.mempool().await? {
            if self.on_staychain(txid).await {
                return Ok(Some(txid));
            }
        }
        Ok(None)
    }

    /// Builds the unsigned attestation transaction: the given unspents in,
    /// one output of `sum(inputs) - fee` to the pay-to address.
    pub fn create_attestation(
        &self,
        payto: &Address,
        unspents: &[Unspent],
    ) -> ClientResult<Transaction> {
        if unspents.is_empty() {
            return Err(ClientError::UnspentNotFound);
        }
        let input = unspents
            .iter()
            .map(|unspent| TxIn {
                previous_output: unspent.outpoint(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect();

        let total: Amount = unspents.iter().map(|unspent| unspent.amount).sum();
        let fee = self.estimated_fee(unspents.len(), 1, self.fees.current());
        let value = total
            .checked_sub(fee)
            .filter(|value| *value > Amount::ZERO)
            .ok_or(ClientError::InsufficientFunds { total, fee })?;

        Ok(Transaction {
            version: transaction::Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output: vec![TxOut {
                value,
                script_pubkey: payto.script_pubkey(),
            }],
        })
    }

    /// Combines externally collected signatures with the local signature into
    /// final scriptSigs. `prev_root` identifies the tweak under which the
    /// output being spent was locked; the zero root means the untweaked
    /// initial script.
    pub async fn sign_attestation(
        &self,
        tx: &Transaction,
        sigs: &SigBags,
        prev_root: CommitmentHash,
    ) -> ClientResult<Transaction> {
        let mut signed = tx.clone();

        // the wallet signs inputs we hold no local key for
        let wallet_signed = if signed.input.len() > 1 && self.config.topup_key.is_none() {
            Some(self.wallet.sign_with_wallet(tx).await?)
        } else {
            None
        };

        for index in 0..signed.input.len() {
            let script_sig = if index == 0 {
                self.staychain_script_sig(tx, prev_root, sigs)?
            } else if let Some(key) = self.config.topup_key {
                self.topup_script_sig(tx, index, &key, sigs)?
            } else if let Some(wallet_tx) = &wallet_signed {
                wallet_tx
                    .input
                    .get(index)
                    .filter(|input| !input.script_sig.is_empty())
                    .map(|input| input.script_sig.clone())
                    .ok_or(ClientError::MissingSignatures(index as u32))?
            } else {
                return Err(ClientError::MissingSignatures(index as u32));
            };
            signed.input[index].script_sig = script_sig;
        }
        Ok(signed)
    }

    /// Broadcasts a signed attestation; the txid reported by the network
    /// must match the locally computed one.
    pub async fn send_attestation(&self, tx: &Transaction) -> ClientResult<Txid> {
        let expected = tx.compute_txid();
        let returned = self.wallet.broadcast(tx).await?;
        if returned != expected {
            return Err(ClientError::TxidMismatch { expected, returned });
        }
        Ok(returned)
    }

    /// Replaces the transaction's fee at the bumped rate and clears every
    /// scriptSig, forcing a fresh signing round.
    pub fn bump_attestation_fees(&mut self, tx: &mut Transaction) -> ClientResult<()> {
        let old_rate = self.fees.current();
        let new_rate = self.fees.bump();
        debug!(old_rate, new_rate, "bumping attestation fee rate");

        let size = self.estimated_size(tx.input.len(), tx.output.len().max(1));
        let delta = Amount::from_sat((new_rate - old_rate) * size);
        let output = tx.output.first_mut().ok_or(ClientError::NoOutputs)?;
        output.value = output
            .value
            .checked_sub(delta)
            .filter(|value| *value > Amount::ZERO)
            .ok_or(ClientError::InsufficientFunds {
                total: output.value,
                fee: delta,
            })?;

        for input in &mut tx.input {
            input.script_sig = ScriptBuf::new();
        }
        Ok(())
    }

    /// Walks a transaction's spend ancestry back to the staychain funding
    /// transaction. Anything the node cannot serve is not ours.
    async fn on_staychain(&self, txid: Txid) -> bool {
        let mut current = txid;
        loop {
            if current == self.config.init_txid {
                return true;
            }
            let Ok(tx) = self.wallet.raw_transaction(&current).await else {
                return false;
            };
            match tx.input.first() {
                Some(input) => current = input.previous_output.txid,
                None => return false,
            }
        }
    }

    fn estimated_size(&self, num_inputs: usize, num_outputs: usize) -> u64 {
        let sizes = vec![self.input_script_sig_size; num_inputs];
        scripts::estimated_signed_size(&sizes, num_outputs) as u64
    }

    fn estimated_fee(&self, num_inputs: usize, num_outputs: usize, rate: u64) -> Amount {
        Amount::from_sat(rate * self.estimated_size(num_inputs, num_outputs))
    }

    fn staychain_script_sig(
        &self,
        tx: &Transaction,
        prev_root: CommitmentHash,
        sigs: &SigBags,
    ) -> ClientResult<ScriptBuf> {
        let untweaked = prev_root == CommitmentHash::all_zeros();
        let key = if untweaked {
            self.config.base_key
        } else {
            scripts::tweak_secret_key(&self.config.base_key, &prev_root)?
        };

        match &self.config.init_script {
            Some(script) => {
                let redeem = if untweaked {
                    script.clone()
                } else {
                    scripts::tweak_multisig_script(&self.secp, script, &prev_root)?
                };
                let local = self.input_signature(tx, 0, &redeem, &key)?;
                let external = sigs.get(&0).map(Vec::as_slice).unwrap_or(&[]);
                self.multisig_script_sig(0, &redeem, &local, external)
            }
            None => {
                let pubkey = key.public_key(&self.secp);
                let script_code =
                    scripts::p2pkh_address(&pubkey, self.config.network).script_pubkey();
                let local = self.input_signature(tx, 0, &script_code, &key)?;
                p2pkh_script_sig(&local, &pubkey.serialize())
            }
        }
    }

    fn topup_script_sig(
        &self,
        tx: &Transaction,
        index: usize,
        key: &SecretKey,
        sigs: &SigBags,
    ) -> ClientResult<ScriptBuf> {
        match &self.config.topup_script {
            Some(redeem) => {
                let local = self.input_signature(tx, index, redeem, key)?;
                let external = sigs.get(&(index as u32)).map(Vec::as_slice).unwrap_or(&[]);
                self.multisig_script_sig(index as u32, redeem, &local, external)
            }
            None => {
                let pubkey = key.public_key(&self.secp);
                let script_code =
                    scripts::p2pkh_address(&pubkey, self.config.network).script_pubkey();
                let local = self.input_signature(tx, index, &script_code, key)?;
                p2pkh_script_sig(&local, &pubkey.serialize())
            }
        }
    }

    fn multisig_script_sig(
        &self,
        input_index: u32,
        redeem: &Script,
        local: &[u8],
        external: &[InputSig],
    ) -> ClientResult<ScriptBuf> {
        let (required, _) = scripts::parse_multisig(redeem)?;

        let mut collected: Vec<&[u8]> = Vec::with_capacity(required);
        collected.push(local);
        for sig in external {
            if collected.len() == required {
                break;
            }
            collected.push(&sig.0);
        }
        if collected.len() < required {
            return Err(ClientError::MissingSignatures(input_index));
        }

        // CHECKMULTISIG consumes one extra stack element
        let mut builder = Builder::new().push_opcode(OP_0);
        for sig in collected {
            builder = builder.push_slice(push_bytes(sig)?);
        }
        Ok(builder.push_slice(push_bytes(redeem.as_bytes())?).into_script())
    }

    fn input_signature(
        &self,
        tx: &Transaction,
        index: usize,
        script_code: &Script,
        key: &SecretKey,
    ) -> ClientResult<Vec<u8>> {
        let sighash = SighashCache::new(tx)
            .legacy_signature_hash(index, script_code, EcdsaSighashType::All.to_u32())
            .map_err(|e| ClientError::Sighash(e.to_string()))?;
        let message = Message::from_digest(sighash.to_byte_array());
        let signature = self.secp.sign_ecdsa(&message, key);

        let mut bytes = signature.serialize_der().to_vec();
        bytes.push(EcdsaSighashType::All.to_u32() as u8);
        Ok(bytes)
    }
}

fn push_bytes(bytes: &[u8]) -> ClientResult<PushBytesBuf> {
    let mut buf = PushBytesBuf::new();
    buf.extend_from_slice(bytes)
        .map_err(|_| ClientError::OversizedPush)?;
    Ok(buf)
}

fn p2pkh_script_sig(signature: &[u8], pubkey: &[u8; 33]) -> ClientResult<ScriptBuf> {
    Ok(Builder::new()
        .push_slice(push_bytes(signature)?)
        .push_slice(pubkey)
        .into_script())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use async_trait::async_trait;
    use bitcoin::{consensus, secp256k1::ecdsa::Signature};
    use staychain_wallet::{TxStatus, WalletResult};

    use super::*;

    #[derive(Debug, Default)]
    struct MockWallet {
        unspents: Vec<Unspent>,
        raw: HashMap<Txid, Transaction>,
        mempool: Vec<Txid>,
        broadcasts: Mutex<Vec<Txid>>,
    }

    #[async_trait]
    impl WalletRpc for MockWallet {
        async fn list_unspent(&self) -> WalletResult<Vec<Unspent>> {
            Ok(self.unspents.clone())
        }

        async fn mempool(&self) -> WalletResult<Vec<Txid>> {
            Ok(self.mempool.clone())
        }

        async fn raw_transaction(&self, txid: &Txid) -> WalletResult<Transaction> {
            self.raw
                .get(txid)
                .cloned()
                .ok_or_else(|| WalletError::MalformedResponse(format!("unknown tx {txid}")))
        }

        async fn tx_status(&self, _txid: &Txid) -> WalletResult<TxStatus> {
            Ok(TxStatus::default())
        }

        async fn broadcast(&self, tx: &Transaction) -> WalletResult<Txid> {
            let txid = tx.compute_txid();
            self.broadcasts.lock().unwrap().push(txid);
            Ok(txid)
        }

        async fn import_address(&self, _address: &Address) -> WalletResult<()> {
            Ok(())
        }

        async fn sign_with_wallet(&self, tx: &Transaction) -> WalletResult<Transaction> {
            Ok(tx.clone())
        }
    }

    fn secret(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    fn root(byte: u8) -> CommitmentHash {
        CommitmentHash::from_byte_array([byte; 32])
    }

    fn txid(byte: u8) -> Txid {
        Txid::from_byte_array([byte; 32])
    }

    fn config(init_script: Option<ScriptBuf>) -> ClientConfig {
        ClientConfig {
            network: Network::Regtest,
            init_txid: txid(0xf0),
            init_script,
            base_key: secret(1),
            topup_address: None,
            topup_script: None,
            topup_key: None,
            fees: FeesConfig::default(),
        }
    }

    fn multisig_config(secp: &Secp256k1<All>) -> ClientConfig {
        let keys = vec![
            secret(1).public_key(secp),
            secret(2).public_key(secp),
            secret(3).public_key(secp),
        ];
        let script = scripts::build_multisig(2, &keys).unwrap();
        config(Some(script))
    }

    fn unspent(tx_byte: u8, sats: u64) -> Unspent {
        Unspent {
            txid: txid(tx_byte),
            vout: 0,
            amount: Amount::from_sat(sats),
        }
    }

    fn spending(prev: Txid) -> Transaction {
        Transaction {
            version: transaction::Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: bitcoin::OutPoint { txid: prev, vout: 0 },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            }],
            output: vec![],
        }
    }

    #[test]
    fn attestation_pays_sum_minus_fee_to_target() {
        let client = AttestClient::new(MockWallet::default(), config(None)).unwrap();
        let key = client.next_attestation_key(&root(9)).unwrap();
        let addr = client.next_attestation_addr(&key, &root(9)).unwrap();

        let unspents = [unspent(2, 100_000), unspent(3, 40_000)];
        let tx = client.create_attestation(&addr, &unspents).unwrap();

        assert_eq!(tx.input.len(), 2);
        assert!(tx
            .input
            .iter()
            .all(|input| input.sequence == Sequence::ENABLE_RBF_NO_LOCKTIME));
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].script_pubkey, addr.script_pubkey());

        let fee = Amount::from_sat(140_000) - tx.output[0].value;
        assert!(fee > Amount::ZERO);
        assert!(fee < Amount::from_sat(140_000));
    }

    #[test]
    fn dust_inputs_cannot_fund_an_attestation() {
        let client = AttestClient::new(MockWallet::default(), config(None)).unwrap();
        let key = client.next_attestation_key(&root(9)).unwrap();
        let addr = client.next_attestation_addr(&key, &root(9)).unwrap();

        let err = client.create_attestation(&addr, &[unspent(2, 10)]).unwrap_err();
        assert!(matches!(err, ClientError::InsufficientFunds { .. }));
    }

    #[test]
    fn addresses_differ_per_commitment() {
        let secp = Secp256k1::new();
        let client = AttestClient::new(MockWallet::default(), multisig_config(&secp)).unwrap();

        let key_a = client.next_attestation_key(&root(1)).unwrap();
        let key_b = client.next_attestation_key(&root(2)).unwrap();
        let addr_a = client.next_attestation_addr(&key_a, &root(1)).unwrap();
        let addr_b = client.next_attestation_addr(&key_b, &root(2)).unwrap();
        assert_ne!(addr_a, addr_b);
    }

    #[tokio::test]
    async fn single_sig_attestation_verifies() {
        let client = AttestClient::new(MockWallet::default(), config(None)).unwrap();
        let key = client.next_attestation_key(&root(5)).unwrap();
        let addr = client.next_attestation_addr(&key, &root(5)).unwrap();
        let tx = client
            .create_attestation(&addr, &[unspent(2, 100_000)])
            .unwrap();

        let prev_root = root(4);
        let signed = client
            .sign_attestation(&tx, &SigBags::new(), prev_root)
            .await
            .unwrap();

        let script_sig = &signed.input[0].script_sig;
        assert!(!script_sig.is_empty());

        // the embedded signature must verify under the tweaked key
        let secp = Secp256k1::new();
        let prev_key = scripts::tweak_secret_key(&secret(1), &prev_root).unwrap();
        let prev_pubkey = prev_key.public_key(&secp);
        let script_code =
            scripts::p2pkh_address(&prev_pubkey, Network::Regtest).script_pubkey();
        let sighash = SighashCache::new(&tx)
            .legacy_signature_hash(0, &script_code, EcdsaSighashType::All.to_u32())
            .unwrap();
        let message = Message::from_digest(sighash.to_byte_array());

        let mut instructions = script_sig.instructions();
        let sig_push = match instructions.next().unwrap().unwrap() {
            bitcoin::script::Instruction::PushBytes(bytes) => bytes.as_bytes().to_vec(),
            other => panic!("expected signature push, got {other:?}"),
        };
        let der = &sig_push[..sig_push.len() - 1];
        let signature = Signature::from_der(der).unwrap();
        secp.verify_ecdsa(&message, &signature, &prev_pubkey).unwrap();
    }

    #[tokio::test]
    async fn multisig_needs_external_signatures() {
        let secp = Secp256k1::new();
        let client = AttestClient::new(MockWallet::default(), multisig_config(&secp)).unwrap();
        let key = client.next_attestation_key(&root(5)).unwrap();
        let addr = client.next_attestation_addr(&key, &root(5)).unwrap();
        let tx = client
            .create_attestation(&addr, &[unspent(2, 100_000)])
            .unwrap();

        // local signature alone cannot satisfy a 2-of-3
        let err = client
            .sign_attestation(&tx, &SigBags::new(), root(4))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingSignatures(0)));

        let mut sigs = SigBags::new();
        sigs.insert(0, vec![InputSig(vec![0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01, 0x01])]);
        let signed = client.sign_attestation(&tx, &sigs, root(4)).await.unwrap();
        assert!(!signed.input[0].script_sig.is_empty());
        assert_ne!(signed.compute_txid(), tx.compute_txid());
    }

    #[tokio::test]
    async fn staychain_tip_found_by_ancestry() {
        let genesis = txid(0xf0);
        let tip = spending(genesis);
        let tip_txid = tip.compute_txid();

        let wallet = MockWallet {
            unspents: vec![unspent(0x77, 50_000), Unspent {
                txid: tip_txid,
                vout: 0,
                amount: Amount::from_sat(90_000),
            }],
            raw: HashMap::from([(tip_txid, tip)]),
            ..Default::default()
        };
        let client = AttestClient::new(wallet, config(None)).unwrap();

        let found = client.find_last_unspent().await.unwrap().unwrap();
        assert_eq!(found.txid, tip_txid);
    }

    #[tokio::test]
    async fn mempool_scan_spots_pending_attestation() {
        let genesis = txid(0xf0);
        let pending = spending(genesis);
        let pending_txid = pending.compute_txid();

        let wallet = MockWallet {
            mempool: vec![txid(0x55), pending_txid],
            raw: HashMap::from([(pending_txid, pending)]),
            ..Default::default()
        };
        let client = AttestClient::new(wallet, config(None)).unwrap();

        assert_eq!(client.unconfirmed_tx().await.unwrap(), Some(pending_txid));
    }

    #[tokio::test]
    async fn topup_found_by_script() {
        let secp = Secp256k1::new();
        let topup_key = secret(7);
        let topup_addr =
            scripts::p2pkh_address(&topup_key.public_key(&secp), Network::Regtest);

        let mut funding = spending(txid(0x11));
        funding.output.push(TxOut {
            value: Amount::from_sat(30_000),
            script_pubkey: topup_addr.script_pubkey(),
        });
        let funding_txid = funding.compute_txid();

        let mut cfg = config(None);
        cfg.topup_address = Some(topup_addr);
        cfg.topup_key = Some(topup_key);

        let wallet = MockWallet {
            unspents: vec![Unspent {
                txid: funding_txid,
                vout: 0,
                amount: Amount::from_sat(30_000),
            }],
            raw: HashMap::from([(funding_txid, funding)]),
            ..Default::default()
        };
        let client = AttestClient::new(wallet, cfg).unwrap();

        let topup = client.find_topup_unspent().await.unwrap().unwrap();
        assert_eq!(topup.txid, funding_txid);
    }

    #[tokio::test]
    async fn broadcast_checks_reported_txid() {
        let client = AttestClient::new(MockWallet::default(), config(None)).unwrap();
        let key = client.next_attestation_key(&root(5)).unwrap();
        let addr = client.next_attestation_addr(&key, &root(5)).unwrap();
        let tx = client
            .create_attestation(&addr, &[unspent(2, 100_000)])
            .unwrap();

        let txid = client.send_attestation(&tx).await.unwrap();
        assert_eq!(txid, tx.compute_txid());
        assert_eq!(client.wallet().broadcasts.lock().unwrap().as_slice(), &[txid]);
    }

    #[test]
    fn bump_lowers_output_and_clears_script_sigs() {
        let mut client = AttestClient::new(MockWallet::default(), config(None)).unwrap();
        let key = client.next_attestation_key(&root(5)).unwrap();
        let addr = client.next_attestation_addr(&key, &root(5)).unwrap();
        let mut tx = client
            .create_attestation(&addr, &[unspent(2, 100_000)])
            .unwrap();
        tx.input[0].script_sig = ScriptBuf::from_bytes(vec![0x51]);

        let value_before = tx.output[0].value;
        let rate_before = client.fees.current();
        client.bump_attestation_fees(&mut tx).unwrap();

        assert_eq!(client.fees.current(), rate_before + client.fees.increment());
        assert!(tx.output[0].value < value_before);
        assert!(tx.input[0].script_sig.is_empty());
    }

    #[test]
    fn unsigned_tx_roundtrips_through_wire_encoding() {
        let client = AttestClient::new(MockWallet::default(), config(None)).unwrap();
        let key = client.next_attestation_key(&root(5)).unwrap();
        let addr = client.next_attestation_addr(&key, &root(5)).unwrap();
        let tx = client
            .create_attestation(&addr, &[unspent(2, 100_000), unspent(3, 50_000)])
            .unwrap();

        let bytes = consensus::encode::serialize(&tx);
        let decoded: Transaction = consensus::encode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn init_script_must_be_multisig() {
        let not_multisig = ScriptBuf::from_bytes(vec![0x51]);
        let err = AttestClient::new(MockWallet::default(), config(Some(not_multisig)));
        assert!(err.is_err());
    }

}
