//! Key tweaking and spend-script derivation.
//!
//! Every attestation output is locked under keys deterministically tweaked by
//! the commitment root being attested, so the spend script itself binds the
//! output to the committed root.

use bitcoin::{
    hashes::{sha256, Hash},
    opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_16},
    script::{Builder, Instruction},
    secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey, Verification},
    Address, Network, Script, ScriptBuf,
};
use thiserror::Error;

use crate::commitment::CommitmentHash;

/// Error type for script and key derivation.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script could not be parsed as an m-of-n multisig.
    #[error("script is not an m-of-n multisig")]
    NotMultisig,

    /// The commitment tweak fell outside the curve order.
    #[error("commitment tweak out of range")]
    TweakOutOfRange,

    /// Key arithmetic failed.
    #[error("secp256k1: {0}")]
    Secp(#[from] bitcoin::secp256k1::Error),

    /// Address derivation failed.
    #[error("address derivation: {0}")]
    Address(String),
}

/// Derives the scalar tweak for a commitment root.
pub fn commitment_tweak(root: &CommitmentHash) -> Result<Scalar, ScriptError> {
    let digest = sha256::Hash::hash(root.as_byte_array());
    Scalar::from_be_bytes(digest.to_byte_array()).map_err(|_| ScriptError::TweakOutOfRange)
}

/// Tweaks a secret key by the commitment root.
pub fn tweak_secret_key(
    secret_key: &SecretKey,
    root: &CommitmentHash,
) -> Result<SecretKey, ScriptError> {
    let tweak = commitment_tweak(root)?;
    Ok(secret_key.add_tweak(&tweak)?)
}

/// Tweaks a public key by the commitment root.
pub fn tweak_public_key<C: Verification>(
    secp: &Secp256k1<C>,
    public_key: &PublicKey,
    root: &CommitmentHash,
) -> Result<PublicKey, ScriptError> {
    let tweak = commitment_tweak(root)?;
    Ok(public_key.add_exp_tweak(secp, &tweak)?)
}

/// Parses an m-of-n multisig script into its threshold and public keys.
pub fn parse_multisig(script: &Script) -> Result<(usize, Vec<PublicKey>), ScriptError> {
    let mut required = None;
    let mut total = None;
    let mut keys = Vec::new();
    let mut complete = false;

    for instruction in script.instructions() {
        let instruction = instruction.map_err(|_| ScriptError::NotMultisig)?;
        if complete {
            return Err(ScriptError::NotMultisig);
        }
        match instruction {
            Instruction::PushBytes(bytes) => {
                if required.is_none() || total.is_some() {
                    return Err(ScriptError::NotMultisig);
                }
                keys.push(PublicKey::from_slice(bytes.as_bytes())?);
            }
            Instruction::Op(op) => {
                let value = op.to_u8();
                if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&value) {
                    let num = (value - OP_PUSHNUM_1.to_u8() + 1) as usize;
                    if required.is_none() {
                        required = Some(num);
                    } else if total.is_none() {
                        total = Some(num);
                    } else {
                        return Err(ScriptError::NotMultisig);
                    }
                } else if op == OP_CHECKMULTISIG {
                    complete = true;
                } else {
                    return Err(ScriptError::NotMultisig);
                }
            }
        }
    }

    let required = required.ok_or(ScriptError::NotMultisig)?;
    let total = total.ok_or(ScriptError::NotMultisig)?;
    if !complete || keys.len() != total || required == 0 || required > total {
        return Err(ScriptError::NotMultisig);
    }
    Ok((required, keys))
}

/// Builds an m-of-n multisig script over the given keys.
pub fn build_multisig(required: usize, keys: &[PublicKey]) -> Result<ScriptBuf, ScriptError> {
    if required == 0 || required > keys.len() || keys.len() > 16 {
        return Err(ScriptError::NotMultisig);
    }
    let mut builder = Builder::new().push_int(required as i64);
    for key in keys {
        builder = builder.push_key(&bitcoin::PublicKey::new(*key));
    }
    Ok(builder
        .push_int(keys.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script())
}

/// Rebuilds a multisig script with every key tweaked by the commitment root.
pub fn tweak_multisig_script<C: Verification>(
    secp: &Secp256k1<C>,
    script: &Script,
    root: &CommitmentHash,
) -> Result<ScriptBuf, ScriptError> {
    let (required, keys) = parse_multisig(script)?;
    let tweaked = keys
        .iter()
        .map(|key| tweak_public_key(secp, key, root))
        .collect::<Result<Vec<_>, _>>()?;
    build_multisig(required, &tweaked)
}

/// Derives the pay-to-pubkey-hash address for a key.
pub fn p2pkh_address(public_key: &PublicKey, network: Network) -> Address {
    Address::p2pkh(bitcoin::PublicKey::new(*public_key).pubkey_hash(), network)
}

/// Derives the pay-to-script-hash address for a redeem script.
pub fn p2sh_address(redeem_script: &Script, network: Network) -> Result<Address, ScriptError> {
    Address::p2sh(redeem_script, network).map_err(|e| ScriptError::Address(e.to_string()))
}

/// Worst-case scriptSig size for a signed p2pkh input.
pub const P2PKH_SCRIPT_SIG_SIZE: usize = 107;

/// Worst-case scriptSig size for a signed p2sh multisig input.
pub fn multisig_script_sig_size(required: usize, redeem_script_len: usize) -> usize {
    // OP_0 + required DER sigs + redeem script push
    1 + required * 73 + redeem_script_len + 3
}

/// Estimated size in bytes of a signed legacy transaction given the expected
/// scriptSig size of each input.
pub fn estimated_signed_size(script_sig_sizes: &[usize], num_outputs: usize) -> usize {
    const TX_OVERHEAD: usize = 10;
    const OUTPUT_SIZE: usize = 34;
    const INPUT_OVERHEAD: usize = 40;

    let inputs: usize = script_sig_sizes
        .iter()
        .map(|size| INPUT_OVERHEAD + var_int_len(*size) + size)
        .sum();
    TX_OVERHEAD + num_outputs * OUTPUT_SIZE + inputs
}

fn var_int_len(value: usize) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        _ => 5,
    }
}
