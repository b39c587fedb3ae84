//! Transport to the remote signer quorum.
//!
//! The driver publishes three fire-and-forget topics (new-hash, new-tx,
//! confirmed-hash) and drains per-input signature bags that peers fill in
//! the background. The wire transport is opaque to the core: [`SignerMux`]
//! is the contract, [`channel::ChannelMux`] the in-process implementation
//! and [`tcp::TcpMux`] the networked one.
pub mod channel;
pub mod config;
pub mod tcp;

use std::collections::BTreeMap;

use thiserror::Error;

/// Error type for the signer transport.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The transport's worker side has gone away.
    #[error("signer transport closed")]
    TransportClosed,
}

/// A single signature contributed by a signer peer for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSig(pub Vec<u8>);

/// Signatures collected per input index.
pub type SigBags = BTreeMap<u32, Vec<InputSig>>;

/// Fan-out/fan-in channel to the signer quorum.
///
/// A [`SignerMux::get_sigs`] call made after the signing delay returns the
/// signatures peers produced in response to the most recent
/// [`SignerMux::send_new_tx`]; older announcements are discarded.
pub trait SignerMux: Send + Sync {
    /// Notifies peers of the next commitment root to sign for.
    fn send_new_hash(&self, root: [u8; 32]) -> Result<(), SignerError>;

    /// Publishes a serialised unsigned transaction for signing.
    fn send_new_tx(&self, tx: Vec<u8>) -> Result<(), SignerError>;

    /// Notifies peers that the previous attestation has confirmed.
    fn send_confirmed_hash(&self, root: [u8; 32]) -> Result<(), SignerError>;

    /// Non-blocking drain of the signature queue.
    fn get_sigs(&self) -> SigBags;
}

impl<T: SignerMux + ?Sized> SignerMux for std::sync::Arc<T> {
    fn send_new_hash(&self, root: [u8; 32]) -> Result<(), SignerError> {
        (**self).send_new_hash(root)
    }

    fn send_new_tx(&self, tx: Vec<u8>) -> Result<(), SignerError> {
        (**self).send_new_tx(tx)
    }

    fn send_confirmed_hash(&self, root: [u8; 32]) -> Result<(), SignerError> {
        (**self).send_confirmed_hash(root)
    }

    fn get_sigs(&self) -> SigBags {
        (**self).get_sigs()
    }
}
