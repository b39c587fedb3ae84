//! Configuration for the signer transport.
use serde::{Deserialize, Serialize};

/// Peer configuration for the signer transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Addresses of the remote signer peers, `host:port`.
    pub signers: Vec<String>,
}
