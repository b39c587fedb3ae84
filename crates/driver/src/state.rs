//! Driver states.
//!
//! Each state carries exactly the payload its handler needs, so combinations
//! like awaiting confirmation without a transaction are unrepresentable. Any
//! handler failure lands in [`DriverState::Failed`], whose next tick resets
//! to [`DriverState::Init`].

use staychain_primitives::attestation::Attestation;
use tokio::time::Instant;

use crate::errors::DriverError;

/// The attestation in flight, as a tagged state.
#[derive(Debug)]
pub enum DriverState {
    /// Re-derive everything from on-chain and store reality.
    Init,

    /// Wait for a fresh client commitment; `prev` is the last attested
    /// state.
    NextCommitment {
        /// The last attested (or default) attestation.
        prev: Attestation,
    },

    /// Build the unsigned transaction for the new attestation.
    NewAttestation {
        /// Attestation bound to the commitment being attested.
        attestation: Attestation,
    },

    /// Collect signer quorum signatures and finalise the scriptSigs.
    SignAttestation {
        /// Attestation carrying the published unsigned transaction.
        attestation: Attestation,
    },

    /// Persist the signed attestation before it is let loose.
    PreSendStore {
        /// Fully signed attestation.
        attestation: Attestation,
    },

    /// Broadcast the signed attestation.
    SendAttestation {
        /// Fully signed, persisted attestation.
        attestation: Attestation,
    },

    /// Poll for the broadcast attestation's confirmation.
    AwaitConfirmation {
        /// Broadcast attestation.
        attestation: Attestation,
        /// When the confirmation wait started.
        since: Instant,
    },

    /// Fee-bump an attestation that has been unconfirmed for too long.
    HandleUnconfirmed {
        /// Attestation whose fee is being replaced.
        attestation: Attestation,
    },

    /// A handler failed; log and restart from [`DriverState::Init`].
    Failed {
        /// The stored failure.
        err: DriverError,
    },
}

impl DriverState {
    /// Short state name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            DriverState::Init => "INIT",
            DriverState::NextCommitment { .. } => "NEXT_COMMITMENT",
            DriverState::NewAttestation { .. } => "NEW_ATTESTATION",
            DriverState::SignAttestation { .. } => "SIGN_ATTESTATION",
            DriverState::PreSendStore { .. } => "PRE_SEND_STORE",
            DriverState::SendAttestation { .. } => "SEND_ATTESTATION",
            DriverState::AwaitConfirmation { .. } => "AWAIT_CONFIRMATION",
            DriverState::HandleUnconfirmed { .. } => "HANDLE_UNCONFIRMED",
            DriverState::Failed { .. } => "FAILED",
        }
    }
}
