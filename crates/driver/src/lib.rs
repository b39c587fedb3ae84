//! The attestation state machine.
//!
//! One driver owns one attestation in flight and advances it a single state
//! per timer tick: create, sign against the remote quorum, persist, broadcast,
//! confirm, fee-bump. Every failure resets uniformly through
//! [`state::DriverState::Failed`] back to [`state::DriverState::Init`], which
//! re-derives the whole picture from the mempool, the wallet and the store.
pub mod errors;
pub mod state;


use std::{mem, time::Duration};

use bitcoin::{consensus, hashes::Hash};
use serde::{Deserialize, Serialize};
use staychain_client::AttestClient;
use staychain_primitives::attestation::Attestation;
use staychain_signer::SignerMux;
use staychain_store::Store;
use staychain_wallet::WalletRpc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{errors::DriverError, state::DriverState};

/// Fixed waiting time between states.
pub const ATIME_FIXED: Duration = Duration::from_secs(5);

/// Waiting time for signatures to arrive from the signer quorum.
pub const ATIME_SIGS: Duration = Duration::from_secs(60);

/// Waiting time between attempts to check whether an attestation confirmed.
pub const ATIME_CONFIRMATION: Duration = Duration::from_secs(15 * 60);

/// Grace period at startup for signer peers to connect.
pub const INITIAL_DELAY: Duration = Duration::from_secs(30);

/// Tick delay forced in regtest to accelerate tests.
pub const REGTEST_DELAY: Duration = Duration::from_secs(10);

/// Default waiting time between consecutive attestations.
pub const DEFAULT_ATIME_NEW_ATTESTATION: Duration = Duration::from_secs(60 * 60);

/// Default waiting time until an unconfirmed attestation is fee-bumped.
pub const DEFAULT_ATIME_HANDLE_UNCONFIRMED: Duration = Duration::from_secs(60 * 60);

/// Timing surface from configuration, in minutes. Non-positive values fall
/// back to the library defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Minutes between consecutive attestations.
    #[serde(default = "sentinel")]
    pub new_attestation_minutes: i64,

    /// Minutes before an unconfirmed attestation is fee-bumped.
    #[serde(default = "sentinel")]
    pub handle_unconfirmed_minutes: i64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            new_attestation_minutes: -1,
            handle_unconfirmed_minutes: -1,
        }
    }
}

const fn sentinel() -> i64 {
    -1
}

/// Resolved timing schedule owned by one driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Waiting time between consecutive attestations.
    pub new_attestation: Duration,

    /// Waiting time until an unconfirmed attestation is fee-bumped.
    pub handle_unconfirmed: Duration,
}

impl Timing {
    /// Resolves the configured schedule, warning on invalid values.
    pub fn from_config(config: &TimingConfig) -> Self {
        let new_attestation = if config.new_attestation_minutes > 0 {
            Duration::from_secs(config.new_attestation_minutes as u64 * 60)
        } else {
            warn!("invalid new attestation time argument, using default");
            DEFAULT_ATIME_NEW_ATTESTATION
        };
        let handle_unconfirmed = if config.handle_unconfirmed_minutes > 0 {
            Duration::from_secs(config.handle_unconfirmed_minutes as u64 * 60)
        } else {
            warn!("invalid handle unconfirmed time argument, using default");
            DEFAULT_ATIME_HANDLE_UNCONFIRMED
        };
        info!(?new_attestation, ?handle_unconfirmed, "timing schedule resolved");
        Timing {
            new_attestation,
            handle_unconfirmed,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            new_attestation: DEFAULT_ATIME_NEW_ATTESTATION,
            handle_unconfirmed: DEFAULT_ATIME_HANDLE_UNCONFIRMED,
        }
    }
}

/// Drives one attestation at a time through creation, signing, broadcast and
/// confirmation.
#[derive(Debug)]
pub struct AttestDriver<W, S, G> {
    client: AttestClient<W>,
    store: S,
    signer: G,
    timing: Timing,
    state: DriverState,
    delay: Duration,
    regtest: bool,
}

impl<W, S, G> AttestDriver<W, S, G>
where
    W: WalletRpc,
    S: Store,
    G: SignerMux,
{
    /// Creates a driver in its initial state.
    pub fn new(client: AttestClient<W>, store: S, signer: G, timing: Timing, regtest: bool) -> Self {
        AttestDriver {
            client,
            store,
            signer,
            timing,
            state: DriverState::Init,
            delay: INITIAL_DELAY,
            regtest,
        }
    }

    /// The current state.
    pub fn state(&self) -> &DriverState {
        &self.state
    }

    /// The delay until the next tick.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The attest client, including its fee policy.
    pub fn client(&self) -> &AttestClient<W> {
        &self.client
    }

    /// Runs the driver until cancelled. The first tick waits out the startup
    /// grace period so signer peers have time to connect.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutting down attestation service");
                    return;
                }
                _ = sleep(self.delay) => {
                    self.tick().await;
                    debug!(delay = ?self.delay, "sleeping until next state");
                }
            }
        }
    }

    /// Advances the state machine by exactly one state.
    pub async fn tick(&mut self) {
        self.delay = ATIME_FIXED;

        let state = mem::replace(&mut self.state, DriverState::Init);
        info!(state = state.name(), "advancing attestation");
        self.state = match state {
            DriverState::Failed { err } => {
                error!(%err, "attestation service failure");
                Ok(DriverState::Init)
            }
            DriverState::Init => self.state_init().await,
            DriverState::NextCommitment { prev } => self.state_next_commitment(prev).await,
            DriverState::NewAttestation { attestation } => {
                self.state_new_attestation(attestation).await
            }
            DriverState::SignAttestation { attestation } => {
                self.state_sign_attestation(attestation).await
            }
            DriverState::PreSendStore { attestation } => {
                self.state_pre_send_store(attestation).await
            }
            DriverState::SendAttestation { attestation } => {
                self.state_send_attestation(attestation).await
            }
            DriverState::AwaitConfirmation { attestation, since } => {
                self.state_await_confirmation(attestation, since).await
            }
            DriverState::HandleUnconfirmed { attestation } => {
                self.state_handle_unconfirmed(attestation).await
            }
        }
        .unwrap_or_else(|err| DriverState::Failed { err });

        if self.regtest {
            self.delay = REGTEST_DELAY;
        }
    }

    /// Determines whether a staychain tip already exists on the network: an
    /// unconfirmed attestation in the mempool resumes the confirmation wait,
    /// a spent-to unspent resumes from its stored commitment, and a bare
    /// funding output starts a fresh chain.
    async fn state_init(&mut self) -> Result<DriverState, DriverError> {
        if let Some(txid) = self.client.unconfirmed_tx().await? {
            let commitment = self
                .store
                .attestation_commitment(txid)
                .await?
                .ok_or(DriverError::CommitmentNotFound(txid))?;
            info!(%txid, "found unconfirmed attestation");
            let mut attestation = Attestation::new(txid, commitment);
            attestation.tx = self.client.wallet().raw_transaction(&txid).await?;
            return Ok(DriverState::AwaitConfirmation {
                attestation,
                since: Instant::now(),
            });
        }

        let Some(unspent) = self.client.find_last_unspent().await? else {
            // with neither a mempool entry nor an unspent there is nothing to
            // resume from; wait for an operator to seed the wallet
            warn!("wallet failure: no unconfirmed attestation and no unspent");
            return Ok(DriverState::Init);
        };

        let attestation = match self.store.attestation_commitment(unspent.txid).await? {
            Some(commitment) => {
                info!(txid = %unspent.txid, "found confirmed attestation");
                let mut attestation = Attestation::new(unspent.txid, commitment);
                attestation.tx = self.client.wallet().raw_transaction(&unspent.txid).await?;
                let status = self.client.wallet().tx_status(&unspent.txid).await?;
                match status.block_hash {
                    Some(block_hash) => attestation
                        .mark_confirmed(block_hash, status.block_time.unwrap_or_default()),
                    None => attestation.confirmed = true,
                }
                self.store.update_latest(&attestation).await?;
                attestation
            }
            None => {
                info!(txid = %unspent.txid, "found unspent transaction, initiating staychain");
                Attestation::default()
            }
        };

        self.signer
            .send_confirmed_hash(attestation.commitment_hash().to_byte_array())?;
        Ok(DriverState::NextCommitment { prev: attestation })
    }

    /// Pulls the latest client commitment and starts a new attestation for
    /// it, unless it has already been attested.
    async fn state_next_commitment(
        &mut self,
        prev: Attestation,
    ) -> Result<DriverState, DriverError> {
        let latest = self.store.client_commitment().await?;
        let latest_hash = latest.commitment_hash();
        info!(%latest_hash, "received commitment hash");

        if latest_hash == prev.commitment_hash() {
            info!("client commitment already attested, skipping attestation");
            self.delay = self.timing.new_attestation;
            return Ok(DriverState::NextCommitment { prev });
        }

        self.signer.send_new_hash(latest_hash.to_byte_array())?;
        Ok(DriverState::NewAttestation {
            attestation: Attestation::with_commitment(latest),
        })
    }

    /// Derives the next pay-to address, builds the unsigned transaction from
    /// the staychain tip (plus a topup, when funded) and publishes it to the
    /// signers.
    async fn state_new_attestation(
        &mut self,
        mut attestation: Attestation,
    ) -> Result<DriverState, DriverError> {
        let root = attestation.commitment_hash();
        let key = self.client.next_attestation_key(&root)?;
        let payto = self.client.next_attestation_addr(&key, &root)?;
        info!(address = %payto, "importing attestation address");
        self.client.import_attestation_addr(&payto).await?;

        let unspent = self
            .client
            .find_last_unspent()
            .await?
            .ok_or(DriverError::UnspentNotFound)?;
        let mut unspents = vec![unspent];
        if let Some(topup) = self.client.find_topup_unspent().await? {
            info!(txid = %topup.txid, "appending topup unspent");
            unspents.push(topup);
        }

        attestation.tx = self.client.create_attestation(&payto, &unspents)?;
        info!(presign_txid = %attestation.tx.compute_txid(), "built unsigned attestation");
        self.signer
            .send_new_tx(consensus::encode::serialize(&attestation.tx))?;

        self.delay = ATIME_SIGS;
        Ok(DriverState::SignAttestation { attestation })
    }

    /// Drains the collected quorum signatures and finalises the scriptSigs
    /// with the local signature.
    async fn state_sign_attestation(
        &mut self,
        mut attestation: Attestation,
    ) -> Result<DriverState, DriverError> {
        let sigs = self.signer.get_sigs();
        for (input, bag) in &sigs {
            info!(input = *input, count = bag.len(), "received signatures");
        }

        let prev_root = self.store.latest_commitment_hash().await?;
        let signed = self
            .client
            .sign_attestation(&attestation.tx, &sigs, prev_root)
            .await?;
        attestation.tx = signed;
        attestation.txid = attestation.tx.compute_txid();

        Ok(DriverState::PreSendStore { attestation })
    }

    /// Persists the signed-but-unbroadcast attestation so a crash between
    /// broadcast and confirmation is recoverable from the mempool scan.
    async fn state_pre_send_store(
        &mut self,
        attestation: Attestation,
    ) -> Result<DriverState, DriverError> {
        self.store.update_latest(&attestation).await?;
        Ok(DriverState::SendAttestation { attestation })
    }

    /// Broadcasts the signed attestation and starts the confirmation wait.
    async fn state_send_attestation(
        &mut self,
        mut attestation: Attestation,
    ) -> Result<DriverState, DriverError> {
        let txid = self.client.send_attestation(&attestation.tx).await?;
        attestation.txid = txid;
        info!(%txid, "attestation transaction committed");

        self.delay = ATIME_CONFIRMATION;
        Ok(DriverState::AwaitConfirmation {
            attestation,
            since: Instant::now(),
        })
    }

    /// Polls for the attestation's confirmation; escalates to the
    /// fee-bumping state once it has been unconfirmed for too long.
    async fn state_await_confirmation(
        &mut self,
        mut attestation: Attestation,
        since: Instant,
    ) -> Result<DriverState, DriverError> {
        info!(txid = %attestation.txid, commitment = %attestation.commitment_hash(),
            "awaiting confirmation");

        if since.elapsed() > self.timing.handle_unconfirmed {
            return Ok(DriverState::HandleUnconfirmed { attestation });
        }

        let status = self.client.wallet().tx_status(&attestation.txid).await?;
        let Some(block_hash) = status.block_hash else {
            self.delay = ATIME_CONFIRMATION;
            return Ok(DriverState::AwaitConfirmation { attestation, since });
        };

        info!(txid = %attestation.txid, "attestation confirmed");
        attestation.mark_confirmed(block_hash, status.block_time.unwrap_or_default());
        self.store.update_latest(&attestation).await?;
        self.client.fees.reset(self.regtest);
        self.signer
            .send_confirmed_hash(attestation.commitment_hash().to_byte_array())?;

        self.delay = self.timing.new_attestation.saturating_sub(since.elapsed());
        Ok(DriverState::NextCommitment { prev: attestation })
    }

    /// Replaces the fee on the lingering attestation and re-enters the
    /// signing round with the bumped transaction.
    async fn state_handle_unconfirmed(
        &mut self,
        mut attestation: Attestation,
    ) -> Result<DriverState, DriverError> {
        info!(txid = %attestation.tx.compute_txid(), "bumping fees for attestation");
        self.client.bump_attestation_fees(&mut attestation.tx)?;
        info!(presign_txid = %attestation.tx.compute_txid(), "re-publishing unsigned attestation");
        self.signer
            .send_new_tx(consensus::encode::serialize(&attestation.tx))?;

        self.delay = ATIME_SIGS;
        Ok(DriverState::SignAttestation { attestation })
    }
}
