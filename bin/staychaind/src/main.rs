//! Staychain attestation daemon.
//!
//! Periodically anchors the latest sidechain state commitment into the parent
//! chain by building, collaboratively signing, broadcasting and confirming a
//! chain of attestation transactions.

use std::{fs, path::Path, process::ExitCode};

use clap::Parser;
use serde::de::DeserializeOwned;
use staychain_client::AttestClient;
use staychain_common::logging::{self, LoggerConfig};
use staychain_driver::{AttestDriver, Timing};
use staychain_signer::tcp::TcpMux;
use staychain_store::inmemory::InMemoryStore;
use staychain_wallet::bitcoind::BitcoindWallet;
use tokio::runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

mod args;
mod config;

use crate::{args::Cli, config::Config};

const DEFAULT_THREAD_COUNT: usize = 2;

fn main() -> ExitCode {
    logging::init(LoggerConfig::with_base_name("staychaind"));

    let cli = Cli::parse();
    info!(config = %cli.config.display(), "starting attestation daemon");

    let config = parse_toml::<Config>(cli.config);

    // bad staychain parameters abort before the driver ever ticks
    let client_config = match config::client_config(&config) {
        Ok(client_config) => client_config,
        Err(e) => {
            error!(%e, "invalid staychain configuration");
            return ExitCode::FAILURE;
        }
    };

    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(DEFAULT_THREAD_COUNT)
        .enable_all()
        .build()
        .expect("must be able to create runtime");

    runtime.block_on(async move {
        let wallet = match BitcoindWallet::new(
            config.main.url.clone(),
            config.main.user.clone(),
            config.main.pass.clone(),
            config.main.retry_count,
            config.main.retry_interval,
            config.main.wallet.clone().unwrap_or_default(),
        ) {
            Ok(wallet) => wallet,
            Err(e) => {
                error!(%e, "could not set up the parent-chain rpc client");
                return ExitCode::FAILURE;
            }
        };

        let client = match AttestClient::new(wallet, client_config) {
            Ok(client) => client,
            Err(e) => {
                error!(%e, "invalid attestation script configuration");
                return ExitCode::FAILURE;
            }
        };

        info!(peers = ?config.signer.signers, "connecting signer transport");
        let signer = TcpMux::connect(&config.signer.signers);

        let store = InMemoryStore::new();
        let timing = Timing::from_config(&config.timing);
        let driver = AttestDriver::new(client, store, signer, timing, config.staychain.regtest);

        let cancel = CancellationToken::new();
        let driver_task = tokio::spawn(driver.run(cancel.clone()));
        debug!("attestation driver started");

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => error!(%e, "could not listen for the shutdown signal"),
        }
        cancel.cancel();
        if let Err(e) = driver_task.await {
            error!(%e, "driver task did not exit cleanly");
            return ExitCode::FAILURE;
        }

        info!("attestation daemon shutdown complete");
        ExitCode::SUCCESS
    })
}

/// Reads and parses a TOML file from the given path into the given type `T`.
///
/// # Panics
///
/// 1. If the file is not readable.
/// 2. If the contents of the file cannot be deserialized into the given type
///    `T`.
fn parse_toml<T>(path: impl AsRef<Path>) -> T
where
    T: std::fmt::Debug + DeserializeOwned,
{
    fs::read_to_string(path)
        .map(|raw| {
            trace!(?raw, "read config file");

            toml::from_str::<T>(&raw).unwrap_or_else(|e| {
                panic!("failed to parse TOML file: {e:?}");
            })
        })
        .unwrap_or_else(|_| {
            panic!("failed to read TOML file");
        })
}
