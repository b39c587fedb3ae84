//! CLI for the attestation daemon.
use std::path::PathBuf;

use clap::Parser;

/// Anchors sidechain state commitments into the parent chain.
#[derive(Debug, Parser)]
#[command(name = "staychaind", version)]
pub(crate) struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    pub config: PathBuf,
}
