//! Fee policy for attestation transactions.
//!
//! A process-lifetime scalar rate in sat/vB, bumped when an attestation
//! lingers unconfirmed and reset once it confirms.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default fee rate floor in sat/vB.
pub const DEFAULT_MIN_FEE: u64 = 10;

/// Default fee rate ceiling in sat/vB.
pub const DEFAULT_MAX_FEE: u64 = 100;

/// Default bump step in sat/vB.
pub const DEFAULT_FEE_INCREMENT: u64 = 5;

/// Regtest baseline sits above the floor so bumping is exercised quickly.
pub const REGTEST_BASE_FEE: u64 = 20;

/// Fee bounds from configuration; `-1` means use the library default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesConfig {
    /// Minimum fee rate in sat/vB.
    #[serde(default = "sentinel")]
    pub min_fee: i64,

    /// Maximum fee rate in sat/vB.
    #[serde(default = "sentinel")]
    pub max_fee: i64,

    /// Bump step in sat/vB.
    #[serde(default = "sentinel")]
    pub fee_increment: i64,
}

impl Default for FeesConfig {
    fn default() -> Self {
        FeesConfig {
            min_fee: -1,
            max_fee: -1,
            fee_increment: -1,
        }
    }
}

const fn sentinel() -> i64 {
    -1
}

/// Current fee rate with bump and reset operations, clamped to `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    current: u64,
    min: u64,
    max: u64,
    increment: u64,
}

impl FeePolicy {
    /// Builds a policy from config, falling back to library defaults for
    /// negative sentinel values.
    pub fn new(config: &FeesConfig) -> Self {
        let min = pick(config.min_fee, DEFAULT_MIN_FEE);
        let mut max = pick(config.max_fee, DEFAULT_MAX_FEE);
        if max < min {
            warn!(min, max, "maximum fee below minimum, raising it to the minimum");
            max = min;
        }
        let increment = pick(config.fee_increment, DEFAULT_FEE_INCREMENT);
        FeePolicy {
            current: min,
            min,
            max,
            increment,
        }
    }

    /// The current fee rate in sat/vB.
    pub const fn current(&self) -> u64 {
        self.current
    }

    /// The configured bump step in sat/vB.
    pub const fn increment(&self) -> u64 {
        self.increment
    }

    /// Raises the current rate by one increment, clamped to the maximum.
    pub fn bump(&mut self) -> u64 {
        self.current = (self.current + self.increment).min(self.max);
        self.current
    }

    /// Returns the rate to its baseline.
    pub fn reset(&mut self, regtest: bool) {
        self.current = if regtest {
            REGTEST_BASE_FEE.clamp(self.min, self.max)
        } else {
            self.min
        };
    }
}

fn pick(value: i64, default: u64) -> u64 {
    if value >= 0 {
        value as u64
    } else {
        default
    }
}
