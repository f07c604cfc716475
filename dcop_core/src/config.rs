//! Agent configuration and algorithm selection.

use crate::error::CoreError;
use crate::paillier::DEFAULT_KEY_BITS;
use serde::{Deserialize, Serialize};

/// Smallest secure-sum threshold. Agent 2's prefix has one contributor, so
/// a Protocol 3 it started would carry agent 1's cost unmasked.
pub const MIN_SECURE_SUM_THRESHOLD: usize = 3;

/// Knobs shared by all agents of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Paillier modulus size in bits (default: 512)
    pub key_bits: u64,

    /// Smallest agent id that runs the P-SyncBB prefix sum and bound
    /// comparison (default: 3)
    pub secure_sum_threshold: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
            secure_sum_threshold: MIN_SECURE_SUM_THRESHOLD,
        }
    }
}

impl AgentConfig {
    /// Rejects a secure-sum threshold that would expose a single prefix cost.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.secure_sum_threshold < MIN_SECURE_SUM_THRESHOLD {
            return Err(CoreError::Config(format!(
                "secure-sum threshold {} below {}",
                self.secure_sum_threshold, MIN_SECURE_SUM_THRESHOLD
            )));
        }
        Ok(())
    }
}

/// The three search variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Plain synchronous branch and bound
    SyncBb,
    /// Secure sums, secure comparison and decision privacy
    PSyncBb,
    /// Secret-shared costs over one-hot encrypted domains
    PcSyncBb,
}

impl Algorithm {
    /// Every variant, in increasing privacy order.
    pub const ALL: [Algorithm; 3] = [Algorithm::SyncBb, Algorithm::PSyncBb, Algorithm::PcSyncBb];

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::SyncBb => "SyncBB",
            Algorithm::PSyncBb => "P-SyncBB",
            Algorithm::PcSyncBb => "PC-SyncBB",
        }
    }

    /// Smallest supported number of agents.
    pub fn min_agents(&self) -> usize {
        match self {
            Algorithm::SyncBb => 1,
            Algorithm::PSyncBb | Algorithm::PcSyncBb => 2,
        }
    }

    /// Rejects runs with too few agents.
    pub fn check_agents(&self, n: usize) -> Result<(), CoreError> {
        if n < self.min_agents() {
            return Err(CoreError::Config(format!(
                "{} needs at least {} agents, got {}",
                self.name(),
                self.min_agents(),
                n
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "syncbb" => Ok(Algorithm::SyncBb),
            "psyncbb" => Ok(Algorithm::PSyncBb),
            "pcsyncbb" => Ok(Algorithm::PcSyncBb),
            _ => Err(format!("Unknown algorithm: {s}")),
        }
    }
}
