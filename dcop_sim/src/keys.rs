//! Deterministic Paillier key provider for simulation.

use dcop_core::{CryptoError, KeyPair};
use dcop_env::AgentId;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Provides deterministic Paillier key pairs derived from seeds.
///
/// In simulation, we need reproducible keys for each agent.
/// This provider generates keys that are:
/// - Deterministic: Same seed always produces same keys
/// - Unique: Each agent gets a different key
/// - Isolated: Changing agent count doesn't affect other agents' keys
///
/// Prime search is the most expensive step of a run, so generated pairs are
/// cached.
pub struct DeterministicKeyProvider {
    /// Master seed
    master_seed: u64,

    /// Modulus size in bits
    bits: u64,

    /// Cache of generated keys by agent ID
    key_cache: HashMap<AgentId, KeyPair>,
}

impl DeterministicKeyProvider {
    /// Creates a new key provider with the given master seed.
    pub fn new(master_seed: u64, bits: u64) -> Self {
        Self {
            master_seed,
            bits,
            key_cache: HashMap::new(),
        }
    }

    /// Modulus size of generated keys.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Generates or retrieves the key pair for an agent.
    ///
    /// The key is derived deterministically from:
    /// `master_seed * golden + agent_id * prime`
    pub fn agent_key(&mut self, agent: AgentId) -> Result<KeyPair, CryptoError> {
        if let Some(key) = self.key_cache.get(&agent) {
            return Ok(key.clone());
        }

        let agent_seed = self
            .master_seed
            .wrapping_mul(0x9e3779b97f4a7c15)
            .wrapping_add((agent.0 as u64).wrapping_mul(0x517cc1b727220a95));

        let mut rng = ChaCha8Rng::seed_from_u64(agent_seed);
        let key = KeyPair::generate(self.bits, &mut rng)?;

        self.key_cache.insert(agent, key.clone());
        Ok(key)
    }

    /// Generates a batch of agent keys.
    pub fn generate_agent_keys(&mut self, num_agents: usize) -> Result<Vec<KeyPair>, CryptoError> {
        AgentId::all(num_agents).map(|id| self.agent_key(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BITS: u64 = 128;

    #[test]
    fn test_deterministic_agent_keys() {
        let mut provider1 = DeterministicKeyProvider::new(42, BITS);
        let mut provider2 = DeterministicKeyProvider::new(42, BITS);

        let key1 = provider1.agent_key(AgentId(5)).unwrap();
        let key2 = provider2.agent_key(AgentId(5)).unwrap();

        assert_eq!(key1.public(), key2.public());
    }

    #[test]
    fn test_different_agents_different_keys() {
        let mut provider = DeterministicKeyProvider::new(42, BITS);
        let keys = provider.generate_agent_keys(3).unwrap();

        assert_ne!(keys[0].public(), keys[1].public());
        assert_ne!(keys[1].public(), keys[2].public());
        assert_ne!(keys[0].public(), keys[2].public());
    }

    #[test]
    fn test_key_isolation() {
        // Adding more agents shouldn't change existing keys
        let mut provider1 = DeterministicKeyProvider::new(42, BITS);
        let mut provider2 = DeterministicKeyProvider::new(42, BITS);

        let keys1 = provider1.generate_agent_keys(2).unwrap();
        let _extra = provider2.generate_agent_keys(4).unwrap();

        for (i, key) in keys1.iter().enumerate() {
            assert_eq!(key.public(), provider2.agent_key(AgentId(i)).unwrap().public());
        }
    }

    #[test]
    fn test_invalid_size_is_an_error() {
        let mut provider = DeterministicKeyProvider::new(1, 33);
        assert!(provider.agent_key(AgentId(0)).is_err());
    }
}
