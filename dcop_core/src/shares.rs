//! Additive cost shares for PC-SyncBB.
//!
//! For a constraint between a requester `i` (higher id) and a lower
//! neighbor `t`, the requester combines `t`'s one-hot vector `Z_t` with its
//! own cost row and a random `ρ`:
//!
//! ```text
//! Y = Π_j Z_t[j]^cost(i, v_i, t, d_j) · E_t(-ρ) = E_t(cost(i, v_i, t, v_t) - ρ)
//! ```
//!
//! `t` decrypts `Y` and keeps the result; `i` keeps `ρ`. Neither share
//! reveals the cost or `t`'s value, but the two add up to the cost.

use crate::error::CryptoError;
use crate::paillier::{Ciphertext, PublicKey};
use dcop_env::{AgentId, Cost};
use rand::Rng;
use std::collections::BTreeMap;

/// Bit size of the share randomness: `ceil(log2(N·(N-1)·max_cost))`.
///
/// Clamped to `[1, 62]` so shares and their sums stay inside `i64`.
pub fn share_bits(n: usize, max_cost: Cost) -> u32 {
    let span = (n as u128)
        .saturating_mul(n.saturating_sub(1) as u128)
        .saturating_mul(max_cost.max(1) as u128);
    let bits = if span <= 1 {
        1
    } else {
        128 - (span - 1).leading_zeros()
    };
    bits.clamp(1, 62)
}

/// Initial shared upper bound held by the first agent: one more than the
/// worst possible total cost, `max_cost · N(N-1)/2 + 1`.
pub fn q_infinity(n: usize, max_cost: Cost) -> Cost {
    let pairs = (n * n.saturating_sub(1) / 2) as Cost;
    max_cost.saturating_mul(pairs).saturating_add(1)
}

/// Computes the blinded ciphertext `Y` sent back to the owner of `z`.
///
/// # Arguments
/// * `owner_key` - Public key of the lower neighbor owning `z`
/// * `z` - The neighbor's one-hot vector
/// * `cost_row` - `cost(i, v_i, t, d_j)` for each domain position `j` of `t`
/// * `rho` - The requester's share
pub fn blinded_cost_share<R: Rng + ?Sized>(
    owner_key: &PublicKey,
    z: &[Ciphertext],
    cost_row: &[Cost],
    rho: Cost,
    rng: &mut R,
) -> Result<Ciphertext, CryptoError> {
    if z.len() != cost_row.len() {
        return Err(CryptoError::LengthMismatch {
            expected: cost_row.len(),
            found: z.len(),
        });
    }

    let mut y = owner_key.encrypt(-rho, rng);
    for (slot, cost) in z.iter().zip(cost_row) {
        let term = owner_key.mul_scalar(slot, *cost)?;
        y = owner_key.add(&y, &term)?;
    }
    Ok(y)
}

/// Shares of constraint costs held by one agent, keyed by the peer on the
/// other end of the constraint.
#[derive(Debug, Clone, Default)]
pub struct ShareTable {
    shares: BTreeMap<AgentId, Cost>,
}

impl ShareTable {
    /// Creates an empty table (all shares zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the share for the constraint with `peer`.
    pub fn set(&mut self, peer: AgentId, share: Cost) {
        self.shares.insert(peer, share);
    }

    /// Zeroes the share for `peer`.
    pub fn zero(&mut self, peer: AgentId) {
        self.shares.remove(&peer);
    }

    /// Share for `peer` (zero if none).
    pub fn get(&self, peer: AgentId) -> Cost {
        self.shares.get(&peer).copied().unwrap_or(0)
    }

    /// Sum of all held shares.
    pub fn sum(&self) -> Cost {
        self.shares.values().fold(0, |acc, s| acc.wrapping_add(*s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::one_hot::EncryptedOneHot;
    use crate::paillier::KeyPair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_share_bits() {
        // 3·2·10 = 60 -> 6 bits
        assert_eq!(share_bits(3, 10), 6);
        // 2·1·32 = 64 -> exactly 6 bits
        assert_eq!(share_bits(2, 32), 6);
        assert_eq!(share_bits(1, 10), 1);
        assert_eq!(share_bits(1000, Cost::MAX), 62);
    }

    #[test]
    fn test_q_infinity() {
        assert_eq!(q_infinity(4, 10), 61);
        assert_eq!(q_infinity(2, 5), 6);
    }

    #[test]
    fn test_shares_reconstruct_cost() {
        let owner = KeyPair::generate(128, &mut ChaCha8Rng::seed_from_u64(40)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(41);

        let mut z = EncryptedOneHot::new(owner.public(), 3, &mut rng).unwrap();
        z.move_to(2);
        let row = [4, 9, 6];

        let rho: Cost = rng.gen_range(0..1 << 10);
        let y = blinded_cost_share(owner.public(), z.slots(), &row, rho, &mut rng).unwrap();
        let owner_share = owner.decrypt_i64(&y).unwrap();

        assert_eq!(owner_share + rho, 6);
    }

    #[test]
    fn test_mismatched_row_rejected() {
        let owner = KeyPair::generate(128, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(43);
        let z = EncryptedOneHot::new(owner.public(), 3, &mut rng).unwrap();
        assert!(blinded_cost_share(owner.public(), z.slots(), &[1, 2], 0, &mut rng).is_err());
    }

    #[test]
    fn test_share_table() {
        let mut t = ShareTable::new();
        t.set(AgentId(1), 5);
        t.set(AgentId(3), -2);
        assert_eq!(t.sum(), 3);
        t.zero(AgentId(1));
        assert_eq!(t.get(AgentId(1)), 0);
        assert_eq!(t.sum(), -2);
    }
}
