//! One-hot encrypted domain vector.

use crate::error::CryptoError;
use crate::paillier::{Ciphertext, KeyPair, PublicKey};
use rand::Rng;

/// Encrypted indicator of an agent's current domain position.
///
/// Exactly one slot holds `E(1)`, every other slot `E(0)`. Reassignment
/// swaps the `E(1)` ciphertext with the slot of the new position instead
/// of re-encrypting the vector.
#[derive(Debug, Clone)]
pub struct EncryptedOneHot {
    /// One ciphertext per domain position
    slots: Vec<Ciphertext>,

    /// Position currently holding `E(1)`
    hot: usize,
}

impl EncryptedOneHot {
    /// Encrypts a fresh vector of `len` slots with the hot slot at 0.
    pub fn new<R: Rng + ?Sized>(
        key: &PublicKey,
        len: usize,
        rng: &mut R,
    ) -> Result<Self, CryptoError> {
        if len == 0 {
            return Err(CryptoError::EmptyDomain);
        }
        let slots = (0..len)
            .map(|i| key.encrypt(i64::from(i == 0), rng))
            .collect();
        Ok(Self { slots, hot: 0 })
    }

    /// Moves the encrypted one to `index`.
    ///
    /// Out-of-range indices leave the vector untouched and return false.
    pub fn move_to(&mut self, index: usize) -> bool {
        if index >= self.slots.len() {
            return false;
        }
        self.slots.swap(self.hot, index);
        self.hot = index;
        true
    }

    /// Current hot position (known only to the owner).
    pub fn hot_index(&self) -> usize {
        self.hot
    }

    /// Ciphertexts, in domain order.
    pub fn slots(&self) -> &[Ciphertext] {
        &self.slots
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false: construction rejects empty domains.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Decrypts every slot (owner-side check).
    pub fn decrypt_all(&self, keys: &KeyPair) -> Result<Vec<i64>, CryptoError> {
        self.slots.iter().map(|c| keys.decrypt_i64(c)).collect()
    }
}
