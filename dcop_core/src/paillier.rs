//! Paillier additively homomorphic cryptosystem.
//!
//! Standard construction with `g = n + 1`:
//!
//! ```text
//! E(m)        = (1 + m·n) · r^n          mod n²
//! D(c)        = L(c^λ mod n²) · μ        mod n,   L(u) = (u - 1) / n
//! E(a) · E(b) = E(a + b)
//! E(a) ^ k    = E(a · k)
//! ```
//!
//! Plaintexts live in `Z_n`. Signed integers are encoded by reduction mod `n`
//! and decoded centered, so `decrypt_i64(encrypt(-5)) == -5`.

use crate::error::CryptoError;
use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_prime::nt_funcs::is_prime;
use num_traits::{One, ToPrimitive, Zero};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default modulus size in bits.
pub const DEFAULT_KEY_BITS: u64 = 512;

/// Smallest accepted modulus size. Small keys are only for tests.
pub const MIN_KEY_BITS: u64 = 64;

const PRIME_SEARCH_LIMIT: usize = 20_000;
const KEYGEN_ATTEMPTS: usize = 16;

// =============================================================================
// KEYS AND CIPHERTEXTS
// =============================================================================

/// Public part of a key pair. Shared through `PUBLIC_KEY` messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    n: BigUint,
    n_squared: BigUint,
}

/// A ciphertext tagged with the id of the key it was produced under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    value: BigUint,
    key_id: u64,
}

impl Ciphertext {
    /// Id of the public key this ciphertext belongs to.
    pub fn key_id(&self) -> u64 {
        self.key_id
    }

    /// Raw group element.
    pub fn value(&self) -> &BigUint {
        &self.value
    }
}

/// A full key pair. Owned by exactly one agent and never sent.
#[derive(Clone)]
pub struct KeyPair {
    public: PublicKey,
    lambda: BigUint,
    mu: BigUint,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &format_args!("{:#018x}", self.public.key_id()))
            .field("bits", &self.public.bits())
            .finish_non_exhaustive()
    }
}

impl PublicKey {
    /// Low 64 bits of the modulus, used to tag ciphertexts.
    pub fn key_id(&self) -> u64 {
        self.n.to_u64_digits().first().copied().unwrap_or(0)
    }

    /// Size of the modulus in bits.
    pub fn bits(&self) -> u64 {
        self.n.bits()
    }

    /// The modulus `n`.
    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    /// Encrypts a signed 64-bit plaintext.
    pub fn encrypt<R: Rng + ?Sized>(&self, plaintext: i64, rng: &mut R) -> Ciphertext {
        self.encrypt_big(&BigInt::from(plaintext), rng)
    }

    /// Encrypts an arbitrary integer, reduced into `Z_n`.
    pub fn encrypt_big<R: Rng + ?Sized>(&self, plaintext: &BigInt, rng: &mut R) -> Ciphertext {
        let m = self.encode(plaintext);
        let r = self.random_unit(rng);

        // g^m = (n + 1)^m = 1 + m·n (mod n²)
        let gm = (BigUint::one() + m * &self.n) % &self.n_squared;
        let rn = r.modpow(&self.n, &self.n_squared);

        Ciphertext {
            value: gm * rn % &self.n_squared,
            key_id: self.key_id(),
        }
    }

    /// Homomorphic addition: `E(a) ⊕ E(b) = E(a + b)`.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, CryptoError> {
        self.check(a)?;
        self.check(b)?;
        Ok(Ciphertext {
            value: &a.value * &b.value % &self.n_squared,
            key_id: a.key_id,
        })
    }

    /// Homomorphic scalar multiplication: `E(a) ⊗ k = E(a · k)`.
    ///
    /// Negative scalars are reduced mod `n`.
    pub fn mul_scalar(&self, c: &Ciphertext, k: i64) -> Result<Ciphertext, CryptoError> {
        self.check(c)?;
        let exponent = self.encode(&BigInt::from(k));
        Ok(Ciphertext {
            value: c.value.modpow(&exponent, &self.n_squared),
            key_id: c.key_id,
        })
    }

    /// Multiplies by a fresh `E(0)`, unlinking the ciphertext from its origin.
    pub fn rerandomize<R: Rng + ?Sized>(
        &self,
        c: &Ciphertext,
        rng: &mut R,
    ) -> Result<Ciphertext, CryptoError> {
        let zero = self.encrypt(0, rng);
        self.add(c, &zero)
    }

    /// Verifies that `c` belongs to this key and lies in `Z_{n²}`.
    pub fn check(&self, c: &Ciphertext) -> Result<(), CryptoError> {
        let expected = self.key_id();
        if c.key_id != expected {
            return Err(CryptoError::KeyMismatch {
                expected,
                found: c.key_id,
            });
        }
        if c.value >= self.n_squared || c.value.is_zero() {
            return Err(CryptoError::CiphertextOutOfRange(expected));
        }
        Ok(())
    }

    fn encode(&self, plaintext: &BigInt) -> BigUint {
        let n = BigInt::from(self.n.clone());
        // mod_floor of a positive modulus is never negative
        plaintext
            .mod_floor(&n)
            .to_biguint()
            .unwrap_or_else(BigUint::zero)
    }

    fn random_unit<R: Rng + ?Sized>(&self, rng: &mut R) -> BigUint {
        loop {
            let r = rng.gen_biguint_below(&self.n);
            if !r.is_zero() && r.gcd(&self.n).is_one() {
                return r;
            }
        }
    }
}

impl KeyPair {
    /// Generates a key pair with a `bits`-bit modulus.
    ///
    /// # Arguments
    /// * `bits` - Modulus size, even and at least [`MIN_KEY_BITS`]
    /// * `rng` - Randomness source (seeded in simulation)
    ///
    /// # Returns
    /// * `Ok(KeyPair)` - Fresh key pair
    /// * `Err(CryptoError::KeyGeneration)` - Invalid size or prime search exhausted
    pub fn generate<R: Rng + ?Sized>(bits: u64, rng: &mut R) -> Result<Self, CryptoError> {
        if bits < MIN_KEY_BITS || bits % 2 != 0 {
            return Err(CryptoError::KeyGeneration(format!(
                "modulus size must be even and >= {MIN_KEY_BITS}, got {bits}"
            )));
        }

        for _ in 0..KEYGEN_ATTEMPTS {
            let p = random_prime(bits / 2, rng)?;
            let q = random_prime(bits / 2, rng)?;
            if p == q {
                continue;
            }

            let n = &p * &q;
            let p1 = &p - 1u32;
            let q1 = &q - 1u32;
            if !n.gcd(&(&p1 * &q1)).is_one() {
                continue;
            }

            let n_squared = &n * &n;
            let lambda = p1.lcm(&q1);
            let g = &n + 1u32;
            let l = (g.modpow(&lambda, &n_squared) - 1u32) / &n;
            let Some(mu) = mod_inverse(&l, &n) else {
                continue;
            };

            return Ok(Self {
                public: PublicKey { n, n_squared },
                lambda,
                mu,
            });
        }

        Err(CryptoError::KeyGeneration(
            "no usable prime pair found".to_string(),
        ))
    }

    /// Returns the shareable public key.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Decrypts to the canonical representative in `[0, n)`.
    pub fn decrypt(&self, c: &Ciphertext) -> Result<BigUint, CryptoError> {
        self.public.check(c)?;
        let n = &self.public.n;
        let u = c.value.modpow(&self.lambda, &self.public.n_squared);
        let l = (u - 1u32) / n;
        Ok(l * &self.mu % n)
    }

    /// Decrypts and decodes a centered signed value.
    pub fn decrypt_i64(&self, c: &Ciphertext) -> Result<i64, CryptoError> {
        let m = self.decrypt(c)?;
        let n = &self.public.n;
        let half = n >> 1u32;
        let signed = if m > half {
            -BigInt::from(n - &m)
        } else {
            BigInt::from(m)
        };
        signed.to_i64().ok_or(CryptoError::PlaintextOverflow)
    }
}

// =============================================================================
// NUMBER THEORY
// =============================================================================

fn mod_inverse(a: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let a = BigInt::from(a.clone());
    let m = BigInt::from(modulus.clone());
    let egcd = a.extended_gcd(&m);
    if !egcd.gcd.is_one() {
        return None;
    }
    egcd.x.mod_floor(&m).to_biguint()
}

fn random_prime<R: Rng + ?Sized>(bits: u64, rng: &mut R) -> Result<BigUint, CryptoError> {
    for _ in 0..PRIME_SEARCH_LIMIT {
        let mut candidate = rng.gen_biguint(bits);
        // Force full size and oddness
        candidate |= BigUint::one() << (bits - 1);
        candidate |= BigUint::one();
        if is_probable_prime(&candidate) {
            return Ok(candidate);
        }
    }
    Err(CryptoError::KeyGeneration(format!(
        "no {bits}-bit prime after {PRIME_SEARCH_LIMIT} candidates"
    )))
}

/// Baillie-PSW test. Deterministic, so seeded key generation stays reproducible.
fn is_probable_prime(candidate: &BigUint) -> bool {
    is_prime(candidate, None).probably()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_keys(seed: u64) -> KeyPair {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        KeyPair::generate(128, &mut rng).unwrap()
    }

    #[test]
    fn test_primality_small_values() {
        let primes = [2u32, 3, 97, 101, 7919, 104_729];
        let composites = [1u32, 4, 91, 561, 7917, 104_730];
        for p in primes {
            assert!(is_probable_prime(&BigUint::from(p)), "{p}");
        }
        for c in composites {
            assert!(!is_probable_prime(&BigUint::from(c)), "{c}");
        }
    }

    #[test]
    fn test_keygen_rejects_bad_sizes() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        assert!(KeyPair::generate(32, &mut rng).is_err());
        assert!(KeyPair::generate(129, &mut rng).is_err());
    }

    #[test]
    fn test_keygen_is_deterministic_per_seed() {
        let a = test_keys(7);
        let b = test_keys(7);
        assert_eq!(a.public(), b.public());
        assert_ne!(a.public(), test_keys(8).public());
    }

    #[test]
    fn test_negative_plaintexts_round_trip() {
        let keys = test_keys(3);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for m in [-1i64, -5, -1_000_000, i64::MIN + 1] {
            let c = keys.public().encrypt(m, &mut rng);
            assert_eq!(keys.decrypt_i64(&c).unwrap(), m);
        }
    }

    #[test]
    fn test_encryption_is_probabilistic() {
        let keys = test_keys(5);
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let a = keys.public().encrypt(42, &mut rng);
        let b = keys.public().encrypt(42, &mut rng);
        assert_ne!(a, b);

        let c = keys.public().rerandomize(&a, &mut rng).unwrap();
        assert_ne!(a, c);
        assert_eq!(keys.decrypt_i64(&c).unwrap(), 42);
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let alice = test_keys(10);
        let bob = test_keys(11);
        let mut rng = ChaCha8Rng::seed_from_u64(12);

        let c = alice.public().encrypt(9, &mut rng);
        assert!(matches!(
            bob.decrypt(&c),
            Err(CryptoError::KeyMismatch { .. })
        ));
        let d = bob.public().encrypt(1, &mut rng);
        assert!(alice.public().add(&c, &d).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_round_trip(m in any::<i64>().prop_filter("centered range", |m| *m != i64::MIN)) {
            let keys = test_keys(20);
            let mut rng = ChaCha8Rng::seed_from_u64(m as u64);
            let c = keys.public().encrypt(m, &mut rng);
            prop_assert_eq!(keys.decrypt_i64(&c).unwrap(), m);
        }

        #[test]
        fn prop_homomorphic_add(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
            let keys = test_keys(21);
            let mut rng = ChaCha8Rng::seed_from_u64(a.wrapping_mul(31).wrapping_add(b) as u64);
            let pk = keys.public();
            let sum = pk.add(&pk.encrypt(a, &mut rng), &pk.encrypt(b, &mut rng)).unwrap();
            prop_assert_eq!(keys.decrypt_i64(&sum).unwrap(), a + b);
        }

        #[test]
        fn prop_homomorphic_scalar(a in -1_000_000i64..1_000_000, k in -1_000_000i64..1_000_000) {
            let keys = test_keys(22);
            let mut rng = ChaCha8Rng::seed_from_u64(a.wrapping_mul(17).wrapping_add(k) as u64);
            let pk = keys.public();
            let product = pk.mul_scalar(&pk.encrypt(a, &mut rng), k).unwrap();
            prop_assert_eq!(keys.decrypt_i64(&product).unwrap(), a * k);
        }
    }
}
