//! An in-memory [`BallotCipher`] standing in for ElGamal over Baby Jubjub
//! (spec §1 Out of scope, §4.6 re-encryption). Real ElGamal ciphertexts are
//! curve-point pairs; this mock represents a ciphertext limb as a hash of the
//! public key and nonce, XOR-combined so homomorphic addition and
//! re-randomization-by-zero are at least associative and commutative the way
//! the real scheme's addition is.

use sha2::{Digest, Sha256};

use sequencer_interface::model::EncryptedBallot;
use sequencer_interface::traits::BallotCipher;
use sequencer_interface::SequencerError;

type Result<T> = std::result::Result<T, SequencerError>;

const CIPHERTEXT_LIMBS: usize = 2;

fn hash_limb(domain: &[u8], public_key: &[u8; 32], nonce: &[u8; 32], limb: u8) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(public_key);
    hasher.update(nonce);
    hasher.update([limb]);
    hasher.finalize().into()
}

fn xor32(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// A hash-based stand-in for ElGamal-over-Baby-Jubjub encryption of zero.
pub struct MockBallotCipher;

impl MockBallotCipher {
    /// Creates the cipher. Stateless: every instance agrees on the same
    /// deterministic derivation.
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockBallotCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl BallotCipher for MockBallotCipher {
    fn encrypt_zero(&self, public_key: &[u8; 32], nonce: &[u8; 32]) -> Result<EncryptedBallot> {
        let ciphertexts = (0..CIPHERTEXT_LIMBS)
            .map(|limb| hash_limb(b"mock-ballot-cipher-enc-zero", public_key, nonce, limb as u8))
            .collect();
        Ok(EncryptedBallot { ciphertexts })
    }

    fn homomorphic_add(&self, a: &EncryptedBallot, b: &EncryptedBallot) -> Result<EncryptedBallot> {
        if a.ciphertexts.len() != b.ciphertexts.len() {
            return Err(SequencerError::StructuralInvalid(
                "ciphertext limb count mismatch".to_string(),
            ));
        }
        let ciphertexts = a
            .ciphertexts
            .iter()
            .zip(&b.ciphertexts)
            .map(|(x, y)| xor32(x, y))
            .collect();
        Ok(EncryptedBallot { ciphertexts })
    }

    fn derive_nonce(&self, nonce: &[u8; 32]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"mock-ballot-cipher-derive-nonce");
        hasher.update(nonce);
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_nonce_is_deterministic_and_chains() {
        let cipher = MockBallotCipher::new();
        let k0 = [1u8; 32];
        let k1 = cipher.derive_nonce(&k0);
        let k1_again = cipher.derive_nonce(&k0);
        let k2 = cipher.derive_nonce(&k1);
        assert_eq!(k1, k1_again);
        assert_ne!(k1, k2);
    }

    #[test]
    fn homomorphic_add_is_commutative() {
        let cipher = MockBallotCipher::new();
        let a = cipher.encrypt_zero(&[1u8; 32], &[2u8; 32]).unwrap();
        let b = cipher.encrypt_zero(&[1u8; 32], &[3u8; 32]).unwrap();
        let ab = cipher.homomorphic_add(&a, &b).unwrap();
        let ba = cipher.homomorphic_add(&b, &a).unwrap();
        assert_eq!(ab, ba);
    }
}
