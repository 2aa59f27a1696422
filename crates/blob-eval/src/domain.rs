//! The bit-reversed root-of-unity domain and its two fixed constants
//! (spec §4.8, §6 "Blob domain constants (bit-exact)").

use ark_bls12_381::Fr;
use ark_ff::{Field, One, PrimeField};
use ark_std::Zero;

/// Number of cells in a blob.
pub const N: usize = 4096;

/// `log2(N)`.
pub const LOG_N: u32 = 12;

/// The generator of `Fr*` used to derive the domain (spec §4.8).
const PRIMITIVE_ROOT_GENERATOR: u64 = 5;

/// The precomputed evaluation domain: `ω[0..N)`, bit-reversal permuted, plus
/// `n_inv = N^{-1} mod r`. Built once at startup and treated as immutable
/// (spec §9 "Global mutable state").
pub struct Domain {
    /// `ω[i]` for `i` in bit-reversed order.
    pub roots: Vec<Fr>,
    /// `N^{-1} mod r`.
    pub n_inv: Fr,
}

/// Reverses the low `LOG_N` bits of `i`.
pub fn bit_reverse(i: usize) -> usize {
    let mut x = i as u32;
    x = x.reverse_bits();
    (x >> (32 - LOG_N)) as usize
}

impl Domain {
    /// Builds the domain: `ω = g^((r-1)/N) mod r`, then `ω[bit_reverse(i)] = ω^i`.
    pub fn new() -> Self {
        let g = Fr::from(PRIMITIVE_ROOT_GENERATOR);
        // (r - 1) / N as an exponent; Fr's modulus minus one is divisible by N
        // for N a power of two up to 2^32 on BLS12-381's scalar field.
        let exponent = {
            let r_minus_one = Fr::zero() - Fr::one();
            let mut bigint = r_minus_one.into_bigint();
            bigint.divn(LOG_N);
            bigint
        };
        let omega = g.pow(exponent);

        let mut natural_order = Vec::with_capacity(N);
        let mut acc = Fr::one();
        for _ in 0..N {
            natural_order.push(acc);
            acc *= omega;
        }

        let mut roots = vec![Fr::zero(); N];
        for (i, root) in natural_order.into_iter().enumerate() {
            roots[bit_reverse(i)] = root;
        }

        let n_inv = Fr::from(N as u64).inverse().expect("N is invertible mod r");

        Self { roots, n_inv }
    }

    /// Returns the domain index of `z` if it coincides with a root, i.e. the
    /// "edge rule" collision case (spec §4.8).
    pub fn index_of(&self, z: Fr) -> Option<usize> {
        self.roots.iter().position(|root| *root == z)
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_reverse_is_involution() {
        for i in 0..N {
            assert_eq!(bit_reverse(bit_reverse(i)), i);
        }
    }

    #[test]
    fn domain_roots_are_distinct_nth_roots_of_unity() {
        let domain = Domain::new();
        let mut seen = std::collections::HashSet::new();
        for root in &domain.roots {
            let power = root.pow([N as u64]);
            assert_eq!(power, Fr::one(), "root is not an N-th root of unity");
            assert!(seen.insert(root.to_string()), "domain roots must be distinct");
        }
        assert_eq!(seen.len(), N);
    }

    #[test]
    fn n_inv_is_the_true_inverse_of_n() {
        let domain = Domain::new();
        assert_eq!(domain.n_inv * Fr::from(N as u64), Fr::one());
    }
}
