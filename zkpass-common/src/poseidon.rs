//! Native Poseidon over the BN256 scalar field.
//!
//! Width 6, rate 5, 8 full and 57 partial rounds, constant-length domain. The
//! admission circuit hashes with the same parameters, so every commitment
//! computed here can be recomputed in-circuit.

use halo2curves_axiom::{bn256::Fr, ff::Field};
use poseidon_primitives::poseidon::primitives::{ConstantLength, Hash as PoseidonHash, Spec};

use crate::{POSEIDON_FULL_ROUNDS, POSEIDON_PARTIAL_ROUNDS, POSEIDON_RATE, POSEIDON_T};

pub fn poseidon_hash<const L: usize>(values: &[Fr; L]) -> Fr {
    PoseidonHash::<Fr, ZkPoseidonSpec, ConstantLength<L>, POSEIDON_T, POSEIDON_RATE>::init()
        .hash(*values)
}

pub fn hash1(a: Fr) -> Fr {
    poseidon_hash(&[a])
}

pub fn hash2(a: Fr, b: Fr) -> Fr {
    poseidon_hash(&[a, b])
}

pub fn hash3(a: Fr, b: Fr, c: Fr) -> Fr {
    poseidon_hash(&[a, b, c])
}

#[derive(Debug)]
struct ZkPoseidonSpec;

impl Spec<Fr, POSEIDON_T, POSEIDON_RATE> for ZkPoseidonSpec {
    fn full_rounds() -> usize {
        POSEIDON_FULL_ROUNDS
    }

    fn partial_rounds() -> usize {
        POSEIDON_PARTIAL_ROUNDS
    }

    fn sbox(val: Fr) -> Fr {
        val.pow_vartime([5])
    }

    fn secure_mds() -> usize {
        0
    }
}
