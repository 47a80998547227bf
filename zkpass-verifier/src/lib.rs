// zkpass/zkpass-verifier/src/lib.rs

//! Groth16 verification of admission proofs over BN256.
//!
//! The check is `e(A, B) = e(alpha, beta) + e(IC(x), gamma) + e(C, delta)` in
//! the additively written target group, where `IC(x) = ic[0] + sum x_i * ic[i+1]`.

use std::{fs, path::Path};

use halo2curves_axiom::bn256::{pairing, Fr, G1Affine, G2Affine, G1};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zkpass_common::{proof::serde_point, Groth16Proof, PUBLIC_INPUT_COUNT};

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("verifying key expects {expected} public inputs, got {actual}")]
    InputCount { expected: usize, actual: usize },
    #[error("verifying key has {0} IC points, expected one per public input plus one")]
    KeyShape(usize),
    #[error("failed to read verifying key: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed verifying key: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey {
    #[serde(with = "serde_point")]
    pub alpha_g1: G1Affine,
    #[serde(with = "serde_point")]
    pub beta_g2: G2Affine,
    #[serde(with = "serde_point")]
    pub gamma_g2: G2Affine,
    #[serde(with = "serde_point")]
    pub delta_g2: G2Affine,
    #[serde(with = "serde_point_vec")]
    pub ic: Vec<G1Affine>,
}

impl VerifyingKey {
    pub fn from_json(json: &str) -> Result<Self, VerifierError> {
        let vk: VerifyingKey = serde_json::from_str(json)?;
        vk.check_shape()?;
        Ok(vk)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, VerifierError> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn to_json(&self) -> Result<String, VerifierError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn num_inputs(&self) -> usize {
        self.ic.len().saturating_sub(1)
    }

    fn check_shape(&self) -> Result<(), VerifierError> {
        if self.ic.len() != PUBLIC_INPUT_COUNT + 1 {
            return Err(VerifierError::KeyShape(self.ic.len()));
        }
        Ok(())
    }

    /// Linear combination of the IC points with the public inputs.
    pub fn prepare_inputs(&self, inputs: &[Fr]) -> Result<G1Affine, VerifierError> {
        if inputs.len() + 1 != self.ic.len() {
            return Err(VerifierError::InputCount {
                expected: self.num_inputs(),
                actual: inputs.len(),
            });
        }
        let acc = inputs
            .iter()
            .zip(self.ic.iter().skip(1))
            .fold(G1::from(self.ic[0]), |acc, (x, point)| acc + point * x);
        Ok(G1Affine::from(acc))
    }
}

/// Seam between the admission state machine and the proof system.
pub trait SnarkVerifier: Send + Sync {
    fn verify(&self, proof: &Groth16Proof, public_inputs: &[Fr]) -> Result<bool, VerifierError>;
}

#[derive(Clone, Debug)]
pub struct Groth16Verifier {
    vk: VerifyingKey,
}

impl Groth16Verifier {
    pub fn new(vk: VerifyingKey) -> Result<Self, VerifierError> {
        vk.check_shape()?;
        Ok(Self { vk })
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.vk
    }
}

impl SnarkVerifier for Groth16Verifier {
    fn verify(&self, proof: &Groth16Proof, public_inputs: &[Fr]) -> Result<bool, VerifierError> {
        let prepared = self.vk.prepare_inputs(public_inputs)?;
        let ok = verify(&self.vk, proof, &prepared);
        debug!(ok, "groth16 pairing check");
        Ok(ok)
    }
}

/// Pairing check against already prepared inputs.
pub fn verify(vk: &VerifyingKey, proof: &Groth16Proof, prepared_inputs: &G1Affine) -> bool {
    let lhs = pairing(&proof.a, &proof.b);
    let rhs = pairing(&vk.alpha_g1, &vk.beta_g2)
        + pairing(prepared_inputs, &vk.gamma_g2)
        + pairing(&proof.c, &vk.delta_g2);
    lhs == rhs
}

mod serde_point_vec {
    use halo2curves_axiom::bn256::G1Affine;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use zkpass_common::proof::serde_point;

    pub fn serialize<S: Serializer>(points: &[G1Affine], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(points.iter().map(serde_point::to_hex))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<G1Affine>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|raw| serde_point::from_hex(raw).map_err(de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo2curves_axiom::{ff::Field, group::prime::PrimeCurveAffine};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    struct Trapdoor {
        alpha: Fr,
        beta: Fr,
        gamma: Fr,
        delta: Fr,
        ic: Vec<Fr>,
    }

    fn g1(s: Fr) -> G1Affine {
        G1Affine::from(G1Affine::generator() * s)
    }

    fn g2(s: Fr) -> G2Affine {
        G2Affine::from(G2Affine::generator() * s)
    }

    fn setup(rng: &mut ChaCha20Rng) -> (Trapdoor, VerifyingKey) {
        let td = Trapdoor {
            alpha: Fr::random(&mut *rng),
            beta: Fr::random(&mut *rng),
            gamma: Fr::random(&mut *rng),
            delta: Fr::random(&mut *rng),
            ic: (0..=PUBLIC_INPUT_COUNT).map(|_| Fr::random(&mut *rng)).collect(),
        };
        let vk = VerifyingKey {
            alpha_g1: g1(td.alpha),
            beta_g2: g2(td.beta),
            gamma_g2: g2(td.gamma),
            delta_g2: g2(td.delta),
            ic: td.ic.iter().map(|s| g1(*s)).collect(),
        };
        (td, vk)
    }

    fn prove(td: &Trapdoor, inputs: &[Fr], rng: &mut ChaCha20Rng) -> Groth16Proof {
        let r = Fr::random(&mut *rng);
        let s = Fr::random(&mut *rng);
        let ic_x = inputs
            .iter()
            .zip(td.ic.iter().skip(1))
            .fold(td.ic[0], |acc, (x, k)| acc + *x * k);
        let c = (r * s - td.alpha * td.beta - ic_x * td.gamma) * td.delta.invert().unwrap();
        Groth16Proof {
            a: g1(r),
            b: g2(s),
            c: g1(c),
        }
    }

    fn inputs() -> Vec<Fr> {
        (1..=PUBLIC_INPUT_COUNT as u64).map(Fr::from).collect()
    }

    #[test]
    fn accepts_valid_proof() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let (td, vk) = setup(&mut rng);
        let verifier = Groth16Verifier::new(vk).unwrap();
        let proof = prove(&td, &inputs(), &mut rng);
        assert!(verifier.verify(&proof, &inputs()).unwrap());
    }

    #[test]
    fn rejects_tampered_input_and_proof() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let (td, vk) = setup(&mut rng);
        let verifier = Groth16Verifier::new(vk).unwrap();
        let proof = prove(&td, &inputs(), &mut rng);

        let mut tampered = inputs();
        tampered[3] += Fr::one();
        assert!(!verifier.verify(&proof, &tampered).unwrap());

        let mut swapped = inputs();
        swapped.swap(0, 1);
        assert!(!verifier.verify(&proof, &swapped).unwrap());

        let mut bad = proof;
        bad.c = g1(Fr::from(5u64));
        assert!(!verifier.verify(&bad, &inputs()).unwrap());
    }

    #[test]
    fn rejects_wrong_input_count() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (td, vk) = setup(&mut rng);
        let verifier = Groth16Verifier::new(vk).unwrap();
        let proof = prove(&td, &inputs(), &mut rng);
        let err = verifier.verify(&proof, &inputs()[..5]).unwrap_err();
        assert!(matches!(
            err,
            VerifierError::InputCount {
                expected: 6,
                actual: 5
            }
        ));
    }

    #[test]
    fn key_json_round_trip_and_shape_check() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let (_, vk) = setup(&mut rng);
        let json = vk.to_json().unwrap();
        assert_eq!(VerifyingKey::from_json(&json).unwrap(), vk);

        let mut short = vk.clone();
        short.ic.pop();
        let json = serde_json::to_string(&short).unwrap();
        assert!(matches!(
            VerifyingKey::from_json(&json),
            Err(VerifierError::KeyShape(6))
        ));
    }
}
