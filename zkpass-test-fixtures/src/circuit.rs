//! Stand-in for the admission circuit.
//!
//! Holds the Groth16 trapdoor of its own verifying key, so it can produce
//! proofs that pass the real pairing check for any public inputs. Before
//! proving it enforces what the real circuit enforces natively: the leaf is
//! in the tree under the claimed root and the plaintext attribute satisfies
//! the criteria.

use std::sync::Mutex;

use halo2curves_axiom::{
    bn256::{Fr, G1Affine, G2Affine},
    ff::Field,
    group::prime::PrimeCurveAffine,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use zkpass_common::{
    encrypt_fields, leaf_hash, secret_hash, AdmissionProof, Groth16Proof, PublicInputs,
    PUBLIC_INPUT_COUNT,
};
use zkpass_prover::{CircuitClient, CircuitInput, ProverError};
use zkpass_verifier::VerifyingKey;

struct Trapdoor {
    alpha: Fr,
    beta: Fr,
    gamma: Fr,
    delta_inv: Fr,
    ic: Vec<Fr>,
}

pub struct SimulatedCircuit {
    trapdoor: Trapdoor,
    vk: VerifyingKey,
    rng: Mutex<ChaCha20Rng>,
}

fn g1(s: Fr) -> G1Affine {
    G1Affine::from(G1Affine::generator() * s)
}

fn g2(s: Fr) -> G2Affine {
    G2Affine::from(G2Affine::generator() * s)
}

fn nonzero(rng: &mut ChaCha20Rng) -> Fr {
    loop {
        let s = Fr::random(&mut *rng);
        if !bool::from(s.is_zero()) {
            return s;
        }
    }
}

impl SimulatedCircuit {
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let alpha = nonzero(&mut rng);
        let beta = nonzero(&mut rng);
        let gamma = nonzero(&mut rng);
        let delta = nonzero(&mut rng);
        let ic: Vec<Fr> = (0..=PUBLIC_INPUT_COUNT).map(|_| nonzero(&mut rng)).collect();
        let vk = VerifyingKey {
            alpha_g1: g1(alpha),
            beta_g2: g2(beta),
            gamma_g2: g2(gamma),
            delta_g2: g2(delta),
            ic: ic.iter().map(|s| g1(*s)).collect(),
        };
        let delta_inv = Option::<Fr>::from(delta.invert()).unwrap_or(Fr::one());
        Self {
            trapdoor: Trapdoor {
                alpha,
                beta,
                gamma,
                delta_inv,
                ic,
            },
            vk,
            rng: Mutex::new(rng),
        }
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.vk
    }

    /// Produce a proof that verifies for exactly `inputs`, with no statement
    /// checks. Tests use it to submit well-formed proofs for bad statements.
    pub fn prove_unchecked(&self, inputs: &[Fr]) -> Groth16Proof {
        let (r, s) = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            (nonzero(&mut rng), nonzero(&mut rng))
        };
        let td = &self.trapdoor;
        let ic_x = inputs
            .iter()
            .zip(td.ic.iter().skip(1))
            .fold(td.ic[0], |acc, (x, k)| acc + *x * k);
        let c = (r * s - td.alpha * td.beta - ic_x * td.gamma) * td.delta_inv;
        Groth16Proof {
            a: g1(r),
            b: g2(s),
            c: g1(c),
        }
    }

    pub fn admission_proof(&self, inputs: &PublicInputs) -> AdmissionProof {
        AdmissionProof::new(self.prove_unchecked(&inputs.to_vec()), inputs)
    }
}

impl CircuitClient for SimulatedCircuit {
    fn prove(&self, input: &CircuitInput) -> Result<AdmissionProof, ProverError> {
        input.validate()?;
        let fields = input
            .fields
            .as_ref()
            .ok_or_else(|| ProverError::Input("plaintext fields are required".into()))?;

        let leaf = leaf_hash(&secret_hash(&input.secret), &encrypt_fields(&input.secret, fields));
        if !input.tree_path().verify(&leaf) {
            return Err(ProverError::Circuit(
                "record is not included under the given root".into(),
            ));
        }
        if !input.criteria().is_satisfied_by(fields) {
            return Err(ProverError::Circuit("criteria not satisfied".into()));
        }
        Ok(self.admission_proof(&input.expected_public_inputs()))
    }
}
