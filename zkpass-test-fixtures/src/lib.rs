//! Shared fixtures for registry, prover and CLI tests.

mod circuit;
mod users;

use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use zkpass_verifier::{Groth16Verifier, SnarkVerifier, VerifyingKey};

pub use circuit::SimulatedCircuit;
pub use users::{test_user, user_with_age, TestUser};

const CIRCUIT_SEED: u64 = 1_700_000_000;
const USER_COUNT: u64 = 5;

static FIXTURES: OnceCell<TestFixtures> = OnceCell::new();

/// One simulated circuit and its verifier, plus a handful of users, reused
/// across tests.
pub struct TestFixtures {
    circuit: Arc<SimulatedCircuit>,
    verifier: Arc<Groth16Verifier>,
    vk_json: String,
    users: Vec<TestUser>,
}

impl TestFixtures {
    pub fn circuit(&self) -> Arc<SimulatedCircuit> {
        Arc::clone(&self.circuit)
    }

    pub fn verifier(&self) -> Arc<dyn SnarkVerifier> {
        self.verifier.clone()
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.circuit.verifying_key()
    }

    pub fn vk_json(&self) -> &str {
        &self.vk_json
    }

    pub fn users(&self) -> &[TestUser] {
        &self.users
    }
}

pub fn fixtures() -> &'static TestFixtures {
    FIXTURES.get_or_init(|| build_fixtures().expect("failed to build zkpass test fixtures"))
}

fn build_fixtures() -> Result<TestFixtures> {
    let circuit = SimulatedCircuit::new(CIRCUIT_SEED);
    let verifier = Groth16Verifier::new(circuit.verifying_key().clone())
        .context("simulated verifying key has the wrong shape")?;
    let vk_json = circuit
        .verifying_key()
        .to_json()
        .context("encode verifying key json")?;
    Ok(TestFixtures {
        circuit: Arc::new(circuit),
        verifier: Arc::new(verifier),
        vk_json,
        users: (0..USER_COUNT).map(test_user).collect(),
    })
}
