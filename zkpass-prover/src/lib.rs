// zkpass/zkpass-prover/src/lib.rs

//! Boundary to the admission circuit.
//!
//! The circuit itself lives outside this workspace. This crate builds its
//! input, calls it through [`CircuitClient`] and bounds the call with a
//! timeout so a stuck prover surfaces as an error instead of a hang.

mod client;
mod input;
mod process;

use std::time::Duration;

use thiserror::Error;

pub use client::{CircuitClient, TimeoutCircuitClient};
pub use input::CircuitInput;
pub use process::ProcessCircuitClient;

pub const DEFAULT_PROVER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("circuit client timed out after {0:?}")]
    Timeout(Duration),
    #[error("circuit failed: {0}")]
    Circuit(String),
    #[error("circuit client went away without answering")]
    Disconnected,
    #[error("invalid circuit input: {0}")]
    Input(String),
}

impl ProverError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ProverError::Timeout(_) => "PROVER_TIMEOUT",
            ProverError::Circuit(_) => "CIRCUIT_FAILED",
            ProverError::Disconnected => "PROVER_DISCONNECTED",
            ProverError::Input(_) => "CIRCUIT_INPUT_INVALID",
        }
    }
}
