//! Proof checking and nullifier consumption for a single event.

use halo2curves_axiom::bn256::Fr;
use serde::Serialize;
use tracing::{info, warn};
use zkpass_common::{fr_to_hex, AdmissionProof, EventId};

use crate::{
    events::Event,
    nullifier::{NullifierKey, NullifierLedger},
    tree::MerkleTree,
    RegistryError,
};
use zkpass_verifier::SnarkVerifier;

/// Proof of a granted admission. Issued exactly once per (event, nullifier).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AdmissionReceipt {
    pub event_id: EventId,
    #[serde(with = "zkpass_common::serde_fr")]
    pub nullifier: Fr,
    /// Admission sequence number within the event.
    pub token_id: u64,
    #[serde(with = "zkpass_common::serde_fr")]
    pub root: Fr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdmissionStatus {
    NotAdmitted,
    Admitted { token_id: u64 },
}

pub(crate) struct Admission<'a> {
    pub event: &'a Event,
    pub verifier: &'a dyn SnarkVerifier,
    pub nullifiers: &'a NullifierLedger,
}

impl Admission<'_> {
    /// Check `proof` against the event and the tree, then consume its
    /// nullifier. The caller holds `tree` read-locked for the whole call.
    pub fn run(
        &self,
        proof: &AdmissionProof,
        tree: &MerkleTree,
    ) -> Result<AdmissionReceipt, RegistryError> {
        let result = self.check(proof, tree);
        match &result {
            Ok(receipt) => info!(
                event = %receipt.event_id,
                token_id = receipt.token_id,
                nullifier = %fr_to_hex(&receipt.nullifier),
                "admission granted"
            ),
            Err(err) => warn!(event = %self.event.id, code = err.error_code(), "admission rejected: {err}"),
        }
        result
    }

    fn check(&self, proof: &AdmissionProof, tree: &MerkleTree) -> Result<AdmissionReceipt, RegistryError> {
        let event = self.event;
        let inputs = proof
            .inputs()
            .map_err(|err| RegistryError::MalformedProof(err.to_string()))?;

        if inputs.event_id != event.id.to_fr() {
            return Err(RegistryError::WrongEvent(event.id));
        }
        if [inputs.field_index, inputs.op, inputs.value] != event.criteria.public_fields() {
            return Err(RegistryError::CriteriaMismatch(event.id));
        }
        if !tree.is_known_root(&inputs.merkle_root) {
            return Err(RegistryError::RootMismatch(fr_to_hex(&inputs.merkle_root)));
        }
        if !self.verifier.verify(&proof.proof, &proof.public_inputs)? {
            return Err(RegistryError::InvalidProof);
        }

        let token_id = self
            .nullifiers
            .record(&NullifierKey::new(event.id, &inputs.nullifier))?;
        Ok(AdmissionReceipt {
            event_id: event.id,
            nullifier: inputs.nullifier,
            token_id,
            root: inputs.merkle_root,
        })
    }
}
