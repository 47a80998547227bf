use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zkpass_common::{
    nullifier, Criteria, CriteriaOp, EventId, PublicInputs, TreeProof, FIELD_COUNT, TREE_DEPTH,
};

use crate::ProverError;

/// Everything the admission circuit needs for one (user, event) pair.
///
/// `secret` and `fields` are private witnesses; the remaining values end up
/// as public inputs. Serialized in the camelCase layout the circuit client
/// reads, with the event identifier under `contractAddr`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitInput {
    pub contract_addr: EventId,
    #[serde(with = "zkpass_common::serde_fr")]
    pub secret: Fr,
    #[serde(with = "zkpass_common::serde_fr")]
    pub merkle_root: Fr,
    #[serde(with = "zkpass_common::serde_fr_vec")]
    pub tree_proof: Vec<Fr>,
    pub tree_index: u64,
    pub field_index: u64,
    pub op: CriteriaOp,
    #[serde(with = "zkpass_common::serde_fr")]
    pub value: Fr,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_fr_vec")]
    pub fields: Option<Vec<Fr>>,
}

impl CircuitInput {
    pub fn new(secret: Fr, event_id: EventId, criteria: &Criteria, path: &TreeProof) -> Self {
        Self {
            contract_addr: event_id,
            secret,
            merkle_root: path.root,
            tree_proof: path.siblings.clone(),
            tree_index: path.index,
            field_index: criteria.field_index,
            op: criteria.op,
            value: criteria.value,
            fields: None,
        }
    }

    /// Attach the plaintext attribute values for circuits that take them
    /// directly instead of decrypting in-circuit.
    pub fn with_fields(mut self, fields: Vec<Fr>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn criteria(&self) -> Criteria {
        Criteria::new(self.field_index, self.op, self.value)
    }

    pub fn tree_path(&self) -> TreeProof {
        TreeProof {
            index: self.tree_index,
            root: self.merkle_root,
            siblings: self.tree_proof.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ProverError> {
        if self.tree_proof.len() != TREE_DEPTH {
            return Err(ProverError::Input(format!(
                "tree proof has {} siblings, expected {TREE_DEPTH}",
                self.tree_proof.len()
            )));
        }
        if self.tree_index >= 1u64 << TREE_DEPTH {
            return Err(ProverError::Input(format!(
                "tree index {} exceeds capacity",
                self.tree_index
            )));
        }
        if self.field_index as usize >= FIELD_COUNT {
            return Err(ProverError::Input(format!(
                "field index {} out of range",
                self.field_index
            )));
        }
        if let Some(fields) = &self.fields {
            if fields.len() != FIELD_COUNT {
                return Err(ProverError::Input(format!(
                    "expected {FIELD_COUNT} plaintext fields, got {}",
                    fields.len()
                )));
            }
        }
        Ok(())
    }

    /// Public inputs a correct proof for this input must expose.
    pub fn expected_public_inputs(&self) -> PublicInputs {
        let event = self.contract_addr.to_fr();
        PublicInputs {
            nullifier: nullifier(&event, &self.secret),
            event_id: event,
            merkle_root: self.merkle_root,
            field_index: Fr::from(self.field_index),
            op: self.op.to_fr(),
            value: self.value,
        }
    }
}

mod opt_fr_vec {
    use halo2curves_axiom::bn256::Fr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &Option<Vec<Fr>>, serializer: S) -> Result<S::Ok, S::Error> {
        match values {
            Some(values) => zkpass_common::serde_fr_vec::serialize(values, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<Fr>>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapped(#[serde(with = "zkpass_common::serde_fr_vec")] Vec<Fr>);

        Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(values)| values))
    }
}
