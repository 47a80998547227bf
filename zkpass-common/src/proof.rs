//! Wire types for admission proofs.
//!
//! A proof carries the three Groth16 elements and exactly six public inputs in
//! circuit order: `[nullifier, eventIdentifier, merkleRoot, fieldIndex, op,
//! value]`.

use halo2curves_axiom::bn256::{Fr, G1Affine, G2Affine};
use serde::{Deserialize, Serialize};

use crate::{CommonError, PUBLIC_INPUT_COUNT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicInputs {
    pub nullifier: Fr,
    pub event_id: Fr,
    pub merkle_root: Fr,
    pub field_index: Fr,
    pub op: Fr,
    pub value: Fr,
}

impl PublicInputs {
    pub fn to_vec(&self) -> Vec<Fr> {
        vec![
            self.nullifier,
            self.event_id,
            self.merkle_root,
            self.field_index,
            self.op,
            self.value,
        ]
    }

    pub fn from_slice(values: &[Fr]) -> Result<Self, CommonError> {
        match values {
            [nullifier, event_id, merkle_root, field_index, op, value] => Ok(Self {
                nullifier: *nullifier,
                event_id: *event_id,
                merkle_root: *merkle_root,
                field_index: *field_index,
                op: *op,
                value: *value,
            }),
            _ => Err(CommonError::PublicInputCount {
                expected: PUBLIC_INPUT_COUNT,
                actual: values.len(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    #[serde(with = "serde_point")]
    pub a: G1Affine,
    #[serde(with = "serde_point")]
    pub b: G2Affine,
    #[serde(with = "serde_point")]
    pub c: G1Affine,
}

/// Proof as returned by the circuit client and submitted for admission.
///
/// Public inputs are kept as a raw list so a submission with a missing or
/// extra input is representable and can be rejected explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionProof {
    pub proof: Groth16Proof,
    #[serde(rename = "publicInputs", with = "crate::serde_fr_vec")]
    pub public_inputs: Vec<Fr>,
}

impl AdmissionProof {
    pub fn new(proof: Groth16Proof, inputs: &PublicInputs) -> Self {
        Self {
            proof,
            public_inputs: inputs.to_vec(),
        }
    }

    pub fn inputs(&self) -> Result<PublicInputs, CommonError> {
        PublicInputs::from_slice(&self.public_inputs)
    }
}

/// Serde module for curve points as hex of their compressed encoding.
pub mod serde_point {
    use halo2curves_axiom::group::GroupEncoding;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::CommonError;

    pub fn to_hex<P: GroupEncoding>(point: &P) -> String {
        format!("0x{}", hex::encode(point.to_bytes().as_ref()))
    }

    pub fn from_hex<P: GroupEncoding>(value: &str) -> Result<P, CommonError> {
        let hex_str = value.strip_prefix("0x").unwrap_or(value);
        let bytes = hex::decode(hex_str).map_err(|err| CommonError::Hex(err.to_string()))?;
        let mut repr = P::Repr::default();
        if repr.as_ref().len() != bytes.len() {
            return Err(CommonError::InvalidPoint("compressed length"));
        }
        repr.as_mut().copy_from_slice(&bytes);
        Option::from(P::from_bytes(&repr)).ok_or(CommonError::InvalidPoint("curve point"))
    }

    pub fn serialize<P, S>(point: &P, serializer: S) -> Result<S::Ok, S::Error>
    where
        P: GroupEncoding,
        S: Serializer,
    {
        serializer.serialize_str(&to_hex(point))
    }

    pub fn deserialize<'de, P, D>(deserializer: D) -> Result<P, D::Error>
    where
        P: GroupEncoding,
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        from_hex(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo2curves_axiom::group::prime::PrimeCurveAffine;

    fn sample_inputs() -> PublicInputs {
        PublicInputs {
            nullifier: Fr::from(1u64),
            event_id: Fr::from(2u64),
            merkle_root: Fr::from(3u64),
            field_index: Fr::from(0u64),
            op: Fr::from(1u64),
            value: Fr::from(18u64),
        }
    }

    #[test]
    fn public_inputs_keep_circuit_order() {
        let inputs = sample_inputs();
        let raw = inputs.to_vec();
        assert_eq!(raw[0], inputs.nullifier);
        assert_eq!(raw[2], inputs.merkle_root);
        assert_eq!(raw[5], inputs.value);
        assert_eq!(PublicInputs::from_slice(&raw).unwrap(), inputs);
    }

    #[test]
    fn wrong_input_count_is_rejected() {
        let raw = sample_inputs().to_vec();
        assert_eq!(
            PublicInputs::from_slice(&raw[..5]),
            Err(CommonError::PublicInputCount {
                expected: 6,
                actual: 5
            })
        );
        let mut extra = raw.clone();
        extra.push(Fr::zero());
        assert!(PublicInputs::from_slice(&extra).is_err());
    }

    #[test]
    fn proof_json_shape() {
        let proof = AdmissionProof::new(
            Groth16Proof {
                a: G1Affine::generator(),
                b: G2Affine::generator(),
                c: G1Affine::generator(),
            },
            &sample_inputs(),
        );
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["publicInputs"].as_array().unwrap().len(), 6);
        assert!(json["proof"]["b"].as_str().unwrap().starts_with("0x"));
        let back: AdmissionProof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }

    #[test]
    fn garbage_point_is_rejected() {
        assert!(serde_point::from_hex::<G1Affine>("0x00").is_err());
        assert!(serde_point::from_hex::<G1Affine>("zz").is_err());
    }
}
