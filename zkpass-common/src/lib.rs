//! Shared primitives for the zkpass registry and admission protocol.
//!
//! Everything in this crate is pure and must agree bit-for-bit with the
//! admission circuit: the Poseidon parameterisation, the attribute cipher,
//! leaf folding, nullifier derivation, Merkle path recomputation and the
//! ordering of the six public inputs.

pub mod attributes;
pub mod cipher;
pub mod commitment;
pub mod criteria;
pub mod identity;
pub mod merkle;
pub mod poseidon;
pub mod proof;

use std::cmp::Ordering;

use halo2curves_axiom::{bn256::Fr, ff::PrimeField};
use thiserror::Error;

pub use attributes::{decode_str, encode_str};
pub use cipher::{decrypt_fields, derive_field_key, encrypt_fields};
pub use commitment::{leaf_hash, nullifier, secret_hash};
pub use criteria::{Criteria, CriteriaOp};
pub use identity::{EventId, Organizer};
pub use merkle::{compute_root, zero_value, TreeProof};
pub use proof::{AdmissionProof, Groth16Proof, PublicInputs};

/// Number of encrypted attribute fields carried by every user record.
///
/// Fixed for the lifetime of a deployment; the leaf folding and the circuit
/// both depend on it.
pub const FIELD_COUNT: usize = 4;

/// Depth of the registry Merkle tree. Capacity is `2^TREE_DEPTH` leaves.
pub const TREE_DEPTH: usize = 10;

/// Number of public inputs exposed by the admission circuit.
pub const PUBLIC_INPUT_COUNT: usize = 6;

pub const POSEIDON_T: usize = 6;
pub const POSEIDON_RATE: usize = 5;
pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommonError {
    #[error("invalid bn256 scalar encoding")]
    InvalidScalar,
    #[error("field element does not fit in {0} bits")]
    Overflow(u32),
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("attribute string is {0} bytes, at most 31 fit in a field element")]
    AttributeTooLong(usize),
    #[error("attribute bytes are not valid utf-8")]
    AttributeNotUtf8,
    #[error("unknown criteria op code {0}")]
    UnknownOp(u64),
    #[error("expected {expected} public inputs, got {actual}")]
    PublicInputCount { expected: usize, actual: usize },
    #[error("invalid curve point encoding for {0}")]
    InvalidPoint(&'static str),
}

pub fn fr_from_bytes(bytes: &[u8; 32]) -> Result<Fr, CommonError> {
    Option::from(Fr::from_repr(*bytes)).ok_or(CommonError::InvalidScalar)
}

pub fn fr_to_bytes(fr: &Fr) -> [u8; 32] {
    let repr = fr.to_repr();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(repr.as_ref());
    bytes
}

/// Interpret `bytes` as a big-endian integer and reduce it into the field.
pub fn reduce_be_bytes_to_fr(bytes: &[u8]) -> Fr {
    let mut acc = Fr::zero();
    let base = Fr::from(256u64);
    for byte in bytes.iter() {
        acc = acc * base + Fr::from(*byte as u64);
    }
    acc
}

/// Big-endian canonical bytes of a field element.
pub fn fr_to_be_bytes(fr: &Fr) -> [u8; 32] {
    let mut bytes = fr_to_bytes(fr);
    bytes.reverse();
    bytes
}

pub fn fr_to_u64(fr: &Fr) -> Result<u64, CommonError> {
    let bytes = fr_to_bytes(fr);
    if bytes[8..].iter().any(|&b| b != 0) {
        return Err(CommonError::Overflow(64));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    Ok(u64::from_le_bytes(buf))
}

/// Order two field elements by their canonical integer value.
pub fn fr_cmp(a: &Fr, b: &Fr) -> Ordering {
    fr_to_be_bytes(a).cmp(&fr_to_be_bytes(b))
}

pub fn fr_to_hex(fr: &Fr) -> String {
    format!("0x{}", hex::encode(fr_to_bytes(fr)))
}

pub fn fr_from_hex(value: &str) -> Result<Fr, CommonError> {
    let hex_str = value.strip_prefix("0x").unwrap_or(value);
    if hex_str.len() != 64 {
        return Err(CommonError::Hex(format!(
            "expected 64 hex chars, got {}",
            hex_str.len()
        )));
    }
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(hex_str, &mut bytes).map_err(|err| CommonError::Hex(err.to_string()))?;
    fr_from_bytes(&bytes)
}

/// Parse either a `0x`-prefixed 32-byte little-endian repr or a plain decimal
/// integer that fits in a `u64`.
pub fn parse_fr(value: &str) -> Result<Fr, CommonError> {
    if value.starts_with("0x") {
        return fr_from_hex(value);
    }
    value
        .parse::<u64>()
        .map(Fr::from)
        .map_err(|err| CommonError::Hex(format!("{value}: {err}")))
}

/// Serde module for Fr as 32-byte hex (little-endian, matching halo2's to_repr).
pub mod serde_fr {
    use halo2curves_axiom::bn256::Fr;
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(fr: &Fr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::fr_to_hex(fr))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fr, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FrVisitor;

        impl de::Visitor<'_> for FrVisitor {
            type Value = Fr;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 32-byte hex string (with or without 0x prefix)")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                super::fr_from_hex(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(FrVisitor)
    }
}

/// Serde module for sequences of Fr, each encoded like [`serde_fr`].
pub mod serde_fr_vec {
    use halo2curves_axiom::bn256::Fr;
    use serde::{de, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(values: &[Fr], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&super::fr_to_hex(value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Fr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|value| super::fr_from_hex(value).map_err(de::Error::custom))
            .collect()
    }
}
