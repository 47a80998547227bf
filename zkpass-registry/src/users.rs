use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zkpass_common::{fr_to_bytes, fr_to_hex};

const USER_PREFIX: &[u8] = b"user/";
const LEAF_PREFIX: &[u8] = b"leaf/";

/// A registered identity as the registry stores it. The secret never
/// reaches the registry; only its hash does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(with = "zkpass_common::serde_fr")]
    pub secret_hash: Fr,
    #[serde(with = "zkpass_common::serde_fr_vec")]
    pub encrypted_fields: Vec<Fr>,
    #[serde(with = "zkpass_common::serde_fr")]
    pub leaf: Fr,
    pub tree_index: u64,
    pub exists: bool,
}

impl UserRecord {
    /// Placeholder returned for lookups of unknown users.
    pub fn absent(secret_hash: Fr) -> Self {
        Self {
            secret_hash,
            encrypted_fields: Vec::new(),
            leaf: Fr::zero(),
            tree_index: 0,
            exists: false,
        }
    }
}

/// Result of a successful registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registration {
    pub tree_index: u64,
    pub leaf: Fr,
    pub root: Fr,
}

impl std::fmt::Display for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "index {} leaf {} root {}",
            self.tree_index,
            fr_to_hex(&self.leaf),
            fr_to_hex(&self.root)
        )
    }
}

pub(crate) fn user_key(secret_hash: &Fr) -> Vec<u8> {
    let mut key = USER_PREFIX.to_vec();
    key.extend_from_slice(&fr_to_bytes(secret_hash));
    key
}

pub(crate) fn leaf_key(leaf: &Fr) -> Vec<u8> {
    let mut key = LEAF_PREFIX.to_vec();
    key.extend_from_slice(&fr_to_bytes(leaf));
    key
}
