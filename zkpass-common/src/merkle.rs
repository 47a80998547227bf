use std::fmt;

use halo2curves_axiom::bn256::Fr;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{fr_to_hex, poseidon::hash2, TREE_DEPTH};

static ZERO_VALUES: Lazy<[Fr; TREE_DEPTH + 1]> = Lazy::new(|| {
    let mut zeros = [Fr::zero(); TREE_DEPTH + 1];
    for level in 1..=TREE_DEPTH {
        zeros[level] = hash2(zeros[level - 1], zeros[level - 1]);
    }
    zeros
});

/// Root of an empty subtree of height `level`.
///
/// # Panics
/// If `level > TREE_DEPTH`.
pub fn zero_value(level: usize) -> Fr {
    ZERO_VALUES[level]
}

pub fn zero_values() -> &'static [Fr; TREE_DEPTH + 1] {
    &ZERO_VALUES
}

/// Fold `leaf` up through `siblings`, taking the left/right position at each
/// level from the bits of `index` (least significant bit first).
pub fn compute_root(leaf: &Fr, index: u64, siblings: &[Fr]) -> Fr {
    siblings
        .iter()
        .enumerate()
        .fold(*leaf, |node, (level, sibling)| {
            if (index >> level) & 1 == 0 {
                hash2(node, *sibling)
            } else {
                hash2(*sibling, node)
            }
        })
}

/// Inclusion path of one leaf against the root it was issued for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeProof {
    pub index: u64,
    #[serde(with = "crate::serde_fr")]
    pub root: Fr,
    #[serde(with = "crate::serde_fr_vec")]
    pub siblings: Vec<Fr>,
}

impl TreeProof {
    pub fn verify(&self, leaf: &Fr) -> bool {
        self.siblings.len() == TREE_DEPTH && compute_root(leaf, self.index, &self.siblings) == self.root
    }
}

impl fmt::Display for TreeProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "index: {}", self.index)?;
        writeln!(f, "root:  {}", fr_to_hex(&self.root))?;
        for (level, sibling) in self.siblings.iter().enumerate() {
            writeln!(f, "  [{level:2}] {}", fr_to_hex(sibling))?;
        }
        Ok(())
    }
}
