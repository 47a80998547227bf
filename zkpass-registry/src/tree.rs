//! Append-only incremental Merkle tree over registry leaves.
//!
//! Nodes live in flat per-level arrays: `levels[0]` holds the leaves and
//! `levels[l]` holds `ceil(size / 2^l)` nodes. Missing right siblings are the
//! public zero value of their level, so the tree never materialises empty
//! subtrees. Every append touches exactly one node per level.

use std::collections::VecDeque;

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zkpass_common::{
    fr_from_bytes, fr_to_bytes, fr_to_hex, poseidon::hash2, zero_value, TreeProof, TREE_DEPTH,
};

use crate::{
    store::{KvStore, WriteBatch},
    RegistryError,
};

const NODE_PREFIX: &[u8] = b"node/";
const SIZE_KEY: &[u8] = b"meta/size";
const ROOTS_KEY: &[u8] = b"meta/roots";

pub const CAPACITY: u64 = 1 << TREE_DEPTH;

/// Ring of the most recent roots, newest last.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootHistory {
    roots: VecDeque<Fr>,
    capacity: usize,
}

impl RootHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            roots: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, root: Fr) {
        if self.roots.len() == self.capacity {
            self.roots.pop_front();
        }
        self.roots.push_back(root);
    }

    /// The zero element is never accepted, even if it were ever pushed.
    pub fn contains(&self, root: &Fr) -> bool {
        if *root == Fr::zero() {
            return false;
        }
        self.roots.iter().any(|known| known == root)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Fr> {
        self.roots.iter()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedRoots(#[serde(with = "zkpass_common::serde_fr_vec")] Vec<Fr>);

/// Result of computing an append without applying it.
#[derive(Debug)]
pub struct StagedInsert {
    pub index: u64,
    pub root: Fr,
    updates: Vec<(usize, u64, Fr)>,
    history: RootHistory,
}

impl StagedInsert {
    /// Add the node, size and root-history writes for this append to `batch`.
    pub fn write_to(&self, batch: &mut WriteBatch) -> Result<(), RegistryError> {
        for (level, index, node) in &self.updates {
            batch.put(node_key(*level, *index), fr_to_bytes(node).to_vec());
        }
        batch.put(SIZE_KEY, (self.index + 1).to_be_bytes().to_vec());
        let roots = PersistedRoots(self.history.roots().copied().collect());
        batch.put(ROOTS_KEY, serde_json::to_vec(&roots)?);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<Fr>>,
    history: RootHistory,
}

impl MerkleTree {
    pub fn new(root_history_size: usize) -> Self {
        let mut history = RootHistory::new(root_history_size);
        history.push(zero_value(TREE_DEPTH));
        Self {
            levels: vec![Vec::new(); TREE_DEPTH + 1],
            history,
        }
    }

    /// Rebuild the tree from persisted nodes.
    pub fn load(store: &KvStore, root_history_size: usize) -> Result<Self, RegistryError> {
        let size = match store.get(SIZE_KEY)? {
            Some(raw) => decode_u64(&raw)?,
            None => return Ok(Self::new(root_history_size)),
        };

        let mut levels: Vec<Vec<Fr>> = (0..=TREE_DEPTH)
            .map(|level| Vec::with_capacity(level_len(size, level) as usize))
            .collect();
        for (key, value) in store.scan_prefix(NODE_PREFIX)? {
            let (level, index) = parse_node_key(&key)?;
            let nodes = &mut levels[level];
            if index != nodes.len() as u64 {
                return Err(RegistryError::Store(format!(
                    "gap in persisted level {level} at index {index}"
                )));
            }
            nodes.push(decode_fr(&value)?);
        }
        for (level, nodes) in levels.iter().enumerate() {
            if nodes.len() as u64 != level_len(size, level) {
                return Err(RegistryError::Store(format!(
                    "level {level} has {} nodes, expected {}",
                    nodes.len(),
                    level_len(size, level)
                )));
            }
        }

        let mut tree = Self {
            levels,
            history: RootHistory::new(root_history_size),
        };
        match store.get(ROOTS_KEY)? {
            Some(raw) => {
                let PersistedRoots(roots) = serde_json::from_slice(&raw)?;
                for root in roots {
                    tree.history.push(root);
                }
            }
            None => tree.history.push(tree.root()),
        }
        debug!(size, root = %fr_to_hex(&tree.root()), "loaded merkle tree");
        Ok(tree)
    }

    pub fn size(&self) -> u64 {
        self.levels[0].len() as u64
    }

    pub fn root(&self) -> Fr {
        self.levels[TREE_DEPTH]
            .first()
            .copied()
            .unwrap_or_else(|| zero_value(TREE_DEPTH))
    }

    pub fn leaf(&self, index: u64) -> Option<Fr> {
        self.levels[0].get(index as usize).copied()
    }

    pub fn is_known_root(&self, root: &Fr) -> bool {
        self.history.contains(root)
    }

    pub fn history(&self) -> &RootHistory {
        &self.history
    }

    /// Compute the nodes an append of `leaf` would write.
    pub fn stage_insert(&self, leaf: Fr) -> Result<StagedInsert, RegistryError> {
        let index = self.size();
        if index >= CAPACITY {
            return Err(RegistryError::CapacityExceeded(CAPACITY));
        }

        let mut updates = Vec::with_capacity(TREE_DEPTH + 1);
        let mut node = leaf;
        let mut idx = index;
        for level in 0..TREE_DEPTH {
            updates.push((level, idx, node));
            // The appended node is always the rightmost one of its level.
            node = if idx & 1 == 0 {
                hash2(node, zero_value(level))
            } else {
                hash2(self.levels[level][(idx - 1) as usize], node)
            };
            idx >>= 1;
        }
        updates.push((TREE_DEPTH, 0, node));

        let mut history = self.history.clone();
        history.push(node);
        Ok(StagedInsert {
            index,
            root: node,
            updates,
            history,
        })
    }

    pub fn commit(&mut self, staged: StagedInsert) {
        for (level, index, node) in staged.updates {
            let nodes = &mut self.levels[level];
            let index = index as usize;
            if index < nodes.len() {
                nodes[index] = node;
            } else {
                nodes.push(node);
            }
        }
        self.history = staged.history;
        debug!(index = staged.index, root = %fr_to_hex(&staged.root), "appended leaf");
    }

    /// Inclusion path for `index` against the current root.
    pub fn proof(&self, index: u64) -> Result<TreeProof, RegistryError> {
        let size = self.size();
        if index >= size {
            return Err(RegistryError::IndexOutOfRange { index, size });
        }
        let siblings = (0..TREE_DEPTH)
            .map(|level| {
                let sibling = ((index >> level) ^ 1) as usize;
                self.levels[level]
                    .get(sibling)
                    .copied()
                    .unwrap_or_else(|| zero_value(level))
            })
            .collect();
        Ok(TreeProof {
            index,
            root: self.root(),
            siblings,
        })
    }
}

fn level_len(size: u64, level: usize) -> u64 {
    if size == 0 {
        0
    } else {
        ((size - 1) >> level) + 1
    }
}

fn node_key(level: usize, index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(NODE_PREFIX.len() + 9);
    key.extend_from_slice(NODE_PREFIX);
    key.push(level as u8);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

fn parse_node_key(key: &[u8]) -> Result<(usize, u64), RegistryError> {
    let rest = &key[NODE_PREFIX.len()..];
    if rest.len() != 9 || rest[0] as usize > TREE_DEPTH {
        return Err(RegistryError::Store("malformed node key".into()));
    }
    Ok((rest[0] as usize, decode_u64(&rest[1..])?))
}

pub(crate) fn decode_u64(raw: &[u8]) -> Result<u64, RegistryError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| RegistryError::Store(format!("expected 8-byte integer, got {}", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

pub(crate) fn decode_fr(raw: &[u8]) -> Result<Fr, RegistryError> {
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| RegistryError::Store(format!("expected 32-byte scalar, got {}", raw.len())))?;
    fr_from_bytes(&bytes).map_err(|err| RegistryError::Store(err.to_string()))
}
