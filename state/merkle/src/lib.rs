//! Fixed-depth Merkle tree state for ledger entries.
//!
//! The tree mirrors the verifier's hash domain and supports in-place leaf
//! updates, append-at-cursor insertion, and authentication path queries.
//! Storage is sparse: a node is only materialised when it differs from the
//! default node for its level, so deep trees with few written leaves stay
//! cheap.

use std::collections::{BTreeMap, BTreeSet};

use crypto::hashes::merkle_node;
use crypto::FieldElement;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod entry;

pub use entry::AccountEntry;

/// Binary Merkle tree.
const BRANCH_FACTOR: usize = 2;

/// Deepest supported tree; keeps the capacity within `usize`.
pub const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("tree depth must be between 1 and {MAX_DEPTH}, got {0}")]
    InvalidDepth(usize),
    #[error("merkle tree is full")]
    TreeFull,
    #[error("leaf index {index} is out of range for capacity {capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },
    #[error("{count} leaves exceed tree capacity {capacity}")]
    TooManyLeaves { count: usize, capacity: usize },
}

/// Membership proof for a single leaf.
///
/// `path_indices[level]` is 0 when the running node is the left child at that
/// level and 1 when it is the right child.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: FieldElement,
    pub path_elements: Vec<FieldElement>,
    pub path_indices: Vec<u8>,
    pub root: FieldElement,
}

impl MerkleProof {
    /// Leaf position encoded by the path bits, or `None` if a bit is not 0/1.
    pub fn leaf_index(&self) -> Option<usize> {
        self.path_indices
            .iter()
            .enumerate()
            .try_fold(0usize, |acc, (level, bit)| match bit {
                0 => Some(acc),
                1 => Some(acc | (1 << level)),
                _ => None,
            })
    }

    /// Re-hash `leaf` up the path. `None` when the proof is malformed.
    pub fn compute_root(&self) -> Option<FieldElement> {
        if self.path_elements.len() != self.path_indices.len() {
            return None;
        }
        let mut current = self.leaf.clone();
        for (sibling, bit) in self.path_elements.iter().zip(self.path_indices.iter()) {
            current = match bit {
                0 => merkle_node(&current, sibling),
                1 => merkle_node(sibling, &current),
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn verify(&self) -> bool {
        self.compute_root().as_ref() == Some(&self.root)
    }
}

#[derive(Clone, Debug)]
pub struct MerkleTree {
    depth: usize,
    zero: FieldElement,
    next_index: usize,
    default_nodes: Vec<FieldElement>,
    levels: Vec<BTreeMap<usize, FieldElement>>,
}

impl MerkleTree {
    pub fn new(depth: usize, zero: FieldElement) -> Result<Self, MerkleError> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(MerkleError::InvalidDepth(depth));
        }
        let mut default_nodes = Vec::with_capacity(depth + 1);
        default_nodes.push(zero.clone());
        for level in 0..depth {
            let prev = &default_nodes[level];
            let next = merkle_node(prev, prev);
            default_nodes.push(next);
        }
        Ok(Self {
            depth,
            zero,
            next_index: 0,
            default_nodes,
            levels: vec![BTreeMap::new(); depth + 1],
        })
    }

    /// Build a tree whose first leaves are `leaves`; the rest hold `zero`.
    pub fn with_leaves<I>(depth: usize, zero: FieldElement, leaves: I) -> Result<Self, MerkleError>
    where
        I: IntoIterator<Item = FieldElement>,
    {
        let mut tree = Self::new(depth, zero)?;
        let capacity = tree.capacity();
        let mut count = 0usize;
        for leaf in leaves {
            if count < capacity {
                tree.set_node(0, count, leaf);
            }
            count += 1;
        }
        if count > capacity {
            return Err(MerkleError::TooManyLeaves { count, capacity });
        }
        tree.next_index = count;
        tree.rebuild();
        Ok(tree)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> usize {
        1usize << self.depth
    }

    pub fn zero(&self) -> &FieldElement {
        &self.zero
    }

    /// Position of the append cursor: one past the highest written index.
    pub fn len(&self) -> usize {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    pub fn is_full(&self) -> bool {
        self.next_index == self.capacity()
    }

    pub fn root(&self) -> FieldElement {
        self.node(self.depth, 0)
    }

    pub fn leaf(&self, index: usize) -> Result<FieldElement, MerkleError> {
        self.check_index(index)?;
        Ok(self.node(0, index))
    }

    /// Every logical leaf, `zero` included. Materialises `capacity()` values.
    pub fn leaves(&self) -> Vec<FieldElement> {
        (0..self.capacity()).map(|index| self.node(0, index)).collect()
    }

    /// Replace the leaf at `index` and rehash its path to the root.
    pub fn update(&mut self, index: usize, value: FieldElement) -> Result<FieldElement, MerkleError> {
        self.check_index(index)?;
        let mut current = value;
        let mut position = index;
        self.set_node(0, position, current.clone());
        for level in 0..self.depth {
            let sibling = self.node(level, position ^ 1);
            current = if position % BRANCH_FACTOR == 0 {
                merkle_node(&current, &sibling)
            } else {
                merkle_node(&sibling, &current)
            };
            position /= BRANCH_FACTOR;
            self.set_node(level + 1, position, current.clone());
        }
        self.next_index = self.next_index.max(index + 1);
        Ok(current)
    }

    /// Write `value` at the append cursor.
    pub fn append(&mut self, value: FieldElement) -> Result<(usize, FieldElement), MerkleError> {
        if self.is_full() {
            return Err(MerkleError::TreeFull);
        }
        let index = self.next_index;
        let root = self.update(index, value)?;
        Ok((index, root))
    }

    pub fn extend<I>(&mut self, values: I) -> Result<Vec<FieldElement>, MerkleError>
    where
        I: IntoIterator<Item = FieldElement>,
    {
        let mut roots = Vec::new();
        for value in values {
            let (_, root) = self.append(value)?;
            roots.push(root);
        }
        Ok(roots)
    }

    pub fn authentication_path(&self, index: usize) -> Result<Vec<FieldElement>, MerkleError> {
        self.check_index(index)?;
        let mut path = Vec::with_capacity(self.depth);
        let mut position = index;
        for level in 0..self.depth {
            path.push(self.node(level, position ^ 1));
            position /= BRANCH_FACTOR;
        }
        Ok(path)
    }

    /// Proof for the current leaf at `index`, bound to the current root.
    pub fn path(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        let path_elements = self.authentication_path(index)?;
        let path_indices = (0..self.depth)
            .map(|level| ((index >> level) & 1) as u8)
            .collect();
        Ok(MerkleProof {
            leaf: self.node(0, index),
            path_elements,
            path_indices,
            root: self.root(),
        })
    }

    /// Check a proof independently of any tree state.
    pub fn verify(proof: &MerkleProof) -> bool {
        proof.verify()
    }

    fn check_index(&self, index: usize) -> Result<(), MerkleError> {
        if index >= self.capacity() {
            return Err(MerkleError::IndexOutOfRange {
                index,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    fn node(&self, level: usize, position: usize) -> FieldElement {
        self.levels[level]
            .get(&position)
            .unwrap_or(&self.default_nodes[level])
            .clone()
    }

    fn set_node(&mut self, level: usize, position: usize, value: FieldElement) {
        if value == self.default_nodes[level] {
            self.levels[level].remove(&position);
        } else {
            self.levels[level].insert(position, value);
        }
    }

    fn rebuild(&mut self) {
        for level in 0..self.depth {
            let parents: BTreeSet<usize> = self.levels[level]
                .keys()
                .map(|position| position / BRANCH_FACTOR)
                .collect();
            for parent in parents {
                let left = self.node(level, parent * BRANCH_FACTOR);
                let right = self.node(level, parent * BRANCH_FACTOR + 1);
                self.set_node(level + 1, parent, merkle_node(&left, &right));
            }
        }
    }
}
