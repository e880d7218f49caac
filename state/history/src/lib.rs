//! Historical ledger snapshots.
//!
//! Every finalized ledger state is kept as its own Merkle tree of
//! [`AccountEntry`] leaves, and each snapshot root is committed as a leaf of
//! an outer history tree. A [`Claim`] proves that an entry was present in a
//! given snapshot; [`SnapshotHistory::claim_status`] additionally decides
//! whether a later snapshot has since superseded it.

use std::collections::BTreeMap;

use crypto::FieldElement;
use serde::{Deserialize, Serialize};
use state_merkle::{AccountEntry, MerkleError, MerkleProof, MerkleTree};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("block {block} does not exist; history holds {len} snapshots")]
    BlockOutOfRange { block: usize, len: usize },
    #[error("history tree is full")]
    HistoryFull,
    #[error("no entry at index {index} in block {block}")]
    EmptySlot { block: usize, index: usize },
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

/// One finalized ledger state.
#[derive(Clone, Debug)]
pub struct Snapshot {
    entries: BTreeMap<usize, AccountEntry>,
    tree: MerkleTree,
}

impl Snapshot {
    pub fn root(&self) -> FieldElement {
        self.tree.root()
    }

    pub fn entry(&self, index: usize) -> Option<&AccountEntry> {
        self.entries.get(&index)
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, &AccountEntry)> {
        self.entries.iter().map(|(index, entry)| (*index, entry))
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }
}

/// Assertion that `entry` sat at `state_index` of snapshot `block_number`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub entry: AccountEntry,
    pub block_number: usize,
    pub state_index: usize,
    pub proof: MerkleProof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimStatus {
    /// The proof does not bind the entry to the stored snapshot.
    Invalid,
    /// Structurally valid, but either a later snapshot changed the slot or
    /// the entry was already there in the block before.
    Stale,
    /// Valid, still the latest state of the slot, and made at the block
    /// where the slot was last written. At most one block per slot qualifies.
    Canonical,
}

#[derive(Clone, Debug)]
pub struct SnapshotHistory {
    snapshot_depth: usize,
    zero: FieldElement,
    snapshots: Vec<Snapshot>,
    history_tree: MerkleTree,
}

impl SnapshotHistory {
    pub fn new(
        history_depth: usize,
        snapshot_depth: usize,
        zero: FieldElement,
    ) -> Result<Self, HistoryError> {
        // Rejects a bad snapshot depth up front rather than on first append.
        MerkleTree::new(snapshot_depth, zero.clone())?;
        let history_tree = MerkleTree::new(history_depth, zero.clone())?;
        Ok(Self {
            snapshot_depth,
            zero,
            snapshots: Vec::new(),
            history_tree,
        })
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn snapshot_depth(&self) -> usize {
        self.snapshot_depth
    }

    pub fn history_root(&self) -> FieldElement {
        self.history_tree.root()
    }

    pub fn history_tree(&self) -> &MerkleTree {
        &self.history_tree
    }

    pub fn snapshot(&self, block_number: usize) -> Result<&Snapshot, HistoryError> {
        self.snapshots
            .get(block_number)
            .ok_or(HistoryError::BlockOutOfRange {
                block: block_number,
                len: self.snapshots.len(),
            })
    }

    /// Commit a new snapshot whose entries occupy indices `0..entries.len()`.
    pub fn append_snapshot<I>(&mut self, entries: I) -> Result<usize, HistoryError>
    where
        I: IntoIterator<Item = AccountEntry>,
    {
        if self.history_tree.is_full() {
            return Err(HistoryError::HistoryFull);
        }
        let entries: BTreeMap<usize, AccountEntry> = entries.into_iter().enumerate().collect();
        let tree = MerkleTree::with_leaves(
            self.snapshot_depth,
            self.zero.clone(),
            entries.values().map(AccountEntry::leaf),
        )?;
        let (block_number, history_root) = self.history_tree.append(tree.root())?;
        info!(
            block_number,
            entries = entries.len(),
            history_root = %history_root,
            "appended snapshot"
        );
        self.snapshots.push(Snapshot { entries, tree });
        Ok(block_number)
    }

    /// Overwrite one entry of an existing snapshot and refresh its history leaf.
    pub fn update_snapshot(
        &mut self,
        block_number: usize,
        state_index: usize,
        entry: AccountEntry,
    ) -> Result<FieldElement, HistoryError> {
        let len = self.snapshots.len();
        let snapshot = self
            .snapshots
            .get_mut(block_number)
            .ok_or(HistoryError::BlockOutOfRange {
                block: block_number,
                len,
            })?;
        let snapshot_root = snapshot.tree.update(state_index, entry.leaf())?;
        snapshot.entries.insert(state_index, entry);
        let history_root = self.history_tree.update(block_number, snapshot_root)?;
        debug!(
            block_number,
            state_index,
            history_root = %history_root,
            "updated snapshot entry"
        );
        Ok(history_root)
    }

    /// Fresh claim on the entry stored at `state_index` of `block_number`.
    pub fn claim(&self, block_number: usize, state_index: usize) -> Result<Claim, HistoryError> {
        let snapshot = self.snapshot(block_number)?;
        let proof = snapshot.tree.path(state_index)?;
        let entry = snapshot
            .entry(state_index)
            .cloned()
            .ok_or(HistoryError::EmptySlot {
                block: block_number,
                index: state_index,
            })?;
        Ok(Claim {
            entry,
            block_number,
            state_index,
            proof,
        })
    }

    /// Structural check only; says nothing about later snapshots.
    pub fn is_claim_valid(&self, claim: &Claim) -> bool {
        let Ok(snapshot) = self.snapshot(claim.block_number) else {
            return false;
        };
        claim.proof.root == snapshot.root()
            && claim.proof.leaf == claim.entry.leaf()
            && claim.proof.path_indices.len() == self.snapshot_depth
            && claim.proof.leaf_index() == Some(claim.state_index)
            && MerkleTree::verify(&claim.proof)
    }

    pub fn claim_status(&self, claim: &Claim) -> ClaimStatus {
        if !self.is_claim_valid(claim) {
            return ClaimStatus::Invalid;
        }
        let holds = |snapshot: &Snapshot| {
            snapshot.tree.leaf(claim.state_index).ok().as_ref() == Some(&claim.proof.leaf)
        };
        let superseded = !self.snapshots[claim.block_number + 1..].iter().all(holds);
        let carried = claim.block_number > 0 && holds(&self.snapshots[claim.block_number - 1]);
        if superseded || carried {
            ClaimStatus::Stale
        } else {
            ClaimStatus::Canonical
        }
    }

    /// Canonical claims for every slot `owner` holds in the latest snapshot.
    ///
    /// Each claim points at the oldest block from which the slot has stayed
    /// unchanged through to the latest snapshot.
    pub fn canonical_claims(&self, owner: &FieldElement) -> Result<Vec<Claim>, HistoryError> {
        let Some(latest) = self.snapshots.last() else {
            return Ok(Vec::new());
        };
        let mut claims = Vec::new();
        for (state_index, entry) in latest.entries() {
            if &entry.owner != owner {
                continue;
            }
            let leaf = entry.leaf();
            let mut block = self.snapshots.len() - 1;
            while block > 0 && self.snapshots[block - 1].tree.leaf(state_index)? == leaf {
                block -= 1;
            }
            claims.push(self.claim(block, state_index)?);
        }
        Ok(claims)
    }

    /// Membership proof of a snapshot root inside the history tree.
    pub fn history_proof(&self, block_number: usize) -> Result<MerkleProof, HistoryError> {
        self.snapshot(block_number)?;
        Ok(self.history_tree.path(block_number)?)
    }
}
