//! Per-transition witness bundles.
//!
//! A bundle records the roots before and after one transition together with
//! every input and Merkle proof the verifier needs to re-derive the
//! post-state from the pre-state.

use crypto::limbs::Limbs;
use crypto::FieldElement;
use serde::{Deserialize, Serialize};
use state_merkle::MerkleProof;

use crate::engine::MintRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Mint,
    Withdraw,
}

/// Roots a mint step reads and writes, in `step_in` order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintState {
    pub queue_root: FieldElement,
    pub ledger_root: FieldElement,
}

impl MintState {
    pub fn to_vec(&self) -> Vec<FieldElement> {
        vec![self.queue_root.clone(), self.ledger_root.clone()]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintStep {
    pub pre_state: MintState,
    pub post_state: MintState,
    pub request: MintRequest,
    pub queue_index: usize,
    pub ledger_slot: usize,
    /// Path of the queued request, taken before the queue leaf is cleared.
    pub queue_proof: MerkleProof,
    /// Path of the empty ledger slot, taken before the slot is written.
    pub ledger_proof: MerkleProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawStep {
    pub pre_root: FieldElement,
    pub post_root: FieldElement,
    pub sender: FieldElement,
    pub receiver: FieldElement,
    pub range_start: FieldElement,
    pub range_end: FieldElement,
    pub leaf_index: usize,
    pub digest: FieldElement,
    pub r: Limbs,
    pub s: Limbs,
    pub msghash: Limbs,
    /// Public key coordinates `[x, y]`.
    pub pubkey: [Limbs; 2],
    /// Path of the sender's leaf against `pre_root`.
    pub ledger_proof: MerkleProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WitnessBundle {
    Mint(MintStep),
    Withdraw(WithdrawStep),
}

impl WitnessBundle {
    pub fn kind(&self) -> TransitionKind {
        match self {
            Self::Mint(_) => TransitionKind::Mint,
            Self::Withdraw(_) => TransitionKind::Withdraw,
        }
    }

    pub fn pre_state(&self) -> Vec<FieldElement> {
        match self {
            Self::Mint(step) => step.pre_state.to_vec(),
            Self::Withdraw(step) => vec![step.pre_root.clone()],
        }
    }

    pub fn post_state(&self) -> Vec<FieldElement> {
        match self {
            Self::Mint(step) => step.post_state.to_vec(),
            Self::Withdraw(step) => vec![step.post_root.clone()],
        }
    }
}

impl From<MintStep> for WitnessBundle {
    fn from(step: MintStep) -> Self {
        Self::Mint(step)
    }
}

impl From<WithdrawStep> for WitnessBundle {
    fn from(step: WithdrawStep) -> Self {
        Self::Withdraw(step)
    }
}
