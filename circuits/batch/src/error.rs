//! Transition engine error types.

use crypto::{CryptoError, FieldElement};
use state_history::HistoryError;
use state_merkle::MerkleError;
use thiserror::Error;

/// Errors raised while applying transitions or assembling witness chains.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Target ledger slot already holds a non-zero leaf.
    #[error("ledger slot {slot} is already occupied")]
    SlotOccupied { slot: usize },

    /// Queue membership proof does not match the queued request.
    #[error("queue proof for request {index} does not verify against the queue root")]
    InvalidQueueProof { index: usize },

    #[error("withdrawal signature does not verify")]
    InvalidSignature,

    #[error("sender {sender} does not match public key address {address}")]
    SenderMismatch {
        sender: FieldElement,
        address: FieldElement,
    },

    /// Ledger leaf does not commit to the range being withdrawn.
    #[error("ledger leaf {index} does not hold the sender's range")]
    LeafMismatch { index: usize },

    /// A batch aborted; nothing from the batch was committed.
    #[error("batch member {index} failed: {source}")]
    BatchMember {
        index: usize,
        source: Box<TransitionError>,
    },

    #[error("witness chain is empty")]
    EmptyChain,

    /// Step `step` does not start from the post-state of step `step - 1`.
    #[error("step {step} does not start from the previous step's post-state")]
    ChainDiscontinuity { step: usize },

    #[error("witness chain mixes mint and withdraw transitions")]
    MixedTransitions,

    #[error("step {step} failed verification: {reason}")]
    ProofVerificationFailed { step: usize, reason: String },

    #[error("claim {index} cannot be filtered: {reason}")]
    InvalidClaim { index: usize, reason: String },

    #[error("invalid witness encoding: {0}")]
    InvalidEncoding(String),

    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl TransitionError {
    pub(crate) fn in_batch(self, index: usize) -> Self {
        Self::BatchMember {
            index,
            source: Box::new(self),
        }
    }

    pub(crate) fn at_step(step: usize, reason: impl Into<String>) -> Self {
        Self::ProofVerificationFailed {
            step,
            reason: reason.into(),
        }
    }
}
