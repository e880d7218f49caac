//! Mint and withdraw transitions over the live ledger tree.
//!
//! Every transition is validated in full before any tree is touched, and
//! batches run against working copies that are only swapped in once the last
//! member succeeds. A failed call therefore leaves the engine exactly as it
//! was.

use crypto::ecdsa::{EcdsaPublicKey, EcdsaSecretKey, EcdsaSignature};
use crypto::hashes::poseidon_hash;
use crypto::limbs::biguint_to_limbs;
use crypto::traits::SigningKey;
use crypto::{CryptoError, FieldElement};
use serde::{Deserialize, Serialize};
use state_merkle::{AccountEntry, MerkleTree};
use tracing::{debug, info, warn};

use crate::error::TransitionError;
use crate::witness::{MintState, MintStep, WithdrawStep};

/// Digest a withdrawal signature commits to. A zero `receiver` burns the
/// range out of the ledger; anything else transfers it.
pub fn withdrawal_digest(
    range_start: &FieldElement,
    range_end: &FieldElement,
    receiver: &FieldElement,
) -> FieldElement {
    poseidon_hash(&[range_start.clone(), range_end.clone(), receiver.clone()])
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    pub recipient: FieldElement,
    pub range_start: FieldElement,
    pub range_end: FieldElement,
}

impl MintRequest {
    pub fn new(recipient: FieldElement, range_start: FieldElement, range_end: FieldElement) -> Self {
        Self {
            recipient,
            range_start,
            range_end,
        }
    }

    pub fn entry(&self) -> AccountEntry {
        AccountEntry::new(
            self.recipient.clone(),
            self.range_start.clone(),
            self.range_end.clone(),
        )
    }

    pub fn leaf(&self) -> FieldElement {
        self.entry().leaf()
    }
}

/// Pending mint requests committed into their own tree, request `i` at leaf `i`.
#[derive(Clone, Debug)]
pub struct MintQueue {
    tree: MerkleTree,
    requests: Vec<MintRequest>,
}

impl MintQueue {
    pub fn new(
        depth: usize,
        zero: FieldElement,
        requests: Vec<MintRequest>,
    ) -> Result<Self, TransitionError> {
        let tree = MerkleTree::with_leaves(depth, zero, requests.iter().map(MintRequest::leaf))?;
        Ok(Self { tree, requests })
    }

    /// Adopt a queue tree built elsewhere. Leaves are checked when minted.
    pub fn from_parts(tree: MerkleTree, requests: Vec<MintRequest>) -> Self {
        Self { tree, requests }
    }

    pub fn root(&self) -> FieldElement {
        self.tree.root()
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    pub fn requests(&self) -> &[MintRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub sender: FieldElement,
    pub range_start: FieldElement,
    pub range_end: FieldElement,
    pub receiver: FieldElement,
    pub signature: EcdsaSignature,
    pub public_key: EcdsaPublicKey,
    pub leaf_index: usize,
}

impl WithdrawRequest {
    /// Sign a request for the range at `leaf_index`, sent from the key's own address.
    pub fn signed(
        key: &EcdsaSecretKey,
        leaf_index: usize,
        range_start: FieldElement,
        range_end: FieldElement,
        receiver: FieldElement,
    ) -> Result<Self, CryptoError> {
        let public_key = key.verify_key();
        let signature = key.sign_digest(&withdrawal_digest(&range_start, &range_end, &receiver))?;
        Ok(Self {
            sender: public_key.address(),
            range_start,
            range_end,
            receiver,
            signature,
            public_key,
            leaf_index,
        })
    }

    pub fn digest(&self) -> FieldElement {
        withdrawal_digest(&self.range_start, &self.range_end, &self.receiver)
    }

    fn sender_entry(&self) -> AccountEntry {
        AccountEntry::new(
            self.sender.clone(),
            self.range_start.clone(),
            self.range_end.clone(),
        )
    }

    fn receiver_entry(&self) -> AccountEntry {
        self.sender_entry().with_owner(self.receiver.clone())
    }
}

/// Applies transitions to a single ledger tree.
#[derive(Clone, Debug)]
pub struct TransitionEngine {
    ledger: MerkleTree,
    cursor: usize,
}

impl TransitionEngine {
    pub fn new(depth: usize, zero: FieldElement) -> Result<Self, TransitionError> {
        Ok(Self {
            ledger: MerkleTree::new(depth, zero)?,
            cursor: 0,
        })
    }

    /// Resume from an existing ledger; minting continues after its last leaf.
    pub fn with_ledger(ledger: MerkleTree) -> Self {
        let cursor = ledger.len();
        Self { ledger, cursor }
    }

    pub fn ledger(&self) -> &MerkleTree {
        &self.ledger
    }

    pub fn root(&self) -> FieldElement {
        self.ledger.root()
    }

    /// Ledger slot the next mint writes to.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move every queued request into consecutive ledger slots.
    pub fn apply_mint(&mut self, queue: &mut MintQueue) -> Result<Vec<MintStep>, TransitionError> {
        info!(
            requests = queue.len(),
            cursor = self.cursor,
            queue_root = %queue.root(),
            "applying mint batch"
        );
        let mut ledger = self.ledger.clone();
        let mut queue_tree = queue.tree.clone();
        let mut steps = Vec::with_capacity(queue.len());

        for (index, request) in queue.requests.iter().enumerate() {
            let step = mint_step(&mut ledger, &mut queue_tree, index, self.cursor + index, request)
                .map_err(|err| {
                    warn!(index, error = %err, "mint batch aborted");
                    err.in_batch(index)
                })?;
            debug!(index, slot = step.ledger_slot, "minted range");
            steps.push(step);
        }

        self.cursor += steps.len();
        self.ledger = ledger;
        queue.tree = queue_tree;
        queue.requests.clear();
        info!(ledger_root = %self.ledger.root(), cursor = self.cursor, "mint batch committed");
        Ok(steps)
    }

    /// Apply one withdrawal directly to the ledger.
    pub fn apply_withdraw(
        &mut self,
        request: &WithdrawRequest,
    ) -> Result<WithdrawStep, TransitionError> {
        let step = withdraw_step(&mut self.ledger, request)?;
        debug!(leaf_index = request.leaf_index, post_root = %step.post_root, "applied withdrawal");
        Ok(step)
    }

    /// Apply withdrawals in order; nothing is committed unless all succeed.
    pub fn apply_withdrawals(
        &mut self,
        requests: &[WithdrawRequest],
    ) -> Result<Vec<WithdrawStep>, TransitionError> {
        info!(requests = requests.len(), "applying withdraw batch");
        let mut ledger = self.ledger.clone();
        let mut steps = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            let step = withdraw_step(&mut ledger, request).map_err(|err| {
                warn!(index, error = %err, "withdraw batch aborted");
                err.in_batch(index)
            })?;
            debug!(index, leaf_index = request.leaf_index, "withdrew range");
            steps.push(step);
        }
        self.ledger = ledger;
        info!(ledger_root = %self.ledger.root(), "withdraw batch committed");
        Ok(steps)
    }
}

fn mint_step(
    ledger: &mut MerkleTree,
    queue: &mut MerkleTree,
    index: usize,
    slot: usize,
    request: &MintRequest,
) -> Result<MintStep, TransitionError> {
    if &ledger.leaf(slot)? != ledger.zero() {
        return Err(TransitionError::SlotOccupied { slot });
    }
    let queue_proof = queue.path(index)?;
    let leaf = request.leaf();
    if queue_proof.leaf != leaf || !MerkleTree::verify(&queue_proof) {
        return Err(TransitionError::InvalidQueueProof { index });
    }
    let ledger_proof = ledger.path(slot)?;
    let pre_state = MintState {
        queue_root: queue_proof.root.clone(),
        ledger_root: ledger_proof.root.clone(),
    };

    let zero = queue.zero().clone();
    let queue_root = queue.update(index, zero)?;
    let ledger_root = ledger.update(slot, leaf)?;

    Ok(MintStep {
        pre_state,
        post_state: MintState {
            queue_root,
            ledger_root,
        },
        request: request.clone(),
        queue_index: index,
        ledger_slot: slot,
        queue_proof,
        ledger_proof,
    })
}

fn withdraw_step(
    ledger: &mut MerkleTree,
    request: &WithdrawRequest,
) -> Result<WithdrawStep, TransitionError> {
    let digest = request.digest();
    request
        .public_key
        .verify_digest(&digest, &request.signature)
        .map_err(|_| TransitionError::InvalidSignature)?;
    let address = request.public_key.address();
    if request.sender != address {
        return Err(TransitionError::SenderMismatch {
            sender: request.sender.clone(),
            address,
        });
    }
    let ledger_proof = ledger.path(request.leaf_index)?;
    if ledger_proof.leaf != request.sender_entry().leaf() {
        return Err(TransitionError::LeafMismatch {
            index: request.leaf_index,
        });
    }
    let msghash = biguint_to_limbs(digest.as_biguint())?;

    let post_root = ledger.update(request.leaf_index, request.receiver_entry().leaf())?;

    Ok(WithdrawStep {
        pre_root: ledger_proof.root.clone(),
        post_root,
        sender: request.sender.clone(),
        receiver: request.receiver.clone(),
        range_start: request.range_start.clone(),
        range_end: request.range_end.clone(),
        leaf_index: request.leaf_index,
        digest,
        r: request.signature.r_limbs(),
        s: request.signature.s_limbs(),
        msghash,
        pubkey: [request.public_key.x_limbs(), request.public_key.y_limbs()],
        ledger_proof,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn felt(value: u64) -> FieldElement {
        FieldElement::from_u64(value)
    }

    fn queue() -> MintQueue {
        MintQueue::new(
            3,
            FieldElement::zero(),
            vec![
                MintRequest::new(felt(111), felt(0), felt(10)),
                MintRequest::new(felt(222), felt(11), felt(15)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn mint_moves_queue_into_ledger() {
        let mut engine = TransitionEngine::new(3, FieldElement::zero()).unwrap();
        let mut queue = queue();
        let expected = [
            poseidon_hash(&[felt(111), felt(0), felt(10)]),
            poseidon_hash(&[felt(222), felt(11), felt(15)]),
        ];
        let steps = engine.apply_mint(&mut queue).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(engine.ledger().leaf(0).unwrap(), expected[0]);
        assert_eq!(engine.ledger().leaf(1).unwrap(), expected[1]);
        assert!(queue.tree().leaves().iter().all(FieldElement::is_zero));
        assert_eq!(steps[0].post_state, steps[1].pre_state);
        assert_eq!(steps[1].post_state.ledger_root, engine.root());
        assert_eq!(engine.cursor(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn second_batch_continues_after_cursor() {
        let mut engine = TransitionEngine::new(3, FieldElement::zero()).unwrap();
        engine.apply_mint(&mut queue()).unwrap();
        let steps = engine.apply_mint(&mut queue()).unwrap();
        assert_eq!(steps[0].ledger_slot, 2);
        assert_eq!(steps[1].ledger_slot, 3);
    }

    #[test]
    fn occupied_slot_aborts_whole_batch() {
        let mut ledger = MerkleTree::new(3, FieldElement::zero()).unwrap();
        ledger.update(1, felt(5)).unwrap();
        let mut engine = TransitionEngine {
            ledger,
            cursor: 0,
        };
        let before = engine.root();
        let mut queue = queue();
        let queue_root = queue.root();
        let err = engine.apply_mint(&mut queue).unwrap_err();
        assert_eq!(
            err,
            TransitionError::SlotOccupied { slot: 1 }.in_batch(1)
        );
        assert_eq!(engine.root(), before);
        assert_eq!(engine.cursor(), 0);
        assert_eq!(queue.root(), queue_root);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn tampered_queue_is_rejected() {
        let tree = MerkleTree::with_leaves(3, FieldElement::zero(), [felt(1)]).unwrap();
        let mut queue = MintQueue::from_parts(tree, vec![MintRequest::new(felt(1), felt(0), felt(1))]);
        let mut engine = TransitionEngine::new(3, FieldElement::zero()).unwrap();
        assert_eq!(
            engine.apply_mint(&mut queue).unwrap_err(),
            TransitionError::InvalidQueueProof { index: 0 }.in_batch(0)
        );
    }

    #[test]
    fn mint_past_capacity_fails() {
        let mut engine = TransitionEngine::new(1, FieldElement::zero()).unwrap();
        let mut queue = MintQueue::new(
            2,
            FieldElement::zero(),
            (0..3).map(|i| MintRequest::new(felt(i + 1), felt(i), felt(i))).collect(),
        )
        .unwrap();
        let err = engine.apply_mint(&mut queue).unwrap_err();
        assert!(matches!(err, TransitionError::BatchMember { index: 2, .. }));
        assert!(engine.ledger().is_empty());
    }

    #[test]
    fn withdraw_burns_leaf() {
        let key = EcdsaSecretKey::generate_deterministic(b"alice");
        let address = key.verify_key().address();
        let ledger = MerkleTree::with_leaves(
            3,
            FieldElement::zero(),
            [AccountEntry::new(address, felt(0), felt(10)).leaf()],
        )
        .unwrap();
        let mut engine = TransitionEngine::with_ledger(ledger);
        let pre_root = engine.root();

        let request = WithdrawRequest::signed(&key, 0, felt(0), felt(10), felt(0)).unwrap();
        let step = engine.apply_withdraw(&request).unwrap();
        assert_eq!(step.pre_root, pre_root);
        assert!(step.ledger_proof.verify());
        assert_eq!(step.ledger_proof.root, pre_root);
        assert_eq!(
            engine.ledger().leaf(0).unwrap(),
            poseidon_hash(&[felt(0), felt(0), felt(10)])
        );
        assert_eq!(step.post_root, engine.root());
        assert_eq!(step.msghash, biguint_to_limbs(step.digest.as_biguint()).unwrap());
    }

    #[test]
    fn withdraw_rejections_leave_ledger_untouched() {
        let key = EcdsaSecretKey::generate_deterministic(b"alice");
        let other = EcdsaSecretKey::generate_deterministic(b"mallory");
        let address = key.verify_key().address();
        let ledger = MerkleTree::with_leaves(
            3,
            FieldElement::zero(),
            [AccountEntry::new(address.clone(), felt(0), felt(10)).leaf()],
        )
        .unwrap();
        let mut engine = TransitionEngine::with_ledger(ledger);
        let root = engine.root();

        let mut forged = WithdrawRequest::signed(&key, 0, felt(0), felt(10), felt(0)).unwrap();
        forged.receiver = felt(9);
        assert_eq!(
            engine.apply_withdraw(&forged).unwrap_err(),
            TransitionError::InvalidSignature
        );

        let mut spoofed = WithdrawRequest::signed(&other, 0, felt(0), felt(10), felt(0)).unwrap();
        spoofed.sender = address;
        assert!(matches!(
            engine.apply_withdraw(&spoofed).unwrap_err(),
            TransitionError::SenderMismatch { .. }
        ));

        let wrong_range = WithdrawRequest::signed(&key, 0, felt(0), felt(11), felt(0)).unwrap();
        assert_eq!(
            engine.apply_withdraw(&wrong_range).unwrap_err(),
            TransitionError::LeafMismatch { index: 0 }
        );
        assert_eq!(engine.root(), root);
    }

    #[test]
    fn withdraw_batch_is_atomic() {
        let key = EcdsaSecretKey::generate_deterministic(b"alice");
        let address = key.verify_key().address();
        let ledger = MerkleTree::with_leaves(
            3,
            FieldElement::zero(),
            [
                AccountEntry::new(address.clone(), felt(0), felt(10)).leaf(),
                AccountEntry::new(address, felt(11), felt(15)).leaf(),
            ],
        )
        .unwrap();
        let mut engine = TransitionEngine::with_ledger(ledger);
        let root = engine.root();
        let good = WithdrawRequest::signed(&key, 0, felt(0), felt(10), felt(0)).unwrap();
        let bad = WithdrawRequest::signed(&key, 1, felt(11), felt(16), felt(0)).unwrap();
        let err = engine.apply_withdrawals(&[good.clone(), bad]).unwrap_err();
        assert_eq!(err, TransitionError::LeafMismatch { index: 1 }.in_batch(1));
        assert_eq!(engine.root(), root);

        let transfer = WithdrawRequest::signed(&key, 1, felt(11), felt(15), felt(42)).unwrap();
        let steps = engine.apply_withdrawals(&[good, transfer]).unwrap();
        assert_eq!(steps[0].post_root, steps[1].pre_root);
        assert_eq!(
            engine.ledger().leaf(1).unwrap(),
            AccountEntry::from_u64(42, 11, 15).leaf()
        );
    }
}
