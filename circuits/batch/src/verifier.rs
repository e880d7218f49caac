//! Step-chain verification.
//!
//! [`ChainVerifier`] is the seam for the succinct-proof verifier. The
//! [`ReplayVerifier`] shipped here re-executes every step natively: it checks
//! each Merkle path against the running roots, recomputes the post-state and
//! compares the final roots with `expected` when present.

use crypto::ecdsa::{EcdsaPublicKey, EcdsaSignature};
use crypto::limbs::{limbs_to_biguint, limbs_to_bytes};
use crypto::FieldElement;
use state_merkle::{AccountEntry, MerkleProof};
use tracing::debug;

use crate::engine::withdrawal_digest;
use crate::error::TransitionError;
use crate::shape::{
    parse_bits, parse_field, parse_fields, parse_limbs, ChainInput, MintChainInput, MintRound,
    WithdrawChainInput, WithdrawRound,
};

/// Accepts or rejects a chain input, returning the final state on success.
pub trait ChainVerifier {
    fn verify_mint(&self, input: &MintChainInput) -> Result<Vec<FieldElement>, TransitionError>;

    fn verify_withdraw(
        &self,
        input: &WithdrawChainInput,
    ) -> Result<Vec<FieldElement>, TransitionError>;

    fn verify(&self, input: &ChainInput) -> Result<Vec<FieldElement>, TransitionError> {
        match input {
            ChainInput::Mint(input) => self.verify_mint(input),
            ChainInput::Withdraw(input) => self.verify_withdraw(input),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReplayVerifier {
    zero: FieldElement,
}

impl ReplayVerifier {
    /// `zero` is the empty-leaf value of the ledger and queue trees.
    pub fn new(zero: FieldElement) -> Self {
        Self { zero }
    }

    fn replay_mint(
        &self,
        step: usize,
        round: &MintRound,
        queue_root: &FieldElement,
        ledger_root: &FieldElement,
    ) -> Result<(FieldElement, FieldElement), TransitionError> {
        if !parse_field(&round.sender)?.is_zero() {
            return Err(TransitionError::at_step(step, "mint sender must be zero"));
        }
        let entry = AccountEntry::new(
            parse_field(&round.recipient)?,
            parse_field(&round.leaf_coins[0])?,
            parse_field(&round.leaf_coins[1])?,
        );
        let leaf = entry.leaf();

        let queue_path = parse_fields(&round.mint_path_elements)?;
        let queue_bits = parse_bits(&round.mint_path_indices)?;
        let queued = proof(leaf.clone(), &queue_path, &queue_bits, queue_root);
        if !queued.verify() {
            return Err(TransitionError::at_step(step, "queue path does not reach the queue root"));
        }

        let ledger_path = parse_fields(&round.path_elements)?;
        let ledger_bits = parse_bits(&round.path_indices)?;
        let slot = proof(self.zero.clone(), &ledger_path, &ledger_bits, ledger_root);
        if !slot.verify() {
            return Err(TransitionError::at_step(step, "ledger slot is not empty under the ledger root"));
        }

        let next_queue = recompute(self.zero.clone(), &queue_path, &queue_bits, step)?;
        let next_ledger = recompute(leaf, &ledger_path, &ledger_bits, step)?;
        Ok((next_queue, next_ledger))
    }

    fn replay_withdraw(
        &self,
        step: usize,
        round: &WithdrawRound,
        ledger_root: &FieldElement,
    ) -> Result<FieldElement, TransitionError> {
        let sender = parse_field(&round.sender)?;
        let receiver = parse_field(&round.recipient)?;
        let range_start = parse_field(&round.leaf_coins[0])?;
        let range_end = parse_field(&round.leaf_coins[1])?;

        let digest = withdrawal_digest(&range_start, &range_end, &receiver);
        let msghash = limbs_to_biguint(&parse_limbs(&round.msghash)?);
        if &msghash != digest.as_biguint() {
            return Err(TransitionError::at_step(step, "msghash does not match the withdrawal digest"));
        }
        let public_key = EcdsaPublicKey::from_coordinates(
            &limbs_to_bytes(&parse_limbs(&round.pubkey[0])?),
            &limbs_to_bytes(&parse_limbs(&round.pubkey[1])?),
        )
        .map_err(|err| TransitionError::at_step(step, err.to_string()))?;
        let signature = EcdsaSignature::from_scalars(
            limbs_to_bytes(&parse_limbs(&round.r)?),
            limbs_to_bytes(&parse_limbs(&round.s)?),
        )
        .map_err(|err| TransitionError::at_step(step, err.to_string()))?;
        public_key
            .verify_digest(&digest, &signature)
            .map_err(|_| TransitionError::at_step(step, "signature does not verify"))?;
        if public_key.address() != sender {
            return Err(TransitionError::at_step(step, "sender is not the signing key's address"));
        }

        let path = parse_fields(&round.path_elements)?;
        let bits = parse_bits(&round.path_indices)?;
        let owned = AccountEntry::new(sender, range_start, range_end);
        if !proof(owned.leaf(), &path, &bits, ledger_root).verify() {
            return Err(TransitionError::at_step(step, "sender leaf is not under the ledger root"));
        }
        recompute(owned.with_owner(receiver).leaf(), &path, &bits, step)
    }
}

impl ChainVerifier for ReplayVerifier {
    fn verify_mint(&self, input: &MintChainInput) -> Result<Vec<FieldElement>, TransitionError> {
        let mut queue_root = parse_field(&input.step_in[0])?;
        let mut ledger_root = parse_field(&input.step_in[1])?;
        for (step, round) in input.private_inputs.iter().enumerate() {
            (queue_root, ledger_root) = self.replay_mint(step, round, &queue_root, &ledger_root)?;
            debug!(step, "replayed mint step");
        }
        let state = vec![queue_root, ledger_root];
        check_expected(input.expected.as_ref().map(|e| e.as_slice()), &state, input.private_inputs.len())?;
        Ok(state)
    }

    fn verify_withdraw(
        &self,
        input: &WithdrawChainInput,
    ) -> Result<Vec<FieldElement>, TransitionError> {
        let mut ledger_root = parse_field(&input.step_in[0])?;
        for (step, round) in input.private_inputs.iter().enumerate() {
            ledger_root = self.replay_withdraw(step, round, &ledger_root)?;
            debug!(step, "replayed withdraw step");
        }
        let state = vec![ledger_root];
        check_expected(input.expected.as_ref().map(|e| e.as_slice()), &state, input.private_inputs.len())?;
        Ok(state)
    }
}

fn proof(leaf: FieldElement, path: &[FieldElement], bits: &[u8], root: &FieldElement) -> MerkleProof {
    MerkleProof {
        leaf,
        path_elements: path.to_vec(),
        path_indices: bits.to_vec(),
        root: root.clone(),
    }
}

fn recompute(
    leaf: FieldElement,
    path: &[FieldElement],
    bits: &[u8],
    step: usize,
) -> Result<FieldElement, TransitionError> {
    proof(leaf, path, bits, &FieldElement::zero())
        .compute_root()
        .ok_or_else(|| TransitionError::at_step(step, "path elements and indices differ in length"))
}

fn check_expected(
    expected: Option<&[String]>,
    state: &[FieldElement],
    steps: usize,
) -> Result<(), TransitionError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    if parse_fields(expected)? != state {
        return Err(TransitionError::at_step(
            steps.saturating_sub(1),
            "final state differs from expected",
        ));
    }
    Ok(())
}
