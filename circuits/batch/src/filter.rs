//! Claim filtering against a snapshot history.
//!
//! Claims are posted as a Keccak hash chain
//! `chain' = keccak(chain || be32(block) || be32(index) || leaf)`, starting
//! from 32 zero bytes. The filter unwinds that chain from the last claim to
//! the first, inserting the leaf of every canonical claim into a fresh
//! filtered tree. A slot is credited at most once. The step input commits
//! to the history root, the final chain value, the empty filtered root and a
//! zero count; after the last round the chain is back at zero.

use std::collections::BTreeSet;

use crypto::hashes::keccak256;
use crypto::FieldElement;
use state_history::{Claim, ClaimStatus, SnapshotHistory};
use state_merkle::{MerkleError, MerkleTree};
use tracing::{debug, info};

use crate::error::TransitionError;
use crate::shape::{decimals, FilterChainInput, FilterRound};

pub type ClaimChain = [u8; 32];

const CHAIN_HALF: usize = 16;

/// Fold one claim into the chain.
pub fn extend_chain(
    chain: &ClaimChain,
    block_number: u32,
    state_index: u32,
    leaf: &FieldElement,
) -> ClaimChain {
    let mut preimage = Vec::with_capacity(32 + 4 + 4 + 32);
    preimage.extend_from_slice(chain);
    preimage.extend_from_slice(&block_number.to_be_bytes());
    preimage.extend_from_slice(&state_index.to_be_bytes());
    preimage.extend_from_slice(&leaf.to_be_bytes());
    keccak256(&preimage)
}

/// High and low 128-bit halves, each small enough for one field element.
pub fn split_chain(chain: &ClaimChain) -> [FieldElement; 2] {
    [
        FieldElement::from_be_bytes(&chain[..CHAIN_HALF]),
        FieldElement::from_be_bytes(&chain[CHAIN_HALF..]),
    ]
}

/// Result of filtering a claim list.
#[derive(Clone, Debug)]
pub struct FilterOutcome {
    pub input: FilterChainInput,
    pub filtered: MerkleTree,
    /// Positions in the claim list that made it into the filtered tree.
    pub accepted: Vec<usize>,
}

pub struct ClaimFilter<'a> {
    history: &'a SnapshotHistory,
    filtered_depth: usize,
    zero: FieldElement,
}

impl<'a> ClaimFilter<'a> {
    pub fn new(history: &'a SnapshotHistory, filtered_depth: usize, zero: FieldElement) -> Self {
        Self {
            history,
            filtered_depth,
            zero,
        }
    }

    /// Chain value after every claim in `claims`, in order.
    pub fn claim_chain(claims: &[Claim]) -> Result<Vec<ClaimChain>, TransitionError> {
        let mut chains = Vec::with_capacity(claims.len() + 1);
        let mut chain = [0u8; 32];
        chains.push(chain);
        for (index, claim) in claims.iter().enumerate() {
            let (block, slot) = claim_position(index, claim)?;
            chain = extend_chain(&chain, block, slot, &claim.entry.leaf());
            chains.push(chain);
        }
        Ok(chains)
    }

    pub fn run(&self, claims: &[Claim]) -> Result<FilterOutcome, TransitionError> {
        let chains = Self::claim_chain(claims)?;
        let mut filtered = MerkleTree::new(self.filtered_depth, self.zero.clone())?;
        let history_root = self.history.history_root();
        let [final_hi, final_lo] = split_chain(&chains[claims.len()]);
        let step_in = [
            history_root.to_decimal(),
            final_hi.to_decimal(),
            final_lo.to_decimal(),
            filtered.root().to_decimal(),
            "0".to_string(),
        ];

        let mut rounds = Vec::with_capacity(claims.len());
        let mut accepted = Vec::new();
        let mut credited = BTreeSet::new();
        for index in (0..claims.len()).rev() {
            let claim = &claims[index];
            let [prev_hi, prev_lo] = split_chain(&chains[index]);
            let history_path = self
                .history
                .history_tree()
                .authentication_path(claim.block_number)
                .map_err(|err| TransitionError::InvalidClaim {
                    index,
                    reason: err.to_string(),
                })?;
            if filtered.is_full() {
                return Err(MerkleError::TreeFull.into());
            }
            let filtered_path = filtered.authentication_path(filtered.len())?;

            rounds.push(FilterRound {
                next_claim_chain: [prev_hi.to_decimal(), prev_lo.to_decimal()],
                history_path_elements: decimals(&history_path),
                state_root: claim.proof.root.to_decimal(),
                filtered_path_elements: decimals(&filtered_path),
                address: claim.entry.owner.to_decimal(),
                first_coin: claim.entry.range_start.to_decimal(),
                last_coin: claim.entry.range_end.to_decimal(),
                block_number: claim.block_number.to_string(),
                state_path_elements: decimals(&claim.proof.path_elements),
                state_path_index: claim.state_index.to_string(),
            });

            let status = self.history.claim_status(claim);
            debug!(index, ?status, "filtered claim");
            if status == ClaimStatus::Canonical && credited.insert(claim.state_index) {
                filtered.append(claim.entry.leaf())?;
                accepted.push(index);
            }
        }

        info!(
            claims = claims.len(),
            accepted = accepted.len(),
            filtered_root = %filtered.root(),
            "claim filter complete"
        );
        let expected = [
            history_root.to_decimal(),
            "0".to_string(),
            "0".to_string(),
            filtered.root().to_decimal(),
            filtered.len().to_string(),
        ];
        Ok(FilterOutcome {
            input: FilterChainInput {
                step_in,
                private_inputs: rounds,
                expected: Some(expected),
            },
            filtered,
            accepted,
        })
    }
}

fn claim_position(index: usize, claim: &Claim) -> Result<(u32, u32), TransitionError> {
    let narrow = |value: usize, what: &str| {
        u32::try_from(value).map_err(|_| TransitionError::InvalidClaim {
            index,
            reason: format!("{what} {value} does not fit in 32 bits"),
        })
    };
    Ok((
        narrow(claim.block_number, "block number")?,
        narrow(claim.state_index, "state index")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use state_merkle::AccountEntry;

    fn history() -> SnapshotHistory {
        let mut history = SnapshotHistory::new(3, 3, FieldElement::zero()).unwrap();
        history
            .append_snapshot([
                AccountEntry::from_u64(1234, 0, 10),
                AccountEntry::from_u64(5678, 11, 15),
                AccountEntry::from_u64(9101, 16, 20),
            ])
            .unwrap();
        history
            .append_snapshot([
                AccountEntry::from_u64(1234, 0, 10),
                AccountEntry::from_u64(1234, 11, 15),
                AccountEntry::from_u64(1234, 16, 20),
            ])
            .unwrap();
        history
    }

    #[test]
    fn only_canonical_claims_are_filtered() {
        let history = history();
        let claims = vec![
            history.claim(0, 0).unwrap(),
            history.claim(0, 1).unwrap(),
            history.claim(1, 2).unwrap(),
        ];
        let outcome = ClaimFilter::new(&history, 3, FieldElement::zero())
            .run(&claims)
            .unwrap();
        // Unwound last to first; block 0 slot 1 was reassigned in block 1.
        assert_eq!(outcome.accepted, vec![2, 0]);
        assert_eq!(outcome.filtered.len(), 2);
        assert_eq!(
            outcome.filtered.leaf(0).unwrap(),
            AccountEntry::from_u64(1234, 16, 20).leaf()
        );
        assert_eq!(outcome.input.private_inputs.len(), 3);
        let expected = outcome.input.expected.clone().unwrap();
        assert_eq!(expected[1], "0");
        assert_eq!(expected[4], "2");
        assert_eq!(expected[3], outcome.filtered.root().to_decimal());
    }

    #[test]
    fn rounds_carry_the_previous_chain_value() {
        let history = history();
        let claims = vec![history.claim(0, 0).unwrap(), history.claim(1, 1).unwrap()];
        let chains = ClaimFilter::claim_chain(&claims).unwrap();
        let outcome = ClaimFilter::new(&history, 3, FieldElement::zero())
            .run(&claims)
            .unwrap();

        let [hi, lo] = split_chain(&chains[2]);
        assert_eq!(outcome.input.step_in[1], hi.to_decimal());
        assert_eq!(outcome.input.step_in[2], lo.to_decimal());

        // First round processed is the last claim; it reveals the chain before it.
        let [prev_hi, prev_lo] = split_chain(&chains[1]);
        let round = &outcome.input.private_inputs[0];
        assert_eq!(round.next_claim_chain, [prev_hi.to_decimal(), prev_lo.to_decimal()]);
        assert_eq!(round.block_number, "1");
        assert_eq!(round.state_path_index, "1");
        assert_eq!(
            extend_chain(&chains[1], 1, 1, &claims[1].entry.leaf()),
            chains[2]
        );
        let last = &outcome.input.private_inputs[1];
        assert_eq!(last.next_claim_chain, ["0".to_string(), "0".to_string()]);
    }

    #[test]
    fn tampered_claim_is_chained_but_not_filtered() {
        let history = history();
        let mut claim = history.claim(1, 0).unwrap();
        claim.entry.range_end = FieldElement::from_u64(99);
        let outcome = ClaimFilter::new(&history, 2, FieldElement::zero())
            .run(&[claim])
            .unwrap();
        assert!(outcome.accepted.is_empty());
        assert!(outcome.filtered.is_empty());
        assert_eq!(outcome.input.private_inputs[0].last_coin, "99");
    }

    #[test]
    fn slot_is_credited_once() {
        let history = history();
        let origin = history.claim(0, 0).unwrap();
        let carried = history.claim(1, 0).unwrap();
        let claims = vec![origin.clone(), carried, origin];
        let outcome = ClaimFilter::new(&history, 3, FieldElement::zero())
            .run(&claims)
            .unwrap();
        assert_eq!(outcome.accepted, vec![2]);
        assert_eq!(outcome.filtered.len(), 1);
        assert_eq!(outcome.input.private_inputs.len(), 3);
        assert_eq!(outcome.input.expected.unwrap()[4], "1");
    }

    #[test]
    fn chain_halves_are_128_bits() {
        let [hi, lo] = split_chain(&[0xff; 32]);
        assert_eq!(hi.as_biguint().bits(), 128);
        assert_eq!(lo, hi);
    }

    #[test]
    fn claim_outside_history_capacity_is_rejected() {
        let history = history();
        let mut claim = history.claim(0, 0).unwrap();
        claim.block_number = 8;
        let err = ClaimFilter::new(&history, 3, FieldElement::zero())
            .run(&[claim])
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidClaim { index: 0, .. }));
    }
}
