//! Packaging of ordered witness bundles into a verifier step chain.

use crypto::FieldElement;
use tracing::debug;

use crate::error::TransitionError;
use crate::shape::{decimals, ChainInput, MintChainInput, MintRound, WithdrawChainInput, WithdrawRound};
use crate::witness::{TransitionKind, WitnessBundle};

/// Bundles whose post-state feeds the next bundle's pre-state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessChain {
    kind: TransitionKind,
    initial_state: Vec<FieldElement>,
    final_state: Vec<FieldElement>,
    bundles: Vec<WitnessBundle>,
}

impl WitnessChain {
    pub fn build(bundles: Vec<WitnessBundle>) -> Result<Self, TransitionError> {
        let first = bundles.first().ok_or(TransitionError::EmptyChain)?;
        let kind = first.kind();
        if bundles.iter().any(|bundle| bundle.kind() != kind) {
            return Err(TransitionError::MixedTransitions);
        }
        for (step, pair) in bundles.windows(2).enumerate() {
            if pair[0].post_state() != pair[1].pre_state() {
                return Err(TransitionError::ChainDiscontinuity { step: step + 1 });
            }
        }
        let initial_state = first.pre_state();
        let final_state = bundles
            .last()
            .map(WitnessBundle::post_state)
            .unwrap_or_default();
        debug!(?kind, steps = bundles.len(), "built witness chain");
        Ok(Self {
            kind,
            initial_state,
            final_state,
            bundles,
        })
    }

    /// Convenience over [`WitnessChain::build`] for a homogeneous step list.
    pub fn from_steps<T: Into<WitnessBundle>>(steps: Vec<T>) -> Result<Self, TransitionError> {
        Self::build(steps.into_iter().map(Into::into).collect())
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    pub fn initial_state(&self) -> &[FieldElement] {
        &self.initial_state
    }

    pub fn final_state(&self) -> &[FieldElement] {
        &self.final_state
    }

    pub fn bundles(&self) -> &[WitnessBundle] {
        &self.bundles
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// External representation, with the final roots as `expected`.
    pub fn to_input(&self) -> ChainInput {
        let step_in = decimals(&self.initial_state);
        let expected = decimals(&self.final_state);
        match self.kind {
            TransitionKind::Mint => ChainInput::Mint(MintChainInput {
                step_in: [step_in[0].clone(), step_in[1].clone()],
                private_inputs: self
                    .bundles
                    .iter()
                    .filter_map(|bundle| match bundle {
                        WitnessBundle::Mint(step) => Some(MintRound::from(step)),
                        WitnessBundle::Withdraw(_) => None,
                    })
                    .collect(),
                expected: Some([expected[0].clone(), expected[1].clone()]),
            }),
            TransitionKind::Withdraw => ChainInput::Withdraw(WithdrawChainInput {
                step_in: [step_in[0].clone()],
                private_inputs: self
                    .bundles
                    .iter()
                    .filter_map(|bundle| match bundle {
                        WitnessBundle::Withdraw(step) => Some(WithdrawRound::from(step)),
                        WitnessBundle::Mint(_) => None,
                    })
                    .collect(),
                expected: Some([expected[0].clone()]),
            }),
        }
    }
}
