use batch_circuit::{ChainVerifier, MintQueue, MintRequest, ReplayVerifier, TransitionEngine, WitnessChain};
use crypto::FieldElement;
use proptest::prelude::*;

fn requests(ranges: &[(u64, u64)]) -> Vec<MintRequest> {
    ranges
        .iter()
        .map(|(owner, start)| {
            MintRequest::new(
                FieldElement::from_u64(*owner),
                FieldElement::from_u64(*start),
                FieldElement::from_u64(start + 5),
            )
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn consecutive_mint_batches_replay(
        first in prop::collection::vec((1u64..1_000, 0u64..1_000), 1..5),
        second in prop::collection::vec((1u64..1_000, 0u64..1_000), 1..5),
    ) {
        let zero = FieldElement::zero();
        let mut engine = TransitionEngine::new(4, zero.clone()).unwrap();
        let verifier = ReplayVerifier::new(zero.clone());

        for batch in [first, second] {
            let mut queue = MintQueue::new(3, zero.clone(), requests(&batch)).unwrap();
            let steps = engine.apply_mint(&mut queue).unwrap();
            prop_assert_eq!(steps.len(), batch.len());
            let chain = WitnessChain::from_steps(steps).unwrap();
            let state = verifier.verify(&chain.to_input()).unwrap();
            prop_assert_eq!(&state[1], &engine.root());
        }
    }
}
