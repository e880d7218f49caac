use std::sync::OnceLock;

use sha3::digest::Digest;
use sha3::Keccak256;

use crate::deterministic::expand_to_field;
use crate::field::FieldElement;

const POSEIDON_WIDTH: usize = 3;
const POSEIDON_ROUNDS: usize = 8;
const POSEIDON_SBOX_EXPONENT: u64 = 5;

type RoundConstants = [[FieldElement; POSEIDON_WIDTH]; POSEIDON_ROUNDS];

fn poseidon_round_constants() -> &'static RoundConstants {
    static CONSTANTS: OnceLock<RoundConstants> = OnceLock::new();
    CONSTANTS.get_or_init(|| {
        let mut constants: RoundConstants = Default::default();
        for (round, round_constants) in constants.iter_mut().enumerate() {
            for (idx, constant) in round_constants.iter_mut().enumerate() {
                *constant = expand_to_field(b"poseidon-constants", &[round as u8, idx as u8]);
            }
        }
        constants
    })
}

fn poseidon_mix(state: &mut [FieldElement; POSEIDON_WIDTH]) {
    const MIX_MATRIX: [[u64; POSEIDON_WIDTH]; POSEIDON_WIDTH] = [[2, 1, 1], [1, 2, 1], [1, 1, 2]];
    let mut new_state: [FieldElement; POSEIDON_WIDTH] = Default::default();
    for (new_slot, mix_row) in new_state.iter_mut().zip(MIX_MATRIX.iter()) {
        let mut acc = FieldElement::zero();
        for (value, coeff) in state.iter().zip(mix_row.iter()) {
            acc = &acc + &(value * &FieldElement::from_u64(*coeff));
        }
        *new_slot = acc;
    }
    *state = new_state;
}

/// Poseidon-style sponge over the scalar field.
///
/// The arity is bound into the initial state, so `hash([a, b])` and
/// `hash([a, b, 0])` never collide. Inputs are already reduced field
/// elements.
///
/// This is not circomlib Poseidon: its round constants and mix matrix are
/// derived locally. Leaves, roots and chain inputs built on it only check
/// against a verifier that uses this same sponge.
pub fn poseidon_hash(inputs: &[FieldElement]) -> FieldElement {
    let constants = poseidon_round_constants();
    let mut state = [
        FieldElement::one(),
        FieldElement::from_u64(inputs.len() as u64),
        FieldElement::zero(),
    ];

    for input in inputs {
        state[0] = &state[0] + input;
        for round_constants in constants.iter() {
            for (state_slot, constant) in state.iter_mut().zip(round_constants.iter()) {
                *state_slot = &*state_slot + constant;
            }
            for state_slot in &mut state {
                *state_slot = state_slot.pow(POSEIDON_SBOX_EXPONENT);
            }
            poseidon_mix(&mut state);
        }
    }

    let [first, _, _] = state;
    first
}

/// Two-to-one compression used for every interior tree node.
pub fn merkle_node(left: &FieldElement, right: &FieldElement) -> FieldElement {
    poseidon_hash(&[left.clone(), right.clone()])
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}
