use core::cmp::min;
use sha2::{Digest, Sha256};

use crate::field::{FieldElement, FIELD_BYTES};

/// Extra bytes drawn before reduction so the result is close to uniform mod P.
const WIDE_REDUCTION_BYTES: usize = FIELD_BYTES + 16;

/// Expand the provided input into a deterministic byte vector of the requested length.
pub fn expand_to_length(domain: &[u8], input: &[u8], length: usize) -> Vec<u8> {
    let mut counter = 0u32;
    let mut output = Vec::with_capacity(length);
    while output.len() < length {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        hasher.update(counter.to_be_bytes());
        hasher.update(input);
        let digest = hasher.finalize();
        let take = min(length - output.len(), digest.len());
        output.extend_from_slice(&digest[..take]);
        counter = counter.checked_add(1).expect("counter overflow");
    }
    output
}

/// Derive a field element from a domain label and seed material.
pub fn expand_to_field(domain: &[u8], input: &[u8]) -> FieldElement {
    FieldElement::from_be_bytes(&expand_to_length(domain, input, WIDE_REDUCTION_BYTES))
}
