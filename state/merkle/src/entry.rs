use crypto::hashes::poseidon_hash;
use crypto::FieldElement;
use serde::{Deserialize, Serialize};

/// A contiguous coin range `[range_start, range_end]` held by `owner`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountEntry {
    pub owner: FieldElement,
    pub range_start: FieldElement,
    pub range_end: FieldElement,
}

impl AccountEntry {
    pub fn new(owner: FieldElement, range_start: FieldElement, range_end: FieldElement) -> Self {
        Self {
            owner,
            range_start,
            range_end,
        }
    }

    pub fn from_u64(owner: u64, range_start: u64, range_end: u64) -> Self {
        Self::new(
            FieldElement::from_u64(owner),
            FieldElement::from_u64(range_start),
            FieldElement::from_u64(range_end),
        )
    }

    /// Tree leaf committed for this entry.
    pub fn leaf(&self) -> FieldElement {
        poseidon_hash(&[
            self.owner.clone(),
            self.range_start.clone(),
            self.range_end.clone(),
        ])
    }

    /// Same range, handed to `owner`.
    pub fn with_owner(&self, owner: FieldElement) -> Self {
        Self {
            owner,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_binds_every_field() {
        let entry = AccountEntry::from_u64(111, 0, 10);
        assert_ne!(entry.leaf(), AccountEntry::from_u64(112, 0, 10).leaf());
        assert_ne!(entry.leaf(), AccountEntry::from_u64(111, 1, 10).leaf());
        assert_ne!(entry.leaf(), AccountEntry::from_u64(111, 0, 11).leaf());
        assert_eq!(entry.with_owner(FieldElement::zero()).leaf(), AccountEntry::from_u64(0, 0, 10).leaf());
    }
}
