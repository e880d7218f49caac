use std::fs;
use std::path::Path;

use crypto::FieldElement;
use serde::{Deserialize, Serialize};

use crate::error::NodeResult;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub ledger_depth: usize,
    pub queue_depth: usize,
    pub history_depth: usize,
    pub snapshot_depth: usize,
    pub filtered_depth: usize,
    /// Empty-leaf value shared by every tree, as a decimal string.
    pub zero: FieldElement,
}

impl LedgerConfig {
    /// Read a JSON config. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> NodeResult<Self> {
        let bytes = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn with_depth(depth: usize) -> Self {
        Self {
            ledger_depth: depth,
            queue_depth: depth,
            history_depth: depth,
            snapshot_depth: depth,
            filtered_depth: depth,
            ..Self::default()
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ledger_depth: 3,
            queue_depth: 3,
            history_depth: 3,
            snapshot_depth: 3,
            filtered_depth: 3,
            zero: FieldElement::zero(),
        }
    }
}
