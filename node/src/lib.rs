//! Batch driver for the range ledger.
//!
//! Loads request files, runs them through the transition engine or the claim
//! filter, and hands back the verifier's chain input.

pub mod config;
pub mod driver;
pub mod error;

pub use config::LedgerConfig;
pub use error::{NodeError, NodeResult};
