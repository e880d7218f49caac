//! Mint/withdraw transitions over the range ledger and the witness chains
//! handed to the step verifier.
//!
//! ## Key Components
//!
//! - [`TransitionEngine`] - applies mint batches and withdrawals to the ledger tree
//! - [`WitnessChain`] - checks step continuity and renders the verifier input
//! - [`ReplayVerifier`] - native [`ChainVerifier`] that replays every step
//! - [`ClaimFilter`] - filters historical claims into a fresh tree
//!
//! ## Usage
//!
//! ```rust,ignore
//! use batch_circuit::{MintQueue, TransitionEngine, WitnessChain};
//!
//! let mut engine = TransitionEngine::new(3, FieldElement::zero())?;
//! let mut queue = MintQueue::new(3, FieldElement::zero(), requests)?;
//! let steps = engine.apply_mint(&mut queue)?;
//! let input = WitnessChain::from_steps(steps)?.to_input();
//! ```

pub mod chain;
pub mod engine;
pub mod error;
pub mod filter;
pub mod shape;
pub mod verifier;
pub mod witness;

pub use chain::WitnessChain;
pub use engine::{withdrawal_digest, MintQueue, MintRequest, TransitionEngine, WithdrawRequest};
pub use error::TransitionError;
pub use filter::{ClaimFilter, FilterOutcome};
pub use shape::{ChainInput, FilterChainInput, MintChainInput, WithdrawChainInput};
pub use verifier::{ChainVerifier, ReplayVerifier};
pub use witness::{MintState, MintStep, TransitionKind, WithdrawStep, WitnessBundle};
