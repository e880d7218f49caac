//! Primitives shared by the range ledger.
//!
//! Everything that touches a tree leaf, a digest or a signature lives in the
//! BN254 scalar field. The hash and signature schemes are exposed through
//! small free functions and the traits in [`traits`], so higher layers never
//! depend on the concrete backends.

pub mod deterministic;
pub mod ecdsa;
pub mod error;
pub mod field;
pub mod hashes;
pub mod limbs;
pub mod traits;

pub use error::CryptoError;
pub use field::FieldElement;
