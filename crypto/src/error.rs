use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid length: expected {expected} bytes, found {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("verification failed")]
    VerificationFailed,

    #[error("invalid key")]
    InvalidKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid field encoding: {0}")]
    InvalidEncoding(String),

    #[error("value needs {bits} bits, limb decomposition holds at most 256")]
    ValueTooWide { bits: u64 },
}
