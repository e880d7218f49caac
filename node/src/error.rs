use batch_circuit::TransitionError;
use crypto::CryptoError;
use state_history::HistoryError;
use state_merkle::MerkleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transition error: {0}")]
    Transition(#[from] TransitionError),
    #[error("history error: {0}")]
    History(#[from] HistoryError),
    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type NodeResult<T> = Result<T, NodeError>;
