use crate::types::CircuitType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZkError {
    #[error("{circuit} circuit expects {expected} public inputs, got {got}")]
    ArityMismatch {
        circuit: CircuitType,
        expected: usize,
        got: usize,
    },

    #[error("invalid field element: {0}")]
    InvalidFieldElement(String),

    #[error("invalid curve point: {0}")]
    InvalidPoint(String),

    #[error("invalid circuit input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("proof verification failed")]
    VerificationFailed,

    #[error("arkworks error: {0}")]
    Ark(String),
}
