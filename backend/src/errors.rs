use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use ethers::types::H256;
use learnchain_zk::ZkError;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// Failures of the proof generation step, reported to the caller and never retried.
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("circuit artifact missing: {0}")]
    CircuitArtifactMissing(String),

    #[error("witness generation failed: {0}")]
    WitnessGenerationFailed(String),

    #[error("prover failed: {0}")]
    ProverFailed(String),

    #[error("wallet signature does not match the claimed address")]
    SignatureInvalid,

    #[error("{circuit} produced {got} public inputs, expected {expected}")]
    ArityMismatch { circuit: String, expected: usize, got: usize },

    #[error("public signal {slot} does not match the host-derived value")]
    PublicSignalMismatch { slot: &'static str },

    #[error("{step} timed out after {secs}s")]
    Timeout { step: &'static str, secs: u64 },

    #[error("malformed prover output: {0}")]
    MalformedOutput(String),

    #[error("local verification failed: {0}")]
    Verification(String),
}

impl From<ZkError> for ProofError {
    fn from(e: ZkError) -> Self {
        match e {
            ZkError::ArityMismatch { circuit, expected, got } => {
                ProofError::ArityMismatch { circuit: circuit.to_string(), expected, got }
            }
            ZkError::InvalidInput(msg) => ProofError::WitnessGenerationFailed(msg),
            ZkError::InvalidFieldElement(msg) | ZkError::InvalidPoint(msg) | ZkError::Serialization(msg) => {
                ProofError::MalformedOutput(msg)
            }
            ZkError::VerificationFailed => ProofError::Verification("proof rejected".to_string()),
            ZkError::Ark(msg) => ProofError::ProverFailed(msg),
        }
    }
}

/// JSON-RPC and signing failures below the submitter.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("rpc call {0} timed out")]
    Timeout(&'static str),

    #[error("execution reverted: {0}")]
    ExecutionReverted(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ChainError {
    /// Reverts are deterministic; everything else may succeed on another try.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ChainError::ExecutionReverted(_) | ChainError::Signing(_))
    }
}

#[derive(Debug, Error)]
pub enum HealthIssue {
    #[error("signer balance {balance_eth} ETH is below the {required_eth} ETH minimum")]
    InsufficientBalance { balance_eth: String, required_eth: String },

    #[error("network congested: gas price {gas_price_gwei} gwei")]
    Congested { gas_price_gwei: String },
}

/// Error taxonomy of the whole mint pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("proof generation failed: {0}")]
    ProofGeneration(#[from] ProofError),

    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("network unhealthy: {0}")]
    NetworkUnhealthy(#[from] HealthIssue),

    #[error("transaction {tx_hash:?} reverted in block {block_number}")]
    TransactionReverted { tx_hash: H256, block_number: u64 },

    #[error("transaction not confirmed after {attempts} attempts (last hash {last_tx_hash:?})")]
    TransactionTimeout { attempts: u32, last_tx_hash: Option<H256> },

    #[error("proof for commitment {commitment} was already used")]
    DuplicateProof { commitment: String },

    #[error("claim does not meet the achievement requirements")]
    ClaimNotSatisfied,

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("metadata packaging failed: {0}")]
    Metadata(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the caller may try the same request again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::NetworkUnhealthy(HealthIssue::Congested { .. }) => true,
            PipelineError::TransactionTimeout { .. } => true,
            PipelineError::Chain(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            PipelineError::TransactionReverted { tx_hash, .. } => Some(*tx_hash),
            PipelineError::TransactionTimeout { last_tx_hash, .. } => *last_tx_hash,
            _ => None,
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Storage(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error")]
    Internal,
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::ProofGeneration(ProofError::SignatureInvalid)
            | PipelineError::SignatureVerification(_) => ApiError::Unauthorized(e.to_string()),
            PipelineError::ProofGeneration(_) | PipelineError::ClaimNotSatisfied => ApiError::BadRequest(e.to_string()),
            PipelineError::DuplicateProof { .. } | PipelineError::TransactionReverted { .. } => {
                ApiError::Conflict(e.to_string())
            }
            PipelineError::NetworkUnhealthy(_)
            | PipelineError::Chain(_)
            | PipelineError::TransactionTimeout { .. }
            | PipelineError::Metadata(_) => ApiError::Unavailable(e.to_string()),
            other => {
                tracing::error!(error = %other, "pipeline failure");
                ApiError::Internal
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!(error = %e, "database failure");
        ApiError::Internal
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let msg = match &self {
            ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::Unavailable(m) => m.clone(),
            ApiError::Internal => "internal error".to_string(),
        };

        (self.status(), Json(ErrorBody { error: msg })).into_response()
    }
}
