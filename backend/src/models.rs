use crate::submitter::TransactionOutcome;
use crate::verifier::VerificationMode;
use chrono::{DateTime, Utc};
use ethers::types::Address;
use learnchain_zk::encoding::ToolchainProof;
use learnchain_zk::types::CircuitType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub address: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub nonce: String,
    /// Exact text the wallet must sign.
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MintResponse {
    pub mint_id: Uuid,
    pub outcome: TransactionOutcome,
    pub commitment_hash: String,
    pub metadata_uri: Option<String>,
    pub metadata_url: Option<String>,

    /// Whether the same request may succeed if sent again later.
    pub retryable: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyProofRequest {
    pub circuit: CircuitType,

    /// `proof.json` as produced by the proving toolchain.
    pub proof: ToolchainProof,

    /// `public.json`: decimal signal strings in circuit order.
    pub public_signals: Vec<String>,

    #[serde(default)]
    pub mode: VerificationMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyProofResponse {
    pub valid: bool,
    pub circuit: CircuitType,
    pub mode: VerificationMode,
}
