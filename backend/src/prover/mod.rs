//! Proving backends behind one seam.

pub mod arkworks;
pub mod snarkjs;

use crate::config::{ProverConfig, ProverKind};
use crate::errors::ProofError;
use ark_bn254::Bn254;
use ark_groth16::Proof;
use async_trait::async_trait;
use learnchain_zk::types::{CircuitInput, CircuitType, PublicInputs};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

pub use arkworks::ArkworksBackend;
pub use snarkjs::SnarkjsBackend;

#[derive(Clone, Debug)]
pub struct ProverOutput {
    pub proof: Proof<Bn254>,
    pub public_inputs: PublicInputs,
}

#[async_trait]
pub trait ProvingBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compute the witness for `input` and prove it.
    async fn prove(&self, input: &CircuitInput) -> Result<ProverOutput, ProofError>;

    /// Check a proof against the circuit's verifying key.
    async fn verify(&self, proof: &Proof<Bn254>, public_inputs: &PublicInputs) -> Result<bool, ProofError>;

    /// Verifying key in the backend's native format, for independent verification.
    async fn export_verifying_key(&self, circuit: CircuitType) -> Result<Value, ProofError>;
}

pub fn from_config(config: &ProverConfig, data_dir: &Path) -> Arc<dyn ProvingBackend> {
    match config.kind {
        ProverKind::Snarkjs => Arc::new(SnarkjsBackend::new(config.clone())),
        ProverKind::Arkworks => Arc::new(ArkworksBackend::with_key_dir(data_dir.join("keys"))),
    }
}
