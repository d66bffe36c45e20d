use crate::chain::{abi, ChainClient};
use crate::errors::{ChainError, PipelineError, ProofError};
use crate::prover::ProvingBackend;
use ark_bn254::Bn254;
use ark_groth16::Proof;
use ethers::types::Address;
use learnchain_zk::encoding::ContractProof;
use learnchain_zk::types::{CircuitType, PublicInputs};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Advisory check with the proving backend's own verifier.
    #[default]
    Local,
    /// Authoritative check: `eth_call` against the deployed verifier contract.
    OnChain,
}

pub struct ProofVerifier {
    backend: Arc<dyn ProvingBackend>,
    chain: Arc<dyn ChainClient>,
    module_verifier: Address,
    achievement_verifier: Address,
}

impl ProofVerifier {
    pub fn new(
        backend: Arc<dyn ProvingBackend>,
        chain: Arc<dyn ChainClient>,
        module_verifier: Address,
        achievement_verifier: Address,
    ) -> Self {
        Self { backend, chain, module_verifier, achievement_verifier }
    }

    pub fn verifier_address(&self, circuit: CircuitType) -> Address {
        match circuit {
            CircuitType::ModuleProgress => self.module_verifier,
            CircuitType::LearningAchievement => self.achievement_verifier,
        }
    }

    pub async fn verify(
        &self,
        proof: &Proof<Bn254>,
        public_inputs: &PublicInputs,
        circuit: CircuitType,
        mode: VerificationMode,
    ) -> Result<bool, PipelineError> {
        let expected = circuit.public_input_arity();
        if public_inputs.circuit() != circuit || public_inputs.len() != expected {
            return Err(ProofError::ArityMismatch {
                circuit: circuit.to_string(),
                expected,
                got: public_inputs.len(),
            }
            .into());
        }

        let valid = match mode {
            VerificationMode::Local => self.backend.verify(proof, public_inputs).await?,
            VerificationMode::OnChain => {
                let to = self.verifier_address(circuit);
                let data = abi::encode_verify_proof(&ContractProof::from_proof(proof), public_inputs);
                match self.chain.call(to, data).await {
                    Ok(ret) => abi::decode_bool(&ret)?,
                    // Some generated verifiers revert instead of returning false.
                    Err(ChainError::ExecutionReverted(reason)) => {
                        warn!(%to, %reason, "verifier reverted");
                        false
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        debug!(%circuit, ?mode, valid, "proof verification");
        Ok(valid)
    }
}
