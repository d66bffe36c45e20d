use crate::claim::AchievementClaim;
use crate::errors::ProofError;
use crate::prover::ProvingBackend;
use crate::signature::verify_challenge;
use ark_bn254::{Bn254, Fr};
use ark_groth16::Proof;
use learnchain_zk::encoding::ContractProof;
use learnchain_zk::hashing::{address_to_field, fr_from_be_bytes, session_hash, student_hash};
use learnchain_zk::types::{CircuitInput, CircuitType, FrHex, PublicInputs, Requirements};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A proof plus the host-derived values it was checked against.
#[derive(Clone, Debug)]
pub struct GeneratedProof {
    pub proof: Proof<Bn254>,
    pub public_inputs: PublicInputs,
    pub commitment_hash: Fr,
    pub student_hash: Fr,
    pub binding_hash: Fr,
}

impl GeneratedProof {
    pub fn circuit(&self) -> CircuitType {
        self.public_inputs.circuit()
    }

    pub fn commitment_hex(&self) -> String {
        FrHex::from_fr(&self.commitment_hash).hex
    }

    pub fn student_hash_hex(&self) -> String {
        FrHex::from_fr(&self.student_hash).hex
    }

    pub fn contract_proof(&self) -> ContractProof {
        ContractProof::from_proof(&self.proof)
    }
}

pub struct ProofGenerator {
    backend: Arc<dyn ProvingBackend>,
    app_name: String,
}

impl ProofGenerator {
    pub fn new(backend: Arc<dyn ProvingBackend>, app_name: impl Into<String>) -> Self {
        Self { backend, app_name: app_name.into() }
    }

    pub fn backend(&self) -> &Arc<dyn ProvingBackend> {
        &self.backend
    }

    /// Assemble the full signal assignment for a claim. Deterministic in its arguments.
    pub fn build_input(
        &self,
        claim: &AchievementClaim,
        requirements: &Requirements,
        secret: Fr,
    ) -> Result<CircuitInput, ProofError> {
        if claim.circuit() != requirements.circuit() {
            return Err(ProofError::WitnessGenerationFailed(format!(
                "{} claim paired with {} requirements",
                claim.circuit(),
                requirements.circuit()
            )));
        }

        let address_bytes = claim.student.as_fixed_bytes();
        let address = address_to_field(address_bytes);
        let context_id = claim.context.field();
        let binding_hash = match claim.learning_data_hash {
            Some(hash) => fr_from_be_bytes(hash.as_bytes()),
            None => session_hash(address_bytes, context_id, claim.completed_at, secret),
        };

        Ok(CircuitInput {
            requirements: *requirements,
            address,
            secret,
            attributes: claim.attributes,
            student_hash: student_hash(address, secret),
            commitment_hash: claim.commitment(),
            context_id,
            binding_hash,
            timestamp: claim.completed_at,
        })
    }

    pub async fn generate(
        &self,
        claim: &AchievementClaim,
        requirements: &Requirements,
        secret: Fr,
    ) -> Result<GeneratedProof, ProofError> {
        if let Some(sig) = &claim.signature {
            if !verify_challenge(&self.app_name, claim.student, &sig.nonce, &sig.signature) {
                warn!(student = %claim.student, "challenge signature rejected");
                return Err(ProofError::SignatureInvalid);
            }
        }

        let input = self.build_input(claim, requirements, secret)?;
        let started = Instant::now();
        let output = self.backend.prove(&input).await?;

        let public_inputs = output.public_inputs;
        let expected = input.circuit().public_input_arity();
        if public_inputs.circuit() != input.circuit() || public_inputs.len() != expected {
            return Err(ProofError::ArityMismatch {
                circuit: input.circuit().to_string(),
                expected,
                got: public_inputs.len(),
            });
        }

        let checks = [
            ("studentHash", public_inputs.student_hash(), input.student_hash),
            ("commitmentHash", public_inputs.commitment_hash(), input.commitment_hash),
            ("contextId", public_inputs.context_id(), input.context_id),
            ("bindingHash", public_inputs.binding_hash(), input.binding_hash),
        ];
        for (slot, got, want) in checks {
            if got != want {
                warn!(slot, backend = self.backend.name(), "public signal differs from host value");
                return Err(ProofError::PublicSignalMismatch { slot });
            }
        }

        let generated = GeneratedProof {
            proof: output.proof,
            public_inputs,
            commitment_hash: input.commitment_hash,
            student_hash: input.student_hash,
            binding_hash: input.binding_hash,
        };

        info!(
            circuit = %generated.circuit(),
            context = claim.context.id(),
            commitment = %generated.commitment_hex(),
            backend = self.backend.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "proof generated"
        );
        Ok(generated)
    }
}
