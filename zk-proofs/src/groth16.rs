//! Groth16 prover/verifier orchestration for the achievement circuits.
//!
//! SECURITY NOTE: keys produced by [`setup_keys`] come from a local, single-party setup.
//! They are for the in-process backend and for tests; production proofs use the
//! ceremony-derived `.zkey` shipped with the compiled circuit.

use crate::circuit::AchievementCircuit;
use crate::error::ZkError;
use crate::hashing::student_hash;
use crate::types::{
    AchievementRequirements, CircuitInput, CircuitType, ModuleRequirements, PrivateAttributes, PublicInputs,
    Requirements,
};
use ark_bn254::{Bn254, Fr};
use ark_groth16::{prepare_verifying_key, Groth16, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::RngCore;

/// A satisfying assignment with every value zero; only its shape matters for setup.
fn placeholder_input(circuit: CircuitType) -> CircuitInput {
    let requirements = match circuit {
        CircuitType::ModuleProgress => {
            Requirements::ModuleProgress(ModuleRequirements { min_score: 0, max_time_seconds: 0, max_attempts: 0 })
        }
        CircuitType::LearningAchievement => Requirements::LearningAchievement(AchievementRequirements {
            min_score: 0,
            min_practice_hours: 0,
            min_study_materials: 0,
        }),
    };
    let zero = Fr::from(0u64);
    CircuitInput {
        requirements,
        address: zero,
        secret: zero,
        attributes: PrivateAttributes::default(),
        student_hash: student_hash(zero, zero),
        commitment_hash: zero,
        context_id: zero,
        binding_hash: zero,
        timestamp: 0,
    }
}

/// Generate a Groth16 keypair for one circuit. Run once per circuit.
pub fn setup_keys(
    circuit: CircuitType,
    rng: &mut impl RngCore,
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ZkError> {
    let circuit = AchievementCircuit::new(placeholder_input(circuit));

    let pk = Groth16::<Bn254>::generate_random_parameters_with_reduction(circuit, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    let vk = pk.vk.clone();
    Ok((pk, vk))
}

/// Synthesize the witness and check every constraint, the way a witness generator would.
///
/// Groth16 proving does not check satisfiability itself, so skipping this would yield a
/// proof that simply fails verification.
pub fn check_witness(input: &CircuitInput) -> Result<(), ZkError> {
    input.validate()?;

    let cs = ConstraintSystem::<Fr>::new_ref();
    AchievementCircuit::new(input.clone())
        .generate_constraints(cs.clone())
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    let satisfied = cs.is_satisfied().map_err(|e| ZkError::Ark(format!("{e}")))?;
    if !satisfied {
        let which = cs
            .which_is_unsatisfied()
            .ok()
            .flatten()
            .unwrap_or_else(|| "unknown constraint".to_string());
        return Err(ZkError::InvalidInput(format!("witness does not satisfy the circuit ({which})")));
    }
    Ok(())
}

/// Prove one claim, returning the proof and its public inputs.
pub fn prove(
    rng: &mut impl RngCore,
    pk: &ProvingKey<Bn254>,
    input: &CircuitInput,
) -> Result<(Proof<Bn254>, PublicInputs), ZkError> {
    check_witness(input)?;
    let public_inputs = input.expected_public_inputs()?;

    let circuit = AchievementCircuit::new(input.clone());
    let proof = Groth16::<Bn254>::create_random_proof_with_reduction(circuit, pk, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    Ok((proof, public_inputs))
}

/// Verify a proof against its public inputs.
pub fn verify(vk: &VerifyingKey<Bn254>, proof: &Proof<Bn254>, public_inputs: &PublicInputs) -> Result<bool, ZkError> {
    let expected = vk.gamma_abc_g1.len().saturating_sub(1);
    if expected != public_inputs.len() {
        return Err(ZkError::ArityMismatch { circuit: public_inputs.circuit(), expected, got: public_inputs.len() });
    }

    let pvk = prepare_verifying_key(vk);
    Groth16::<Bn254>::verify_proof(&pvk, proof, public_inputs.as_slice()).map_err(|e| ZkError::Ark(format!("{e}")))
}

/// Serialize a proving key to bytes.
pub fn serialize_pk(pk: &ProvingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    pk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, ZkError> {
    ProvingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_vk(vk: &VerifyingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    vk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_vk(bytes: &[u8]) -> Result<VerifyingKey<Bn254>, ZkError> {
    VerifyingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}
