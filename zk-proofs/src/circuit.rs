//! R1CS mirror of the module-progress and learning-achievement circuits.
//!
//! The production proofs come from externally compiled circom artifacts. This module
//! encodes the same public signal layout and the same statements so the pipeline can
//! prove and verify in-process:
//! 1) The prover knows `(address, secret)` with `Poseidon(address, secret) = studentHash`.
//! 2) The private attributes meet the public thresholds. For module progress an unmet
//!    threshold is unsatisfiable; for achievements it drives the public `isValid` output.
//! 3) The commitment, context, binding hash and timestamp are carried as public inputs,
//!    so the proof cannot be replayed against different values.

use crate::constants::{poseidon_config, MAX_SCORE, VALUE_BITS};
use crate::types::{CircuitInput, Requirements};
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

/// Convert little-endian boolean bits into an FpVar.
fn bits_le_to_fp(bits_le: &[Boolean<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    let mut acc = FpVar::<Fr>::constant(Fr::from(0u64));
    let mut coeff = FpVar::<Fr>::constant(Fr::from(1u64));

    for b in bits_le {
        // b ? coeff : 0
        let term = b.select(&coeff, &FpVar::<Fr>::constant(Fr::from(0u64)))?;
        acc += term;
        coeff += coeff.clone();
    }

    Ok(acc)
}

/// Enforce that `v` fits in `n` bits and return its `n` little-endian bits.
fn constrain_bits(v: &FpVar<Fr>, n: usize) -> Result<Vec<Boolean<Fr>>, SynthesisError> {
    let bits = v.to_bits_le()?;
    let low = bits[..n].to_vec();
    let reconstructed = bits_le_to_fp(&low)?;
    reconstructed.enforce_equal(v)?;
    Ok(low)
}

/// Boolean gadget: `a >= b` for operands already constrained to `VALUE_BITS` bits.
fn is_geq(a: &FpVar<Fr>, b: &FpVar<Fr>) -> Result<Boolean<Fr>, SynthesisError> {
    // a - b + 2^n lies in [1, 2^(n+1)); its bit n is set exactly when a >= b.
    let offset = FpVar::<Fr>::constant(Fr::from(1u64 << VALUE_BITS));
    let shifted = a - b + offset;
    let bits = constrain_bits(&shifted, VALUE_BITS + 1)?;
    Ok(bits[VALUE_BITS].clone())
}

fn enforce_geq(a: &FpVar<Fr>, b: &FpVar<Fr>) -> Result<(), SynthesisError> {
    is_geq(a, b)?.enforce_equal(&Boolean::constant(true))
}

/// Circuit for either proof kind; the variant of `input.requirements` selects the statement.
#[derive(Clone, Debug)]
pub struct AchievementCircuit {
    pub input: CircuitInput,
}

impl AchievementCircuit {
    pub fn new(input: CircuitInput) -> Self {
        Self { input }
    }
}

impl ConstraintSynthesizer<Fr> for AchievementCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let input = self.input;

        let (min_score, limit_a, limit_b) = match input.requirements {
            Requirements::ModuleProgress(r) => (r.min_score, r.max_time_seconds, r.max_attempts),
            Requirements::LearningAchievement(r) => (r.min_score, r.min_practice_hours, r.min_study_materials),
        };

        // --- Public inputs ---
        // IMPORTANT: ordering MUST match `CircuitInput::expected_public_inputs`.
        let student_hash = FpVar::<Fr>::new_input(cs.clone(), || Ok(input.student_hash))?;
        let commitment = FpVar::<Fr>::new_input(cs.clone(), || Ok(input.commitment_hash))?;
        let context_id = FpVar::<Fr>::new_input(cs.clone(), || Ok(input.context_id))?;
        let min_score = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(min_score as u64)))?;
        let limit_a = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(limit_a as u64)))?;
        let limit_b = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(limit_b as u64)))?;
        let binding = FpVar::<Fr>::new_input(cs.clone(), || Ok(input.binding_hash))?;
        let timestamp = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(input.timestamp)))?;

        // --- Witness ---
        let address = FpVar::<Fr>::new_witness(cs.clone(), || Ok(input.address))?;
        let secret = FpVar::<Fr>::new_witness(cs.clone(), || Ok(input.secret))?;
        let attrs = input.attributes;
        let score = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(attrs.score as u64)))?;

        for v in [&score, &min_score, &limit_a, &limit_b] {
            constrain_bits(v, VALUE_BITS)?;
        }
        enforce_geq(&FpVar::<Fr>::constant(Fr::from(MAX_SCORE as u64)), &score)?;

        // Student identity binding.
        let poseidon_cfg = poseidon_config();
        let mut sponge = PoseidonSpongeVar::<Fr>::new(cs.clone(), &poseidon_cfg);
        sponge.absorb(&vec![address, secret])?;
        let derived = sponge.squeeze_field_elements(1)?[0].clone();
        derived.enforce_equal(&student_hash)?;

        // Pass-through inputs appear in no other constraint; squaring ties each one
        // into the system so it cannot be swapped after proving.
        for v in [&commitment, &context_id, &binding, &timestamp] {
            let _ = v.square()?;
        }

        match input.requirements {
            Requirements::ModuleProgress(_) => {
                let time_spent = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(attrs.time_spent as u64)))?;
                let attempts = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(attrs.attempts as u64)))?;
                constrain_bits(&time_spent, VALUE_BITS)?;
                constrain_bits(&attempts, VALUE_BITS)?;

                enforce_geq(&score, &min_score)?;
                enforce_geq(&limit_a, &time_spent)?;
                enforce_geq(&limit_b, &attempts)?;
            }
            Requirements::LearningAchievement(_) => {
                let is_valid_value = Fr::from(input.meets_requirements() as u64);
                let is_valid = FpVar::<Fr>::new_input(cs.clone(), || Ok(is_valid_value))?;

                let practice = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(attrs.practice_hours as u64)))?;
                let materials =
                    FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(attrs.study_material_count as u64)))?;
                constrain_bits(&practice, VALUE_BITS)?;
                constrain_bits(&materials, VALUE_BITS)?;

                let ok = Boolean::kary_and(&[
                    is_geq(&score, &min_score)?,
                    is_geq(&practice, &limit_a)?,
                    is_geq(&materials, &limit_b)?,
                ])?;
                FpVar::from(ok).enforce_equal(&is_valid)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{commitment_hash, student_hash};
    use crate::types::{AchievementRequirements, ModuleRequirements, PrivateAttributes};
    use ark_relations::r1cs::ConstraintSystem;

    fn input(requirements: Requirements, attributes: PrivateAttributes) -> CircuitInput {
        let address = Fr::from(0xabcdu64);
        let secret = Fr::from(99u64);
        CircuitInput {
            requirements,
            address,
            secret,
            attributes,
            student_hash: student_hash(address, secret),
            commitment_hash: commitment_hash(&attributes.commitment_preimage(requirements.circuit())),
            context_id: Fr::from(5u64),
            binding_hash: Fr::from(6u64),
            timestamp: 1_700_000_000,
        }
    }

    fn satisfied(input: CircuitInput) -> bool {
        let cs = ConstraintSystem::<Fr>::new_ref();
        AchievementCircuit::new(input).generate_constraints(cs.clone()).unwrap();
        cs.is_satisfied().unwrap()
    }

    fn passing() -> PrivateAttributes {
        PrivateAttributes { score: 92, time_spent: 1800, attempts: 1, practice_hours: 12, study_material_count: 4 }
    }

    #[test]
    fn module_progress_accepts_passing_claim() {
        let reqs = Requirements::ModuleProgress(ModuleRequirements { min_score: 80, ..Default::default() });
        assert!(satisfied(input(reqs, passing())));
    }

    #[test]
    fn module_progress_rejects_low_score() {
        let reqs = Requirements::ModuleProgress(ModuleRequirements { min_score: 95, ..Default::default() });
        assert!(!satisfied(input(reqs, passing())));
    }

    #[test]
    fn module_progress_rejects_too_many_attempts() {
        let reqs = Requirements::ModuleProgress(ModuleRequirements { max_attempts: 0, ..Default::default() });
        assert!(!satisfied(input(reqs, passing())));
    }

    #[test]
    fn wrong_student_hash_is_unsatisfiable() {
        let reqs = Requirements::ModuleProgress(ModuleRequirements::default());
        let mut i = input(reqs, passing());
        i.student_hash = Fr::from(1u64);
        assert!(!satisfied(i));
    }

    #[test]
    fn achievement_is_valid_tracks_thresholds() {
        let reqs = Requirements::LearningAchievement(AchievementRequirements::default());
        assert!(satisfied(input(reqs, passing())));

        // Unmet thresholds still satisfy the circuit; they only flip `isValid` to 0.
        let weak = PrivateAttributes { practice_hours: 2, ..passing() };
        let i = input(reqs, weak);
        assert!(!i.meets_requirements());
        assert!(satisfied(i));
    }

    #[test]
    fn score_above_maximum_is_unsatisfiable() {
        let reqs = Requirements::ModuleProgress(ModuleRequirements::default());
        let over = PrivateAttributes { score: 101, ..passing() };
        assert!(!satisfied(input(reqs, over)));
    }
}
