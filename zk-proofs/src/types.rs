//! Types shared between the circuits and the host-side pipeline.

use crate::constants::{LEARNING_ACHIEVEMENT_PUBLIC_INPUTS, MAX_SCORE, MODULE_PROGRESS_PUBLIC_INPUTS};
use crate::error::ZkError;
use crate::hashing::{commitment_hash, field_from_decimal, field_to_be_bytes32, field_to_decimal};
use ark_bn254::Fr;
use ark_ff::PrimeField;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Public signal slots common to both circuits.
pub const STUDENT_HASH_SLOT: usize = 0;
pub const COMMITMENT_SLOT: usize = 1;
pub const CONTEXT_SLOT: usize = 2;
pub const MIN_SCORE_SLOT: usize = 3;
pub const BINDING_SLOT: usize = 6;
pub const TIMESTAMP_SLOT: usize = 7;
/// Achievement circuit only.
pub const IS_VALID_SLOT: usize = 8;

/// The two precompiled circuits the pipeline can prove against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitType {
    ModuleProgress,
    LearningAchievement,
}

impl CircuitType {
    pub fn public_input_arity(self) -> usize {
        match self {
            CircuitType::ModuleProgress => MODULE_PROGRESS_PUBLIC_INPUTS,
            CircuitType::LearningAchievement => LEARNING_ACHIEVEMENT_PUBLIC_INPUTS,
        }
    }

    /// File stem of the compiled artifacts (`<stem>.wasm`, `<stem>_final.zkey`, ...).
    pub fn artifact_stem(self) -> &'static str {
        match self {
            CircuitType::ModuleProgress => "module_progress",
            CircuitType::LearningAchievement => "learning_achievement",
        }
    }
}

impl fmt::Display for CircuitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact_stem())
    }
}

/// JSON-friendly representation of a field element.
///
/// `0x`-prefixed, big-endian and zero-padded to 64 hex digits, the same layout as a
/// `uint256`/`bytes32` word on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrHex {
    pub hex: String,
}

impl FrHex {
    pub fn from_fr(x: &Fr) -> Self {
        Self { hex: format!("0x{}", hex::encode(field_to_be_bytes32(x))) }
    }

    pub fn to_fr(&self) -> Result<Fr, ZkError> {
        let digits = self.hex.strip_prefix("0x").unwrap_or(&self.hex);
        let bytes = hex::decode(digits).map_err(|e| ZkError::InvalidFieldElement(format!("invalid hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(ZkError::InvalidFieldElement(format!("expected 32 bytes, got {}", bytes.len())));
        }
        let modulus: BigUint = Fr::MODULUS.into();
        if BigUint::from_bytes_be(&bytes) >= modulus {
            return Err(ZkError::InvalidFieldElement(format!("{} exceeds the field modulus", self.hex)));
        }
        Ok(Fr::from_be_bytes_mod_order(&bytes))
    }
}

/// Thresholds a module completion is proven against. They become public inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRequirements {
    pub min_score: u32,
    pub max_time_seconds: u32,
    pub max_attempts: u32,
}

impl Default for ModuleRequirements {
    fn default() -> Self {
        Self { min_score: 70, max_time_seconds: 7 * 24 * 3600, max_attempts: 5 }
    }
}

/// Thresholds a learning achievement is proven against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementRequirements {
    pub min_score: u32,
    pub min_practice_hours: u32,
    pub min_study_materials: u32,
}

impl Default for AchievementRequirements {
    fn default() -> Self {
        Self { min_score: 80, min_practice_hours: 10, min_study_materials: 3 }
    }
}

/// Which circuit to prove against, with that circuit's public thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "circuit", rename_all = "snake_case")]
pub enum Requirements {
    ModuleProgress(ModuleRequirements),
    LearningAchievement(AchievementRequirements),
}

impl Requirements {
    pub fn circuit(&self) -> CircuitType {
        match self {
            Requirements::ModuleProgress(_) => CircuitType::ModuleProgress,
            Requirements::LearningAchievement(_) => CircuitType::LearningAchievement,
        }
    }

    pub fn min_score(&self) -> u32 {
        match self {
            Requirements::ModuleProgress(r) => r.min_score,
            Requirements::LearningAchievement(r) => r.min_score,
        }
    }
}

/// Private attributes of a claim. Witness values only; never leave the prover.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateAttributes {
    pub score: u32,
    pub time_spent: u32,
    pub attempts: u32,
    pub practice_hours: u32,
    pub study_material_count: u32,
}

impl PrivateAttributes {
    /// Commitment preimage, in the fixed order the given circuit binds.
    pub fn commitment_preimage(&self, circuit: CircuitType) -> Vec<u64> {
        let mut values = vec![self.score as u64, self.time_spent as u64, self.attempts as u64];
        if circuit == CircuitType::LearningAchievement {
            values.push(self.practice_hours as u64);
            values.push(self.study_material_count as u64);
        }
        values
    }

    pub fn commitment(&self, circuit: CircuitType) -> Fr {
        commitment_hash(&self.commitment_preimage(circuit))
    }
}

/// Full signal assignment for one proof: private witness plus public inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitInput {
    pub requirements: Requirements,

    // Private.
    pub address: Fr,
    pub secret: Fr,
    pub attributes: PrivateAttributes,

    // Public.
    pub student_hash: Fr,
    pub commitment_hash: Fr,
    pub context_id: Fr,
    pub binding_hash: Fr,
    pub timestamp: u64,
}

impl CircuitInput {
    pub fn circuit(&self) -> CircuitType {
        self.requirements.circuit()
    }

    /// Reject inputs the circuit's range checks would refuse anyway.
    pub fn validate(&self) -> Result<(), ZkError> {
        if self.attributes.score > MAX_SCORE {
            return Err(ZkError::InvalidInput(format!("score {} exceeds {MAX_SCORE}", self.attributes.score)));
        }
        if self.requirements.min_score() > MAX_SCORE {
            return Err(ZkError::InvalidInput(format!(
                "min score {} exceeds {MAX_SCORE}",
                self.requirements.min_score()
            )));
        }
        Ok(())
    }

    /// Whether the achievement thresholds are met (the circuit's `isValid` output).
    ///
    /// Module-progress proofs have no such output: an unmet threshold makes the witness
    /// unsatisfiable instead.
    pub fn meets_requirements(&self) -> bool {
        let a = &self.attributes;
        match self.requirements {
            Requirements::ModuleProgress(r) => {
                a.score >= r.min_score && a.time_spent <= r.max_time_seconds && a.attempts <= r.max_attempts
            }
            Requirements::LearningAchievement(r) => {
                a.score >= r.min_score
                    && a.practice_hours >= r.min_practice_hours
                    && a.study_material_count >= r.min_study_materials
            }
        }
    }

    /// The public-input vector a correct proof of this input carries.
    ///
    /// ORDERING MUST MATCH the circuits' `new_input` allocation order.
    pub fn expected_public_inputs(&self) -> Result<PublicInputs, ZkError> {
        let mut v = Vec::with_capacity(self.circuit().public_input_arity());
        v.push(self.student_hash);
        v.push(self.commitment_hash);
        v.push(self.context_id);
        match self.requirements {
            Requirements::ModuleProgress(r) => {
                v.push(Fr::from(r.min_score as u64));
                v.push(Fr::from(r.max_time_seconds as u64));
                v.push(Fr::from(r.max_attempts as u64));
            }
            Requirements::LearningAchievement(r) => {
                v.push(Fr::from(r.min_score as u64));
                v.push(Fr::from(r.min_practice_hours as u64));
                v.push(Fr::from(r.min_study_materials as u64));
            }
        }
        v.push(self.binding_hash);
        v.push(Fr::from(self.timestamp));
        if self.circuit() == CircuitType::LearningAchievement {
            v.push(Fr::from(self.meets_requirements() as u64));
        }
        PublicInputs::new(self.circuit(), v)
    }

    /// Input file for the external witness generator (circom signal names, decimal strings).
    pub fn to_toolchain_json(&self) -> Value {
        let d = field_to_decimal::<Fr>;
        let a = &self.attributes;
        match self.requirements {
            Requirements::ModuleProgress(r) => json!({
                "studentAddress": d(&self.address),
                "secret": d(&self.secret),
                "score": a.score.to_string(),
                "timeSpent": a.time_spent.to_string(),
                "attempts": a.attempts.to_string(),
                "studentHash": d(&self.student_hash),
                "commitmentHash": d(&self.commitment_hash),
                "moduleId": d(&self.context_id),
                "minScoreRequired": r.min_score.to_string(),
                "maxTimeAllowed": r.max_time_seconds.to_string(),
                "maxAttemptsAllowed": r.max_attempts.to_string(),
                "learningDataHash": d(&self.binding_hash),
                "timestamp": self.timestamp.to_string(),
            }),
            Requirements::LearningAchievement(r) => json!({
                "studentAddress": d(&self.address),
                "secret": d(&self.secret),
                "score": a.score.to_string(),
                "timeSpent": a.time_spent.to_string(),
                "attempts": a.attempts.to_string(),
                "practiceHours": a.practice_hours.to_string(),
                "studyMaterialCount": a.study_material_count.to_string(),
                "studentHash": d(&self.student_hash),
                "commitmentHash": d(&self.commitment_hash),
                "achievementType": d(&self.context_id),
                "minScoreRequired": r.min_score.to_string(),
                "minPracticeHours": r.min_practice_hours.to_string(),
                "minStudyMaterials": r.min_study_materials.to_string(),
                "sessionHash": d(&self.binding_hash),
                "timestamp": self.timestamp.to_string(),
            }),
        }
    }
}

/// Ordered public inputs of one proof, validated against the circuit's arity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicInputs {
    circuit: CircuitType,
    values: Vec<Fr>,
}

impl PublicInputs {
    pub fn new(circuit: CircuitType, values: Vec<Fr>) -> Result<Self, ZkError> {
        let expected = circuit.public_input_arity();
        if values.len() != expected {
            return Err(ZkError::ArityMismatch { circuit, expected, got: values.len() });
        }
        Ok(Self { circuit, values })
    }

    /// Parse the toolchain's `public.json` signal list.
    pub fn from_decimal_strings(circuit: CircuitType, signals: &[String]) -> Result<Self, ZkError> {
        let values = signals
            .iter()
            .map(|s| field_from_decimal::<Fr>(s))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(circuit, values)
    }

    pub fn circuit(&self) -> CircuitType {
        self.circuit
    }

    pub fn as_slice(&self) -> &[Fr] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn student_hash(&self) -> Fr {
        self.values[STUDENT_HASH_SLOT]
    }

    pub fn commitment_hash(&self) -> Fr {
        self.values[COMMITMENT_SLOT]
    }

    pub fn context_id(&self) -> Fr {
        self.values[CONTEXT_SLOT]
    }

    pub fn binding_hash(&self) -> Fr {
        self.values[BINDING_SLOT]
    }

    /// `Some(flag)` for the achievement circuit, `None` for module progress.
    pub fn is_valid(&self) -> Option<bool> {
        match self.circuit {
            CircuitType::LearningAchievement => Some(self.values[IS_VALID_SLOT] == Fr::from(1u64)),
            CircuitType::ModuleProgress => None,
        }
    }

    pub fn to_decimal_strings(&self) -> Vec<String> {
        self.values.iter().map(field_to_decimal).collect()
    }

    pub fn to_be_words(&self) -> Vec<[u8; 32]> {
        self.values.iter().map(field_to_be_bytes32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input(requirements: Requirements) -> CircuitInput {
        let attributes = PrivateAttributes {
            score: 92,
            time_spent: 1800,
            attempts: 1,
            practice_hours: 12,
            study_material_count: 4,
        };
        CircuitInput {
            requirements,
            address: Fr::from(42u64),
            secret: Fr::from(7u64),
            attributes,
            student_hash: Fr::from(1u64),
            commitment_hash: attributes.commitment(requirements.circuit()),
            context_id: Fr::from(3u64),
            binding_hash: Fr::from(4u64),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn arity_is_enforced() {
        let err = PublicInputs::new(CircuitType::ModuleProgress, vec![Fr::from(0u64); 9]).unwrap_err();
        assert!(matches!(err, ZkError::ArityMismatch { expected: 8, got: 9, .. }));
        assert!(PublicInputs::new(CircuitType::LearningAchievement, vec![Fr::from(0u64); 9]).is_ok());
    }

    #[test]
    fn expected_inputs_have_circuit_arity() {
        let module = sample_input(Requirements::ModuleProgress(ModuleRequirements::default()));
        assert_eq!(module.expected_public_inputs().unwrap().len(), 8);

        let achievement = sample_input(Requirements::LearningAchievement(AchievementRequirements::default()));
        let inputs = achievement.expected_public_inputs().unwrap();
        assert_eq!(inputs.len(), 9);
        assert_eq!(inputs.is_valid(), Some(true));
    }

    #[test]
    fn unmet_achievement_reports_invalid() {
        let mut input = sample_input(Requirements::LearningAchievement(AchievementRequirements::default()));
        input.attributes.practice_hours = 1;
        assert_eq!(input.expected_public_inputs().unwrap().is_valid(), Some(false));
    }

    #[test]
    fn toolchain_json_uses_circuit_signal_names() {
        let input = sample_input(Requirements::ModuleProgress(ModuleRequirements::default()));
        let json = input.to_toolchain_json();
        assert_eq!(json["score"], "92");
        assert_eq!(json["moduleId"], "3");
        assert!(json.get("practiceHours").is_none());

        let input = sample_input(Requirements::LearningAchievement(AchievementRequirements::default()));
        let json = input.to_toolchain_json();
        assert_eq!(json["studyMaterialCount"], "4");
        assert_eq!(json["sessionHash"], "4");
    }

    #[test]
    fn fr_hex_is_padded_big_endian() {
        let h = FrHex::from_fr(&Fr::from(255u64));
        assert_eq!(h.hex.len(), 66);
        assert!(h.hex.ends_with("ff"));
        assert_eq!(h.to_fr().unwrap(), Fr::from(255u64));
    }

    #[test]
    fn scores_above_maximum_are_rejected() {
        let mut input = sample_input(Requirements::ModuleProgress(ModuleRequirements::default()));
        input.attributes.score = 101;
        assert!(input.validate().is_err());
    }
}
