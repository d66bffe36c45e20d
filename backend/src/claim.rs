use ark_bn254::Fr;
use ethers::types::{Address, H256};
use learnchain_zk::hashing::id_to_field;
use learnchain_zk::types::{CircuitType, PrivateAttributes};
use serde::{Deserialize, Serialize};

/// What the claim is about: one module, or a cross-module achievement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimContext {
    Module { module_id: String },
    Achievement { achievement_type: String },
}

impl ClaimContext {
    pub fn id(&self) -> &str {
        match self {
            ClaimContext::Module { module_id } => module_id,
            ClaimContext::Achievement { achievement_type } => achievement_type,
        }
    }

    pub fn circuit(&self) -> CircuitType {
        match self {
            ClaimContext::Module { .. } => CircuitType::ModuleProgress,
            ClaimContext::Achievement { .. } => CircuitType::LearningAchievement,
        }
    }

    pub fn field(&self) -> Fr {
        id_to_field(self.id())
    }
}

/// Proof that the student controls `student`: a signed challenge nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSignature {
    pub nonce: String,
    pub signature: String,
}

/// A student's claim to a completed module or achievement.
///
/// `attributes` are the private performance values; they go into the witness and the
/// commitment and nowhere else.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementClaim {
    pub student: Address,
    pub context: ClaimContext,
    pub attributes: PrivateAttributes,
    pub completed_at: u64,
    #[serde(default)]
    pub learning_data_hash: Option<H256>,
    #[serde(default)]
    pub signature: Option<WalletSignature>,
}

impl AchievementClaim {
    pub fn circuit(&self) -> CircuitType {
        self.context.circuit()
    }

    pub fn commitment(&self) -> Fr {
        self.attributes.commitment(self.circuit())
    }
}
