#![allow(dead_code)]

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Log, H256, U256};
use ethers::utils::{id, keccak256};
use learnchain_backend::chain::abi::{mint_signature, usage_key, verify_signature, PROOF_MINTED_EVENT, USED_COMMITMENTS};
use learnchain_backend::chain::{ChainClient, FeeSnapshot, ReceiptInfo, SignedTransaction};
use learnchain_backend::claim::{AchievementClaim, ClaimContext};
use learnchain_backend::config::{ChainConfig, Config, HealthConfig, ProverConfig, ProverKind, SubmitConfig};
use learnchain_backend::db::{self, Db};
use learnchain_backend::errors::ChainError;
use learnchain_backend::prover::ArkworksBackend;
use learnchain_backend::state::{AppState, Services};
use learnchain_zk::types::{CircuitType, PrivateAttributes};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

pub const SIGNER_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const STUDENT_KEY: &str = "0123456789012345678901234567890123456789012345678901234567890123";
pub const CHAIN_ID: u64 = 31337;
pub const API_KEY: &str = "test-key";

pub fn achievement_contract() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn module_verifier() -> Address {
    Address::repeat_byte(0xb1)
}

pub fn achievement_verifier() -> Address {
    Address::repeat_byte(0xb2)
}

pub fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::exp10(9)
}

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::exp10(18)
}

pub fn signer() -> LocalWallet {
    SIGNER_KEY.parse::<LocalWallet>().unwrap().with_chain_id(CHAIN_ID)
}

pub fn student_wallet() -> LocalWallet {
    STUDENT_KEY.parse::<LocalWallet>().unwrap()
}

/// When broadcasts get a receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MineMode {
    Immediately,
    Never,
    /// Only the n-th broadcast (1-based) and later are mined.
    FromBroadcast(usize),
}

#[derive(Debug)]
pub struct MockState {
    pub block_number: u64,
    pub base_fee: U256,
    pub priority_fee: U256,
    pub gas_prices: Vec<U256>,
    pub balance: U256,
    pub gas_estimate: U256,
    pub estimate_reverts: bool,
    /// The next n estimates revert.
    pub failing_estimates: usize,
    pub estimate_delay: Duration,
    pub revert_mined: bool,
    pub mine: MineMode,
    pub chain_nonce: U256,
    pub broadcasts: Vec<SignedTransaction>,
    pub receipts: HashMap<H256, ReceiptInfo>,
    pub used_commitments: HashSet<[u8; 32]>,
    pub verifier_result: bool,
    pub verifier_reverts: bool,
    pub next_token_id: u64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            block_number: 100,
            base_fee: gwei(10),
            priority_fee: gwei(2),
            gas_prices: vec![gwei(12)],
            balance: ether(1),
            gas_estimate: U256::from(250_000u64),
            estimate_reverts: false,
            failing_estimates: 0,
            estimate_delay: Duration::ZERO,
            revert_mined: false,
            mine: MineMode::Immediately,
            chain_nonce: U256::zero(),
            broadcasts: Vec::new(),
            receipts: HashMap::new(),
            used_commitments: HashSet::new(),
            verifier_result: true,
            verifier_reverts: false,
            next_token_id: 1,
        }
    }
}

/// In-memory chain: records broadcasts, mines per [`MineMode`], answers the contract
/// calls the pipeline makes.
#[derive(Debug, Default)]
pub struct MockChain {
    pub state: Mutex<MockState>,
}

/// Public signals of a mint call, if `data` is one.
fn mint_signals(data: &[u8]) -> Option<Vec<[u8; 32]>> {
    for circuit in [CircuitType::ModuleProgress, CircuitType::LearningAchievement] {
        if data.len() < 4 || data[..4] != id(&mint_signature(circuit))[..] {
            continue;
        }
        let uint = || Box::new(ParamType::Uint(256));
        let types = [
            ParamType::Tuple(vec![ParamType::Uint(256), ParamType::String, ParamType::Uint(256), ParamType::FixedBytes(32)]),
            ParamType::Tuple(vec![
                ParamType::FixedArray(uint(), 2),
                ParamType::FixedArray(Box::new(ParamType::FixedArray(uint(), 2)), 2),
                ParamType::FixedArray(uint(), 2),
                ParamType::FixedArray(uint(), circuit.public_input_arity()),
            ]),
        ];
        let decoded = abi::decode(&types, &data[4..]).ok()?;
        let Token::Tuple(proof) = &decoded[1] else { return None };
        let Token::FixedArray(signals) = &proof[3] else { return None };
        let words = signals
            .iter()
            .map(|t| {
                let mut word = [0u8; 32];
                if let Token::Uint(v) = t {
                    v.to_big_endian(&mut word);
                }
                word
            })
            .collect();
        return Some(words);
    }
    None
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(f: impl FnOnce(&mut MockState)) -> Arc<Self> {
        let chain = Self::default();
        f(&mut chain.state.lock().unwrap());
        Arc::new(chain)
    }

    pub fn broadcasts(&self) -> Vec<SignedTransaction> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    fn mine(state: &mut MockState, tx: &SignedTransaction) {
        state.block_number += 1;
        state.chain_nonce = state.chain_nonce.max(tx.nonce + 1);

        let mut logs = Vec::new();
        if !state.revert_mined {
            if let Some(signals) = mint_signals(&tx.data) {
                // contextId, studentHash, commitmentHash
                state.used_commitments.insert(usage_key(&signals[2], &signals[0], &signals[1]));
                let token_id = state.next_token_id;
                state.next_token_id += 1;
                logs.push(Log {
                    address: tx.to,
                    topics: vec![
                        H256::from(keccak256(PROOF_MINTED_EVENT)),
                        H256::from(Address::repeat_byte(0x5e)),
                        H256::from_low_u64_be(token_id),
                    ],
                    data: keccak256(&tx.data).to_vec().into(),
                    ..Default::default()
                });
            }
        }

        state.receipts.insert(
            tx.hash,
            ReceiptInfo {
                tx_hash: tx.hash,
                success: !state.revert_mined,
                block_number: state.block_number,
                gas_used: state.gas_estimate,
                logs,
            },
        );
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().unwrap().block_number)
    }

    async fn fee_snapshot(&self) -> Result<FeeSnapshot, ChainError> {
        let s = self.state.lock().unwrap();
        Ok(FeeSnapshot { base_fee: s.base_fee, priority_fee: s.priority_fee })
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        let mut s = self.state.lock().unwrap();
        // Walk the configured sequence, then stay on its last value.
        if s.gas_prices.len() > 1 {
            Ok(s.gas_prices.remove(0))
        } else {
            Ok(s.gas_prices.first().copied().unwrap_or_default())
        }
    }

    async fn balance(&self, _account: Address) -> Result<U256, ChainError> {
        Ok(self.state.lock().unwrap().balance)
    }

    async fn pending_nonce(&self, _account: Address) -> Result<U256, ChainError> {
        let s = self.state.lock().unwrap();
        let pending = s.broadcasts.iter().map(|tx| tx.nonce + 1).max().unwrap_or_default();
        Ok(s.chain_nonce.max(pending))
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> Result<U256, ChainError> {
        let (reverts, delay, estimate) = {
            let mut s = self.state.lock().unwrap();
            let reverts = s.estimate_reverts || s.failing_estimates > 0;
            s.failing_estimates = s.failing_estimates.saturating_sub(1);
            (reverts, s.estimate_delay, s.gas_estimate)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if reverts {
            return Err(ChainError::ExecutionReverted("execution reverted: already minted".into()));
        }
        Ok(estimate)
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<H256, ChainError> {
        let mut s = self.state.lock().unwrap();
        s.broadcasts.push(tx.clone());
        let n = s.broadcasts.len();
        let mine = match s.mine {
            MineMode::Immediately => true,
            MineMode::Never => false,
            MineMode::FromBroadcast(k) => n >= k,
        };
        if mine {
            Self::mine(&mut s, tx);
        }
        Ok(tx.hash)
    }

    async fn receipt(&self, tx_hash: H256) -> Result<Option<ReceiptInfo>, ChainError> {
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let s = self.state.lock().unwrap();
        let selector = &data[..4.min(data.len())];

        if selector == &id(USED_COMMITMENTS)[..] {
            let mut key = [0u8; 32];
            key.copy_from_slice(&data[4..36]);
            return Ok(abi::encode(&[Token::Bool(s.used_commitments.contains(&key))]).into());
        }

        for circuit in [CircuitType::ModuleProgress, CircuitType::LearningAchievement] {
            if selector == &id(&verify_signature(circuit))[..] {
                if s.verifier_reverts {
                    return Err(ChainError::ExecutionReverted("execution reverted".into()));
                }
                return Ok(abi::encode(&[Token::Bool(s.verifier_result)]).into());
            }
        }

        Err(ChainError::ExecutionReverted("unknown selector".into()))
    }
}

pub fn test_config() -> Config {
    Config {
        app_name: "LearnChain".into(),
        bind_addr: "127.0.0.1:0".into(),
        data_dir: std::env::temp_dir(),
        api_key: API_KEY.into(),
        challenge_ttl: Duration::from_secs(600),
        chain: ChainConfig {
            rpc_url: "http://127.0.0.1:8545".into(),
            chain_id: CHAIN_ID,
            signer_key: SIGNER_KEY.into(),
            achievement_contract: achievement_contract(),
            module_verifier: module_verifier(),
            achievement_verifier: achievement_verifier(),
            rpc_timeout: Duration::from_secs(1),
        },
        prover: ProverConfig {
            kind: ProverKind::Arkworks,
            circuits_dir: PathBuf::from("circuits"),
            snarkjs_bin: "snarkjs".into(),
            witness_timeout: Duration::from_secs(5),
            prove_timeout: Duration::from_secs(5),
            max_concurrent: 1,
        },
        submit: SubmitConfig {
            max_attempts: 3,
            receipt_timeout: Duration::from_millis(60),
            receipt_poll: Duration::from_millis(10),
            gas_limit_multiplier: 3,
        },
        health: HealthConfig { congestion_backoff: Duration::from_millis(5), ..HealthConfig::default() },
        ipfs: None,
    }
}

/// One prover per test binary; Groth16 setup is the slow part.
pub fn prover() -> Arc<ArkworksBackend> {
    static PROVER: OnceLock<Arc<ArkworksBackend>> = OnceLock::new();
    PROVER.get_or_init(|| Arc::new(ArkworksBackend::in_memory())).clone()
}

pub async fn test_db() -> Db {
    let db = db::connect_in_memory().await.unwrap();
    db::init_schema(&db).await.unwrap();
    db
}

pub async fn app_state(chain: Arc<MockChain>) -> AppState {
    let services = Services { chain, prover: prover(), wallet: signer(), pin: None };
    AppState::assemble(&test_config(), test_db().await, services)
}

/// The reference module claim: score 92 in 30 minutes on the first attempt.
pub fn module_claim(student: Address, module_id: &str) -> AchievementClaim {
    AchievementClaim {
        student,
        context: ClaimContext::Module { module_id: module_id.into() },
        attributes: PrivateAttributes { score: 92, time_spent: 1800, attempts: 1, ..Default::default() },
        completed_at: 1_700_000_000,
        learning_data_hash: None,
        signature: None,
    }
}

pub fn achievement_claim(student: Address, practice_hours: u32) -> AchievementClaim {
    AchievementClaim {
        student,
        context: ClaimContext::Achievement { achievement_type: "rust-fundamentals".into() },
        attributes: PrivateAttributes {
            score: 88,
            time_spent: 36_000,
            attempts: 2,
            practice_hours,
            study_material_count: 4,
        },
        completed_at: 1_700_000_500,
        learning_data_hash: Some(H256::repeat_byte(0x07)),
        signature: None,
    }
}
