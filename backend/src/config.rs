//! Service configuration, read once from the environment at startup.

use ethers::types::{Address, U256};
use ethers::utils::{parse_ether, parse_units};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Which proving backend the generator talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProverKind {
    /// External snarkjs CLI against compiled circom artifacts.
    Snarkjs,
    /// In-process arkworks prover (local keys).
    Arkworks,
}

#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub signer_key: String,
    pub achievement_contract: Address,
    pub module_verifier: Address,
    pub achievement_verifier: Address,
    pub rpc_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ProverConfig {
    pub kind: ProverKind,
    pub circuits_dir: PathBuf,
    pub snarkjs_bin: String,
    pub witness_timeout: Duration,
    pub prove_timeout: Duration,
    pub max_concurrent: usize,
}

#[derive(Clone, Debug)]
pub struct SubmitConfig {
    pub max_attempts: u32,
    pub receipt_timeout: Duration,
    pub receipt_poll: Duration,
    pub gas_limit_multiplier: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            receipt_timeout: Duration::from_secs(300),
            receipt_poll: Duration::from_secs(2),
            gas_limit_multiplier: 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthConfig {
    pub min_balance_wei: U256,
    pub congestion_gas_price_wei: U256,
    pub congestion_waits: u32,
    pub congestion_backoff: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            // 0.01 ETH
            min_balance_wei: U256::exp10(16),
            // 50 gwei
            congestion_gas_price_wei: U256::from(50u64) * U256::exp10(9),
            congestion_waits: 3,
            congestion_backoff: Duration::from_secs(15),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IpfsConfig {
    pub pinata_jwt: String,
    pub api_url: String,
    pub gateway: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub app_name: String,
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub api_key: String,
    pub challenge_ttl: Duration,
    pub chain: ChainConfig,
    pub prover: ProverConfig,
    pub submit: SubmitConfig,
    pub health: HealthConfig,
    pub ipfs: Option<IpfsConfig>,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn optional(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn parsed<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    optional(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::Invalid { key, reason: e.to_string() })
}

fn address(key: &'static str) -> Result<Address, ConfigError> {
    Address::from_str(&required(key)?).map_err(|e| ConfigError::Invalid { key, reason: e.to_string() })
}

impl Config {
    /// Load `.env` (if present) and read every setting; a missing chain setting is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let chain = ChainConfig {
            rpc_url: required("RPC_URL")?,
            chain_id: parsed("CHAIN_ID", "31337")?,
            signer_key: required("SIGNER_PRIVATE_KEY")?,
            achievement_contract: address("ACHIEVEMENT_CONTRACT")?,
            module_verifier: address("MODULE_VERIFIER_CONTRACT")?,
            achievement_verifier: address("ACHIEVEMENT_VERIFIER_CONTRACT")?,
            rpc_timeout: Duration::from_secs(parsed("RPC_TIMEOUT_SECS", "30")?),
        };

        let kind = match optional("PROVER_BACKEND", "snarkjs").to_ascii_lowercase().as_str() {
            "snarkjs" => ProverKind::Snarkjs,
            "arkworks" => ProverKind::Arkworks,
            other => {
                return Err(ConfigError::Invalid {
                    key: "PROVER_BACKEND",
                    reason: format!("expected snarkjs or arkworks, got {other}"),
                });
            }
        };

        let prover = ProverConfig {
            kind,
            circuits_dir: PathBuf::from(optional("CIRCUITS_DIR", "circuits")),
            snarkjs_bin: optional("SNARKJS_BIN", "snarkjs"),
            witness_timeout: Duration::from_secs(parsed("WITNESS_TIMEOUT_SECS", "60")?),
            prove_timeout: Duration::from_secs(parsed("PROVE_TIMEOUT_SECS", "120")?),
            max_concurrent: parsed("MAX_CONCURRENT_PROOFS", "2")?,
        };
        if prover.max_concurrent == 0 {
            return Err(ConfigError::Invalid { key: "MAX_CONCURRENT_PROOFS", reason: "must be at least 1".into() });
        }

        let submit = SubmitConfig {
            receipt_timeout: Duration::from_secs(parsed("RECEIPT_TIMEOUT_SECS", "300")?),
            receipt_poll: Duration::from_millis(parsed("RECEIPT_POLL_MS", "2000")?),
            ..SubmitConfig::default()
        };

        let min_balance = optional("MIN_BALANCE_ETH", "0.01");
        let congestion = optional("CONGESTION_GWEI", "50");
        let health = HealthConfig {
            min_balance_wei: parse_ether(&min_balance)
                .map_err(|e| ConfigError::Invalid { key: "MIN_BALANCE_ETH", reason: e.to_string() })?,
            congestion_gas_price_wei: parse_units(&congestion, "gwei")
                .map_err(|e| ConfigError::Invalid { key: "CONGESTION_GWEI", reason: e.to_string() })?
                .into(),
            ..HealthConfig::default()
        };

        let ipfs = env::var("PINATA_JWT").ok().filter(|v| !v.is_empty()).map(|jwt| IpfsConfig {
            pinata_jwt: jwt,
            api_url: optional("PINATA_API_URL", "https://api.pinata.cloud"),
            gateway: optional("IPFS_GATEWAY", "https://gateway.pinata.cloud"),
        });

        Ok(Self {
            app_name: optional("APP_NAME", "LearnChain"),
            bind_addr: optional("BACKEND_ADDR", "127.0.0.1:8080"),
            data_dir: PathBuf::from(optional("DATA_DIR", "data")),
            api_key: optional("API_KEY", "dev-secret-key"),
            challenge_ttl: Duration::from_secs(parsed("CHALLENGE_TTL_SECS", "600")?),
            chain,
            prover,
            submit,
            health,
            ipfs,
        })
    }
}
