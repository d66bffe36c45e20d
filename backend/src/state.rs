use crate::chain::{ChainClient, EthersChain};
use crate::config::{Config, ConfigError};
use crate::db::Db;
use crate::errors::PipelineError;
use crate::health::NetworkHealthMonitor;
use crate::metadata::{MetadataPackager, PinService, PinataClient};
use crate::mint::MintService;
use crate::nonce::NonceManager;
use crate::proof_generator::ProofGenerator;
use crate::prover::{self, ProvingBackend};
use crate::submitter::TransactionSubmitter;
use crate::verifier::ProofVerifier;
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::keccak256;
use std::sync::Arc;
use std::time::Duration;

/// Settings the HTTP layer reads directly.
#[derive(Clone, Debug)]
pub struct ApiSettings {
    pub app_name: String,
    pub api_key: String,
    pub challenge_ttl: Duration,
}

/// External collaborators the pipeline is wired from.
pub struct Services {
    pub chain: Arc<dyn ChainClient>,
    pub prover: Arc<dyn ProvingBackend>,
    pub wallet: LocalWallet,
    pub pin: Option<Arc<dyn PinService>>,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub settings: Arc<ApiSettings>,
    pub mint: Arc<MintService>,
    pub verifier: Arc<ProofVerifier>,
    pub health: Arc<NetworkHealthMonitor>,
    pub prover: Arc<dyn ProvingBackend>,
}

impl AppState {
    pub fn assemble(config: &Config, db: Db, services: Services) -> Self {
        let Services { chain, prover, wallet, pin } = services;
        // Student secrets are keyed off the relayer key.
        let secret_key =
            keccak256([b"learnchain/student-secret".as_slice(), wallet.signer().to_bytes().as_slice()].concat());

        let health = Arc::new(NetworkHealthMonitor::new(chain.clone(), wallet.address(), config.health.clone()));
        let verifier = Arc::new(ProofVerifier::new(
            prover.clone(),
            chain.clone(),
            config.chain.module_verifier,
            config.chain.achievement_verifier,
        ));
        let submitter = TransactionSubmitter::new(
            chain.clone(),
            wallet,
            Arc::new(NonceManager::new()),
            health.clone(),
            config.submit.clone(),
        );

        let mint = MintService::new(
            ProofGenerator::new(prover.clone(), config.app_name.clone()),
            verifier.clone(),
            submitter,
            MetadataPackager::new(config.app_name.clone(), pin),
            chain,
            config.chain.achievement_contract,
            db.clone(),
            secret_key,
        );

        Self {
            db,
            settings: Arc::new(ApiSettings {
                app_name: config.app_name.clone(),
                api_key: config.api_key.clone(),
                challenge_ttl: config.challenge_ttl,
            }),
            mint: Arc::new(mint),
            verifier,
            health,
            prover,
        }
    }

    /// Wire the production collaborators: JSON-RPC chain, configured prover, Pinata.
    pub fn from_config(config: &Config, db: Db) -> Result<Self, PipelineError> {
        let chain = EthersChain::connect(&config.chain.rpc_url, config.chain.rpc_timeout)?;

        let wallet = config
            .chain
            .signer_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| ConfigError::Invalid { key: "SIGNER_PRIVATE_KEY", reason: e.to_string() })?
            .with_chain_id(config.chain.chain_id);

        let pin = match &config.ipfs {
            Some(ipfs) => Some(Arc::new(PinataClient::new(ipfs)?) as Arc<dyn PinService>),
            None => None,
        };

        let services = Services {
            chain: Arc::new(chain),
            prover: prover::from_config(&config.prover, &config.data_dir),
            wallet,
            pin,
        };
        Ok(Self::assemble(config, db, services))
    }
}
