//! The proof-gated mint pipeline.
//!
//! `preflight (duplicate) -> prove -> package metadata -> build call -> submit`, with the
//! outcome of every run written to the ledger.

use crate::chain::abi::{self, MintParams};
use crate::chain::ChainClient;
use crate::claim::AchievementClaim;
use crate::db::{self, Db, MintRecord};
use crate::errors::{PipelineError, ProofError};
use crate::metadata::MetadataPackager;
use crate::proof_generator::ProofGenerator;
use crate::submitter::{TransactionOutcome, TransactionSubmitter};
use crate::verifier::{ProofVerifier, VerificationMode};
use ark_bn254::Fr;
use chrono::Utc;
use ethers::types::{Address, H256, U256};
use learnchain_zk::encoding::Word;
use learnchain_zk::hashing::{address_to_field, derive_secret, field_to_be_bytes32, student_hash};
use learnchain_zk::types::{CircuitType, FrHex, Requirements};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MintRequest {
    pub claim: AchievementClaim,
    pub requirements: Requirements,
    /// Check the proof with the local verifier before paying for gas.
    #[serde(default)]
    pub verify_locally: bool,
}

/// What a successful run produced besides the transaction outcome.
#[derive(Clone, Debug)]
pub struct MintReceipt {
    pub outcome: TransactionOutcome,
    pub commitment_hash: String,
    pub student_hash: String,
    pub metadata_uri: String,
    pub gateway_url: Option<String>,
}

/// Ledger entry for one run plus the error that ended it, if any.
#[derive(Debug)]
pub struct MintReport {
    pub record: MintRecord,
    pub gateway_url: Option<String>,
    pub error: Option<PipelineError>,
}

/// Claim keys with a mint currently running.
#[derive(Debug, Default)]
struct InFlight {
    keys: Mutex<HashSet<Word>>,
}

impl InFlight {
    fn reserve(&self, key: Word) -> Option<Reservation<'_>> {
        let inserted = self.keys.lock().unwrap_or_else(|e| e.into_inner()).insert(key);
        if inserted { Some(Reservation { owner: self, key }) } else { None }
    }
}

struct Reservation<'a> {
    owner: &'a InFlight,
    key: Word,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.owner.keys.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.key);
    }
}

pub struct MintService {
    generator: ProofGenerator,
    verifier: Arc<ProofVerifier>,
    submitter: TransactionSubmitter,
    metadata: MetadataPackager,
    chain: Arc<dyn ChainClient>,
    contract: Address,
    db: Db,
    secret_key: Word,
    in_flight: InFlight,
}

impl MintService {
    pub fn new(
        generator: ProofGenerator,
        verifier: Arc<ProofVerifier>,
        submitter: TransactionSubmitter,
        metadata: MetadataPackager,
        chain: Arc<dyn ChainClient>,
        contract: Address,
        db: Db,
        secret_key: Word,
    ) -> Self {
        Self {
            generator,
            verifier,
            submitter,
            metadata,
            chain,
            contract,
            db,
            secret_key,
            in_flight: InFlight::default(),
        }
    }

    /// Secret blinding the student hash of `claim`; the same for every claim by this
    /// student in this context.
    pub fn claim_secret(&self, claim: &AchievementClaim) -> Fr {
        derive_secret(&self.secret_key, claim.student.as_fixed_bytes(), claim.context.field())
    }

    /// Contract registry word for `claim`: context, student hash and commitment.
    pub fn usage_key(&self, claim: &AchievementClaim) -> Word {
        let address = address_to_field(claim.student.as_fixed_bytes());
        let student = student_hash(address, self.claim_secret(claim));
        abi::usage_key(
            &field_to_be_bytes32(&claim.context.field()),
            &field_to_be_bytes32(&student),
            &field_to_be_bytes32(&claim.commitment()),
        )
    }

    /// Whether the contract has already accepted a proof for `key`.
    pub async fn is_used_on_chain(&self, key: &Word) -> Result<bool, PipelineError> {
        let data = abi::encode_used_commitment(key);
        let ret = self.chain.call(self.contract, data).await?;
        Ok(abi::decode_bool(&ret)?)
    }

    pub async fn mint(&self, request: &MintRequest) -> Result<MintReceipt, PipelineError> {
        let claim = &request.claim;
        let circuit = claim.circuit();
        let commitment_hex = FrHex::from_fr(&claim.commitment()).hex;
        let student = format!("{:?}", claim.student);
        let key = self.usage_key(claim);

        info!(stage = "preflight", %circuit, context = claim.context.id(), commitment = %commitment_hex, "mint started");
        // Held until this run ends, so a concurrent identical request fails here.
        let Some(_reservation) = self.in_flight.reserve(key) else {
            warn!(commitment = %commitment_hex, "identical mint already in flight");
            return Err(PipelineError::DuplicateProof { commitment: commitment_hex });
        };
        if db::count_confirmed_for_claim(&self.db, &student, claim.context.id(), &commitment_hex).await? > 0
            || self.is_used_on_chain(&key).await?
        {
            warn!(commitment = %commitment_hex, "commitment already used");
            return Err(PipelineError::DuplicateProof { commitment: commitment_hex });
        }

        let generated = self.generator.generate(claim, &request.requirements, self.claim_secret(claim)).await?;

        if circuit == CircuitType::LearningAchievement && generated.public_inputs.is_valid() != Some(true) {
            warn!(commitment = %commitment_hex, "achievement requirements not met");
            return Err(PipelineError::ClaimNotSatisfied);
        }

        if request.verify_locally {
            let valid = self
                .verifier
                .verify(&generated.proof, &generated.public_inputs, circuit, VerificationMode::Local)
                .await?;
            if !valid {
                return Err(ProofError::Verification("local verifier rejected the proof".to_string()).into());
            }
        }

        let metadata = self.metadata.package(claim, &generated).await?;

        let params = MintParams {
            context_id: U256::from_big_endian(&field_to_be_bytes32(&generated.public_inputs.context_id())),
            metadata_uri: metadata.uri.clone(),
            score: U256::from(claim.attributes.score),
            learning_data_hash: H256::from(field_to_be_bytes32(&generated.binding_hash)),
        };
        let calldata = abi::encode_mint(&params, &generated.contract_proof(), &generated.public_inputs);
        info!(stage = "built", calldata_bytes = calldata.len(), "mint call built");

        let outcome = self.submitter.submit(self.contract, calldata).await?;
        info!(
            stage = "confirmed",
            tx_hash = ?outcome.tx_hash,
            token_id = ?outcome.token_id,
            commitment = %commitment_hex,
            "achievement minted"
        );

        Ok(MintReceipt {
            outcome,
            commitment_hash: commitment_hex,
            student_hash: generated.student_hash_hex(),
            metadata_uri: metadata.uri,
            gateway_url: metadata.gateway_url,
        })
    }

    /// Run the pipeline and record the result, successful or not.
    ///
    /// Only a ledger write failure is returned as `Err`; pipeline failures come back in
    /// the report.
    pub async fn execute(&self, request: &MintRequest) -> Result<MintReport, PipelineError> {
        let claim = &request.claim;
        let result = self.mint(request).await;

        let (outcome, metadata_uri, gateway_url, error) = match result {
            Ok(receipt) => (receipt.outcome, Some(receipt.metadata_uri), receipt.gateway_url, None),
            Err(e) => {
                warn!(stage = "failed", error = %e, retryable = e.is_retryable(), "mint failed");
                (TransactionOutcome::from_error(&e), None, None, Some(e))
            }
        };

        let record = MintRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            student: format!("{:?}", claim.student),
            circuit: claim.circuit(),
            context_id: claim.context.id().to_string(),
            commitment_hash: FrHex::from_fr(&claim.commitment()).hex,
            metadata_uri,
            outcome,
        };
        db::insert_mint(&self.db, &record).await?;

        Ok(MintReport { record, gateway_url, error })
    }
}
