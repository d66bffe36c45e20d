use super::{ProverOutput, ProvingBackend};
use crate::errors::ProofError;
use ark_bn254::Bn254;
use ark_groth16::{Proof, ProvingKey, VerifyingKey};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use learnchain_zk::groth16::{self, deserialize_pk, deserialize_vk, serialize_pk, serialize_vk, setup_keys};
use learnchain_zk::types::{CircuitInput, CircuitType, PublicInputs};
use rand::rngs::OsRng;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

#[derive(Clone)]
pub struct ZkKeys {
    pub pk: Arc<ProvingKey<Bn254>>,
    pub vk: Arc<VerifyingKey<Bn254>>,
}

/// In-process Groth16 over the R1CS mirror of both circuits.
pub struct ArkworksBackend {
    key_dir: Option<PathBuf>,
    module_keys: OnceCell<ZkKeys>,
    achievement_keys: OnceCell<ZkKeys>,
}

fn io_error(path: &Path, e: std::io::Error) -> ProofError {
    ProofError::ProverFailed(format!("key cache {}: {e}", path.display()))
}

/// Load cached keys, or run setup and cache the result.
///
/// Local setup is a single-party ceremony; deployments that need a shared verifier use
/// the snarkjs backend with ceremony-produced keys instead.
fn load_or_setup(key_dir: Option<&Path>, circuit: CircuitType) -> Result<ZkKeys, ProofError> {
    let Some(dir) = key_dir else {
        let (pk, vk) = setup_keys(circuit, &mut OsRng)?;
        return Ok(ZkKeys { pk: Arc::new(pk), vk: Arc::new(vk) });
    };

    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    let stem = circuit.artifact_stem();
    let pk_path = dir.join(format!("{stem}_pk.bin"));
    let vk_path = dir.join(format!("{stem}_vk.bin"));

    if pk_path.exists() && vk_path.exists() {
        let pk_bytes = std::fs::read(&pk_path).map_err(|e| io_error(&pk_path, e))?;
        let vk_bytes = std::fs::read(&vk_path).map_err(|e| io_error(&vk_path, e))?;
        info!(%circuit, "loaded cached groth16 keys");
        return Ok(ZkKeys { pk: Arc::new(deserialize_pk(&pk_bytes)?), vk: Arc::new(deserialize_vk(&vk_bytes)?) });
    }

    info!(%circuit, "running groth16 setup");
    let (pk, vk) = setup_keys(circuit, &mut OsRng)?;

    std::fs::write(&pk_path, serialize_pk(&pk)?).map_err(|e| io_error(&pk_path, e))?;
    std::fs::write(&vk_path, serialize_vk(&vk)?).map_err(|e| io_error(&vk_path, e))?;

    Ok(ZkKeys { pk: Arc::new(pk), vk: Arc::new(vk) })
}

impl ArkworksBackend {
    /// Keys live in memory only; every process runs its own setup.
    pub fn in_memory() -> Self {
        Self { key_dir: None, module_keys: OnceCell::new(), achievement_keys: OnceCell::new() }
    }

    pub fn with_key_dir(dir: impl Into<PathBuf>) -> Self {
        Self { key_dir: Some(dir.into()), module_keys: OnceCell::new(), achievement_keys: OnceCell::new() }
    }

    pub async fn keys(&self, circuit: CircuitType) -> Result<ZkKeys, ProofError> {
        let cell = match circuit {
            CircuitType::ModuleProgress => &self.module_keys,
            CircuitType::LearningAchievement => &self.achievement_keys,
        };
        let key_dir = self.key_dir.clone();

        cell.get_or_try_init(|| async move {
            tokio::task::spawn_blocking(move || load_or_setup(key_dir.as_deref(), circuit))
                .await
                .map_err(|e| ProofError::ProverFailed(format!("setup task: {e}")))?
        })
        .await
        .cloned()
    }
}

#[async_trait]
impl ProvingBackend for ArkworksBackend {
    fn name(&self) -> &'static str {
        "arkworks"
    }

    async fn prove(&self, input: &CircuitInput) -> Result<ProverOutput, ProofError> {
        let keys = self.keys(input.circuit()).await?;
        let input = input.clone();

        let (proof, public_inputs) = tokio::task::spawn_blocking(move || groth16::prove(&mut OsRng, &keys.pk, &input))
            .await
            .map_err(|e| ProofError::ProverFailed(format!("prover task: {e}")))??;

        Ok(ProverOutput { proof, public_inputs })
    }

    async fn verify(&self, proof: &Proof<Bn254>, public_inputs: &PublicInputs) -> Result<bool, ProofError> {
        let keys = self.keys(public_inputs.circuit()).await?;
        Ok(groth16::verify(&keys.vk, proof, public_inputs)?)
    }

    async fn export_verifying_key(&self, circuit: CircuitType) -> Result<Value, ProofError> {
        let keys = self.keys(circuit).await?;
        let vk_bytes = serialize_vk(keys.vk.as_ref())?;
        Ok(json!({
            "curve": "bn254",
            "proof_system": "groth16",
            "circuit": circuit,
            "vk_b64": STANDARD.encode(vk_bytes),
        }))
    }
}
