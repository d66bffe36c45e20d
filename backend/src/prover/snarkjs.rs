use super::{ProverOutput, ProvingBackend};
use crate::config::ProverConfig;
use crate::errors::ProofError;
use ark_bn254::Bn254;
use ark_groth16::Proof;
use async_trait::async_trait;
use learnchain_zk::encoding::ToolchainProof;
use learnchain_zk::types::{CircuitInput, CircuitType, PublicInputs};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Compiled circuit files for one circuit.
///
/// Layout: `<circuits_dir>/<stem>/<stem>.wasm`, `<stem>_final.zkey`, `verification_key.json`.
#[derive(Clone, Debug)]
pub struct CircuitArtifacts {
    pub wasm: PathBuf,
    pub zkey: PathBuf,
    pub vkey: PathBuf,
}

impl CircuitArtifacts {
    pub fn locate(circuits_dir: &Path, circuit: CircuitType) -> Self {
        let stem = circuit.artifact_stem();
        let dir = circuits_dir.join(stem);
        Self {
            wasm: dir.join(format!("{stem}.wasm")),
            zkey: dir.join(format!("{stem}_final.zkey")),
            vkey: dir.join("verification_key.json"),
        }
    }
}

fn require(path: &Path) -> Result<(), ProofError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ProofError::CircuitArtifactMissing(path.display().to_string()))
    }
}

struct StepOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl StepOutput {
    fn detail(&self) -> String {
        let text = if self.stderr.trim().is_empty() { &self.stdout } else { &self.stderr };
        text.trim().chars().take(2000).collect()
    }

    /// snarkjs sometimes logs an error and still exits 0.
    fn failed(&self) -> bool {
        !self.success || self.stdout.contains("[ERROR]")
    }
}

/// Drives the snarkjs CLI: witness calculation, then Groth16 proving, each in a
/// per-request scratch directory.
pub struct SnarkjsBackend {
    config: ProverConfig,
    permits: Semaphore,
}

impl SnarkjsBackend {
    pub fn new(config: ProverConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent.max(1));
        Self { config, permits }
    }

    fn scratch_dir(&self, circuit: CircuitType) -> Result<tempfile::TempDir, ProofError> {
        tempfile::Builder::new()
            .prefix(&format!("{}-", circuit.artifact_stem()))
            .tempdir()
            .map_err(|e| ProofError::ProverFailed(format!("scratch dir: {e}")))
    }

    async fn exec(&self, step: &'static str, args: &[&OsStr], limit: Duration) -> Result<StepOutput, ProofError> {
        debug!(step, bin = %self.config.snarkjs_bin, ?args, "running snarkjs");
        let started = Instant::now();

        let mut cmd = Command::new(&self.config.snarkjs_bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ProofError::ProverFailed(format!("failed to start {}: {e}", self.config.snarkjs_bin)));
            }
            Err(_) => {
                warn!(step, timeout_secs = limit.as_secs(), "snarkjs step timed out");
                return Err(ProofError::Timeout { step, secs: limit.as_secs() });
            }
        };

        let out = StepOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if out.failed() {
            warn!(step, status = ?output.status.code(), detail = %out.detail(), "snarkjs step failed");
        } else {
            debug!(step, elapsed_ms = started.elapsed().as_millis() as u64, "snarkjs step done");
        }
        Ok(out)
    }

    async fn read_output(path: &Path) -> Result<Vec<u8>, ProofError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| ProofError::MalformedOutput(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl ProvingBackend for SnarkjsBackend {
    fn name(&self) -> &'static str {
        "snarkjs"
    }

    async fn prove(&self, input: &CircuitInput) -> Result<ProverOutput, ProofError> {
        let circuit = input.circuit();
        let artifacts = CircuitArtifacts::locate(&self.config.circuits_dir, circuit);
        require(&artifacts.wasm)?;
        require(&artifacts.zkey)?;
        input.validate()?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ProofError::ProverFailed("prover pool closed".to_string()))?;

        let scratch = self.scratch_dir(circuit)?;
        let input_path = scratch.path().join("input.json");
        let witness_path = scratch.path().join("witness.wtns");
        let proof_path = scratch.path().join("proof.json");
        let public_path = scratch.path().join("public.json");

        let input_json = serde_json::to_vec(&input.to_toolchain_json())
            .map_err(|e| ProofError::WitnessGenerationFailed(format!("input serialization: {e}")))?;
        tokio::fs::write(&input_path, input_json)
            .await
            .map_err(|e| ProofError::WitnessGenerationFailed(format!("write input: {e}")))?;

        let started = Instant::now();
        let witness = self
            .exec(
                "witness generation",
                &[
                    OsStr::new("wtns"),
                    OsStr::new("calculate"),
                    artifacts.wasm.as_os_str(),
                    input_path.as_os_str(),
                    witness_path.as_os_str(),
                ],
                self.config.witness_timeout,
            )
            .await?;
        if witness.failed() {
            return Err(ProofError::WitnessGenerationFailed(witness.detail()));
        }

        let proving = self
            .exec(
                "proving",
                &[
                    OsStr::new("groth16"),
                    OsStr::new("prove"),
                    artifacts.zkey.as_os_str(),
                    witness_path.as_os_str(),
                    proof_path.as_os_str(),
                    public_path.as_os_str(),
                ],
                self.config.prove_timeout,
            )
            .await?;
        if proving.failed() {
            return Err(ProofError::ProverFailed(proving.detail()));
        }

        let proof = ToolchainProof::from_json(&Self::read_output(&proof_path).await?)?.to_proof()?;
        let signals: Vec<String> = serde_json::from_slice(&Self::read_output(&public_path).await?)
            .map_err(|e| ProofError::MalformedOutput(format!("public.json: {e}")))?;
        let public_inputs = PublicInputs::from_decimal_strings(circuit, &signals)?;

        info!(
            %circuit,
            signals = public_inputs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snarkjs proof generated"
        );
        Ok(ProverOutput { proof, public_inputs })
    }

    async fn verify(&self, proof: &Proof<Bn254>, public_inputs: &PublicInputs) -> Result<bool, ProofError> {
        let circuit = public_inputs.circuit();
        let artifacts = CircuitArtifacts::locate(&self.config.circuits_dir, circuit);
        require(&artifacts.vkey)?;

        let scratch = self.scratch_dir(circuit)?;
        let proof_path = scratch.path().join("proof.json");
        let public_path = scratch.path().join("public.json");

        let proof_json = serde_json::to_vec(&ToolchainProof::from_proof(proof))
            .map_err(|e| ProofError::Verification(e.to_string()))?;
        let public_json = serde_json::to_vec(&public_inputs.to_decimal_strings())
            .map_err(|e| ProofError::Verification(e.to_string()))?;
        tokio::fs::write(&proof_path, proof_json)
            .await
            .map_err(|e| ProofError::Verification(format!("write proof: {e}")))?;
        tokio::fs::write(&public_path, public_json)
            .await
            .map_err(|e| ProofError::Verification(format!("write public: {e}")))?;

        let out = self
            .exec(
                "verification",
                &[
                    OsStr::new("groth16"),
                    OsStr::new("verify"),
                    artifacts.vkey.as_os_str(),
                    public_path.as_os_str(),
                    proof_path.as_os_str(),
                ],
                self.config.prove_timeout,
            )
            .await?;

        if out.stdout.contains("Invalid proof") || out.stderr.contains("Invalid proof") {
            return Ok(false);
        }
        if out.success && out.stdout.contains("OK") {
            return Ok(true);
        }
        Err(ProofError::Verification(out.detail()))
    }

    async fn export_verifying_key(&self, circuit: CircuitType) -> Result<Value, ProofError> {
        let artifacts = CircuitArtifacts::locate(&self.config.circuits_dir, circuit);
        require(&artifacts.vkey)?;
        let bytes = Self::read_output(&artifacts.vkey).await?;
        serde_json::from_slice(&bytes).map_err(|e| ProofError::MalformedOutput(format!("verification_key.json: {e}")))
    }
}
