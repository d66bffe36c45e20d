#![cfg(unix)]

mod common;

use ark_bn254::Fr;
use common::*;
use ethers::signers::Signer;
use learnchain_backend::config::{ProverConfig, ProverKind};
use learnchain_backend::errors::ProofError;
use learnchain_backend::proof_generator::ProofGenerator;
use learnchain_backend::prover::{ProvingBackend, SnarkjsBackend};
use learnchain_zk::encoding::ToolchainProof;
use learnchain_zk::types::{CircuitType, ModuleRequirements, PublicInputs, Requirements};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn requirements() -> Requirements {
    Requirements::ModuleProgress(ModuleRequirements { min_score: 80, ..ModuleRequirements::default() })
}

/// Circuit directory with placeholder artifacts and a fake CLI running `script`.
fn workspace(script: &str) -> (TempDir, ProverConfig) {
    let dir = tempfile::tempdir().unwrap();
    let circuit_dir = dir.path().join("circuits").join("module_progress");
    std::fs::create_dir_all(&circuit_dir).unwrap();
    std::fs::write(circuit_dir.join("module_progress.wasm"), b"wasm").unwrap();
    std::fs::write(circuit_dir.join("module_progress_final.zkey"), b"zkey").unwrap();
    std::fs::write(circuit_dir.join("verification_key.json"), br#"{"protocol":"groth16","nPublic":8}"#).unwrap();

    let bin = dir.path().join("snarkjs");
    std::fs::write(&bin, format!("#!/bin/sh\n{script}\n")).unwrap();
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = ProverConfig {
        kind: ProverKind::Snarkjs,
        circuits_dir: dir.path().join("circuits"),
        snarkjs_bin: bin.to_string_lossy().into_owned(),
        witness_timeout: Duration::from_secs(5),
        prove_timeout: Duration::from_secs(5),
        max_concurrent: 2,
    };
    (dir, config)
}

/// A real proof for the reference claim, written where the fake CLI copies it from.
async fn fixture(dir: &Path, secret: Fr) -> PathBuf {
    let claim = module_claim(student_wallet().address(), "m1");
    let generated = ProofGenerator::new(prover(), "LearnChain").generate(&claim, &requirements(), secret).await.unwrap();

    let fixture = dir.join("fixture");
    std::fs::create_dir_all(&fixture).unwrap();
    std::fs::write(fixture.join("proof.json"), serde_json::to_vec(&ToolchainProof::from_proof(&generated.proof)).unwrap())
        .unwrap();
    std::fs::write(
        fixture.join("public.json"),
        serde_json::to_vec(&generated.public_inputs.to_decimal_strings()).unwrap(),
    )
    .unwrap();
    fixture
}

fn replaying(fixture: &Path) -> String {
    format!(
        r#"case "$1 $2" in
  "wtns calculate") echo witness > "$5" ;;
  "groth16 prove") cp "{f}/proof.json" "$5" && cp "{f}/public.json" "$6" ;;
  "groth16 verify") echo "[INFO]  snarkJS: OK!" ;;
esac"#,
        f = fixture.display()
    )
}

#[tokio::test]
async fn proves_through_the_cli() {
    let secret = Fr::from(21u64);
    let (dir, mut config) = workspace("exit 1");
    let fixture = fixture(dir.path(), secret).await;
    std::fs::write(&config.snarkjs_bin, format!("#!/bin/sh\n{}\n", replaying(&fixture))).unwrap();
    config.max_concurrent = 1;

    let backend: Arc<dyn ProvingBackend> = Arc::new(SnarkjsBackend::new(config));
    let generator = ProofGenerator::new(backend.clone(), "LearnChain");
    let claim = module_claim(student_wallet().address(), "m1");

    let generated = generator.generate(&claim, &requirements(), secret).await.unwrap();
    assert_eq!(generated.public_inputs.len(), 8);
    assert!(backend.verify(&generated.proof, &generated.public_inputs).await.unwrap());
}

#[tokio::test]
async fn signals_for_another_witness_are_rejected() {
    let (dir, config) = workspace("exit 1");
    let fixture = fixture(dir.path(), Fr::from(1u64)).await;
    std::fs::write(&config.snarkjs_bin, format!("#!/bin/sh\n{}\n", replaying(&fixture))).unwrap();

    let generator = ProofGenerator::new(Arc::new(SnarkjsBackend::new(config)), "LearnChain");
    let claim = module_claim(student_wallet().address(), "m1");

    let err = generator.generate(&claim, &requirements(), Fr::from(2u64)).await.unwrap_err();
    assert!(matches!(err, ProofError::PublicSignalMismatch { slot: "studentHash" }));
}

#[tokio::test]
async fn error_in_output_fails_even_with_exit_zero() {
    let (_dir, config) = workspace(r#"echo "[ERROR] snarkJS: Assert Failed"; exit 0"#);
    let generator = ProofGenerator::new(Arc::new(SnarkjsBackend::new(config)), "LearnChain");
    let claim = module_claim(student_wallet().address(), "m1");

    let err = generator.generate(&claim, &requirements(), Fr::from(2u64)).await.unwrap_err();
    match err {
        ProofError::WitnessGenerationFailed(detail) => assert!(detail.contains("Assert Failed")),
        other => panic!("expected witness failure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_artifacts_are_reported() {
    let (dir, config) = workspace("exit 0");
    std::fs::remove_file(dir.path().join("circuits/module_progress/module_progress_final.zkey")).unwrap();
    let generator = ProofGenerator::new(Arc::new(SnarkjsBackend::new(config)), "LearnChain");
    let claim = module_claim(student_wallet().address(), "m1");

    let err = generator.generate(&claim, &requirements(), Fr::from(2u64)).await.unwrap_err();
    match err {
        ProofError::CircuitArtifactMissing(path) => assert!(path.ends_with("module_progress_final.zkey")),
        other => panic!("expected missing artifact, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_witness_step_times_out() {
    let (_dir, mut config) = workspace("sleep 5");
    config.witness_timeout = Duration::from_millis(200);
    let generator = ProofGenerator::new(Arc::new(SnarkjsBackend::new(config)), "LearnChain");
    let claim = module_claim(student_wallet().address(), "m1");

    let err = generator.generate(&claim, &requirements(), Fr::from(2u64)).await.unwrap_err();
    assert!(matches!(err, ProofError::Timeout { step: "witness generation", .. }));
}

#[tokio::test]
async fn invalid_proof_verdict_is_false() {
    let secret = Fr::from(9u64);
    let (dir, config) = workspace("exit 1");
    let fixture = fixture(dir.path(), secret).await;
    let script = r#"case "$1 $2" in
  "groth16 verify") echo "[ERROR] snarkJS: Invalid proof" ;;
  *) exit 1 ;;
esac"#;
    std::fs::write(&config.snarkjs_bin, format!("#!/bin/sh\n{script}\n")).unwrap();

    let proof_json = std::fs::read(fixture.join("proof.json")).unwrap();
    let proof = ToolchainProof::from_json(&proof_json).unwrap().to_proof().unwrap();
    let signals: Vec<String> = serde_json::from_slice(&std::fs::read(fixture.join("public.json")).unwrap()).unwrap();
    let inputs = PublicInputs::from_decimal_strings(CircuitType::ModuleProgress, &signals).unwrap();

    let backend = SnarkjsBackend::new(config);
    assert!(!backend.verify(&proof, &inputs).await.unwrap());

    let vk = backend.export_verifying_key(CircuitType::ModuleProgress).await.unwrap();
    assert_eq!(vk["nPublic"], 8);
}
