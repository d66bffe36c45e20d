//! ZK layer for proof-gated achievement minting.
//!
//! This crate contains:
//! - Host-side hashing (commitment, student and session hashes) over BN254's scalar field.
//! - The circuits' public signal layout, with arity-checked `PublicInputs`.
//! - An in-process R1CS mirror of both circuits plus Groth16 orchestration.
//! - Conversions between arkworks proofs, the toolchain's `proof.json` and contract calldata.

pub mod circuit;
pub mod constants;
pub mod encoding;
pub mod error;
pub mod groth16;
pub mod hashing;
pub mod types;

pub use error::ZkError;
