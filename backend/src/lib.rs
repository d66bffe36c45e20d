//! Proof-gated achievement minting service.
//!
//! A claim about private learning performance is proven with Groth16, formatted for the
//! on-chain verifier, and minted through a nonce- and fee-managed transaction pipeline.

pub mod api;
pub mod chain;
pub mod claim;
pub mod config;
pub mod db;
pub mod errors;
pub mod gas;
pub mod health;
pub mod metadata;
pub mod mint;
pub mod models;
pub mod nonce;
pub mod proof_generator;
pub mod prover;
pub mod signature;
pub mod state;
pub mod submitter;
pub mod verifier;
