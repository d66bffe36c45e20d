//! Proof transport formats.
//!
//! Two layouts matter:
//! - the proving toolchain's `proof.json` (`pi_a`, `pi_b`, `pi_c` as decimal strings), and
//! - the verifier contract's calldata words (big-endian `uint256`).
//!
//! The contract's pairing precompile expects each G2 coordinate as `(c1, c0)`, while the
//! toolchain and arkworks order it `(c0, c1)`. The swap happens in exactly one place:
//! [`ContractProof::from_proof`].

use crate::constants::WORD_BYTES;
use crate::error::ZkError;
use crate::hashing::{field_from_decimal, field_to_be_bytes32, field_to_decimal};
use ark_bn254::{Bn254, Fq, Fq2, G1Affine, G2Affine};
use ark_groth16::Proof;
use serde::{Deserialize, Serialize};

pub type Word = [u8; WORD_BYTES];

/// `proof.json` as written by the toolchain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainProof {
    // Affine `["x","y"]` or projective `["x","y","1"]`; only the first two are read.
    pub pi_a: Vec<String>,
    // `[[x0,x1],[y0,y1]]` plus an optional projective `["1","0"]` row.
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_curve")]
    pub curve: String,
}

fn default_protocol() -> String {
    "groth16".to_string()
}

fn default_curve() -> String {
    "bn128".to_string()
}

fn parse_g1(coords: &[String], label: &str) -> Result<G1Affine, ZkError> {
    if coords.len() < 2 {
        return Err(ZkError::InvalidPoint(format!("{label} needs two coordinates, got {}", coords.len())));
    }
    let x = field_from_decimal::<Fq>(&coords[0])?;
    let y = field_from_decimal::<Fq>(&coords[1])?;
    let p = G1Affine::new_unchecked(x, y);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ZkError::InvalidPoint(format!("{label} is not a valid G1 point")));
    }
    Ok(p)
}

fn parse_fq2(pair: &[String], label: &str) -> Result<Fq2, ZkError> {
    if pair.len() < 2 {
        return Err(ZkError::InvalidPoint(format!("{label} needs two coefficients, got {}", pair.len())));
    }
    Ok(Fq2::new(field_from_decimal::<Fq>(&pair[0])?, field_from_decimal::<Fq>(&pair[1])?))
}

fn parse_g2(coords: &[Vec<String>], label: &str) -> Result<G2Affine, ZkError> {
    if coords.len() < 2 {
        return Err(ZkError::InvalidPoint(format!("{label} needs two Fq2 coordinates, got {}", coords.len())));
    }
    let x = parse_fq2(&coords[0], label)?;
    let y = parse_fq2(&coords[1], label)?;
    let p = G2Affine::new_unchecked(x, y);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ZkError::InvalidPoint(format!("{label} is not a valid G2 point")));
    }
    Ok(p)
}

impl ToolchainProof {
    pub fn to_proof(&self) -> Result<Proof<Bn254>, ZkError> {
        if self.protocol != "groth16" {
            return Err(ZkError::Serialization(format!("unsupported protocol {:?}", self.protocol)));
        }
        Ok(Proof {
            a: parse_g1(&self.pi_a, "pi_a")?,
            b: parse_g2(&self.pi_b, "pi_b")?,
            c: parse_g1(&self.pi_c, "pi_c")?,
        })
    }

    pub fn from_proof(proof: &Proof<Bn254>) -> Self {
        let d = field_to_decimal::<Fq>;
        Self {
            pi_a: vec![d(&proof.a.x), d(&proof.a.y), "1".to_string()],
            pi_b: vec![
                vec![d(&proof.b.x.c0), d(&proof.b.x.c1)],
                vec![d(&proof.b.y.c0), d(&proof.b.y.c1)],
                vec!["1".to_string(), "0".to_string()],
            ],
            pi_c: vec![d(&proof.c.x), d(&proof.c.y), "1".to_string()],
            protocol: default_protocol(),
            curve: default_curve(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ZkError> {
        serde_json::from_slice(bytes).map_err(|e| ZkError::Serialization(format!("invalid proof.json: {e}")))
    }
}

/// Proof coordinates laid out as the verifier contract's `uint256` arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractProof {
    pub a: [Word; 2],
    pub b: [[Word; 2]; 2],
    pub c: [Word; 2],
}

impl ContractProof {
    pub fn from_proof(proof: &Proof<Bn254>) -> Self {
        let w = field_to_be_bytes32::<Fq>;
        Self {
            a: [w(&proof.a.x), w(&proof.a.y)],
            b: [
                [w(&proof.b.x.c1), w(&proof.b.x.c0)],
                [w(&proof.b.y.c1), w(&proof.b.y.c0)],
            ],
            c: [w(&proof.c.x), w(&proof.c.y)],
        }
    }

    /// `abi.encodePacked(a, b, c)`; handy as a stable fingerprint of the proof.
    pub fn packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 * WORD_BYTES);
        out.extend(self.a.iter().flatten());
        out.extend(self.b.iter().flatten().flatten());
        out.extend(self.c.iter().flatten());
        out
    }
}
