//! Host-side hashing and field helpers.
//!
//! Everything here is deterministic. The commitment and the student hash must be
//! recomputed bit-for-bit identically from the same inputs, so the byte layouts below
//! are part of the on-chain format.

use crate::constants::{poseidon_config, WORD_BYTES};
use crate::error::ZkError;
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// Reduce arbitrary big-endian bytes into the scalar field.
pub fn fr_from_be_bytes(bytes: &[u8]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

/// Big-endian, zero-padded 32-byte encoding of any prime field element.
pub fn field_to_be_bytes32<F: PrimeField>(x: &F) -> [u8; WORD_BYTES] {
    let bytes = x.into_bigint().to_bytes_be();
    let mut out = [0u8; WORD_BYTES];
    let start = WORD_BYTES.saturating_sub(bytes.len());
    out[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(WORD_BYTES)..]);
    out
}

/// Decimal rendering used by the proving toolchain's JSON files.
pub fn field_to_decimal<F: PrimeField>(x: &F) -> String {
    let n: BigUint = x.into_bigint().into();
    n.to_string()
}

/// Parse a decimal string into a field element, rejecting values at or above the modulus.
pub fn field_from_decimal<F: PrimeField>(s: &str) -> Result<F, ZkError> {
    let trimmed = s.trim();
    let n = BigUint::parse_bytes(trimmed.as_bytes(), 10)
        .ok_or_else(|| ZkError::InvalidFieldElement(format!("not a decimal integer: {trimmed:?}")))?;

    let modulus: BigUint = F::MODULUS.into();
    if n >= modulus {
        return Err(ZkError::InvalidFieldElement(format!("{trimmed} exceeds the field modulus")));
    }

    Ok(F::from_le_bytes_mod_order(&n.to_bytes_le()))
}

/// `SHA256(be32(v_0) || be32(v_1) || ...)` reduced mod the scalar field order.
///
/// Each value is left-padded to a full 32-byte word, matching `abi.encodePacked` over
/// `uint256` arguments.
pub fn commitment_hash(values: &[u64]) -> Fr {
    let mut hasher = Sha256::new();
    for v in values {
        let mut word = [0u8; WORD_BYTES];
        word[WORD_BYTES - 8..].copy_from_slice(&v.to_be_bytes());
        hasher.update(word);
    }
    fr_from_be_bytes(&hasher.finalize())
}

/// `Poseidon(address, secret)`, the value the circuit recomputes from its private inputs.
pub fn student_hash(address: Fr, secret: Fr) -> Fr {
    let cfg = poseidon_config();
    let mut sponge = PoseidonSponge::<Fr>::new(&cfg);
    sponge.absorb(&vec![address, secret]);
    sponge.squeeze_field_elements(1)[0]
}

/// Interpret a 20-byte account address as an integer field element.
pub fn address_to_field(address: &[u8; 20]) -> Fr {
    fr_from_be_bytes(address)
}

/// Map a textual identifier (module id, achievement type) onto a field element.
pub fn id_to_field(id: &str) -> Fr {
    fr_from_be_bytes(&Sha256::digest(id.as_bytes()))
}

/// Fresh binding value tying a proof to one session when no data hash is supplied.
pub fn session_hash(address: &[u8; 20], context_id: Fr, completed_at: u64, secret: Fr) -> Fr {
    let mut hasher = Sha256::new();
    hasher.update(address);
    hasher.update(field_to_be_bytes32(&context_id));
    hasher.update(completed_at.to_be_bytes());
    hasher.update(field_to_be_bytes32(&secret));
    fr_from_be_bytes(&hasher.finalize())
}

/// Secret that blinds the student hash for one `(student, context)` pair.
///
/// `SHA256(key || address || be32(context_id))`. Keyed by a value only the service holds,
/// so the student hash stays unlinkable to the address while every proof for the same
/// student and context carries the same student hash.
pub fn derive_secret(key: &[u8; WORD_BYTES], address: &[u8; 20], context_id: Fr) -> Fr {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(address);
    hasher.update(field_to_be_bytes32(&context_id));
    fr_from_be_bytes(&hasher.finalize())
}
