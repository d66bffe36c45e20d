//! Crate-wide constants shared by the circuits and the host-side pipeline.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;

/// Public signal count of the module-progress circuit.
pub const MODULE_PROGRESS_PUBLIC_INPUTS: usize = 8;

/// Public signal count of the learning-achievement circuit (last slot is `isValid`).
pub const LEARNING_ACHIEVEMENT_PUBLIC_INPUTS: usize = 9;

/// Bit width every private attribute and threshold is range-constrained to.
///
/// Comparisons in the circuit are only sound while both operands fit in this width.
pub const VALUE_BITS: usize = 32;

/// Highest score a claim may carry.
pub const MAX_SCORE: u32 = 100;

/// Width of one big-endian word in the commitment preimage and in contract calldata.
pub const WORD_BYTES: usize = 32;

// Poseidon sponge configuration.
//
// Width-3 sponge (rate=2, capacity=1): the student hash absorbs exactly one
// (address, secret) pair. The external circuit must be compiled against the
// same instantiation for the student hash slot to line up.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;

pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon S-box exponent (alpha).
pub const POSEIDON_ALPHA: u64 = 5;

/// Deterministically derive Poseidon parameters for BN254::Fr.
///
/// Both the native hasher and the in-circuit gadget call this, so they always agree on
/// the round constants and MDS matrix.
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits = Fr::MODULUS_BIT_SIZE as u64;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );

    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}
