//! Calldata and log layout of the achievement and verifier contracts.

use crate::errors::ChainError;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, Log, H256, U256};
use ethers::utils::{id, keccak256};
use learnchain_zk::encoding::{ContractProof, Word};
use learnchain_zk::types::{CircuitType, PublicInputs};

pub const USED_COMMITMENTS: &str = "usedCommitments(bytes32)";
pub const PROOF_MINTED_EVENT: &str = "ProofMinted(address,uint256,bytes32)";
pub const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";

/// `mintWithZKProof((uint256,string,uint256,bytes32),(uint256[2],uint256[2][2],uint256[2],uint256[N]))`
pub fn mint_signature(circuit: CircuitType) -> String {
    format!(
        "mintWithZKProof((uint256,string,uint256,bytes32),(uint256[2],uint256[2][2],uint256[2],uint256[{}]))",
        circuit.public_input_arity()
    )
}

/// Generated verifier entry point: `verifyProof(uint256[2],uint256[2][2],uint256[2],uint256[N])`.
pub fn verify_signature(circuit: CircuitType) -> String {
    format!(
        "verifyProof(uint256[2],uint256[2][2],uint256[2],uint256[{}])",
        circuit.public_input_arity()
    )
}

/// Non-proof half of a mint call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintParams {
    pub context_id: U256,
    pub metadata_uri: String,
    pub score: U256,
    pub learning_data_hash: H256,
}

fn uint(w: &Word) -> Token {
    Token::Uint(U256::from_big_endian(w))
}

fn pair(words: &[Word; 2]) -> Token {
    Token::FixedArray(vec![uint(&words[0]), uint(&words[1])])
}

fn proof_tokens(proof: &ContractProof, inputs: &PublicInputs) -> Vec<Token> {
    vec![
        pair(&proof.a),
        Token::FixedArray(vec![pair(&proof.b[0]), pair(&proof.b[1])]),
        pair(&proof.c),
        Token::FixedArray(inputs.to_be_words().iter().map(uint).collect()),
    ]
}

fn with_selector(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(tokens));
    data.into()
}

pub fn encode_mint(params: &MintParams, proof: &ContractProof, inputs: &PublicInputs) -> Bytes {
    let params = Token::Tuple(vec![
        Token::Uint(params.context_id),
        Token::String(params.metadata_uri.clone()),
        Token::Uint(params.score),
        Token::FixedBytes(params.learning_data_hash.as_bytes().to_vec()),
    ]);
    let proof = Token::Tuple(proof_tokens(proof, inputs));
    with_selector(&mint_signature(inputs.circuit()), &[params, proof])
}

pub fn encode_verify_proof(proof: &ContractProof, inputs: &PublicInputs) -> Bytes {
    with_selector(&verify_signature(inputs.circuit()), &proof_tokens(proof, inputs))
}

/// Registry word the contract marks when it accepts a proof:
/// `keccak256(abi.encode(contextId, studentHash, commitmentHash))`.
pub fn usage_key(context_id: &Word, student_hash: &Word, commitment: &Word) -> Word {
    keccak256(abi::encode(&[
        uint(context_id),
        Token::FixedBytes(student_hash.to_vec()),
        Token::FixedBytes(commitment.to_vec()),
    ]))
}

pub fn encode_used_commitment(key: &Word) -> Bytes {
    with_selector(USED_COMMITMENTS, &[Token::FixedBytes(key.to_vec())])
}

/// Decode a single `bool` return value.
pub fn decode_bool(data: &[u8]) -> Result<bool, ChainError> {
    let tokens = abi::decode(&[ParamType::Bool], data).map_err(|e| ChainError::Decode(e.to_string()))?;
    match tokens.as_slice() {
        [Token::Bool(b)] => Ok(*b),
        other => Err(ChainError::Decode(format!("expected bool, got {other:?}"))),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MintEvents {
    pub token_id: Option<U256>,
    pub proof_hash: Option<H256>,
}

/// Pull the minted token id and on-chain proof hash out of a receipt's logs.
///
/// `ProofMinted` wins; an ERC-721 `Transfer` emitted by the same contract is the fallback
/// for the token id.
pub fn parse_mint_events(contract: Address, logs: &[Log]) -> MintEvents {
    let minted_topic = H256::from(keccak256(PROOF_MINTED_EVENT));
    let transfer_topic = H256::from(keccak256(TRANSFER_EVENT));

    let mut events = MintEvents::default();
    let mut transfer_token = None;

    for log in logs.iter().filter(|l| l.address == contract) {
        match log.topics.first() {
            Some(t) if *t == minted_topic && log.topics.len() >= 3 => {
                events.token_id = Some(U256::from_big_endian(log.topics[2].as_bytes()));
                if log.data.len() >= 32 {
                    events.proof_hash = Some(H256::from_slice(&log.data[..32]));
                }
            }
            Some(t) if *t == transfer_topic && log.topics.len() == 4 => {
                transfer_token.get_or_insert(U256::from_big_endian(log.topics[3].as_bytes()));
            }
            _ => {}
        }
    }

    if events.token_id.is_none() {
        events.token_id = transfer_token;
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;
    use learnchain_zk::hashing::field_to_be_bytes32;

    fn inputs(circuit: CircuitType) -> PublicInputs {
        let values = (1..=circuit.public_input_arity() as u64).map(Fr::from).collect();
        PublicInputs::new(circuit, values).unwrap()
    }

    fn proof() -> ContractProof {
        let w = |n: u64| field_to_be_bytes32(&Fr::from(n));
        ContractProof { a: [w(1), w(2)], b: [[w(3), w(4)], [w(5), w(6)]], c: [w(7), w(8)] }
    }

    #[test]
    fn signatures_carry_circuit_arity() {
        assert!(mint_signature(CircuitType::ModuleProgress).ends_with("uint256[8]))"));
        assert!(verify_signature(CircuitType::LearningAchievement).ends_with("uint256[9])"));
    }

    #[test]
    fn verify_calldata_is_fixed_size() {
        let data = encode_verify_proof(&proof(), &inputs(CircuitType::ModuleProgress));
        assert_eq!(&data[..4], &id(&verify_signature(CircuitType::ModuleProgress))[..]);
        // 2 + 4 + 2 + 8 static words.
        assert_eq!(data.len(), 4 + 16 * 32);
        // b[0][1] is the fourth argument word.
        assert_eq!(U256::from_big_endian(&data[4 + 3 * 32..4 + 4 * 32]), U256::from(4u64));
    }

    #[test]
    fn mint_calldata_decodes_back() {
        let params = MintParams {
            context_id: U256::from(77u64),
            metadata_uri: "ipfs://cid".into(),
            score: U256::from(92u64),
            learning_data_hash: H256::repeat_byte(0xab),
        };
        let data = encode_mint(&params, &proof(), &inputs(CircuitType::LearningAchievement));

        let types = [
            ParamType::Tuple(vec![
                ParamType::Uint(256),
                ParamType::String,
                ParamType::Uint(256),
                ParamType::FixedBytes(32),
            ]),
            ParamType::Tuple(vec![
                ParamType::FixedArray(Box::new(ParamType::Uint(256)), 2),
                ParamType::FixedArray(Box::new(ParamType::FixedArray(Box::new(ParamType::Uint(256)), 2)), 2),
                ParamType::FixedArray(Box::new(ParamType::Uint(256)), 2),
                ParamType::FixedArray(Box::new(ParamType::Uint(256)), 9),
            ]),
        ];
        let decoded = abi::decode(&types, &data[4..]).unwrap();
        let Token::Tuple(p) = &decoded[0] else { panic!("params tuple") };
        assert_eq!(p[1], Token::String("ipfs://cid".into()));
        let Token::Tuple(z) = &decoded[1] else { panic!("proof tuple") };
        let Token::FixedArray(signals) = &z[3] else { panic!("signals") };
        assert_eq!(signals[8], Token::Uint(U256::from(9u64)));
    }

    #[test]
    fn usage_key_covers_every_part() {
        let w = |n: u64| field_to_be_bytes32(&Fr::from(n));
        let key = usage_key(&w(1), &w(2), &w(3));
        assert_eq!(key, keccak256([w(1), w(2), w(3)].concat()));
        assert_ne!(key, usage_key(&w(9), &w(2), &w(3)));
        assert_ne!(key, usage_key(&w(1), &w(9), &w(3)));
    }

    #[test]
    fn decode_bool_reads_abi_word() {
        let mut word = [0u8; 32];
        word[31] = 1;
        assert!(decode_bool(&word).unwrap());
        assert!(!decode_bool(&[0u8; 32]).unwrap());
        assert!(decode_bool(&[1u8; 3]).is_err());
    }

    #[test]
    fn proof_minted_preferred_over_transfer() {
        let contract = Address::repeat_byte(0x11);
        let transfer = Log {
            address: contract,
            topics: vec![
                H256::from(keccak256(TRANSFER_EVENT)),
                H256::zero(),
                H256::repeat_byte(0x22),
                H256::from_low_u64_be(5),
            ],
            ..Default::default()
        };
        let minted = Log {
            address: contract,
            topics: vec![
                H256::from(keccak256(PROOF_MINTED_EVENT)),
                H256::repeat_byte(0x22),
                H256::from_low_u64_be(7),
            ],
            data: vec![0xcd; 32].into(),
            ..Default::default()
        };

        let events = parse_mint_events(contract, &[transfer.clone(), minted]);
        assert_eq!(events.token_id, Some(U256::from(7u64)));
        assert_eq!(events.proof_hash, Some(H256::repeat_byte(0xcd)));

        let fallback = parse_mint_events(contract, &[transfer]);
        assert_eq!(fallback.token_id, Some(U256::from(5u64)));
        assert_eq!(fallback.proof_hash, None);

        assert_eq!(parse_mint_events(Address::zero(), &[]), MintEvents::default());
    }
}
