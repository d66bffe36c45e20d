//! Wallet challenge signatures (EIP-191 `personal_sign`).

use ethers::types::{Address, Signature};
use rand::rngs::OsRng;
use rand::RngCore;
use std::str::FromStr;

pub fn challenge_message(app_name: &str, nonce: &str) -> String {
    format!("{app_name} Challenge: {nonce}")
}

/// 32 random bytes, hex encoded.
pub fn new_challenge_nonce() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Address that produced `signature` over the challenge, if the signature parses.
pub fn recover_signer(app_name: &str, nonce: &str, signature: &str) -> Option<Address> {
    let sig = Signature::from_str(signature.trim()).ok()?;
    sig.recover(challenge_message(app_name, nonce)).ok()
}

/// Whether `address` signed the challenge for `nonce`. Malformed input is `false`.
pub fn verify_challenge(app_name: &str, address: Address, nonce: &str, signature: &str) -> bool {
    recover_signer(app_name, nonce, signature) == Some(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::{LocalWallet, Signer};

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    async fn signed(nonce: &str) -> (Address, String) {
        let wallet: LocalWallet = KEY.parse().unwrap();
        let sig = wallet.sign_message(challenge_message("LearnChain", nonce)).await.unwrap();
        (wallet.address(), format!("0x{sig}"))
    }

    #[test]
    fn message_format() {
        assert_eq!(challenge_message("LearnChain", "abc"), "LearnChain Challenge: abc");
    }

    #[test]
    fn nonces_are_fresh_hex() {
        let a = new_challenge_nonce();
        let b = new_challenge_nonce();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn signature_round_trip() {
        let (address, sig) = signed("n1").await;
        assert!(verify_challenge("LearnChain", address, "n1", &sig));
        assert_eq!(recover_signer("LearnChain", "n1", &sig), Some(address));
    }

    #[tokio::test]
    async fn any_single_field_tamper_fails() {
        let (address, sig) = signed("n1").await;

        assert!(!verify_challenge("LearnChain", address, "n2", &sig));
        assert!(!verify_challenge("OtherApp", address, "n1", &sig));
        assert!(!verify_challenge("LearnChain", Address::repeat_byte(0x42), "n1", &sig));

        // Flip one byte of r.
        let mut bytes = hex::decode(sig.trim_start_matches("0x")).unwrap();
        bytes[5] ^= 0x01;
        let tampered = format!("0x{}", hex::encode(bytes));
        assert!(!verify_challenge("LearnChain", address, "n1", &tampered));
    }

    #[test]
    fn malformed_signature_is_false() {
        assert!(!verify_challenge("LearnChain", Address::zero(), "n1", "not-a-signature"));
        assert!(!verify_challenge("LearnChain", Address::zero(), "n1", "0x1234"));
        assert!(!verify_challenge("LearnChain", Address::zero(), "n1", ""));
    }
}
