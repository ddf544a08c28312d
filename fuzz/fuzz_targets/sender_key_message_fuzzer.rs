//! Fuzz target for sender key wire parsing
//!
//! # Strategy
//!
//! - Random bytes fed to every sender key decoder
//! - Valid signed message with arbitrary byte flips
//! - Valid message truncated at arbitrary length
//!
//! # Invariants
//!
//! - Decoders never panic
//! - A flipped or truncated message never verifies
//! - An untouched message always verifies

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use wamd_crypto::{
    SenderKeyDistributionMessage, SenderKeyMessage, SenderKeyRecord, SigningKeyPair,
};

const NONCE: [u8; 64] = [0x5A; 64];

#[derive(Debug, Clone, Arbitrary)]
enum Input {
    RandomBytes { bytes: Vec<u8> },
    Flipped { seed: [u8; 32], ciphertext: Vec<u8>, flips: Vec<(u16, u8)> },
    Truncated { seed: [u8; 32], ciphertext: Vec<u8>, keep: u16 },
}

fuzz_target!(|input: Input| {
    match input {
        Input::RandomBytes { bytes } => {
            let _ = SenderKeyMessage::deserialize(&bytes);
            let _ = SenderKeyDistributionMessage::deserialize(&bytes);
            let _ = SenderKeyRecord::from_bytes(&bytes);
        }

        Input::Flipped { seed, ciphertext, flips } => {
            let signing = SigningKeyPair::from_seed(seed);
            let message = SenderKeyMessage::new(7, 3, ciphertext, &signing.private, &NONCE);
            let original = message.serialized().to_vec();
            assert!(message.verify_signature(&signing.public).is_ok());

            let mut bytes = original.clone();
            for (at, mask) in flips {
                let at = at as usize % bytes.len();
                bytes[at] ^= mask;
            }
            if bytes == original {
                return;
            }

            if let Ok(parsed) = SenderKeyMessage::deserialize(&bytes) {
                assert!(parsed.verify_signature(&signing.public).is_err());
            }
        }

        Input::Truncated { seed, ciphertext, keep } => {
            let signing = SigningKeyPair::from_seed(seed);
            let message = SenderKeyMessage::new(1, 0, ciphertext, &signing.private, &NONCE);
            let bytes = message.serialized();
            let keep = keep as usize % bytes.len();

            if let Ok(parsed) = SenderKeyMessage::deserialize(&bytes[..keep]) {
                assert!(parsed.verify_signature(&signing.public).is_err());
            }
        }
    }
});
