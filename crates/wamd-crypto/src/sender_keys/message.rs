//! Wire messages for sender keys
//!
//! ```text
//! SenderKeyMessage:             [version:1][protobuf body][signature:64]
//! SenderKeyDistributionMessage: [version:1][protobuf body]
//! ```
//!
//! The version byte packs `(current << 4) | current`. The signature covers
//! everything before it, so key id, iteration and ciphertext are all bound.
//!
//! Bodies use the libsignal protobuf layouts:
//!
//! ```text
//! SenderKeyMessage             { id = 1, iteration = 2, ciphertext = 3 }
//! SenderKeyDistributionMessage { id = 1, iteration = 2, chainKey = 3, signingKey = 4 }
//! ```

use prost::Message;

use super::signing::{SIGNATURE_SIZE, decode_public_key, encode_public_key, sign, verify};
use crate::error::SenderKeyError;

/// Current sender key message version.
pub const CURRENT_VERSION: u8 = 3;

const VERSION_BYTE: u8 = (CURRENT_VERSION << 4) | CURRENT_VERSION;

#[derive(Clone, PartialEq, Message)]
struct SenderKeyMessageBody {
    #[prost(uint32, optional, tag = "1")]
    id: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    iteration: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    ciphertext: Option<Vec<u8>>,
}

/// A signed group message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKeyMessage {
    key_id: u32,
    iteration: u32,
    ciphertext: Vec<u8>,
    signature: [u8; SIGNATURE_SIZE],
    serialized: Vec<u8>,
}

impl SenderKeyMessage {
    /// Build and sign a message.
    ///
    /// `random` seeds the signature nonce.
    pub fn new(
        key_id: u32,
        iteration: u32,
        ciphertext: Vec<u8>,
        signing_private: &[u8; 32],
        random: &[u8; 64],
    ) -> Self {
        let body = SenderKeyMessageBody {
            id: Some(key_id),
            iteration: Some(iteration),
            ciphertext: Some(ciphertext),
        };

        let mut serialized = vec![VERSION_BYTE];
        serialized.extend(body.encode_to_vec());

        let signature = sign(signing_private, &serialized, random);
        serialized.extend_from_slice(&signature);

        let ciphertext = body.ciphertext.unwrap_or_default();
        Self { key_id, iteration, ciphertext, signature, serialized }
    }

    /// Parse a serialized message. The signature is NOT checked here.
    ///
    /// # Errors
    ///
    /// - `Malformed` for short input, an unsupported version, a bad body or
    ///   a body missing a field
    pub fn deserialize(bytes: &[u8]) -> Result<Self, SenderKeyError> {
        if bytes.len() < 1 + SIGNATURE_SIZE {
            return Err(SenderKeyError::Malformed {
                reason: format!("message too short: {} bytes", bytes.len()),
            });
        }

        check_version(bytes[0])?;

        let (signed, signature_bytes) = bytes.split_at(bytes.len() - SIGNATURE_SIZE);
        let body = SenderKeyMessageBody::decode(&signed[1..])
            .map_err(|e| SenderKeyError::Malformed { reason: e.to_string() })?;

        let (Some(key_id), Some(iteration), Some(ciphertext)) =
            (body.id, body.iteration, body.ciphertext)
        else {
            return Err(SenderKeyError::Malformed { reason: "incomplete message body".into() });
        };

        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(signature_bytes);

        Ok(Self { key_id, iteration, ciphertext, signature, serialized: bytes.to_vec() })
    }

    /// Verify the trailing signature with the sender's public key.
    pub fn verify_signature(&self, signing_public: &[u8; 32]) -> Result<(), SenderKeyError> {
        let signed = &self.serialized[..self.serialized.len() - SIGNATURE_SIZE];
        verify(signing_public, signed, &self.signature)
    }

    /// Sender key id the message was encrypted under.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Chain iteration of the message key.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// AES-256-CBC ciphertext.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Full wire encoding.
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

#[derive(Clone, PartialEq, Message)]
struct DistributionBody {
    #[prost(uint32, optional, tag = "1")]
    id: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    iteration: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    chain_key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "4")]
    signing_key: Option<Vec<u8>>,
}

/// Everything a receiver needs to start following a sender's chain.
#[derive(Clone, PartialEq, Eq)]
pub struct SenderKeyDistributionMessage {
    key_id: u32,
    iteration: u32,
    chain_key: [u8; 32],
    signing_key: [u8; 32],
}

impl SenderKeyDistributionMessage {
    /// Describe a chain at `iteration`.
    pub fn new(key_id: u32, iteration: u32, chain_key: [u8; 32], signing_key: [u8; 32]) -> Self {
        Self { key_id, iteration, chain_key, signing_key }
    }

    /// Sender key id.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Chain iteration the seed belongs to.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Chain key seed at `iteration`.
    pub fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// Sender's Curve25519 public key.
    pub fn signing_key(&self) -> &[u8; 32] {
        &self.signing_key
    }

    /// Wire encoding. The signing key carries its `0x05` type byte.
    pub fn serialize(&self) -> Vec<u8> {
        let body = DistributionBody {
            id: Some(self.key_id),
            iteration: Some(self.iteration),
            chain_key: Some(self.chain_key.to_vec()),
            signing_key: Some(encode_public_key(&self.signing_key)),
        };

        let mut out = vec![VERSION_BYTE];
        out.extend(body.encode_to_vec());
        out
    }

    /// Parse a wire encoding.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, SenderKeyError> {
        let Some((&version, body)) = bytes.split_first() else {
            return Err(SenderKeyError::Malformed { reason: "empty distribution message".into() });
        };
        check_version(version)?;

        let body = DistributionBody::decode(body)
            .map_err(|e| SenderKeyError::Malformed { reason: e.to_string() })?;

        let (Some(key_id), Some(iteration), Some(chain_key), Some(signing_key)) =
            (body.id, body.iteration, body.chain_key, body.signing_key)
        else {
            return Err(SenderKeyError::Malformed {
                reason: "incomplete distribution message".into(),
            });
        };

        let chain_key: [u8; 32] = chain_key.as_slice().try_into().map_err(|_| {
            SenderKeyError::Malformed { reason: format!("chain key is {} bytes", chain_key.len()) }
        })?;
        let signing_key = decode_public_key(&signing_key)?;

        Ok(Self::new(key_id, iteration, chain_key, signing_key))
    }
}

impl std::fmt::Debug for SenderKeyDistributionMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderKeyDistributionMessage")
            .field("key_id", &self.key_id)
            .field("iteration", &self.iteration)
            .finish_non_exhaustive()
    }
}

fn check_version(byte: u8) -> Result<(), SenderKeyError> {
    let version = byte >> 4;
    if version < CURRENT_VERSION {
        let reason = format!("legacy message version {version}");
        return Err(SenderKeyError::Malformed { reason });
    }
    if version > CURRENT_VERSION {
        let reason = format!("unknown message version {version}");
        return Err(SenderKeyError::Malformed { reason });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender_keys::signing::SigningKeyPair;

    const NONCE: [u8; 64] = [0x42; 64];

    #[test]
    fn message_roundtrip_and_verify() {
        let pair = SigningKeyPair::from_seed([1; 32]);
        let message = SenderKeyMessage::new(77, 3, vec![1, 2, 3, 4], &pair.private, &NONCE);

        let parsed = SenderKeyMessage::deserialize(message.serialized()).unwrap();

        assert_eq!(parsed, message);
        assert_eq!(parsed.key_id(), 77);
        assert_eq!(parsed.iteration(), 3);
        assert_eq!(parsed.ciphertext(), &[1, 2, 3, 4]);
        assert!(parsed.verify_signature(&pair.public).is_ok());
    }

    #[test]
    fn body_uses_protobuf_field_numbers() {
        let pair = SigningKeyPair::from_seed([1; 32]);
        let message = SenderKeyMessage::new(5, 2, vec![0xAA, 0xBB], &pair.private, &NONCE);

        // id = 1 (varint), iteration = 2 (varint), ciphertext = 3 (bytes)
        let body = &message.serialized()[1..message.serialized().len() - SIGNATURE_SIZE];
        assert_eq!(body, &[0x08, 0x05, 0x10, 0x02, 0x1A, 0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn version_byte_leads_message() {
        let pair = SigningKeyPair::from_seed([1; 32]);
        let message = SenderKeyMessage::new(1, 0, vec![], &pair.private, &NONCE);
        assert_eq!(message.serialized()[0], 0x33);
    }

    #[test]
    fn flipped_ciphertext_bit_breaks_signature() {
        let pair = SigningKeyPair::from_seed([1; 32]);
        let message = SenderKeyMessage::new(1, 0, vec![0u8; 16], &pair.private, &NONCE);

        let mut bytes = message.serialized().to_vec();
        // Last ciphertext byte sits right before the signature
        let target = bytes.len() - SIGNATURE_SIZE - 1;
        bytes[target] ^= 0x01;

        let parsed = SenderKeyMessage::deserialize(&bytes).unwrap();
        assert_eq!(parsed.verify_signature(&pair.public), Err(SenderKeyError::InvalidSignature));
    }

    #[test]
    fn short_input_is_malformed() {
        assert!(matches!(
            SenderKeyMessage::deserialize(&[0x33; 10]),
            Err(SenderKeyError::Malformed { .. })
        ));
    }

    #[test]
    fn missing_field_is_malformed() {
        // Body carries only id = 1
        let mut bytes = vec![0x33, 0x08, 0x01];
        bytes.extend_from_slice(&[0u8; SIGNATURE_SIZE]);

        let err = SenderKeyMessage::deserialize(&bytes).unwrap_err();
        assert_eq!(err, SenderKeyError::Malformed { reason: "incomplete message body".into() });
    }

    #[test]
    fn legacy_version_is_rejected() {
        let pair = SigningKeyPair::from_seed([1; 32]);
        let message = SenderKeyMessage::new(1, 0, vec![], &pair.private, &NONCE);
        let mut bytes = message.serialized().to_vec();
        bytes[0] = 0x22;

        let err = SenderKeyMessage::deserialize(&bytes).unwrap_err();
        assert_eq!(err, SenderKeyError::Malformed { reason: "legacy message version 2".into() });
    }

    #[test]
    fn distribution_roundtrip() {
        let pair = SigningKeyPair::from_seed([6; 32]);
        let message = SenderKeyDistributionMessage::new(12, 4, [5; 32], pair.public);
        let bytes = message.serialize();
        let parsed = SenderKeyDistributionMessage::deserialize(&bytes).unwrap();

        assert_eq!(parsed, message);
        assert_eq!(parsed.iteration(), 4);
        assert_eq!(parsed.chain_key(), &[5; 32]);
    }

    #[test]
    fn distribution_signing_key_has_type_byte() {
        let message = SenderKeyDistributionMessage::new(1, 0, [5; 32], [6; 32]);
        let bytes = message.serialize();

        // Field 4, length 33, then the 0x05 type byte
        let tail = &bytes[bytes.len() - 35..];
        assert_eq!(&tail[..3], &[0x22, 33, 0x05]);
        assert_eq!(&tail[3..], &[6; 32]);
    }

    #[test]
    fn short_chain_key_is_malformed() {
        // id = 1, iteration = 0, chainKey = 3 bytes, signingKey = 33 bytes
        let mut bytes = vec![0x33, 0x08, 0x01, 0x10, 0x00, 0x1A, 0x03, 1, 2, 3, 0x22, 33, 0x05];
        bytes.extend_from_slice(&[7; 32]);

        let err = SenderKeyDistributionMessage::deserialize(&bytes).unwrap_err();
        assert_eq!(err, SenderKeyError::Malformed { reason: "chain key is 3 bytes".into() });
    }

    #[test]
    fn empty_distribution_is_malformed() {
        assert!(matches!(
            SenderKeyDistributionMessage::deserialize(&[]),
            Err(SenderKeyError::Malformed { .. })
        ));
    }
}
