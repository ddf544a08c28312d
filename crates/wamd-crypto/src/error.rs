//! Error types for the crypto layer

use thiserror::Error;

/// Errors from the low-level primitives (AES, HKDF).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Ciphertext failed to decrypt (bad length or padding)
    #[error("decryption failed")]
    Decrypt,

    /// A key, IV or output buffer had the wrong length
    #[error("invalid {what} length: {len}")]
    InvalidLength {
        /// Which input was wrong
        what: &'static str,
        /// The offending length
        len: usize,
    },
}

/// Errors from sender key ratchet operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SenderKeyError {
    /// Message iteration is behind the chain and its key is not cached.
    /// Either a replay or a message whose key was already evicted.
    #[error("received message with old counter: chain at {current}, message at {requested}")]
    OldCounter {
        /// Current chain key iteration
        current: u32,
        /// Iteration carried by the message
        requested: u32,
    },

    /// Message iteration is too far ahead of the chain
    #[error(
        "message {requested} is over {limit} messages ahead of chain at {current}",
        limit = crate::limits::MAX_FUTURE_MESSAGES
    )]
    FutureMessage {
        /// Current chain key iteration
        current: u32,
        /// Iteration carried by the message
        requested: u32,
    },

    /// Signature over the message did not verify with the state's signing key
    #[error("invalid sender key message signature")]
    InvalidSignature,

    /// Decryption or message parsing failed
    #[error("invalid message: {reason}")]
    InvalidMessage {
        /// Reason for the failure
        reason: String,
    },

    /// Chain iteration would overflow `u32`
    #[error("chain iteration overflow at {current}")]
    IterationOverflow {
        /// Current iteration when overflow was detected
        current: u32,
    },

    /// Serialized record or message could not be decoded
    #[error("malformed sender key data: {reason}")]
    Malformed {
        /// Decoder error
        reason: String,
    },
}

impl SenderKeyError {
    /// Returns true if this error is fatal (unrecoverable)
    ///
    /// Fatal errors indicate tampering, corruption or a protocol violation.
    /// The others may resolve once the sender redistributes its key.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidSignature
            | Self::InvalidMessage { .. }
            | Self::IterationOverflow { .. }
            | Self::Malformed { .. } => true,

            Self::OldCounter { .. } | Self::FutureMessage { .. } => false,
        }
    }
}

impl From<CryptoError> for SenderKeyError {
    fn from(err: CryptoError) -> Self {
        Self::InvalidMessage { reason: err.to_string() }
    }
}
