//! XEdDSA signing keys for sender key messages
//!
//! Sender keys are Curve25519 key pairs. Signatures are Ed25519-shaped
//! (`R || s`) and computed with the birationally equivalent Edwards key, with
//! the Edwards sign bit carried in the top bit of `s`.
//!
//! Key generation is deterministic in the caller-provided seed so tests can
//! drive it from a seeded RNG.

use curve25519_dalek::{
    edwards::EdwardsPoint,
    montgomery::MontgomeryPoint,
    scalar::{Scalar, clamp_integer},
};
use sha2::{Digest, Sha512};

use crate::error::SenderKeyError;

/// XEdDSA signature size.
pub const SIGNATURE_SIZE: usize = 64;

/// Type byte that prefixes a serialized Curve25519 public key.
pub const DJB_KEY_TYPE: u8 = 0x05;

/// Signing key pair owned by the sender of a group.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKeyPair {
    /// 32-byte Curve25519 public key, distributed to receivers
    pub public: [u8; 32],
    /// 32-byte clamped Curve25519 secret, never leaves the sender
    pub private: [u8; 32],
}

impl SigningKeyPair {
    /// Derive a key pair from 32 random bytes.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let private = clamp_integer(seed);
        let public = MontgomeryPoint::mul_base_clamped(private).to_bytes();
        Self { public, private }
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// Serialize a public key as `0x05 || key`.
pub fn encode_public_key(public: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(33);
    out.push(DJB_KEY_TYPE);
    out.extend_from_slice(public);
    out
}

/// Parse a public key, with or without its type byte.
///
/// # Errors
///
/// - `Malformed` for a wrong length or an unknown key type
pub fn decode_public_key(bytes: &[u8]) -> Result<[u8; 32], SenderKeyError> {
    let key = match bytes {
        [DJB_KEY_TYPE, key @ ..] if key.len() == 32 => key,
        key if key.len() == 32 => key,
        _ => {
            let reason = format!("bad signing key: {} bytes", bytes.len());
            return Err(SenderKeyError::Malformed { reason });
        }
    };

    let mut public = [0u8; 32];
    public.copy_from_slice(key);
    Ok(public)
}

/// Sign `message` with a Curve25519 secret.
///
/// `random` is fresh nonce material; two signatures over the same message
/// differ unless it repeats.
pub fn sign(private: &[u8; 32], message: &[u8], random: &[u8; 64]) -> [u8; SIGNATURE_SIZE] {
    let private = clamp_integer(*private);
    let a = Scalar::from_bytes_mod_order(private);
    let edwards_public = EdwardsPoint::mul_base(&a).compress();
    let sign_bit = edwards_public.as_bytes()[31] & 0x80;

    let mut prefix = [0xFF; 32];
    prefix[0] = 0xFE;
    let r = wide_scalar(&[&prefix, &private, message, random]);
    let cap_r = EdwardsPoint::mul_base(&r).compress();

    let h = wide_scalar(&[cap_r.as_bytes(), edwards_public.as_bytes(), message]);
    let s = h * a + r;

    let mut signature = [0u8; SIGNATURE_SIZE];
    signature[..32].copy_from_slice(cap_r.as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());
    signature[63] &= 0x7F;
    signature[63] |= sign_bit;
    signature
}

/// Verify an XEdDSA signature.
///
/// # Errors
///
/// - `InvalidSignature` for an invalid public key or a bad signature
pub fn verify(
    public: &[u8; 32],
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<(), SenderKeyError> {
    let sign_bit = (signature[63] & 0x80) >> 7;
    let Some(edwards_public) = MontgomeryPoint(*public).to_edwards(sign_bit) else {
        return Err(SenderKeyError::InvalidSignature);
    };

    let mut cap_r = [0u8; 32];
    cap_r.copy_from_slice(&signature[..32]);
    let mut s = [0u8; 32];
    s.copy_from_slice(&signature[32..]);
    s[31] &= 0x7F;
    if s[31] & 0xE0 != 0 {
        return Err(SenderKeyError::InvalidSignature);
    }

    let h = wide_scalar(&[&cap_r, edwards_public.compress().as_bytes(), message]);
    let check = EdwardsPoint::vartime_double_scalar_mul_basepoint(
        &h,
        &-edwards_public,
        &Scalar::from_bytes_mod_order(s),
    );

    if check.compress().to_bytes() == cap_r {
        Ok(())
    } else {
        Err(SenderKeyError::InvalidSignature)
    }
}

fn wide_scalar(parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    Scalar::from_bytes_mod_order_wide(&wide)
}
