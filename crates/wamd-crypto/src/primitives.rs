//! HMAC, HKDF and AES-256-CBC building blocks.
//!
//! All functions are pure. Anything that needs randomness (the CBC IV for
//! app-state values) takes the random bytes from the caller.

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block (and CBC IV) size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// AES-256 key size in bytes.
pub const AES_KEY_SIZE: usize = 32;

/// HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    for part in parts {
        mac.update(part);
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// HMAC-SHA512 over the concatenation of `parts`.
pub fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    let Ok(mut mac) = HmacSha512::new_from_slice(key) else {
        unreachable!("HMAC-SHA512 accepts any key size");
    };
    for part in parts {
        mac.update(part);
    }

    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// HKDF-SHA256 with an empty salt, filling `out`.
///
/// Extract-then-expand, matching WebCrypto's `deriveBits` with a zero-length
/// salt.
///
/// # Errors
///
/// - `CryptoError::InvalidLength` if `out` exceeds 255 * 32 bytes
pub fn hkdf_sha256(ikm: &[u8], info: &[u8], out: &mut [u8]) -> Result<(), CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    hkdf.expand(info, out)
        .map_err(|_| CryptoError::InvalidLength { what: "hkdf output", len: out.len() })
}

/// AES-256-CBC encrypt with PKCS#7 padding and an explicit IV.
///
/// # Errors
///
/// - `CryptoError::InvalidLength` if the key is not 32 bytes or the IV is
///   not 16 bytes
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| invalid_key_or_iv(key, iv))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// AES-256-CBC decrypt with PKCS#7 padding and an explicit IV.
///
/// # Errors
///
/// - `CryptoError::InvalidLength` for bad key/IV sizes
/// - `CryptoError::Decrypt` if the ciphertext is not block aligned or the
///   padding is invalid
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| invalid_key_or_iv(key, iv))?;
    cipher.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).map_err(|_| CryptoError::Decrypt)
}

/// AES-256-CBC encrypt, prefixing the IV to the output (`iv ‖ ciphertext`).
pub fn aes_cbc_encrypt_prefixed(
    key: &[u8],
    iv: [u8; AES_BLOCK_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let ciphertext = aes_cbc_encrypt(key, &iv, plaintext)?;

    let mut out = Vec::with_capacity(AES_BLOCK_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`aes_cbc_encrypt_prefixed`].
///
/// # Errors
///
/// - `CryptoError::Decrypt` if the buffer is shorter than one IV or the
///   ciphertext does not decrypt
pub fn aes_cbc_decrypt_prefixed(key: &[u8], buffer: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if buffer.len() < AES_BLOCK_SIZE {
        return Err(CryptoError::Decrypt);
    }
    let (iv, ciphertext) = buffer.split_at(AES_BLOCK_SIZE);
    aes_cbc_decrypt(key, iv, ciphertext)
}

fn invalid_key_or_iv(key: &[u8], iv: &[u8]) -> CryptoError {
    if key.len() == AES_KEY_SIZE {
        CryptoError::InvalidLength { what: "aes iv", len: iv.len() }
    } else {
        CryptoError::InvalidLength { what: "aes key", len: key.len() }
    }
}
