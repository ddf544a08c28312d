//! MACs of the app-state integrity chain
//!
//! ```text
//! index MAC    = HMAC-SHA256(index_key, index bytes)
//! value MAC    = HMAC-SHA512(value_mac_key, op ‖ key id ‖ encrypted ‖ len8)[..32]
//! snapshot MAC = HMAC-SHA256(snapshot_mac_key, lthash ‖ be64(version) ‖ name)
//! patch MAC    = HMAC-SHA256(patch_mac_key,
//!                            snapshot MAC ‖ value MACs ‖ be64(version) ‖ name)
//! ```
//!
//! `len8` is an 8-byte field whose last byte holds `len(op ‖ key id)`.

use wamd_crypto::{
    limits::{LT_HASH_SIZE, MAC_SIZE},
    primitives::{hmac_sha256, hmac_sha512},
};

use super::{CollectionName, SyncdOperation};

/// Canonical byte form of an index: a compact JSON array of strings.
///
/// This is MAC'd directly, so it must match other clients byte for byte.
pub fn canonical_index(index: &[String]) -> Vec<u8> {
    let Ok(bytes) = serde_json::to_vec(index) else {
        unreachable!("a list of strings always serializes to JSON");
    };
    bytes
}

/// Inverse of [`canonical_index`]. `None` if the bytes are not a JSON array
/// of strings.
pub fn parse_index(bytes: &[u8]) -> Option<Vec<String>> {
    serde_json::from_slice(bytes).ok()
}

/// MAC binding the plaintext index.
pub fn index_mac(index_key: &[u8; 32], index_bytes: &[u8]) -> [u8; MAC_SIZE] {
    hmac_sha256(index_key, &[index_bytes])
}

/// MAC binding operation, key id and encrypted value.
pub fn value_mac(
    value_mac_key: &[u8; 32],
    operation: SyncdOperation,
    key_id: &[u8],
    encrypted: &[u8],
) -> [u8; MAC_SIZE] {
    let mut length = [0u8; 8];
    // Only the low byte is set, whatever the key id length
    length[7] = (1 + key_id.len()) as u8;

    let full = hmac_sha512(value_mac_key, &[&[operation.mac_tag()], key_id, encrypted, &length]);

    let mut mac = [0u8; MAC_SIZE];
    mac.copy_from_slice(&full[..MAC_SIZE]);
    mac
}

/// MAC binding an LTHash to a version of a collection.
pub fn snapshot_mac(
    snapshot_mac_key: &[u8; 32],
    hash: &[u8; LT_HASH_SIZE],
    version: u64,
    collection: CollectionName,
) -> [u8; MAC_SIZE] {
    hmac_sha256(snapshot_mac_key, &[hash, &version.to_be_bytes(), collection.as_str().as_bytes()])
}

/// MAC binding a patch's snapshot MAC and value MACs.
pub fn patch_mac<'a>(
    patch_mac_key: &[u8; 32],
    snapshot_mac: &[u8],
    value_macs: impl IntoIterator<Item = &'a [u8]>,
    version: u64,
    collection: CollectionName,
) -> [u8; MAC_SIZE] {
    let version = version.to_be_bytes();
    let mut parts: Vec<&[u8]> = vec![snapshot_mac];
    for mac in value_macs {
        parts.push(mac);
    }
    parts.push(&version);
    parts.push(collection.as_str().as_bytes());

    hmac_sha256(patch_mac_key, &parts)
}

/// Constant-time MAC comparison.
pub fn macs_equal(expected: &[u8], actual: &[u8]) -> bool {
    expected.len() == actual.len()
        && expected.iter().zip(actual).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_index_is_compact_json() {
        let index = vec!["mute".to_string(), "123@s.whatsapp.net".to_string()];
        assert_eq!(canonical_index(&index), br#"["mute","123@s.whatsapp.net"]"#);
    }

    #[test]
    fn canonical_index_escapes_like_json_stringify() {
        let index = vec!["a\"b\\c\nd\u{1}".to_string(), "é/ü".to_string()];
        assert_eq!(
            String::from_utf8(canonical_index(&index)).unwrap(),
            "[\"a\\\"b\\\\c\\nd\\u0001\",\"é/ü\"]"
        );
    }

    #[test]
    fn parse_index_roundtrip() {
        let index = vec!["label_jid".to_string(), "7".to_string(), "1@s.whatsapp.net".to_string()];
        assert_eq!(parse_index(&canonical_index(&index)), Some(index));
        assert_eq!(parse_index(b"{\"a\":1}"), None);
    }

    #[test]
    fn value_mac_binds_operation() {
        let set = value_mac(&[1; 32], SyncdOperation::Set, &[0, 1], b"ciphertext");
        let remove = value_mac(&[1; 32], SyncdOperation::Remove, &[0, 1], b"ciphertext");
        assert_ne!(set, remove);
    }

    #[test]
    fn snapshot_mac_binds_collection() {
        let hash = [0u8; 128];
        assert_ne!(
            snapshot_mac(&[2; 32], &hash, 1, CollectionName::Regular),
            snapshot_mac(&[2; 32], &hash, 1, CollectionName::RegularLow)
        );
    }

    #[test]
    fn patch_mac_covers_every_part_in_order() {
        let snapshot = [3u8; 32];
        let (first, second) = ([4u8; 32], [5u8; 32]);

        let mut message = snapshot.to_vec();
        message.extend_from_slice(&first);
        message.extend_from_slice(&second);
        message.extend_from_slice(&9u64.to_be_bytes());
        message.extend_from_slice(b"regular_high");
        let expected = hmac_sha256(&[6; 32], &[message.as_slice()]);

        let value_macs = [first.as_slice(), second.as_slice()];
        let mac = patch_mac(&[6; 32], &snapshot, value_macs, 9, CollectionName::RegularHigh);
        assert_eq!(mac, expected);

        let swapped = [second.as_slice(), first.as_slice()];
        let mac = patch_mac(&[6; 32], &snapshot, swapped, 9, CollectionName::RegularHigh);
        assert_ne!(mac, expected);
    }

    #[test]
    fn mac_comparison() {
        assert!(macs_equal(&[1, 2, 3], &[1, 2, 3]));
        assert!(!macs_equal(&[1, 2, 3], &[1, 2, 4]));
        assert!(!macs_equal(&[1, 2, 3], &[1, 2]));
    }
}
