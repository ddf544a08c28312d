//! LTHash: a homomorphic, order-independent set hash
//!
//! The 128-byte accumulator is read as 64 little-endian `u16` lanes. Adding
//! an item expands it with HKDF-SHA256 to 128 bytes and adds lane-wise with
//! wrapping arithmetic; removing subtracts the same expansion. The result
//! depends only on the multiset of items, not on the order they arrive in.
//!
//! ```text
//! subtract(add(H, X), X) == H
//! add(add(H, A), B)      == add(add(H, B), A)
//! ```

use crate::{limits::LT_HASH_SIZE, primitives::hkdf_sha256};

/// HKDF info label for item expansion
const PATCH_INTEGRITY_INFO: &[u8] = b"WhatsApp Patch Integrity";

/// The all-zero accumulator of an empty set.
pub const EMPTY_LT_HASH: [u8; LT_HASH_SIZE] = [0u8; LT_HASH_SIZE];

/// Add every item in `items` to `hash`.
pub fn add<I, T>(hash: &[u8; LT_HASH_SIZE], items: I) -> [u8; LT_HASH_SIZE]
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut out = *hash;
    for item in items {
        mix(&mut out, item.as_ref(), u16::wrapping_add);
    }
    out
}

/// Remove every item in `items` from `hash`.
pub fn subtract<I, T>(hash: &[u8; LT_HASH_SIZE], items: I) -> [u8; LT_HASH_SIZE]
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut out = *hash;
    for item in items {
        mix(&mut out, item.as_ref(), u16::wrapping_sub);
    }
    out
}

/// Remove `sub_items`, then add `add_items`.
///
/// Lane arithmetic is a commutative group, so the order only matters for
/// readability: this is the update applied when values are replaced.
pub fn subtract_then_add<A, S, T>(
    hash: &[u8; LT_HASH_SIZE],
    add_items: A,
    sub_items: S,
) -> [u8; LT_HASH_SIZE]
where
    A: IntoIterator<Item = T>,
    S: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    add(&subtract(hash, sub_items), add_items)
}

fn mix(hash: &mut [u8; LT_HASH_SIZE], item: &[u8], op: fn(u16, u16) -> u16) {
    let mut expanded = [0u8; LT_HASH_SIZE];
    let Ok(()) = hkdf_sha256(item, PATCH_INTEGRITY_INFO, &mut expanded) else {
        unreachable!("128 bytes is a valid HKDF-SHA256 output length");
    };

    for (lane, delta) in hash.chunks_exact_mut(2).zip(expanded.chunks_exact(2)) {
        let a = u16::from_le_bytes([lane[0], lane[1]]);
        let b = u16::from_le_bytes([delta[0], delta[1]]);
        lane.copy_from_slice(&op(a, b).to_le_bytes());
    }
}
