//! Protocol limits shared by the sender key and app-state layers.

/// Maximum sender key states kept per record. Oldest is evicted first.
pub const MAX_STATES: usize = 5;

/// Maximum skipped message keys cached per sender key state.
pub const MAX_MESSAGE_KEYS: usize = 2000;

/// Maximum distance a message iteration may be ahead of the chain.
pub const MAX_FUTURE_MESSAGES: u32 = 2000;

/// Exclusive upper bound for sender key ids (ids fit in a positive `i32`).
pub const MAX_SENDER_KEY_ID: u32 = 0x7fff_ffff;

/// Size of the LTHash accumulator in bytes.
pub const LT_HASH_SIZE: usize = 128;

/// Length of every app-state MAC carried on the wire.
pub const MAC_SIZE: usize = 32;
