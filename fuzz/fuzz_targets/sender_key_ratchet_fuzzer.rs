//! Fuzz target for the sender key receive ratchet
//!
//! # Strategy
//!
//! - Arbitrary sequences of requested iterations (in order, skipped,
//!   replayed, far future)
//! - Compared against a reference chain walked step by step
//!
//! # Invariants
//!
//! - Each iteration yields the reference key at most once
//! - Rejected requests leave the state unchanged
//! - The skipped-key cache never exceeds its bound

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use wamd_crypto::{SenderChainKey, SenderKeyState, limits::MAX_MESSAGE_KEYS};

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: [u8; 32],
    start: u16,
    requests: Vec<u16>,
}

fuzz_target!(|scenario: Scenario| {
    let start = u32::from(scenario.start);
    let mut state = SenderKeyState::new(1, start, scenario.seed, [9; 32], None);
    let mut delivered = HashSet::new();

    for request in scenario.requests.into_iter().take(64) {
        let iteration = start + u32::from(request % 4096);
        let before = state.clone();

        match state.message_key_for(iteration) {
            Ok(key) => {
                assert!(delivered.insert(iteration), "iteration {iteration} delivered twice");

                let mut reference = SenderChainKey::new(start, scenario.seed);
                while reference.iteration() < iteration {
                    reference = reference.next().unwrap();
                }
                assert_eq!(key.seed(), reference.message_key().seed());
            }
            Err(_) => assert!(state == before, "rejected request changed state"),
        }

        assert!(state.message_key_count() <= MAX_MESSAGE_KEYS);
    }
});
