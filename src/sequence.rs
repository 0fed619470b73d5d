//! Sequence numbers for command frames.
//!
//! Each connection owns its own counter. Numbers cycle through `1..=255`;
//! zero is reserved.

use std::sync::atomic::{AtomicU8, Ordering};

/// Per-connection sequence counter.
#[derive(Debug)]
pub struct SequenceCounter(AtomicU8);

impl Default for SequenceCounter {
    fn default() -> Self { Self::new() }
}

impl SequenceCounter {
    /// Create a counter whose first value is `1`.
    #[must_use]
    pub fn new() -> Self { Self(AtomicU8::new(0)) }

    /// Return the next sequence number.
    pub fn next(&self) -> u8 {
        let previous = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(advance(current))
            })
            .unwrap_or_else(|current| current);
        advance(previous)
    }
}

fn advance(current: u8) -> u8 {
    match current {
        u8::MAX => 1,
        value => value + 1,
    }
}
