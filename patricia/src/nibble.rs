// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Nibble paths.
//!
//! A key of `L` bytes unfolds into `2 * L` nibbles, high nibble first. All of
//! the helpers here are pure; the engine slices and concatenates nibble
//! sequences but never mutates one in place.

use std::fmt;

#[cfg(any(test, feature = "fuzzing"))]
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

/// A 4-bit value addressing one of the sixteen slots of a branch node.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub(crate) struct Nibble(u8);

impl From<u8> for Nibble {
    fn from(nibble: u8) -> Self {
        assert!(nibble < 16, "nibble (4-bit) must be 0-15, got {}", nibble);
        Nibble(nibble)
    }
}

impl From<Nibble> for u8 {
    fn from(nibble: Nibble) -> Self {
        nibble.0
    }
}

impl From<Nibble> for usize {
    fn from(nibble: Nibble) -> Self {
        nibble.0 as usize
    }
}

impl fmt::Display for Nibble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::Debug for Nibble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

#[cfg(any(test, feature = "fuzzing"))]
impl Arbitrary for Nibble {
    type Parameters = ();
    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (0u8..16).prop_map(Self::from).boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

/// Unfolds a byte key into its nibble sequence, high nibble first.
pub(crate) fn bytes_to_nibbles(bytes: &[u8]) -> Vec<Nibble> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        nibbles.push(Nibble(byte >> 4));
        nibbles.push(Nibble(byte & 0x0f));
    }
    nibbles
}

/// Length of the longest common prefix of two nibble sequences.
pub(crate) fn common_prefix_len(a: &[Nibble], b: &[Nibble]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Splits `path` at `at` into the shared prefix, the diverging nibble and the
/// remainder behind it. `at` must be within bounds.
pub(crate) fn split_at(path: &[Nibble], at: usize) -> (&[Nibble], Nibble, &[Nibble]) {
    (&path[..at], path[at], &path[at + 1..])
}

/// Hex rendition of a nibble sequence, for error contexts.
pub(crate) fn hex_str(nibbles: &[Nibble]) -> String {
    nibbles.iter().map(|n| format!("{}", n)).collect()
}
