// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Streaming and one-shot SHA-1/SHA-256, used throughout the Merkle hash tree and the
//! certificate-chain signature checks.

use sha1::{Digest, Sha1};
use sha2::Sha256;

/// A SHA-1 context that can be fed incrementally, reused across the 64 sectors of a group without
/// reallocating.
#[derive(Clone, Default)]
pub struct Sha1Context(Sha1);

impl Sha1Context {
    /// Start a new digest.
    pub fn new() -> Self {
        Self(Sha1::new())
    }

    /// Feed more bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Consume the context and return the 20-byte digest.
    pub fn finish(self) -> [u8; 20] {
        self.0.finalize().into()
    }

    /// Reset the context to its initial state, so it can be reused for the next hash without a
    /// fresh allocation.
    pub fn reset(&mut self) {
        self.0 = Sha1::new();
    }
}

/// One-shot SHA-1 of `data`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut ctx = Sha1Context::new();
    ctx.update(data);
    ctx.finish()
}

/// A SHA-256 context, for Wii U format-variant signatures.
#[derive(Clone, Default)]
pub struct Sha256Context(Sha256);

impl Sha256Context {
    /// Start a new digest.
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// Feed more bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Consume the context and return the 32-byte digest.
    pub fn finish(self) -> [u8; 32] {
        self.0.finalize().into()
    }
}

/// One-shot SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut ctx = Sha256Context::new();
    ctx.update(data);
    ctx.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_empty_input_matches_known_answer() {
        assert_eq!(
            sha1(b""),
            [
                0xda, 0x39, 0xa3, 0xee, 0x5e, 0x6b, 0x4b, 0x0d, 0x32, 0x55, 0xbf, 0xef, 0x95, 0x60,
                0x18, 0x90, 0xaf, 0xd8, 0x07, 0x09,
            ]
        );
    }

    #[test]
    fn sha1_streaming_matches_one_shot() {
        let mut ctx = Sha1Context::new();
        ctx.update(b"hello ");
        ctx.update(b"world");

        assert_eq!(ctx.finish(), sha1(b"hello world"));
    }

    #[test]
    fn sha1_context_reset_clears_state() {
        let mut ctx = Sha1Context::new();
        ctx.update(b"garbage");
        ctx.reset();
        ctx.update(b"hello world");

        assert_eq!(ctx.finish(), sha1(b"hello world"));
    }

    #[test]
    fn sha256_of_empty_input_matches_known_answer() {
        assert_eq!(
            sha256(b""),
            [
                0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f,
                0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b,
                0x78, 0x52, 0xb8, 0x55,
            ]
        );
    }
}
