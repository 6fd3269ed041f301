// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! The 1024-byte GameCube/Wii disc header and its "flush button" reconstruction path.

use crate::ref_file::{RefFile, lba_to_bytes};
use byteorder::{BigEndian, ByteOrder};
use std::io;
use thiserror::Error;

/// Size in bytes of a disc header.
pub const DISC_HEADER_SIZE: usize = 1024;

const WII_MAGIC_OFFSET: usize = 0x18;
const GCN_MAGIC_OFFSET: usize = 0x1C;
const WII_MAGIC: u32 = 0x5D1C_9EA3;
const GCN_MAGIC: u32 = 0xC233_9F3D;

/// What a disc header's magic bytes identify it as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscKind {
    /// Wii single- or dual-layer disc (layer distinction comes from the bank type, not here).
    Wii,
    /// GameCube disc.
    Gcn,
    /// Neither magic matched.
    Unknown,
}

/// The 1024-byte on-disc GameCube/Wii disc header.
#[derive(Debug, Clone)]
pub struct GcnDiscHeader {
    /// 6-character game ID (4-byte game code + 2-byte maker code).
    pub id6: [u8; 6],
    /// Disc number, for multi-disc titles.
    pub disc_number: u8,
    /// Disc format version.
    pub disc_version: u8,
    /// 64-byte null-padded game title.
    pub game_title: [u8; 64],
    /// Non-zero disables hash verification (an unencrypted/scrubbed Wii image marker).
    pub hash_verify: u8,
    /// Non-zero disables disc encryption.
    pub disc_no_crypt: u8,
    /// Raw bytes, kept so re-emission is byte-exact modulo the fields above.
    raw: [u8; DISC_HEADER_SIZE],
}

/// Errors decoding a disc header.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum DiscHeaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("buffer too short for a disc header: got {0} bytes, need {DISC_HEADER_SIZE}")]
    BufferTooShort(usize),
}

impl GcnDiscHeader {
    /// Parse a disc header from exactly [`DISC_HEADER_SIZE`] bytes.
    pub fn parse(buf: &[u8]) -> Result<Self, DiscHeaderError> {
        if buf.len() < DISC_HEADER_SIZE {
            return Err(DiscHeaderError::BufferTooShort(buf.len()));
        }

        let mut raw = [0u8; DISC_HEADER_SIZE];
        raw.copy_from_slice(&buf[..DISC_HEADER_SIZE]);

        let mut id6 = [0u8; 6];
        id6.copy_from_slice(&raw[0..6]);

        let mut game_title = [0u8; 64];
        game_title.copy_from_slice(&raw[0x20..0x20 + 64]);

        Ok(Self {
            id6,
            disc_number: raw[6],
            disc_version: raw[7],
            game_title,
            hash_verify: raw[0x60],
            disc_no_crypt: raw[0x61],
            raw,
        })
    }

    /// Re-serialize, reflecting any field mutations (`hash_verify`/`disc_no_crypt` in particular)
    /// back into the raw bytes.
    pub fn dump(&self) -> [u8; DISC_HEADER_SIZE] {
        let mut out = self.raw;
        out[0..6].copy_from_slice(&self.id6);
        out[6] = self.disc_number;
        out[7] = self.disc_version;
        out[0x20..0x20 + 64].copy_from_slice(&self.game_title);
        out[0x60] = self.hash_verify;
        out[0x61] = self.disc_no_crypt;
        out
    }

    /// Which magic (if any) this header's bytes carry.
    pub fn identify(&self) -> DiscKind {
        disc_header_identify(&self.raw)
    }

    /// The game ID as a display string, e.g. `"GALE01"`.
    pub fn id6_str(&self) -> String {
        String::from_utf8_lossy(&self.id6).into_owned()
    }
}

/// Identify a raw 1024-byte (or longer) header buffer by its magic bytes.
pub fn disc_header_identify(buf: &[u8]) -> DiscKind {
    if buf.len() >= WII_MAGIC_OFFSET + 4
        && BigEndian::read_u32(&buf[WII_MAGIC_OFFSET..]) == WII_MAGIC
    {
        return DiscKind::Wii;
    }
    if buf.len() >= GCN_MAGIC_OFFSET + 4
        && BigEndian::read_u32(&buf[GCN_MAGIC_OFFSET..]) == GCN_MAGIC
    {
        return DiscKind::Gcn;
    }

    DiscKind::Unknown
}

/// Read the disc header at `lba_start` through `file` (already positioned at the bank's base
/// LBA). Returns `None` when the sector carries no magic and is not all-zero (an `Empty` bank).
///
/// The full "flush button" reconstruction path (decrypting the game partition to recover a
/// zeroed header) lives in `bank::init`, since it needs the partition table and ticket crypto;
/// this only covers the direct read and the all-zero/magic-present fast paths.
pub fn disc_header_get(
    file: &RefFile,
    lba_start: u32,
) -> Result<Option<GcnDiscHeader>, DiscHeaderError> {
    let mut buf = [0u8; DISC_HEADER_SIZE];
    file.seek(lba_to_bytes(lba_start as u64))?;
    file.read_exact(&mut buf)?;

    match disc_header_identify(&buf) {
        DiscKind::Unknown if buf.iter().all(|&b| b == 0) => Ok(None),
        _ => Ok(Some(GcnDiscHeader::parse(&buf)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with_magic(magic_offset: usize, magic: u32) -> [u8; DISC_HEADER_SIZE] {
        let mut buf = [0u8; DISC_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[magic_offset..], magic);
        buf
    }

    #[test]
    fn identifies_wii_magic() {
        let buf = header_with_magic(WII_MAGIC_OFFSET, WII_MAGIC);
        assert_eq!(disc_header_identify(&buf), DiscKind::Wii);
    }

    #[test]
    fn identifies_gcn_magic() {
        let buf = header_with_magic(GCN_MAGIC_OFFSET, GCN_MAGIC);
        assert_eq!(disc_header_identify(&buf), DiscKind::Gcn);
    }

    #[test]
    fn unknown_when_no_magic_matches() {
        let mut buf = [0u8; DISC_HEADER_SIZE];
        buf[0] = 0x42;
        assert_eq!(disc_header_identify(&buf), DiscKind::Unknown);
    }

    #[test]
    fn parse_then_dump_round_trips_mutated_flags() {
        let mut buf = header_with_magic(WII_MAGIC_OFFSET, WII_MAGIC);
        buf[0..6].copy_from_slice(b"RSPE01");

        let mut header = GcnDiscHeader::parse(&buf).expect("parse");
        assert_eq!(header.id6_str(), "RSPE01");

        header.hash_verify = 1;
        header.disc_no_crypt = 1;
        let dumped = header.dump();

        assert_eq!(dumped[0x60], 1);
        assert_eq!(dumped[0x61], 1);
        assert_eq!(disc_header_identify(&dumped), DiscKind::Wii);
    }
}
