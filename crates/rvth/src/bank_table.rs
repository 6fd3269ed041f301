// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! The NHCD bank directory at LBA `0x300000`: header, per-bank entries, and the fallback
//! heuristics used when that directory is missing or damaged.

use crate::ref_file::{RefFile, lba_to_bytes};
use byteorder::{BE, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

/// LBA of the NHCD bank table header.
pub const NHCD_BANKTABLE_ADDRESS_LBA: u32 = 0x300000;
/// Number of LBAs occupied by the header plus the 8 standard entry slots (1 + 8 x 512-byte
/// records).
pub const NHCD_HEADER_SIZE_LBA: u32 = 9;
/// Number of banks a standard (non-extended) table carries.
pub const NHCD_STANDARD_BANK_COUNT: u32 = 8;
/// Spacing between consecutive single-layer Wii/GameCube banks.
pub const NHCD_BANK_SIZE_LBA: u32 = 0x8C4A00;
/// Size of a dual-layer Wii bank (occupies two consecutive bank slots).
pub const NHCD_BANK_WII_DL_SIZE_LBA: u32 = 0xFE9F00;
/// Size given to the relocated bank 1 of an extended bank table (GCN images only).
pub const NHCD_EXTBANKTABLE_BANK_1_SIZE_LBA: u32 = 0x300000;

const NHCD_MAGIC: [u8; 4] = *b"NHCD";
const ENTRY_SIZE: usize = 512;

/// Default LBA a bank would occupy absent any on-disk entry, per `NHCD_BANK_START_LBA`.
///
/// For a standard (`bank_count <= 8`) table every bank after the header sits at fixed spacing
/// from `0x300009`. On an extended table bank 0 relocates to LBA 0 (GCN-sized, since only a
/// GameCube image fits ahead of the directory); banks 1+ keep the standard spacing.
pub const fn default_bank_start_lba(bank_index: u32, bank_count: u32) -> u32 {
    let base = NHCD_BANKTABLE_ADDRESS_LBA + NHCD_HEADER_SIZE_LBA;

    if bank_count <= NHCD_STANDARD_BANK_COUNT {
        base + bank_index * NHCD_BANK_SIZE_LBA
    } else if bank_index == 0 {
        0
    } else {
        base + (bank_index - 1) * NHCD_BANK_SIZE_LBA
    }
}

/// What kind of image (if any) a bank table entry's type tag names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankType {
    /// No image occupies this bank.
    Empty,
    /// A type tag was present but didn't match any known value.
    Unknown,
    /// GameCube disc (`"GC1L"`).
    Gcn,
    /// Single-layer Wii disc (`"NN1L"`).
    WiiSl,
    /// First half of a dual-layer Wii disc (`"NN2L"`).
    WiiDl,
    /// Second half of a dual-layer Wii disc; a placeholder slot, never directly selectable.
    WiiDlBank2,
}

impl BankType {
    fn from_tag(tag: &[u8; 4]) -> Self {
        match tag {
            [0, 0, 0, 0] => Self::Empty,
            b"GC1L" => Self::Gcn,
            b"NN1L" => Self::WiiSl,
            b"NN2L" => Self::WiiDl,
            _ => Self::Unknown,
        }
    }

    fn to_tag(self) -> [u8; 4] {
        match self {
            Self::Empty | Self::WiiDlBank2 => [0, 0, 0, 0],
            Self::Unknown => [0, 0, 0, 0],
            Self::Gcn => *b"GC1L",
            Self::WiiSl => *b"NN1L",
            Self::WiiDl => *b"NN2L",
        }
    }
}

/// One 512-byte NHCD bank table entry, decoded.
#[derive(Debug, Clone, Copy)]
pub struct NhcdBankEntry {
    /// The entry's type tag.
    pub bank_type: BankType,
    /// POSIX timestamp parsed from the 14-byte `"YYYYMMDDhhmmss"` field, or `-1` if unparseable
    /// (including empty banks, which carry no timestamp).
    pub timestamp: i64,
    /// First LBA of the bank's image, relative to the start of the device.
    pub lba_start: u32,
    /// Length of the bank's image, in LBAs.
    pub lba_len: u32,
    /// Set once a bank has been soft-deleted (tracked alongside the entry, not stored on disk as
    /// a distinct bit -- deletion is represented by the host tool zeroing the type tag while
    /// keeping `lba_start`/`lba_len`, see [`crate::error::DomainError::BankAlreadyDeleted`]).
    pub is_deleted: bool,
}

impl NhcdBankEntry {
    fn parse(buf: &[u8; ENTRY_SIZE]) -> Self {
        let tag: [u8; 4] = buf[0..4].try_into().expect("4-byte slice");
        let bank_type = BankType::from_tag(&tag);

        let timestamp_field = &buf[0x012..0x012 + 14];
        let timestamp = parse_timestamp(timestamp_field).unwrap_or(-1);

        let lba_start = BE::read_u32(&buf[0x020..0x024]);
        let lba_len = BE::read_u32(&buf[0x024..0x028]);

        Self {
            bank_type,
            timestamp,
            lba_start,
            lba_len,
            is_deleted: false,
        }
    }

    fn serialize(&self, now_timestamp_field: &[u8; 14]) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];

        if matches!(self.bank_type, BankType::Empty) {
            return buf;
        }

        buf[0..4].copy_from_slice(&self.bank_type.to_tag());
        buf[0x004..0x004 + 14].copy_from_slice(&[b'0'; 14]);

        if !self.is_deleted {
            buf[0x012..0x012 + 14].copy_from_slice(now_timestamp_field);
        }

        BE::write_u32(&mut buf[0x020..0x024], self.lba_start);
        BE::write_u32(&mut buf[0x024..0x028], self.lba_len);

        buf
    }
}

fn parse_timestamp(field: &[u8]) -> Option<i64> {
    let s = std::str::from_utf8(field).ok()?;
    if s.len() != 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year: i64 = s[0..4].parse().ok()?;
    let month: i64 = s[4..6].parse().ok()?;
    let day: i64 = s[6..8].parse().ok()?;
    let hour: i64 = s[8..10].parse().ok()?;
    let minute: i64 = s[10..12].parse().ok()?;
    let second: i64 = s[12..14].parse().ok()?;

    // Days-from-civil algorithm (Howard Hinnant), good for any Gregorian date; avoids a chrono
    // dependency for what is otherwise a single read-only field.
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days_since_epoch = era * 146097 + doe - 719468;

    Some(days_since_epoch * 86400 + hour * 3600 + minute * 60 + second)
}

/// Render a POSIX timestamp as the 14-byte `"YYYYMMDDhhmmss"` field.
pub fn format_timestamp(timestamp: i64) -> [u8; 14] {
    let mut days = timestamp.div_euclid(86400);
    let mut secs_of_day = timestamp.rem_euclid(86400);

    let hour = secs_of_day / 3600;
    secs_of_day %= 3600;
    let minute = secs_of_day / 60;
    let second = secs_of_day % 60;

    days += 719468;
    let era = if days >= 0 { days } else { days - 146096 } / 146097;
    let doe = days - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };

    let formatted = format!(
        "{year:04}{month:02}{day:02}{hour:02}{minute:02}{second:02}"
    );
    formatted.into_bytes().try_into().expect("14-byte timestamp")
}

/// Bank table state: either a parsed NHCD directory, or one of the recognized fallback
/// conditions when no valid NHCD header is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NhcdStatus {
    /// No NHCD header and no other recognizable structure at the expected locations.
    Missing,
    /// An MBR partition signature (`0x55AA` at LBA 0 offset `0x1FE`) was found instead.
    HasMbr,
    /// A GPT signature was found at LBA 1 instead.
    HasGpt,
}

/// The NHCD bank table, or the fallback condition observed in its place.
pub enum BankTable {
    /// A valid NHCD header was read; `entries` holds every decoded bank (at least the standard
    /// 8; more on an extended table).
    Nhcd {
        /// Bank count as declared by the header (may lie outside `[1, 8]`).
        bank_count: u32,
        /// Decoded per-bank entries, in bank order.
        entries: Vec<NhcdBankEntry>,
    },
    /// No NHCD header; a synthesized read-only default 8-bank layout is returned instead, per the
    /// fallback policy.
    Fallback {
        /// Which fallback condition triggered synthesis.
        status: NhcdStatus,
        /// Synthesized default entries (all marked empty; real content is discovered per-bank by
        /// reading the default LBA window and checking for a disc header magic).
        entries: Vec<NhcdBankEntry>,
    },
}

impl BankTable {
    /// Bank entries, regardless of whether they came from a real NHCD table or a synthesized
    /// fallback.
    pub fn entries(&self) -> &[NhcdBankEntry] {
        match self {
            Self::Nhcd { entries, .. } => entries,
            Self::Fallback { entries, .. } => entries,
        }
    }

    /// Whether the device should be treated as read-only (true for every fallback condition).
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Errors reading or writing the bank table.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum BankTableError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("NHCD bank table magic is missing or invalid")]
    NhcdTableMagic,
}

fn synthesize_default_entries() -> Vec<NhcdBankEntry> {
    (0..NHCD_STANDARD_BANK_COUNT)
        .map(|i| NhcdBankEntry {
            bank_type: BankType::Empty,
            timestamp: -1,
            lba_start: default_bank_start_lba(i, NHCD_STANDARD_BANK_COUNT),
            lba_len: NHCD_BANK_SIZE_LBA,
            is_deleted: false,
        })
        .collect()
}

/// Read and parse the NHCD bank table, or detect one of the fallback conditions and synthesize
/// the default 8-bank layout.
pub fn read_bank_table(file: &RefFile) -> Result<BankTable, BankTableError> {
    let mut header = [0u8; 512];
    file.seek(lba_to_bytes(NHCD_BANKTABLE_ADDRESS_LBA as u64))?;
    let read = file.read(&mut header)?;

    if read == 512 && header[0..4] == NHCD_MAGIC && BE::read_u32(&header[4..8]) == 1 {
        let bank_count = BE::read_u32(&header[8..12]);
        let mut entries = Vec::with_capacity(bank_count as usize);

        for i in 0..bank_count {
            let mut entry_buf = [0u8; ENTRY_SIZE];
            file.seek(lba_to_bytes(
                (NHCD_BANKTABLE_ADDRESS_LBA + 1 + i) as u64,
            ))?;
            file.read_exact(&mut entry_buf)?;
            entries.push(NhcdBankEntry::parse(&entry_buf));
        }

        return Ok(BankTable::Nhcd { bank_count, entries });
    }

    let status = detect_fallback_status(file)?;
    Ok(BankTable::Fallback {
        status,
        entries: synthesize_default_entries(),
    })
}

fn detect_fallback_status(file: &RefFile) -> io::Result<NhcdStatus> {
    let mut sector0 = [0u8; 512];
    file.seek(0)?;
    file.read_exact(&mut sector0)?;

    if sector0[0x1FE] == 0x55 && sector0[0x1FF] == 0xAA {
        return Ok(NhcdStatus::HasMbr);
    }

    let mut sector1 = [0u8; 512];
    file.seek(512)?;
    if file.read_exact(&mut sector1).is_ok() && &sector1[0..8] == b"EFI PART" {
        return Ok(NhcdStatus::HasGpt);
    }

    Ok(NhcdStatus::Missing)
}

/// Write a single bank entry back to the NHCD table at slot `index`.
///
/// Requires a writable, valid NHCD-backed device; fallback (synthesized) layouts are always
/// read-only and have nowhere valid to write to.
pub fn write_bank_entry(
    file: &RefFile,
    index: u32,
    entry: &NhcdBankEntry,
    now_timestamp: i64,
) -> Result<(), BankTableError> {
    let timestamp_field = format_timestamp(now_timestamp);
    let buf = entry.serialize(&timestamp_field);

    file.seek(lba_to_bytes((NHCD_BANKTABLE_ADDRESS_LBA + 1 + index) as u64))?;
    file.write_all(&buf)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_nhcd_image(bank_count: u32, entries: &[(BankType, u32, u32)]) -> Vec<u8> {
        let total_lba = NHCD_BANKTABLE_ADDRESS_LBA + NHCD_HEADER_SIZE_LBA + bank_count * 4;
        let mut data = vec![0u8; total_lba as usize * 512];

        let header_off = lba_to_bytes(NHCD_BANKTABLE_ADDRESS_LBA as u64) as usize;
        data[header_off..header_off + 4].copy_from_slice(&NHCD_MAGIC);
        BE::write_u32(&mut data[header_off + 4..header_off + 8], 1);
        BE::write_u32(&mut data[header_off + 8..header_off + 12], bank_count);

        for (i, (bank_type, lba_start, lba_len)) in entries.iter().enumerate() {
            let entry_off =
                lba_to_bytes((NHCD_BANKTABLE_ADDRESS_LBA + 1 + i as u32) as u64) as usize;
            data[entry_off..entry_off + 4].copy_from_slice(&bank_type.to_tag());
            BE::write_u32(&mut data[entry_off + 0x20..entry_off + 0x24], *lba_start);
            BE::write_u32(&mut data[entry_off + 0x24..entry_off + 0x28], *lba_len);
        }

        data
    }

    fn temp_reffile(bytes: &[u8]) -> (std::path::PathBuf, RefFile) {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "rvth_banktable_test_{:?}_{}",
            std::thread::current().id(),
            bytes.len()
        ));
        std::fs::write(&path, bytes).expect("write temp file");
        let file = RefFile::open_read_write(&path).expect("open");
        (path, file)
    }

    #[test]
    fn parses_standard_table() {
        let data = write_nhcd_image(
            8,
            &[
                (BankType::Gcn, 0x300009, 0x8C4A00),
                (BankType::WiiSl, 0x300009 + 0x8C4A00, 0x8C4A00),
            ],
        );
        let (path, file) = temp_reffile(&data);

        let table = read_bank_table(&file).expect("read");
        match table {
            BankTable::Nhcd { bank_count, entries } => {
                assert_eq!(bank_count, 8);
                assert_eq!(entries[0].bank_type, BankType::Gcn);
                assert_eq!(entries[0].lba_start, 0x300009);
                assert_eq!(entries[1].bank_type, BankType::WiiSl);
                assert_eq!(entries[1].lba_start, 0x300009 + 0x8C4A00);
                for e in &entries[2..] {
                    assert_eq!(e.bank_type, BankType::Empty);
                }
            }
            BankTable::Fallback { .. } => panic!("expected a parsed NHCD table"),
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_magic_falls_back_to_default_layout() {
        let data = vec![0u8; 0x400000];
        let (path, file) = temp_reffile(&data);

        let table = read_bank_table(&file).expect("read");
        match table {
            BankTable::Fallback { status, entries } => {
                assert_eq!(status, NhcdStatus::Missing);
                assert_eq!(entries.len(), 8);
                assert!(table_is_read_only_helper(&entries));
            }
            BankTable::Nhcd { .. } => panic!("expected a fallback"),
        }

        let _ = std::fs::remove_file(&path);
    }

    fn table_is_read_only_helper(entries: &[NhcdBankEntry]) -> bool {
        entries.iter().all(|e| e.bank_type == BankType::Empty)
    }

    #[test]
    fn detects_mbr_fallback() {
        let mut data = vec![0u8; 512];
        data[0x1FE] = 0x55;
        data[0x1FF] = 0xAA;
        let (path, file) = temp_reffile(&data);

        let table = read_bank_table(&file).expect("read");
        match table {
            BankTable::Fallback { status, .. } => assert_eq!(status, NhcdStatus::HasMbr),
            BankTable::Nhcd { .. } => panic!("expected a fallback"),
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn timestamp_round_trips() {
        let original = 1_700_000_000i64;
        let field = format_timestamp(original);
        assert_eq!(parse_timestamp(&field), Some(original));
    }

    #[test]
    fn write_bank_entry_persists_fields() {
        let data = write_nhcd_image(8, &[(BankType::Empty, 0, 0)]);
        let (path, file) = temp_reffile(&data);

        let entry = NhcdBankEntry {
            bank_type: BankType::Gcn,
            timestamp: 1_700_000_000,
            lba_start: 0x300009,
            lba_len: 0x8C4A00,
            is_deleted: false,
        };
        write_bank_entry(&file, 0, &entry, 1_700_000_000).expect("write");

        let table = read_bank_table(&file).expect("read back");
        let entries = table.entries();
        assert_eq!(entries[0].bank_type, BankType::Gcn);
        assert_eq!(entries[0].lba_start, 0x300009);
        assert_eq!(entries[0].timestamp, 1_700_000_000);

        let _ = std::fs::remove_file(&path);
    }
}
