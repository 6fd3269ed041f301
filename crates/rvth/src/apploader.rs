// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Boot-block / boot-info (BB2/BI2) parsing and the AppLoader sanity checks run over the DOL
//! executable they describe.
//!
//! The BB2/BI2 byte layout is a best-effort reconstruction: `spec.md` names the fields this
//! module checks (`FSTLength`, `FSTMaxLength`, `debugMonSize`, `simMemSize`, `FSTAddress`,
//! `dolLimit`) without giving byte offsets, and no example in the pack pins down the exact
//! layout. The offsets below follow the well-documented public GC/Wii SDK boot layout; the DOL
//! segment-table layout they feed into (7 text + 11 data segments) *is* the standard, widely
//! reverse-engineered format and is byte-exact.

use byteorder::{BE, ByteOrder};
use std::io::{self, Read};
use thiserror::Error;

/// Physical memory size assumed for the `simMemSize` bound.
pub const PHYS_MEM_SIZE: u32 = 24 * 1024 * 1024;

const BOOT_INFO_OFFSET: usize = 0x420;
const DOL_TEXT_SEGMENTS: usize = 7;
const DOL_DATA_SEGMENTS: usize = 11;
const DOL_HEADER_SIZE: usize = 0x100;

const WII_RETAIL_LIMIT: u32 = 0x8090_0000;
const WII_DEBUG_LIMIT: u32 = 0x8120_0000;
const GCN_RETAIL_LIMIT: u32 = 0x8070_0000;
const GCN_DEBUG_LIMIT: u32 = 0x8120_0000;
const DOL_SEGMENT_LIMIT: u32 = 0x8120_0000;
const FST_ADDRESS_LIMIT: u32 = 0x8170_0000;
const EXEMPT_RANGE: std::ops::Range<u32> = 0x8110_0000..0x8113_0000;

/// Exactly one of the 12 outcomes `init_apploader` can report, plus `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AppLoaderError {
    Ok,
    FstExceedsMax,
    DebugMonSizeUnaligned,
    SimMemSizeUnaligned,
    DebugMonSizeExceedsRemaining,
    SimMemSizeExceedsPhysical,
    FstAddressTooHigh,
    DolTotalSizeExceedsLimit,
    WiiRetailSectionAddressTooHigh,
    WiiDebugSectionAddressTooHigh,
    GcnRetailSectionAddressTooHigh,
    GcnDebugSectionAddressTooHigh,
    DolSegmentEndTooHigh,
}

/// Which console/signing combination governs the per-section address limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleKind {
    /// Wii, retail-signed.
    WiiRetail,
    /// Wii, debug-signed.
    WiiDebug,
    /// GameCube, retail-signed.
    GcnRetail,
    /// GameCube, debug-signed.
    GcnDebug,
}

/// Decoded boot-info (BI2) fields this module's checks depend on.
#[derive(Debug, Clone, Copy)]
pub struct BootInfo {
    /// Size of the FST before the DOL is loaded.
    pub fst_length: u32,
    /// Maximum allowed FST size.
    pub fst_max_length: u32,
    /// Size reserved for the debugger monitor.
    pub debug_mon_size: u32,
    /// Size reserved for the debugger's simulated memory.
    pub sim_mem_size: u32,
    /// Load address of the FST.
    pub fst_address: u32,
}

impl BootInfo {
    /// Parse BI2 fields out of the 1024-byte boot-block/boot-info buffer, anchored at
    /// [`BOOT_INFO_OFFSET`].
    pub fn parse(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < BOOT_INFO_OFFSET + 0x20 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "boot-info buffer too short",
            ));
        }
        let bi2 = &buf[BOOT_INFO_OFFSET..];
        Ok(Self {
            debug_mon_size: BE::read_u32(&bi2[0x00..0x04]),
            sim_mem_size: BE::read_u32(&bi2[0x04..0x08]),
            fst_address: BE::read_u32(&bi2[0x14..0x18]),
            fst_max_length: BE::read_u32(&bi2[0x18..0x1C]),
            fst_length: BE::read_u32(&bi2[0x1C..0x20]),
        })
    }
}

/// A decoded DOL segment table (addresses and sizes only; the segment payloads themselves are
/// not read).
#[derive(Debug, Clone)]
pub struct DolHeader {
    /// Load addresses of the 7 text segments (0 when unused).
    pub text_addresses: [u32; DOL_TEXT_SEGMENTS],
    /// Sizes of the 7 text segments.
    pub text_sizes: [u32; DOL_TEXT_SEGMENTS],
    /// Load addresses of the 11 data segments (0 when unused).
    pub data_addresses: [u32; DOL_DATA_SEGMENTS],
    /// Sizes of the 11 data segments.
    pub data_sizes: [u32; DOL_DATA_SEGMENTS],
}

impl DolHeader {
    /// Parse the 256-byte DOL header (offsets, addresses, lengths; the BSS/entry-point fields
    /// aren't needed by these checks and are skipped).
    pub fn parse(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < DOL_HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "DOL header buffer too short",
            ));
        }

        let mut text_addresses = [0u32; DOL_TEXT_SEGMENTS];
        let mut text_sizes = [0u32; DOL_TEXT_SEGMENTS];
        let mut data_addresses = [0u32; DOL_DATA_SEGMENTS];
        let mut data_sizes = [0u32; DOL_DATA_SEGMENTS];

        for i in 0..DOL_TEXT_SEGMENTS {
            text_addresses[i] = BE::read_u32(&buf[0x48 + i * 4..0x48 + i * 4 + 4]);
            text_sizes[i] = BE::read_u32(&buf[0x90 + i * 4..0x90 + i * 4 + 4]);
        }
        for i in 0..DOL_DATA_SEGMENTS {
            data_addresses[i] = BE::read_u32(&buf[0x64 + i * 4..0x64 + i * 4 + 4]);
            data_sizes[i] = BE::read_u32(&buf[0xAC + i * 4..0xAC + i * 4 + 4]);
        }

        Ok(Self {
            text_addresses,
            text_sizes,
            data_addresses,
            data_sizes,
        })
    }

    /// Sum of every segment's size, the "DOL total size" the checks compare against
    /// `bi2.dolLimit`.
    pub fn total_size(&self) -> u64 {
        self.text_sizes.iter().map(|&s| s as u64).sum::<u64>()
            + self.data_sizes.iter().map(|&s| s as u64).sum::<u64>()
    }

    fn segment_ends(&self) -> impl Iterator<Item = u32> + '_ {
        self.text_addresses
            .iter()
            .zip(self.text_sizes.iter())
            .chain(self.data_addresses.iter().zip(self.data_sizes.iter()))
            .filter(|(&addr, _)| addr != 0)
            .map(|(&addr, &size)| addr.saturating_add(size))
    }
}

fn retail_limit(console: ConsoleKind) -> (u32, AppLoaderError) {
    match console {
        ConsoleKind::WiiRetail => (WII_RETAIL_LIMIT, AppLoaderError::WiiRetailSectionAddressTooHigh),
        ConsoleKind::WiiDebug => (WII_DEBUG_LIMIT, AppLoaderError::WiiDebugSectionAddressTooHigh),
        ConsoleKind::GcnRetail => (GCN_RETAIL_LIMIT, AppLoaderError::GcnRetailSectionAddressTooHigh),
        ConsoleKind::GcnDebug => (GCN_DEBUG_LIMIT, AppLoaderError::GcnDebugSectionAddressTooHigh),
    }
}

/// Run the ordered AppLoader checks over a parsed BI2 and DOL header, given `dol_limit` (from
/// BI2's `dolLimit`) and whether the FST physically precedes or follows the DOL on disc.
///
/// Returns `(AppLoaderError::Ok, [0; 3])` when every check passes; otherwise the first failing
/// check's tag and up to 3 `u32`s of context.
pub fn check_apploader(
    bi2: &BootInfo,
    dol: &DolHeader,
    dol_limit: u64,
    console: ConsoleKind,
    fst_precedes_dol: bool,
) -> (AppLoaderError, [u32; 3]) {
    if bi2.fst_length > bi2.fst_max_length {
        return (AppLoaderError::FstExceedsMax, [bi2.fst_length, bi2.fst_max_length, 0]);
    }

    if bi2.debug_mon_size % 32 != 0 {
        return (AppLoaderError::DebugMonSizeUnaligned, [bi2.debug_mon_size, 0, 0]);
    }

    if bi2.sim_mem_size % 32 != 0 {
        return (AppLoaderError::SimMemSizeUnaligned, [bi2.sim_mem_size, 0, 0]);
    }

    if bi2.sim_mem_size < PHYS_MEM_SIZE
        && bi2.debug_mon_size >= PHYS_MEM_SIZE - bi2.sim_mem_size
    {
        return (
            AppLoaderError::DebugMonSizeExceedsRemaining,
            [bi2.debug_mon_size, PHYS_MEM_SIZE - bi2.sim_mem_size, 0],
        );
    }

    if bi2.sim_mem_size > PHYS_MEM_SIZE {
        return (AppLoaderError::SimMemSizeExceedsPhysical, [bi2.sim_mem_size, PHYS_MEM_SIZE, 0]);
    }

    if bi2.fst_address > FST_ADDRESS_LIMIT {
        return (AppLoaderError::FstAddressTooHigh, [bi2.fst_address, FST_ADDRESS_LIMIT, 0]);
    }

    let dol_total = dol.total_size();
    if dol_total > dol_limit {
        return (
            AppLoaderError::DolTotalSizeExceedsLimit,
            [dol_total as u32, dol_limit as u32, 0],
        );
    }

    let (limit, err) = retail_limit(console);
    for end in dol.segment_ends() {
        if EXEMPT_RANGE.contains(&end) {
            continue;
        }
        if end > limit {
            return (err, [end, limit, 0]);
        }
    }

    for end in dol.segment_ends() {
        if EXEMPT_RANGE.contains(&end) {
            continue;
        }
        if end > DOL_SEGMENT_LIMIT {
            return (AppLoaderError::DolSegmentEndTooHigh, [end, DOL_SEGMENT_LIMIT, 0]);
        }
    }

    if !fst_precedes_dol && bi2.fst_length > bi2.fst_max_length {
        return (AppLoaderError::FstExceedsMax, [bi2.fst_length, bi2.fst_max_length, 0]);
    }

    (AppLoaderError::Ok, [0, 0, 0])
}

/// Errors reading or parsing the boot-block/boot-info/DOL material.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum AppLoaderReadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Read the 1024-byte boot-block/boot-info buffer from a partition's LBA 2 and decode it.
pub fn read_boot_info<R: Read>(mut reader: R) -> Result<BootInfo, AppLoaderReadError> {
    let mut buf = [0u8; 1024];
    reader.read_exact(&mut buf)?;
    Ok(BootInfo::parse(&buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing_bi2() -> BootInfo {
        BootInfo {
            fst_length: 0x1000,
            fst_max_length: 0x2000,
            debug_mon_size: 0,
            sim_mem_size: 0,
            fst_address: 0x8010_0000,
        }
    }

    fn empty_dol() -> DolHeader {
        DolHeader {
            text_addresses: [0; DOL_TEXT_SEGMENTS],
            text_sizes: [0; DOL_TEXT_SEGMENTS],
            data_addresses: [0; DOL_DATA_SEGMENTS],
            data_sizes: [0; DOL_DATA_SEGMENTS],
        }
    }

    #[test]
    fn passes_with_clean_inputs() {
        let (err, _) = check_apploader(
            &passing_bi2(),
            &empty_dol(),
            0x10_0000,
            ConsoleKind::GcnRetail,
            true,
        );
        assert_eq!(err, AppLoaderError::Ok);
    }

    #[test]
    fn flags_fst_exceeding_max() {
        let mut bi2 = passing_bi2();
        bi2.fst_length = bi2.fst_max_length + 1;
        let (err, ctx) = check_apploader(&bi2, &empty_dol(), 0x10_0000, ConsoleKind::GcnRetail, true);
        assert_eq!(err, AppLoaderError::FstExceedsMax);
        assert_eq!(ctx[0], bi2.fst_length);
    }

    #[test]
    fn flags_unaligned_debug_mon_size() {
        let mut bi2 = passing_bi2();
        bi2.debug_mon_size = 33;
        let (err, _) = check_apploader(&bi2, &empty_dol(), 0x10_0000, ConsoleKind::GcnRetail, true);
        assert_eq!(err, AppLoaderError::DebugMonSizeUnaligned);
    }

    #[test]
    fn flags_sim_mem_size_exceeding_physical() {
        let mut bi2 = passing_bi2();
        bi2.sim_mem_size = PHYS_MEM_SIZE + 32;
        let (err, _) = check_apploader(&bi2, &empty_dol(), 0x10_0000, ConsoleKind::GcnRetail, true);
        assert_eq!(err, AppLoaderError::SimMemSizeExceedsPhysical);
    }

    #[test]
    fn flags_gcn_retail_section_too_high() {
        let mut dol = empty_dol();
        dol.text_addresses[0] = GCN_RETAIL_LIMIT;
        dol.text_sizes[0] = 0x100;
        let (err, _) = check_apploader(&passing_bi2(), &dol, 0x10_0000, ConsoleKind::GcnRetail, true);
        assert_eq!(err, AppLoaderError::GcnRetailSectionAddressTooHigh);
    }

    #[test]
    fn exempt_range_is_not_flagged() {
        let mut dol = empty_dol();
        dol.text_addresses[0] = 0x8110_0000;
        dol.text_sizes[0] = 0x1000;
        let (err, _) = check_apploader(&passing_bi2(), &dol, 0x10_0000, ConsoleKind::GcnDebug, true);
        assert_eq!(err, AppLoaderError::Ok);
    }

    #[test]
    fn flags_dol_total_size_exceeding_limit() {
        let mut dol = empty_dol();
        dol.text_sizes[0] = 0x20_0000;
        let (err, _) = check_apploader(&passing_bi2(), &dol, 0x1000, ConsoleKind::GcnRetail, true);
        assert_eq!(err, AppLoaderError::DolTotalSizeExceedsLimit);
    }
}
