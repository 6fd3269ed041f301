// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! The Wii volume-group / partition table at byte offset `0x40000` on every Wii disc.

use crate::reader::Reader;
use byteorder::{BigEndian, ByteOrder};
use std::io;
use thiserror::Error;

/// Byte offset of the volume group table on every Wii disc.
pub const VOLUME_GROUP_TABLE_ADDRESS: u64 = 0x40000;
/// LBA of the volume group table.
pub const VOLUME_GROUP_TABLE_LBA: u32 = (VOLUME_GROUP_TABLE_ADDRESS / 512) as u32;

const VOLUME_GROUP_COUNT: usize = 4;
const MAX_COMBINED_ENTRIES: usize = 31;

/// A partition's type, as recorded in the volume group table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    /// The game data partition.
    Game,
    /// An online-update partition, stripped by [`ptbl_remove_updates`].
    Update,
    /// Anything else (channel installers, etc).
    Other(u32),
}

impl PartitionKind {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Game,
            1 => Self::Update,
            other => Self::Other(other),
        }
    }

    fn to_raw(self) -> u32 {
        match self {
            Self::Game => 0,
            Self::Update => 1,
            Self::Other(raw) => raw,
        }
    }
}

/// One partition table entry, with its LBA span resolved.
#[derive(Debug, Clone, Copy)]
pub struct PartitionEntry {
    /// First LBA of the partition, relative to the bank's window.
    pub lba_start: u32,
    /// Length of the partition in LBAs, derived from the next entry's start (or the bank's total
    /// length, for the last entry).
    pub lba_len: u32,
    /// The partition's declared type.
    pub kind: PartitionKind,
    /// Which of the 4 volume groups this entry came from.
    pub vg_index: u8,
    /// This entry's index within its volume group.
    pub pt_index: u8,
}

/// One volume group's original placement, kept so [`ptbl_write`] can re-emit the table without
/// disturbing groups the tool doesn't touch.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeGroup {
    /// Number of partition entries originally in this group.
    pub count: u32,
    /// Byte address of this group's entry array.
    pub address: u64,
}

/// The 4-group table as originally read from disc.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeGroupTable {
    /// The 4 volume groups, host-endian.
    pub groups: [VolumeGroup; VOLUME_GROUP_COUNT],
}

/// Errors loading or rebuilding a partition table.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum PartitionTableError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("partition table would overflow its combined 31-entry limit")]
    TooManyEntries,
}

fn lba_of_byte_address(addr: u64) -> u32 {
    (addr / 512) as u32
}

/// Read the volume group table and every non-skipped group's partition entries.
///
/// A volume group whose address lies before the table's own base is silently skipped (a common
/// artifact of unused/garbage group slots).
pub fn ptbl_load(
    reader: &mut dyn Reader,
    bank_lba_len: u32,
) -> Result<(VolumeGroupTable, Vec<PartitionEntry>), PartitionTableError> {
    let mut header = [0u8; 1024];
    reader.read(&mut header, VOLUME_GROUP_TABLE_LBA, 2)?;

    let mut table = VolumeGroupTable::default();
    let mut entries = Vec::new();

    for vg_index in 0..VOLUME_GROUP_COUNT {
        let base = vg_index * 8;
        let count = BigEndian::read_u32(&header[base..base + 4]);
        let address_rshift2 = BigEndian::read_u32(&header[base + 4..base + 8]);
        let address = (address_rshift2 as u64) << 2;

        table.groups[vg_index] = VolumeGroup { count, address };

        if count == 0 || address < VOLUME_GROUP_TABLE_ADDRESS {
            continue;
        }

        if entries.len() + count as usize > MAX_COMBINED_ENTRIES {
            return Err(PartitionTableError::TooManyEntries);
        }

        let group_lba = lba_of_byte_address(address);
        let mut group_buf = vec![0u8; count as usize * 8];
        reader.read(
            &mut group_buf,
            group_lba,
            (group_buf.len() as u32).div_ceil(512),
        )?;

        for pt_index in 0..count as usize {
            let entry_base = pt_index * 8;
            let offset_rshift2 = BigEndian::read_u32(&group_buf[entry_base..entry_base + 4]);
            let kind_raw = BigEndian::read_u32(&group_buf[entry_base + 4..entry_base + 8]);

            let lba_start = lba_of_byte_address((offset_rshift2 as u64) << 2);

            entries.push(PartitionEntry {
                lba_start,
                lba_len: 0,
                kind: PartitionKind::from_raw(kind_raw),
                vg_index: vg_index as u8,
                pt_index: pt_index as u8,
            });
        }
    }

    entries.sort_by_key(|e| e.lba_start);
    let last = entries.len().saturating_sub(1);
    for i in 0..entries.len() {
        entries[i].lba_len = if i == last {
            bank_lba_len - entries[i].lba_start
        } else {
            entries[i + 1].lba_start - entries[i].lba_start
        };
    }

    Ok((table, entries))
}

/// Drop every update (`type == 1`) partition from a loaded table.
pub fn ptbl_remove_updates(entries: &mut Vec<PartitionEntry>) {
    entries.retain(|e| !matches!(e.kind, PartitionKind::Update));
}

/// The first game-data partition in volume group 0, if any.
pub fn find_game(entries: &[PartitionEntry]) -> Option<&PartitionEntry> {
    entries
        .iter()
        .find(|e| e.vg_index == 0 && matches!(e.kind, PartitionKind::Game))
}

/// Rebuild the volume group table image, preserving each original group's byte address while
/// updating its entry count and re-packing its entries, and write it back through `reader`.
pub fn ptbl_write(
    reader: &mut dyn Reader,
    table: &VolumeGroupTable,
    entries: &[PartitionEntry],
) -> Result<(), PartitionTableError> {
    let mut header = [0u8; 1024];

    for vg_index in 0..VOLUME_GROUP_COUNT {
        let group = &table.groups[vg_index];
        let group_entries: Vec<&PartitionEntry> =
            entries.iter().filter(|e| e.vg_index as usize == vg_index).collect();

        let base = vg_index * 8;
        BigEndian::write_u32(&mut header[base..base + 4], group_entries.len() as u32);
        BigEndian::write_u32(&mut header[base + 4..base + 8], (group.address >> 2) as u32);

        if group_entries.is_empty() {
            continue;
        }

        let mut group_buf = vec![0u8; group_entries.len() * 8];
        for (i, entry) in group_entries.iter().enumerate() {
            let entry_base = i * 8;
            let byte_offset = (entry.lba_start as u64) * 512;
            BigEndian::write_u32(
                &mut group_buf[entry_base..entry_base + 4],
                (byte_offset >> 2) as u32,
            );
            BigEndian::write_u32(
                &mut group_buf[entry_base + 4..entry_base + 8],
                entry.kind.to_raw(),
            );
        }

        let group_lba = lba_of_byte_address(group.address);
        reader.write(&group_buf, group_lba, (group_buf.len() as u32).div_ceil(512))?;
    }

    reader.write(&header, VOLUME_GROUP_TABLE_LBA, 2)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::PlainReader;
    use crate::ref_file::RefFile;
    use std::io::Write;

    fn reader_over(bytes: Vec<u8>) -> (tempfile_free::TempRefFile, PlainReader) {
        tempfile_free::with_temp_file(bytes)
    }

    // A tiny helper avoiding an actual `tempfile` dependency: write to a unique path under the
    // OS temp dir and open it as a RefFile. Fine for single-threaded test use.
    mod tempfile_free {
        use super::*;
        use std::path::PathBuf;

        pub struct TempRefFile {
            path: PathBuf,
        }

        impl Drop for TempRefFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }

        pub fn with_temp_file(bytes: Vec<u8>) -> (TempRefFile, PlainReader) {
            let mut path = std::env::temp_dir();
            path.push(format!(
                "rvth_ptbl_test_{:?}_{}",
                std::thread::current().id(),
                bytes.len()
            ));

            let mut f = std::fs::File::create(&path).expect("create temp file");
            f.write_all(&bytes).expect("write temp file");
            drop(f);

            let reffile = RefFile::open_read_write(&path).expect("open temp file");
            let len_lba = (bytes.len() as u32).div_ceil(512);
            let reader = PlainReader::new(reffile, 0, len_lba).expect("plain reader");

            (TempRefFile { path }, reader)
        }
    }

    fn build_image(game_lba: u32, update_lba: u32, total_lba: u32) -> Vec<u8> {
        let mut data = vec![0u8; total_lba as usize * 512];

        // Volume group 0: 2 entries, stored right after the table itself.
        let group0_addr = VOLUME_GROUP_TABLE_ADDRESS + 1024;
        BigEndian::write_u32(&mut data[0..4], 2);
        BigEndian::write_u32(&mut data[4..8], (group0_addr >> 2) as u32);

        let group0_off = group0_addr as usize;
        BigEndian::write_u32(
            &mut data[group0_off..group0_off + 4],
            (((update_lba as u64) * 512) >> 2) as u32,
        );
        BigEndian::write_u32(&mut data[group0_off + 4..group0_off + 8], 1);

        BigEndian::write_u32(
            &mut data[group0_off + 8..group0_off + 12],
            (((game_lba as u64) * 512) >> 2) as u32,
        );
        BigEndian::write_u32(&mut data[group0_off + 12..group0_off + 16], 0);

        data
    }

    #[test]
    fn loads_and_sorts_entries_by_lba() {
        let total_lba = 0x20000;
        let data = build_image(0x5000, 0x1000, total_lba);
        let (_guard, mut reader) = reader_over(data);

        let (_table, entries) = ptbl_load(&mut reader, total_lba).expect("load");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].lba_start, 0x1000);
        assert!(matches!(entries[0].kind, PartitionKind::Update));
        assert_eq!(entries[1].lba_start, 0x5000);
        assert!(matches!(entries[1].kind, PartitionKind::Game));

        // Last entry's length runs to the end of the bank.
        assert_eq!(entries[1].lba_len, total_lba - 0x5000);
        assert_eq!(entries[0].lba_len, 0x5000 - 0x1000);
    }

    #[test]
    fn remove_updates_drops_update_partitions_only() {
        let total_lba = 0x20000;
        let data = build_image(0x5000, 0x1000, total_lba);
        let (_guard, mut reader) = reader_over(data);

        let (_table, mut entries) = ptbl_load(&mut reader, total_lba).expect("load");
        ptbl_remove_updates(&mut entries);

        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0].kind, PartitionKind::Game));
    }

    #[test]
    fn find_game_locates_the_game_partition() {
        let total_lba = 0x20000;
        let data = build_image(0x5000, 0x1000, total_lba);
        let (_guard, mut reader) = reader_over(data);

        let (_table, entries) = ptbl_load(&mut reader, total_lba).expect("load");
        let game = find_game(&entries).expect("game partition");
        assert_eq!(game.lba_start, 0x5000);
    }
}
