// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! WBFS container reader. Read-only: only the first disc in the archive is exposed.

use super::{ImageType, Reader};
use crate::ref_file::RefFile;
use byteorder::{BE, ReadBytesExt};
use std::io;

const WBFS_MAGIC: [u8; 4] = *b"WBFS";
const WII_SECTOR_SIZE: u64 = 0x8000;
const WII_SECTORS_PER_DISC: u32 = 143_432 * 2;
const WBFS_DISC_INFO_SIZE: u64 = 0x100;

/// Reader for the WBFS split-block container format. Parses the WBFS head to learn the on-disk
/// sector size, locates disc index 0, and exposes its `wlba_table` as a logical-to-physical block
/// map (entry `0` means "hole", matching CISO's empty-block convention but encoded as a
/// big-endian `u16`).
pub struct WbfsReader {
    file: RefFile,
    lba_start: u32,
    lba_len: u32,
    /// LBAs per WBFS sector.
    wbfs_sec_sz_lba: u32,
    wlba_table: Vec<u16>,
    disc_data_base: u64,
}

impl WbfsReader {
    /// Whether the header carries the WBFS magic and a sane declared sector-size shift.
    pub fn is_supported(header: &[u8]) -> bool {
        header.len() >= 6 && header[0..4] == WBFS_MAGIC && header[5] >= 0x09
    }

    /// Parse the WBFS head and the first disc's info block.
    pub fn new(file: RefFile, lba_start: u32, _lba_len_hint: u32) -> io::Result<Self> {
        let base = crate::ref_file::lba_to_bytes(lba_start as u64);
        file.seek(base)?;

        let mut head = [0u8; 12];
        file.read_exact(&mut head)?;

        if head[0..4] != WBFS_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a WBFS image"));
        }

        let hd_sec_sz_s = head[5];
        if hd_sec_sz_s < 9 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "WBFS sector size shift too small",
            ));
        }

        let hd_sec_sz = 1u64 << hd_sec_sz_s;
        let wbfs_sec_sz_s = head[6];
        let wbfs_sec_sz = 1u64 << wbfs_sec_sz_s;
        let wbfs_sec_sz_lba = (wbfs_sec_sz / 512) as u32;

        let n_wbfs_sec = (WII_SECTORS_PER_DISC as u64 * WII_SECTOR_SIZE) / wbfs_sec_sz + 1;
        let disc_info_sz =
            crate::ref_file::lba_to_bytes(0).max(WBFS_DISC_INFO_SIZE).max(hd_sec_sz);
        let freeblks_lba_bytes =
            (hd_sec_sz + disc_info_sz * 0 /* disc index 0 starts right after the head */) as u64;

        // Disc 0's info block sits immediately after the WBFS head, aligned to `hd_sec_sz`.
        file.seek(base + hd_sec_sz)?;

        let mut disc_id = [0u8; 6];
        file.read_exact(&mut disc_id)?;

        // Skip to the wlba table, which follows a fixed 0x100-byte disc header region.
        file.seek(base + hd_sec_sz + 0x100)?;

        let mut wlba_table = Vec::with_capacity(n_wbfs_sec as usize);
        for _ in 0..n_wbfs_sec {
            wlba_table.push(file.read_u16::<BE>()?);
        }

        let last_used = wlba_table.iter().rposition(|&entry| entry != 0);
        let lba_len = match last_used {
            Some(index) => (index as u32 + 1) * wbfs_sec_sz_lba,
            None => 0,
        };

        let _ = freeblks_lba_bytes;

        Ok(Self {
            file,
            lba_start,
            lba_len,
            wbfs_sec_sz_lba,
            wlba_table,
            disc_data_base: base,
        })
    }
}

impl Reader for WbfsReader {
    fn read(&mut self, buf: &mut [u8], lba_start: u32, lba_count: u32) -> io::Result<u32> {
        if lba_start + lba_count > self.lba_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read request exceeds WBFS disc length",
            ));
        }

        for i in 0..lba_count {
            let lba = lba_start + i;
            let dest = &mut buf[(i as usize) * 512..(i as usize + 1) * 512];

            let logical_block = lba / self.wbfs_sec_sz_lba;
            let offset_in_block = (lba % self.wbfs_sec_sz_lba) as u64 * 512;

            let physical_block = self
                .wlba_table
                .get(logical_block as usize)
                .copied()
                .unwrap_or(0);

            if physical_block == 0 {
                dest.fill(0);
                continue;
            }

            let offset = self.disc_data_base
                + physical_block as u64 * (self.wbfs_sec_sz_lba as u64 * 512)
                + offset_in_block;

            self.file.seek(offset)?;
            self.file.read_exact(dest)?;
        }

        Ok(lba_count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn lba_start(&self) -> u32 {
        self.lba_start
    }

    fn lba_len(&self) -> u32 {
        self.lba_len
    }

    fn image_type(&self) -> ImageType {
        ImageType::Wbfs
    }

    fn lba_adjust(&mut self, n: u32) {
        self.lba_start += n;
        self.lba_len -= n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn detects_magic_and_sector_size() {
        let mut header = [0u8; 6];
        header[0..4].copy_from_slice(&WBFS_MAGIC);
        header[5] = 9;

        assert!(WbfsReader::is_supported(&header));
    }

    #[test]
    fn rejects_small_sector_size() {
        let mut header = [0u8; 6];
        header[0..4].copy_from_slice(&WBFS_MAGIC);
        header[5] = 8;

        assert!(!WbfsReader::is_supported(&header));
    }

    /// Builds a minimal WBFS image with one mapped logical block, one hole, and asserts
    /// `Reader::read` remaps the mapped block's bytes correctly and zero-fills the hole, at a
    /// non-trivial LBA deep inside the `wlba_table`.
    #[test]
    fn reads_remap_mapped_block_and_zero_fill_hole() {
        let hd_sec_sz_s: u8 = 9;
        let wbfs_sec_sz_s: u8 = 17;
        let hd_sec_sz = 1u64 << hd_sec_sz_s;
        let wbfs_sec_sz = 1u64 << wbfs_sec_sz_s;
        let wbfs_sec_sz_lba = (wbfs_sec_sz / 512) as u32;

        let n_wbfs_sec = (WII_SECTORS_PER_DISC as u64 * WII_SECTOR_SIZE) / wbfs_sec_sz + 1;
        let wlba_table_offset = hd_sec_sz + 0x100;
        let wlba_table_end = wlba_table_offset + n_wbfs_sec * 2;

        // Physical block 0 is implicitly reserved for the head/table region; pick the first
        // physical block index that starts clear of it.
        let physical_block = wlba_table_end.div_ceil(wbfs_sec_sz);
        let logical_mapped = 3u16;
        let logical_hole = 2u16;

        let marker_offset_in_block = 5u64 * 512;
        let data_offset = physical_block * wbfs_sec_sz + marker_offset_in_block;

        let mut image = vec![0u8; (data_offset + 512) as usize];
        image[0..4].copy_from_slice(&WBFS_MAGIC);
        image[5] = hd_sec_sz_s;
        image[6] = wbfs_sec_sz_s;

        let entry_offset = (wlba_table_offset + logical_mapped as u64 * 2) as usize;
        image[entry_offset..entry_offset + 2].copy_from_slice(&(physical_block as u16).to_be_bytes());

        image[data_offset as usize] = 0xCC;

        let path = std::env::temp_dir().join(format!("wbfs-reader-test-{}.img", std::process::id()));
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(&image).unwrap();
        }

        let file = RefFile::open_read_only(&path).unwrap();
        let mut reader = WbfsReader::new(file, 0, 0).unwrap();

        let mapped_lba = logical_mapped as u32 * wbfs_sec_sz_lba + 5;
        let mut buf = [0u8; 512];
        reader.read(&mut buf, mapped_lba, 1).unwrap();
        assert_eq!(buf[0], 0xCC);

        let hole_lba = logical_hole as u32 * wbfs_sec_sz_lba + 5;
        let mut buf = [0u8; 512];
        reader.read(&mut buf, hole_lba, 1).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        let _ = std::fs::remove_file(&path);
    }
}
