// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Sparse CISO container reader.

use super::{ImageType, Reader};
use crate::ref_file::RefFile;
use byteorder::{LE, ReadBytesExt};
use std::io;

const CISO_MAGIC: [u8; 4] = *b"CISO";
const CISO_HEADER_SIZE: u64 = 0x8000;
const CISO_MAP_SIZE: usize = 0x8000 - 4 - 4;
const CISO_BLOCK_SIZE_MIN: u32 = 1 << 15;
const CISO_BLOCK_SIZE_MAX: u32 = 1 << 24;
const CISO_MAP_ENTRY_EMPTY: u32 = 0xFFFF;

/// Reader for the CISO sparse container format: a fixed-size header carrying a block size and a
/// presence bitmap, followed by the physically-present blocks back to back in logical order.
pub struct CisoReader {
    file: RefFile,
    lba_start: u32,
    lba_len: u32,
    block_size_lba: u32,
    /// Physical block index for each logical block, or [CISO_MAP_ENTRY_EMPTY] if absent.
    block_map: Vec<u32>,
}

impl CisoReader {
    /// Whether the first bytes of a disc image look like a CISO header: the `"CISO"` magic
    /// followed by a little-endian power-of-two block size in `[2^15, 2^24]`.
    pub fn is_supported(header: &[u8]) -> bool {
        if header.len() < 8 || header[0..4] != CISO_MAGIC {
            return false;
        }

        let Ok(block_size) = (&header[4..8]).read_u32::<LE>() else {
            return false;
        };

        block_size.is_power_of_two()
            && block_size >= CISO_BLOCK_SIZE_MIN
            && block_size <= CISO_BLOCK_SIZE_MAX
    }

    /// Parse the CISO header and presence map starting at `lba_start` and build the
    /// logical-to-physical block index.
    pub fn new(file: RefFile, lba_start: u32, _lba_len_hint: u32) -> io::Result<Self> {
        let base = crate::ref_file::lba_to_bytes(lba_start as u64);
        file.seek(base)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;

        if magic != CISO_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a CISO image"));
        }

        let mut block_size_buf = [0u8; 4];
        file.read_exact(&mut block_size_buf)?;
        let block_size = u32::from_le_bytes(block_size_buf);

        if !block_size.is_power_of_two()
            || block_size < CISO_BLOCK_SIZE_MIN
            || block_size > CISO_BLOCK_SIZE_MAX
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "CISO block size out of range",
            ));
        }

        let block_size_lba = block_size / 512;

        let mut presence = [0u8; CISO_MAP_SIZE];
        file.read_exact(&mut presence)?;

        let mut block_map = Vec::with_capacity(CISO_MAP_SIZE);
        let mut physical_index = 0u32;
        let mut last_present_logical = None;

        for (logical, &flag) in presence.iter().enumerate() {
            match flag {
                0 => block_map.push(CISO_MAP_ENTRY_EMPTY),
                1 => {
                    block_map.push(physical_index);
                    physical_index += 1;
                    last_present_logical = Some(logical as u32);
                }
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unknown CISO presence byte: {other}"),
                    ));
                }
            }
        }

        let lba_len = match last_present_logical {
            Some(last) => (last + 1) * block_size_lba,
            None => 0,
        };

        let _ = CISO_HEADER_SIZE;

        Ok(Self {
            file,
            lba_start,
            lba_len,
            block_size_lba,
            block_map,
        })
    }

    fn physical_offset(&self, lba: u32) -> Option<u64> {
        let logical_block = lba / self.block_size_lba;
        let offset_in_block = (lba % self.block_size_lba) as u64 * 512;

        let physical_block = *self.block_map.get(logical_block as usize)?;
        if physical_block == CISO_MAP_ENTRY_EMPTY {
            return None;
        }

        Some(
            CISO_HEADER_SIZE
                + physical_block as u64 * (self.block_size_lba as u64 * 512)
                + offset_in_block,
        )
    }
}

impl Reader for CisoReader {
    fn read(&mut self, buf: &mut [u8], lba_start: u32, lba_count: u32) -> io::Result<u32> {
        if lba_start + lba_count > self.lba_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read request exceeds CISO image length",
            ));
        }

        // The original reads one LBA at a time; blocks may be non-contiguous on disk so there is
        // no general way to batch this into a single positioned read.
        for i in 0..lba_count {
            let dest = &mut buf[(i as usize) * 512..(i as usize + 1) * 512];

            match self.physical_offset(lba_start + i) {
                Some(offset) => {
                    self.file.seek(offset)?;
                    self.file.read_exact(dest)?;
                }
                None => dest.fill(0),
            }
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
        ImageType::Ciso
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
    fn detects_magic_and_power_of_two_block_size() {
        let mut header = vec![0u8; 8];
        header[0..4].copy_from_slice(&CISO_MAGIC);
        header[4..8].copy_from_slice(&(1u32 << 16).to_le_bytes());

        assert!(CisoReader::is_supported(&header));
    }

    #[test]
    fn rejects_non_power_of_two_block_size() {
        let mut header = vec![0u8; 8];
        header[0..4].copy_from_slice(&CISO_MAGIC);
        header[4..8].copy_from_slice(&100_000u32.to_le_bytes());

        assert!(!CisoReader::is_supported(&header));
    }

    #[test]
    fn rejects_wrong_magic() {
        let header = [0u8; 8];
        assert!(!CisoReader::is_supported(&header));
    }

    /// Logical blocks 0 and 2 present (physical blocks 0 and 1), logical block 1 absent, at the
    /// minimum block size (64 LBAs). Reads a non-trivial LBA out of the second present block and
    /// an LBA out of the absent block, exercising the logical→physical remap and the all-zero gap.
    #[test]
    fn reads_remap_present_blocks_and_zero_fill_absent_ones() {
        let block_size = CISO_BLOCK_SIZE_MIN;
        let block_size_lba = block_size / 512;

        let mut presence = vec![0u8; CISO_MAP_SIZE];
        presence[0] = 1;
        presence[1] = 0;
        presence[2] = 1;

        let mut physical_block_0 = vec![0u8; block_size as usize];
        physical_block_0[5 * 512] = 0xAA;
        let mut physical_block_1 = vec![0u8; block_size as usize];
        physical_block_1[5 * 512] = 0xBB;

        let mut image = Vec::new();
        image.extend_from_slice(&CISO_MAGIC);
        image.extend_from_slice(&block_size.to_le_bytes());
        image.extend_from_slice(&presence);
        image.extend_from_slice(&physical_block_0);
        image.extend_from_slice(&physical_block_1);

        let path = std::env::temp_dir().join(format!("ciso-reader-test-{}.img", std::process::id()));
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(&image).unwrap();
        }

        let file = RefFile::open_read_only(&path).unwrap();
        let mut reader = CisoReader::new(file, 0, 0).unwrap();

        assert_eq!(reader.lba_len(), 3 * block_size_lba);

        // Logical block 2 (physical block 1), LBA 5 within it: non-trivial LBA, non-first block.
        let mut buf = [0u8; 512];
        reader.read(&mut buf, 2 * block_size_lba + 5, 1).unwrap();
        assert_eq!(buf[0], 0xBB);

        // Logical block 1 is absent: must read back as zero without touching its backing bytes.
        let mut buf = [0u8; 512];
        reader.read(&mut buf, block_size_lba + 5, 1).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        let _ = std::fs::remove_file(&path);
    }
}
