// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Direct, unconverted LBA pass-through reader.

use super::{ImageType, Reader, check_bounds};
use crate::ref_file::RefFile;
use std::io;

/// A reader that maps LBAs directly onto the backing file with no translation.
///
/// Covers plain GCM/ISO dumps, SDK-header-wrapped GCM dumps (once the caller has adjusted the
/// window past the header), and both live RVT-H HDD devices and file dumps of a whole HDD.
pub struct PlainReader {
    file: RefFile,
    lba_start: u32,
    lba_len: u32,
    image_type: ImageType,
}

/// Threshold above which a standalone file is assumed to be a full HDD dump rather than a single
/// disc image.
const HDD_IMAGE_SIZE_THRESHOLD: u64 = 10 * 1024 * 1024 * 1024;

impl PlainReader {
    /// Open a plain reader over `file`'s `[lba_start, lba_start+lba_len)` window.
    ///
    /// If `lba_len` is zero it is derived from the file's size minus `lba_start`.
    pub fn new(file: RefFile, lba_start: u32, mut lba_len: u32) -> io::Result<Self> {
        if lba_len == 0 {
            let size = file.size()?;
            let start_bytes = crate::ref_file::lba_to_bytes(lba_start as u64);
            lba_len = ((size.saturating_sub(start_bytes)) / 512) as u32;
        }

        let image_type = if file.is_device() {
            ImageType::HddReader
        } else if file.size()? > HDD_IMAGE_SIZE_THRESHOLD {
            ImageType::HddImage
        } else if lba_start == 0 {
            ImageType::Gcm
        } else {
            ImageType::GcmSdk
        };

        Ok(Self {
            file,
            lba_start,
            lba_len,
            image_type,
        })
    }
}

impl Reader for PlainReader {
    fn read(&mut self, buf: &mut [u8], lba_start: u32, lba_count: u32) -> io::Result<u32> {
        let offset = check_bounds(self.lba_start, self.lba_len, lba_start, lba_count)?;
        self.file.seek(offset)?;
        self.file
            .read_exact(&mut buf[..(lba_count as usize) * 512])?;

        Ok(lba_count)
    }

    fn write(&mut self, buf: &[u8], lba_start: u32, lba_count: u32) -> io::Result<u32> {
        let offset = check_bounds(self.lba_start, self.lba_len, lba_start, lba_count)?;
        self.file.seek(offset)?;
        self.file.write_all(&buf[..(lba_count as usize) * 512])?;

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
        self.image_type
    }

    fn lba_adjust(&mut self, n: u32) {
        self.lba_start += n;
        self.lba_len -= n;
    }
}
