// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! LBA-addressed virtual block device over a disc image, with pluggable container backends.

mod ciso;
mod plain;
mod wbfs;

pub use ciso::CisoReader;
pub use plain::PlainReader;
pub use wbfs::WbfsReader;

use crate::ref_file::RefFile;
use std::io;

/// Tag describing the concrete shape of the image a [Reader] is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    /// A raw GameCube/Wii Master Disc image (`.gcm`/`.iso`).
    Gcm,

    /// A GCM prefixed with a 32 KiB SDK development header.
    GcmSdk,

    /// A file dump of a whole RVT-H Reader HDD.
    HddImage,

    /// A live RVT-H Reader HDD block device.
    HddReader,

    /// A sparse CISO container.
    Ciso,

    /// A WBFS container.
    Wbfs,
}

/// A window of LBA-addressed storage, transparently expanded from whatever container format
/// backs it.
///
/// Every read or write is relative to `lba_start`; requests that would reach past
/// `lba_start + lba_len` fail instead of touching the host file.
pub trait Reader {
    /// Read `lba_count` sectors starting at `lba_start` (relative to this reader's window) into
    /// `buf`. `buf` must be at least `lba_count * 512` bytes. Returns the number of LBAs read.
    fn read(&mut self, buf: &mut [u8], lba_start: u32, lba_count: u32) -> io::Result<u32>;

    /// Write `lba_count` sectors starting at `lba_start`. The default implementation reports the
    /// reader as read-only.
    fn write(&mut self, _buf: &[u8], _lba_start: u32, _lba_count: u32) -> io::Result<u32> {
        Err(io::Error::from(io::ErrorKind::ReadOnlyFilesystem))
    }

    /// Flush any buffered writes to the backing [RefFile].
    fn flush(&mut self) -> io::Result<()>;

    /// First LBA of this reader's window, relative to the backing file.
    fn lba_start(&self) -> u32;

    /// Number of LBAs visible through this reader's window.
    fn lba_len(&self) -> u32;

    /// Shape of the underlying container.
    fn image_type(&self) -> ImageType;

    /// Shift the window's start forward by `n` LBAs, consuming length. Used to skip a 32 KiB SDK
    /// header once it has been detected.
    fn lba_adjust(&mut self, n: u32);
}

/// Bounds-check a `(lba_start, lba_count)` request against a reader's window, returning the byte
/// offset to seek the backing file to on success.
pub(crate) fn check_bounds(
    window_lba_start: u32,
    window_lba_len: u32,
    request_lba_start: u32,
    request_lba_count: u32,
) -> io::Result<u64> {
    let end = request_lba_start
        .checked_add(request_lba_count)
        .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;

    if end > window_lba_len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "read/write request exceeds the reader's LBA window",
        ));
    }

    Ok(crate::ref_file::lba_to_bytes(
        (window_lba_start + request_lba_start) as u64,
    ))
}

const SDK_HEADER_LBA_LEN: u32 = 64;

/// Auto-detect the container format backing `file` within `[lba_start, lba_start+lba_len)` and
/// open the matching [Reader] implementation.
///
/// Detection order: device files are always opened as [PlainReader]; otherwise the first 4 KiB of
/// the window is inspected for the CISO and WBFS magic numbers, then for the SDK development
/// header signature (which causes the window to be adjusted forward by 64 LBAs and handled as
/// plain GCM); anything else falls back to [PlainReader].
pub fn open(
    file: RefFile,
    lba_start: u32,
    lba_len: u32,
) -> io::Result<Box<dyn Reader>> {
    if file.is_device() {
        return Ok(Box::new(PlainReader::new(file, lba_start, lba_len)?));
    }

    let mut header = [0u8; 4096];
    file.seek(crate::ref_file::lba_to_bytes(lba_start as u64))?;
    let read = file.read(&mut header)?;
    let header = &header[..read];

    if CisoReader::is_supported(header) {
        return Ok(Box::new(CisoReader::new(file, lba_start, lba_len)?));
    }

    if WbfsReader::is_supported(header) {
        return Ok(Box::new(WbfsReader::new(file, lba_start, lba_len)?));
    }

    if is_sdk_header(header) && lba_len > SDK_HEADER_LBA_LEN {
        let mut reader = PlainReader::new(file, lba_start, lba_len)?;
        reader.lba_adjust(SDK_HEADER_LBA_LEN);
        return Ok(Box::new(reader));
    }

    Ok(Box::new(PlainReader::new(file, lba_start, lba_len)?))
}

fn is_sdk_header(header: &[u8]) -> bool {
    if header.len() < 0x845 {
        return false;
    }

    header[0..4] == [0xFF, 0xFF, 0x00, 0x00]
        && header[0x082C..0x0830] == [0x00, 0x00, 0xE0, 0x06]
        && header[0x0844] == 0x01
}
