// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Reference-counted handle to the backing file or block device of an RVT-H image.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::rc::Rc;

/// Converts an LBA into a byte offset (512 byte sectors).
pub const fn lba_to_bytes(lba: u64) -> u64 {
    lba * 512
}

/// A shared handle to the file or device an [crate::reader::Reader] operates on.
///
/// Every [crate::reader::Reader] built on the same image shares a single [RefFile]; the file is
/// only ever opened once and is closed when the last holder drops it (by virtue of wrapping an
/// [Rc]). Per §5, all access to a given [RefFile] happens from a single worker at a time, so
/// interior mutability through a [RefCell] (rather than a [std::sync::Mutex]) is enough.
#[derive(Clone)]
pub struct RefFile {
    inner: Rc<RefCell<File>>,
    writable: bool,
    is_device: bool,
    path: std::path::PathBuf,
}

impl RefFile {
    /// Open a file read-only.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).open(path)?;

        Ok(Self {
            is_device: is_device_path(path),
            inner: Rc::new(RefCell::new(file)),
            writable: false,
            path: path.to_path_buf(),
        })
    }

    /// Open a file read-write.
    pub fn open_read_write<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            is_device: is_device_path(path),
            inner: Rc::new(RefCell::new(file)),
            writable: true,
            path: path.to_path_buf(),
        })
    }

    /// Open a file read-write, creating it if it doesn't already exist.
    pub fn open_or_create_writable<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            is_device: is_device_path(path),
            inner: Rc::new(RefCell::new(file)),
            writable: true,
            path: path.to_path_buf(),
        })
    }

    /// Whether the underlying path refers to a raw block device rather than a regular file.
    ///
    /// A path is treated as a device when it starts with `\\.\PhysicalDrive` (any case, either
    /// slash) on Windows, or `/dev/` on POSIX.
    pub fn is_device(&self) -> bool {
        self.is_device
    }

    /// Whether this handle was opened (or has since been promoted) to be writable.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Re-open the same path writable, replacing the held file descriptor in place.
    pub fn make_writable(&mut self) -> io::Result<()> {
        if self.writable {
            return Ok(());
        }

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.inner = Rc::new(RefCell::new(file));
        self.writable = true;

        Ok(())
    }

    /// Seek to an absolute byte offset.
    pub fn seek(&self, offset: u64) -> io::Result<u64> {
        self.inner.borrow_mut().seek(SeekFrom::Start(offset))
    }

    /// Read into `buf` at the current position.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.borrow_mut().read(buf)
    }

    /// Read exactly `buf.len()` bytes at the current position.
    pub fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.borrow_mut().read_exact(buf)
    }

    /// Write `buf` at the current position.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.inner.borrow_mut().write(buf)
    }

    /// Write all of `buf` at the current position.
    pub fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        self.inner.borrow_mut().write_all(buf)
    }

    /// Size of the underlying file, in bytes.
    pub fn size(&self) -> io::Result<u64> {
        self.inner.borrow().metadata().map(|metadata| metadata.len())
    }

    /// Pre-extend the file to `size` bytes and mark the new region as sparse, so a subsequent
    /// extract only materializes the blocks it actually writes.
    ///
    /// On POSIX this is `ftruncate` (the filesystem decides whether a file with holes is stored
    /// sparsely; ext4/xfs/btrfs all elide unwritten ranges). Device destinations ignore this call
    /// since block devices have no notion of sparse regions.
    pub fn make_sparse(&self, size: u64) -> io::Result<()> {
        if self.is_device {
            return Ok(());
        }

        self.inner.borrow().set_len(size)
    }

    /// Flush any OS buffering.
    pub fn flush(&self) -> io::Result<()> {
        self.inner.borrow_mut().flush()
    }
}

fn is_device_path(path: &Path) -> bool {
    let Some(path) = path.to_str() else {
        return false;
    };

    let normalized = path.replace('\\', "/").to_ascii_lowercase();

    normalized.starts_with("//./physicaldrive") || path.starts_with("/dev/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lba_to_bytes_converts_sectors() {
        assert_eq!(lba_to_bytes(1), 512);
        assert_eq!(lba_to_bytes(0x300000), 0x6000_0000);
    }

    #[test]
    fn device_path_detection() {
        assert!(is_device_path(Path::new("/dev/sda")));
        assert!(is_device_path(Path::new(r"\\.\PhysicalDrive0")));
        assert!(!is_device_path(Path::new("/home/user/image.gcm")));
    }
}
