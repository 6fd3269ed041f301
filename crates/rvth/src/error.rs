// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Error taxonomy shared across the bank table, reader, crypto and transfer layers.

use std::io;
use thiserror::Error;

/// Top level error type returned by every fallible operation in this crate.
///
/// Collapses the two axes the original tool kept separate (a positive-valued "domain" status
/// and a negative-valued POSIX `errno`) into a single sum type, as IO failures already carry an
/// [io::ErrorKind] and don't need a second representation.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Domain(#[from] DomainError),

    /// The operation was canceled by the caller through the worker's cancellation flag.
    #[error("operation canceled")]
    Canceled,
}

/// Structural error conditions specific to RVT-H bank and disc image handling.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum DomainError {
    #[error("bank type is unknown")]
    BankUnknown,

    #[error("bank is empty")]
    BankEmpty,

    #[error("bank is the second half of a dual-layer Wii image")]
    BankDl2,

    #[error("the underlying file is not a block device")]
    NotHdd,

    #[error("the underlying file is a block device, expected a standalone image")]
    IsHdd,

    #[error("source image is too large to fit in the destination bank")]
    ImageTooBig,

    #[error("not a recognized Wii disc image")]
    NotWiiImage,

    #[error("partition content is not encrypted")]
    IsUnencrypted,

    #[error("partition content is already encrypted")]
    IsEncrypted,

    #[error("no game partition found in the volume group table")]
    NoGamePartition,

    #[error("partition header is corrupted")]
    PartitionHeaderCorrupted,

    #[error("partition table is corrupted")]
    PartitionTableCorrupted,

    #[error("certificate issuer is unknown: {0}")]
    IssuerUnknown(String),

    #[error("NHCD bank table magic is missing or invalid")]
    NhcdTableMagic,

    #[error("no banks present on this device")]
    NoBanks,

    #[error("the given path does not refer to a device")]
    NotADevice,

    #[error("bank is already marked as deleted")]
    BankAlreadyDeleted,

    #[error("bank is not marked as deleted")]
    BankNotDeleted,

    #[error("destination bank is not empty or deleted")]
    BankNotEmptyOrDeleted,

    #[error("second bank of a dual-layer pair is not empty or deleted")]
    Bank2DlNotEmptyOrDeleted,

    #[error("extended bank table has no bank 1 to host a dual-layer image")]
    DlExtNoBank1,

    #[error("dual-layer image cannot be imported into the last bank")]
    DlLastBank,

    #[error("dual-layer image's two halves are not contiguous banks")]
    DlNotContiguous,

    #[error("GameCube images are not supported on non-device destinations")]
    NdevGcnNotSupported,
}
