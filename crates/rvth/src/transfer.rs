// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Bank extraction/import and signing-tier re-crypt: the bulk-data paths that move a disc image
//! between a bank slot and a standalone file, and that rewrite a bank's ticket/TMD signing tier
//! in place.

use crate::bank_table::{self, BankType, NhcdBankEntry};
use crate::crypto::cert::Pki;
use crate::crypto::group;
use crate::crypto::sign;
use crate::disc::partition_table::PartitionEntry;
use crate::error::{DomainError, Error};
use crate::reader::Reader;
use crate::ref_file::RefFile;
use crate::wii_common_key::WiiCommonKeyKind;
use crate::worker::{CancellationToken, Phase, Progress};

const CHUNK_LBA: u32 = 2048;
const SUBBLOCK_LBA: u32 = 8;

fn is_all_zero(buf: &[u8]) -> bool {
    buf.iter().all(|&b| b == 0)
}

/// Extract a bank to a standalone destination reader, eliding all-zero 4 KiB sub-blocks so the
/// destination file stays sparse.
///
/// `dest_file` must already be marked sparse and pre-extended to `lba_len * 512` bytes by the
/// caller (the RVT-H level owns file creation; this function only ever reads from `source` and
/// writes through `dest`).
pub fn copy_to_gcm(
    source: &mut dyn Reader,
    dest: &mut dyn Reader,
    lba_len: u32,
    token: &CancellationToken,
    mut on_progress: impl FnMut(Progress),
) -> Result<(), Error> {
    let mut lba = 0u32;
    let mut lba_nonsparse: Option<u32> = None;

    while lba + CHUNK_LBA <= lba_len {
        let mut chunk = vec![0u8; CHUNK_LBA as usize * 512];
        source.read(&mut chunk, lba, CHUNK_LBA)?;

        for (i, sub) in chunk.chunks_exact(SUBBLOCK_LBA as usize * 512).enumerate() {
            if is_all_zero(sub) {
                continue;
            }
            let sub_lba = lba + i as u32 * SUBBLOCK_LBA;
            dest.write(sub, sub_lba, SUBBLOCK_LBA)?;
            lba_nonsparse = Some(sub_lba + SUBBLOCK_LBA - 1);
        }

        lba += CHUNK_LBA;
        on_progress(Progress {
            phase: Phase::Extract,
            processed_lba: lba as u64,
            total_lba: lba_len as u64,
        });
        if token.is_canceled() {
            return Err(Error::Canceled);
        }
    }

    let tail_len = lba_len - lba;
    if tail_len > 0 {
        let mut tail = vec![0u8; tail_len as usize * 512];
        source.read(&mut tail, lba, tail_len)?;

        for (i, sector) in tail.chunks_exact(512).enumerate() {
            if is_all_zero(sector) {
                continue;
            }
            let sector_lba = lba + i as u32;
            dest.write(sector, sector_lba, 1)?;
            lba_nonsparse = Some(sector_lba);
        }

        on_progress(Progress {
            phase: Phase::Extract,
            processed_lba: lba_len as u64,
            total_lba: lba_len as u64,
        });
    }

    if lba_nonsparse != Some(lba_len - 1) {
        let zero = [0u8; 512];
        dest.write(&zero, lba_len - 1, 1)?;
    }

    dest.flush()?;
    Ok(())
}

/// Validate that a GCM/bank of `src_lba_len` LBAs and kind `src_kind` can be imported into
/// `dest_index` of a table with `bank_count` banks, given the destination and (for a DL image)
/// the following bank's current state.
pub fn validate_import(
    dest_index: u32,
    bank_count: u32,
    src_kind: BankType,
    src_lba_len: u32,
    dest_entry: &NhcdBankEntry,
    next_entry: Option<&NhcdBankEntry>,
) -> Result<(), DomainError> {
    let dest_is_free = matches!(dest_entry.bank_type, BankType::Empty) || dest_entry.is_deleted;
    if !dest_is_free {
        return Err(DomainError::BankNotEmptyOrDeleted);
    }

    match src_kind {
        BankType::WiiDl => {
            if dest_index + 1 >= bank_count {
                return Err(DomainError::DlLastBank);
            }
            if bank_count > bank_table::NHCD_STANDARD_BANK_COUNT && dest_index == 0 {
                return Err(DomainError::DlExtNoBank1);
            }
            let Some(next) = next_entry else {
                return Err(DomainError::DlNotContiguous);
            };
            let next_is_free = matches!(next.bank_type, BankType::Empty) || next.is_deleted;
            if !next_is_free {
                return Err(DomainError::Bank2DlNotEmptyOrDeleted);
            }
        }
        _ => {
            let limit = if bank_count > bank_table::NHCD_STANDARD_BANK_COUNT && dest_index == 0 {
                bank_table::NHCD_EXTBANKTABLE_BANK_1_SIZE_LBA
            } else {
                bank_table::NHCD_BANK_SIZE_LBA
            };
            if src_lba_len > limit {
                return Err(DomainError::ImageTooBig);
            }
            if bank_count > bank_table::NHCD_STANDARD_BANK_COUNT
                && dest_index == 0
                && !matches!(src_kind, BankType::Gcn)
            {
                return Err(DomainError::NdevGcnNotSupported);
            }
        }
    }

    Ok(())
}

/// Import a standalone image into a validated, empty bank slot: copy the payload in
/// [`CHUNK_LBA`]-sized chunks (with a tail), flush, and write back the bank's NHCD entry.
pub fn copy_to_hdd(
    source: &mut dyn Reader,
    dest: &mut dyn Reader,
    src_lba_len: u32,
    token: &CancellationToken,
    mut on_progress: impl FnMut(Progress),
) -> Result<(), Error> {
    let mut lba = 0u32;

    while lba + CHUNK_LBA <= src_lba_len {
        let mut chunk = vec![0u8; CHUNK_LBA as usize * 512];
        source.read(&mut chunk, lba, CHUNK_LBA)?;
        dest.write(&chunk, lba, CHUNK_LBA)?;

        lba += CHUNK_LBA;
        on_progress(Progress {
            phase: Phase::Import,
            processed_lba: lba as u64,
            total_lba: src_lba_len as u64,
        });
        if token.is_canceled() {
            return Err(Error::Canceled);
        }
    }

    let tail_len = src_lba_len - lba;
    if tail_len > 0 {
        let mut tail = vec![0u8; tail_len as usize * 512];
        source.read(&mut tail, lba, tail_len)?;
        dest.write(&tail, lba, tail_len)?;

        on_progress(Progress {
            phase: Phase::Import,
            processed_lba: src_lba_len as u64,
            total_lba: src_lba_len as u64,
        });
    }

    dest.flush()?;
    Ok(())
}

/// Finish an import: persist the bank's NHCD entry now that the payload has been flushed.
pub fn finish_import(
    file: &RefFile,
    dest_index: u32,
    bank_type: BankType,
    lba_start: u32,
    lba_len: u32,
    now_timestamp: i64,
) -> Result<(), Error> {
    let entry = bank_table::NhcdBankEntry {
        bank_type,
        timestamp: now_timestamp,
        lba_start,
        lba_len,
        is_deleted: false,
    };
    bank_table::write_bank_entry(file, dest_index, &entry, now_timestamp)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    Ok(())
}

/// Which tier to rewrap a bank's ticket/TMD into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecryptTarget {
    /// Re-wrap to the debug tier (fakesign retail source → debug common key, real-sign).
    Debug,
    /// Re-wrap to the retail tier.
    Retail,
}

impl RecryptTarget {
    fn pki(self) -> Pki {
        match self {
            Self::Debug => Pki::Debug,
            Self::Retail => Pki::Retail,
        }
    }

    fn ticket_issuer(self) -> &'static str {
        match self {
            Self::Debug => "Root-CA00000002-XS00000006",
            Self::Retail => "Root-CA00000001-XS00000003",
        }
    }

    fn tmd_issuer(self) -> &'static str {
        match self {
            Self::Debug => "Root-CA00000002-CP00000007",
            Self::Retail => "Root-CA00000001-CP00000004",
        }
    }
}

/// Errors specific to the re-crypt transfer path.
#[derive(thiserror::Error, Debug)]
#[allow(missing_docs)]
pub enum RecryptError {
    #[error("signing error: {0}")]
    Sign(#[from] sign::SignError),
    #[error("common key error: {0}")]
    CommonKey(#[from] crate::wii_common_key::CommonKeyKindError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Re-wrap a single partition's ticket and TMD to `target`'s tier, signing appropriately for the
/// destination (fake-sign for retail, real-sign with the embedded debug private key for debug).
///
/// `ticket` is the [`sign::TICKET_SIZE`]-byte ticket; `tmd` is the full TMD body (header through
/// content chunk records) as recorded by the partition header's `tmd_size` field.
pub fn recrypt_partition_header(
    ticket: &mut [u8],
    tmd: &mut [u8],
    title_id: u64,
    source_common_key_index: u8,
    source_is_debug: bool,
    target: RecryptTarget,
    debug_private_key: Option<(&[u8], &[u8], u32)>,
) -> Result<(), RecryptError> {
    let source_key = WiiCommonKeyKind::for_index(source_common_key_index, source_is_debug)?;
    let target_key = WiiCommonKeyKind::for_index(source_common_key_index, matches!(target.pki(), Pki::Debug))?;

    sign::recrypt_ticket(ticket, title_id, source_key, target_key, target.ticket_issuer())?;

    match target {
        RecryptTarget::Retail => {
            sign::fakesign_ticket(ticket)?;
        }
        RecryptTarget::Debug => {
            let (p, q, e) = debug_private_key.ok_or(RecryptError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "debug re-sign requires an embedded debug private key",
            )))?;
            sign::realsign_ticket_or_tmd(ticket, p, q, e, false)?;
        }
    }

    tmd[sign::ISSUER_OFFSET..sign::ISSUER_OFFSET + target.tmd_issuer().len()]
        .copy_from_slice(target.tmd_issuer().as_bytes());

    match target {
        RecryptTarget::Retail => {
            sign::fakesign_tmd(tmd)?;
        }
        RecryptTarget::Debug => {
            let (p, q, e) = debug_private_key.expect("checked above");
            sign::realsign_ticket_or_tmd(tmd, p, q, e, false)?;
        }
    }

    Ok(())
}

/// Re-wrap every game partition's ticket/TMD to `target`'s tier, dropping update partitions from
/// the bank's in-memory table first (an update partition for one tier is meaningless once its
/// ticket/TMD belong to another).
///
/// `title_id` and `source_common_key_index` are per-partition; callers resolve them once per
/// entry (from the already-parsed ticket) before calling this function for that entry's header.
/// The partition's own `tmd_offset`/`tmd_size` fields (read the same way [`crate::verifier`]
/// reads them) are honored rather than assumed, so this works regardless of cert-chain padding.
pub fn recrypt_wii_partitions(
    reader: &mut dyn Reader,
    partitions: &mut Vec<PartitionEntry>,
    resolve: impl Fn(&PartitionEntry) -> (u64, u8, bool),
    target: RecryptTarget,
    debug_private_key: Option<(&[u8], &[u8], u32)>,
) -> Result<(), RecryptError> {
    crate::disc::partition_table::ptbl_remove_updates(partitions);

    for partition in partitions.iter() {
        let partition_byte_offset = (partition.lba_start as u64) * 512;

        let mut tail = vec![0u8; 0x2C0];
        read_bytes_at_lba(reader, partition_byte_offset, &mut tail)?;
        let tmd_size = u32::from_be_bytes(tail[0x2A4..0x2A8].try_into().expect("4 bytes")) as usize;
        let tmd_offset = (u32::from_be_bytes(tail[0x2A8..0x2AC].try_into().expect("4 bytes")) as u64) << 2;

        let mut ticket = tail[0..sign::TICKET_SIZE].to_vec();
        let mut tmd = vec![0u8; tmd_size];
        read_bytes_at_lba(reader, partition_byte_offset + tmd_offset, &mut tmd)?;

        let (title_id, common_key_index, source_is_debug) = resolve(partition);
        recrypt_partition_header(
            &mut ticket,
            &mut tmd,
            title_id,
            common_key_index,
            source_is_debug,
            target,
            debug_private_key,
        )?;

        write_bytes_at_lba(reader, partition_byte_offset, &ticket)?;
        write_bytes_at_lba(reader, partition_byte_offset + tmd_offset, &tmd)?;
    }

    reader.flush()?;
    Ok(())
}

/// Read `dest.len()` bytes starting at `byte_offset`, tolerating offsets and lengths that aren't
/// multiples of 512 by reading the covering LBA range and slicing it down.
fn read_bytes_at_lba(reader: &mut dyn Reader, byte_offset: u64, dest: &mut [u8]) -> std::io::Result<()> {
    let lba_start = (byte_offset / 512) as u32;
    let start_slack = (byte_offset % 512) as usize;
    let lba_count = ((start_slack + dest.len()) as u32).div_ceil(512);

    let mut buf = vec![0u8; lba_count as usize * 512];
    reader.read(&mut buf, lba_start, lba_count)?;
    dest.copy_from_slice(&buf[start_slack..start_slack + dest.len()]);
    Ok(())
}

/// Read-modify-write `src` back at `byte_offset`, for offsets/lengths that aren't LBA-aligned.
fn write_bytes_at_lba(reader: &mut dyn Reader, byte_offset: u64, src: &[u8]) -> std::io::Result<()> {
    let lba_start = (byte_offset / 512) as u32;
    let start_slack = (byte_offset % 512) as usize;
    let lba_count = ((start_slack + src.len()) as u32).div_ceil(512);

    let mut buf = vec![0u8; lba_count as usize * 512];
    reader.read(&mut buf, lba_start, lba_count)?;
    buf[start_slack..start_slack + src.len()].copy_from_slice(src);
    reader.write(&buf, lba_start, lba_count)?;
    Ok(())
}

const IMPRINT_OBFUSCATION_KEY: u8 = 0x69;
const IMPRINT_HEADER: [u8; 10] = [
    0x67, 0x69, 0x6B, 0x6B, 0x7B, 0x6C, 0x6F, 0x67, 0x6B, 0x6C,
];

/// Build the plaintext imprint-stamp payload: the obfuscated header, an ASCII description, and
/// the first 0x68 bytes of the GCN disc header.
pub fn build_imprint_payload(extra: &str, timestamp_display: &str, disc_header_prefix: &[u8]) -> Vec<u8> {
    let mut header = IMPRINT_HEADER;
    for b in &mut header {
        *b ^= IMPRINT_OBFUSCATION_KEY;
    }

    let mut payload = header.to_vec();
    payload.extend_from_slice(format!("{extra}, {timestamp_display}").as_bytes());
    payload.extend_from_slice(&disc_header_prefix[..disc_header_prefix.len().min(0x68)]);
    payload
}

/// RSA-encrypt an imprint payload under the embedded identity public key, only if `dest_slot` is
/// currently all-zero.
pub fn stamp_imprint(
    dest_slot: &mut [u8],
    payload: &[u8],
    modulus: &[u8],
    exponent: u32,
) -> Result<bool, crate::crypto::rsa::RsaCryptoError> {
    if !is_all_zero(dest_slot) {
        return Ok(false);
    }

    let encrypted = crate::crypto::rsa::encrypt_pkcs1v15(modulus, exponent, payload)?;
    let len = encrypted.len().min(dest_slot.len());
    dest_slot[..len].copy_from_slice(&encrypted[..len]);
    Ok(true)
}

/// Convert a decrypted (unencrypted-on-disk) Wii game partition into an encrypted one while
/// copying it out, group by group, using the already-unwrapped title key.
///
/// `source_decrypted` must be a multiple of [`group::SECTOR_DATA_SIZE`] `*`
/// [`group::SECTORS_PER_GROUP`] except possibly for its final, short group (zero-padded by
/// [`group::encrypt_group`]).
pub fn encrypt_groups_for_extract(
    source_decrypted: &[u8],
    title_key: &[u8; 16],
) -> Result<(Vec<u8>, Vec<[u8; 20]>), group::GroupError> {
    let group_size = group::GROUP_SIZE_DEC;
    let mut encrypted = Vec::new();
    let mut h3_slots = Vec::new();

    for chunk in source_decrypted.chunks(group_size) {
        let (enc, h3) = group::encrypt_group(chunk, title_key)?;
        encrypted.extend_from_slice(&enc);
        h3_slots.push(h3);
    }

    Ok((encrypted, h3_slots))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_import_rejects_oversized_single_layer() {
        let dest = NhcdBankEntry {
            bank_type: BankType::Empty,
            timestamp: -1,
            lba_start: 0,
            lba_len: 0,
            is_deleted: false,
        };
        let err = validate_import(0, 8, BankType::Gcn, bank_table::NHCD_BANK_SIZE_LBA + 1, &dest, None)
            .unwrap_err();
        assert_eq!(err, DomainError::ImageTooBig);
    }

    #[test]
    fn validate_import_rejects_nonempty_destination() {
        let dest = NhcdBankEntry {
            bank_type: BankType::Gcn,
            timestamp: 0,
            lba_start: 0,
            lba_len: 0x1000,
            is_deleted: false,
        };
        let err = validate_import(0, 8, BankType::Gcn, 0x1000, &dest, None).unwrap_err();
        assert_eq!(err, DomainError::BankNotEmptyOrDeleted);
    }

    #[test]
    fn validate_import_rejects_dl_into_last_bank() {
        let dest = NhcdBankEntry {
            bank_type: BankType::Empty,
            timestamp: -1,
            lba_start: 0,
            lba_len: 0,
            is_deleted: false,
        };
        let err = validate_import(7, 8, BankType::WiiDl, 0x1000, &dest, None).unwrap_err();
        assert_eq!(err, DomainError::DlLastBank);
    }

    #[test]
    fn build_imprint_payload_includes_description_and_header_prefix() {
        let disc_header = vec![0xAB; 0x68];
        let payload = build_imprint_payload("RVT-H", "2026/07/31 12:00:00 +0000", &disc_header);
        assert!(payload.len() > 10);
        assert_eq!(&payload[payload.len() - 0x68..], &disc_header[..]);
    }

    #[test]
    fn stamp_imprint_refuses_nonzero_slot() {
        let mut slot = vec![0xFFu8; 256];
        let modulus = vec![0x80u8; 256];
        let result = stamp_imprint(&mut slot, b"payload", &modulus, 0x10001);
        assert!(matches!(result, Ok(false)));
    }
}
