// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Per-partition Merkle verification: wraps [`crate::crypto::group::decrypt_and_verify_group`]
//! with the H3-table and H4-vs-TMD bookkeeping that sits above a single 2 MiB group.

use crate::crypto::cert::Pki;
use crate::crypto::group::{self, GroupHashErrors};
use crate::crypto::hash;
use crate::disc::partition_table::PartitionEntry;
use crate::reader::Reader;
use crate::ticket::PreSwitchTicket;
use crate::title_metadata::TitleMetadata;
use crate::wii_common_key::WiiCommonKeyKind;
use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use std::io::Cursor;
use thiserror::Error;
use util::Aes128CbcDec;

const H3_TABLE_SIZE: usize = 0x18000;
const H3_ENTRY_COUNT: usize = 4915;

/// Outcome of verifying a single 2 MiB group.
#[derive(Debug, Clone, Copy)]
pub struct GroupVerifyResult {
    /// Index of the group within the partition.
    pub group_index: u32,
    /// Per-level hash errors, or all-false when the group verified cleanly.
    pub errors: GroupHashErrors,
    /// Whether the *encrypted* group was entirely zero bytes (a scrubbed/never-written group).
    pub is_zero: bool,
}

/// Outcome of verifying one partition: the H4-vs-TMD check plus every group's result.
#[derive(Debug, Clone)]
pub struct PartitionVerifyResult {
    /// Whether `SHA-1(H3 table)` matched the TMD's recorded content hash.
    pub h4_matches_tmd: bool,
    /// Per-group results, in group order.
    pub groups: Vec<GroupVerifyResult>,
}

impl PartitionVerifyResult {
    /// Whether every group verified with no errors and the H4/TMD check passed.
    pub fn is_fully_verified(&self) -> bool {
        self.h4_matches_tmd && self.groups.iter().all(|g| !g.errors.any())
    }
}

/// Errors verifying a partition.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum VerifierError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("group crypto error: {0}")]
    Group(#[from] group::GroupError),
    #[error("ticket parse error: {0}")]
    Ticket(String),
    #[error("TMD parse error: {0}")]
    Tmd(String),
    #[error("common key error: {0}")]
    CommonKey(#[from] crate::wii_common_key::CommonKeyKindError),
    #[error("partition header is corrupted")]
    PartitionHeaderCorrupted,
}

fn read_bytes_at(reader: &mut dyn Reader, byte_offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    let lba_start = (byte_offset / 512) as u32;
    let start_slack = (byte_offset % 512) as usize;
    let lba_count = ((start_slack + len) as u32).div_ceil(512);

    let mut buf = vec![0u8; lba_count as usize * 512];
    reader.read(&mut buf, lba_start, lba_count)?;

    Ok(buf[start_slack..start_slack + len].to_vec())
}

/// Verify every group of a single partition's content against its H3 table and the TMD's
/// recorded content hash.
pub fn verify_partition(
    reader: &mut dyn Reader,
    partition: &PartitionEntry,
) -> Result<PartitionVerifyResult, VerifierError> {
    let partition_byte_offset = (partition.lba_start as u64) * 512;

    let tail = read_bytes_at(reader, partition_byte_offset, 0x2C0)?;
    if tail.len() < 0x2C0 {
        return Err(VerifierError::PartitionHeaderCorrupted);
    }

    let ticket_bytes = &tail[0..0x2A4];
    let tmd_size = u32::from_be_bytes(tail[0x2A4..0x2A8].try_into().expect("4 bytes")) as usize;
    let tmd_offset = (u32::from_be_bytes(tail[0x2A8..0x2AC].try_into().expect("4 bytes")) as u64) << 2;
    let h3_offset = (u32::from_be_bytes(tail[0x2B4..0x2B8].try_into().expect("4 bytes")) as u64) << 2;
    let data_offset = (u32::from_be_bytes(tail[0x2B8..0x2BC].try_into().expect("4 bytes")) as u64) << 2;
    let data_size = (u32::from_be_bytes(tail[0x2BC..0x2C0].try_into().expect("4 bytes")) as u64) << 2;

    let ticket = PreSwitchTicket::new(Cursor::new(ticket_bytes))
        .map_err(|e| VerifierError::Ticket(e.to_string()))?;
    let tmd_bytes = read_bytes_at(reader, partition_byte_offset + tmd_offset, tmd_size)?;
    let tmd = TitleMetadata::new(Cursor::new(&tmd_bytes)).map_err(|e| VerifierError::Tmd(e.to_string()))?;

    let pki = crate::crypto::cert::cert_get_issuer_from_name(&ticket.signed_blob_header.issuer)
        .map(|issuer| issuer.pki())
        .unwrap_or(Pki::Retail);
    let common_key = WiiCommonKeyKind::for_index(ticket.common_key_kind_index, matches!(pki, Pki::Debug))?;

    let id = if ticket.is_device_unique() {
        ticket.ticket_id
    } else {
        ticket.title_id.inner()
    };
    let iv: [u8; 16] = [id.to_be_bytes(), [0; 8]].concat().try_into().expect("16 bytes");
    let cipher = Aes128CbcDec::new((&common_key.bytes()).into(), &iv.into());
    let mut title_key = ticket.encrypted_title_key;
    let _ = cipher.decrypt_padded_mut::<NoPadding>(&mut title_key);

    let h3_table = read_bytes_at(reader, partition_byte_offset + h3_offset, H3_TABLE_SIZE)?;
    let h4 = hash::sha1(&h3_table);

    let h4_matches_tmd = match tmd.content_chunk_entries.first().map(|entry| &entry.hash) {
        Some(crate::title_metadata::TitleMetadataContentEntryHashKind::Version0(expected)) => {
            expected.as_slice() == h4
        }
        _ => false,
    };

    let group_count = if data_size == 0 {
        h3_table
            .chunks_exact(20)
            .take(H3_ENTRY_COUNT)
            .rev()
            .skip_while(|chunk| chunk.iter().all(|&b| b == 0))
            .count() as u32
    } else {
        (data_size as u32).div_ceil(group::GROUP_SIZE_ENC as u32)
    };

    let mut groups = Vec::with_capacity(group_count as usize);
    for g in 0..group_count {
        let group_byte_offset = partition_byte_offset + data_offset + (g as u64) * group::GROUP_SIZE_ENC as u64;
        let encrypted = read_bytes_at(reader, group_byte_offset, group::GROUP_SIZE_ENC)?;

        let mut expected_h3 = [0u8; 20];
        expected_h3.copy_from_slice(&h3_table[(g as usize) * 20..(g as usize) * 20 + 20]);

        let (_decrypted, errors, is_zero) =
            group::decrypt_and_verify_group(&encrypted, &title_key, &expected_h3)?;

        groups.push(GroupVerifyResult {
            group_index: g,
            errors,
            is_zero,
        });
    }

    Ok(PartitionVerifyResult {
        h4_matches_tmd,
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_verify_result_is_fully_verified_when_clean() {
        let result = PartitionVerifyResult {
            h4_matches_tmd: true,
            groups: vec![GroupVerifyResult {
                group_index: 0,
                errors: GroupHashErrors::default(),
                is_zero: false,
            }],
        };
        assert!(result.is_fully_verified());
    }

    #[test]
    fn partition_verify_result_flags_h4_mismatch() {
        let result = PartitionVerifyResult {
            h4_matches_tmd: false,
            groups: vec![],
        };
        assert!(!result.is_fully_verified());
    }
}
