// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! The Wii disc's 2 MiB hash-group codec: AES-128-CBC bulk (de)cryption plus the four-level
//! (H0-H3) SHA-1 Merkle tree nested inside every group.
//!
//! A group is 64 encrypted 32 KiB sectors. Each sector is a 1 KiB hash block followed by 31 KiB
//! of user data. All 64 sectors in a group share one H2 table; each 8-sector subgroup shares one
//! H1 table. The group's own identity within the disc-wide H3 table is `SHA-1(sector0.H2)`.

use crate::crypto::hash;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use thiserror::Error;
use util::Aes128CbcDec;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// Size in bytes of one encrypted sector.
pub const SECTOR_SIZE: usize = 0x8000;
/// Size in bytes of the hash block at the start of every encrypted sector.
pub const SECTOR_HASH_SIZE: usize = 0x400;
/// Size in bytes of the user data carried by one sector.
pub const SECTOR_DATA_SIZE: usize = SECTOR_SIZE - SECTOR_HASH_SIZE;
/// Sectors per hash group.
pub const SECTORS_PER_GROUP: usize = 64;
/// Sectors per H1 subgroup.
pub const SECTORS_PER_SUBGROUP: usize = 8;
/// Subgroups per group.
pub const SUBGROUPS_PER_GROUP: usize = SECTORS_PER_GROUP / SECTORS_PER_SUBGROUP;
/// 1 KiB chunks hashed into H0, per sector.
pub const H0_ENTRIES: usize = SECTOR_DATA_SIZE / 1024;

/// Size in bytes of one encrypted group (64 x 32 KiB).
pub const GROUP_SIZE_ENC: usize = SECTORS_PER_GROUP * SECTOR_SIZE;
/// Size in bytes of one decrypted group's user data (64 x 31 KiB).
pub const GROUP_SIZE_DEC: usize = SECTORS_PER_GROUP * SECTOR_DATA_SIZE;

const H0_OFFSET: usize = 0x000;
const H1_OFFSET: usize = 0x280;
const H2_OFFSET: usize = 0x340;
/// Where, within a sector's (still-encrypted) hash block, the data IV lives: the last 16 bytes of
/// the final H2 entry.
const DATA_IV_OFFSET: usize = 0x3D0;

/// Errors from the group codec.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum GroupError {
    #[error("encrypted group buffer must be {GROUP_SIZE_ENC} bytes, got {0}")]
    BadEncryptedLength(usize),
    #[error("decrypted group buffer must be at most {GROUP_SIZE_DEC} bytes, got {0}")]
    BadDecryptedLength(usize),
}

fn read_hash20(buf: &[u8], offset: usize) -> [u8; 20] {
    buf[offset..offset + 20].try_into().expect("20-byte slice")
}

fn write_hash20(buf: &mut [u8], offset: usize, hash: &[u8; 20]) {
    buf[offset..offset + 20].copy_from_slice(hash);
}

/// A sector's hash block, decrypted and parsed.
#[derive(Clone)]
struct SectorHashes {
    h0: [[u8; 20]; H0_ENTRIES],
    h1: [[u8; 20]; SUBGROUPS_PER_GROUP],
    h2: [[u8; 20]; SUBGROUPS_PER_GROUP],
}

impl SectorHashes {
    fn parse(block: &[u8; SECTOR_HASH_SIZE]) -> Self {
        let mut h0 = [[0u8; 20]; H0_ENTRIES];
        for (i, slot) in h0.iter_mut().enumerate() {
            *slot = read_hash20(block, H0_OFFSET + i * 20);
        }
        let mut h1 = [[0u8; 20]; SUBGROUPS_PER_GROUP];
        for (i, slot) in h1.iter_mut().enumerate() {
            *slot = read_hash20(block, H1_OFFSET + i * 20);
        }
        let mut h2 = [[0u8; 20]; SUBGROUPS_PER_GROUP];
        for (i, slot) in h2.iter_mut().enumerate() {
            *slot = read_hash20(block, H2_OFFSET + i * 20);
        }

        Self { h0, h1, h2 }
    }

    fn serialize(&self) -> [u8; SECTOR_HASH_SIZE] {
        let mut block = [0u8; SECTOR_HASH_SIZE];
        for (i, hash) in self.h0.iter().enumerate() {
            write_hash20(&mut block, H0_OFFSET + i * 20, hash);
        }
        for (i, hash) in self.h1.iter().enumerate() {
            write_hash20(&mut block, H1_OFFSET + i * 20, hash);
        }
        for (i, hash) in self.h2.iter().enumerate() {
            write_hash20(&mut block, H2_OFFSET + i * 20, hash);
        }

        block
    }
}

fn aes_decrypt(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let cipher = Aes128CbcDec::new(key.into(), iv.into());
    let len = data.len();
    cipher
        .decrypt_padded_b2b_mut::<NoPadding>(&data.to_vec(), &mut data[..len])
        .expect("CBC decrypt of block-aligned data cannot fail");
}

fn aes_encrypt(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let cipher = Aes128CbcEnc::new(key.into(), iv.into());
    let len = data.len();
    cipher
        .encrypt_padded_b2b_mut::<NoPadding>(&data.to_vec(), &mut data[..len])
        .expect("CBC encrypt of block-aligned data cannot fail");
}

/// Decrypt one 32 KiB sector, returning its parsed hash block and 31 KiB of plaintext data.
fn decrypt_sector(encrypted: &[u8; SECTOR_SIZE], title_key: &[u8; 16]) -> (SectorHashes, Vec<u8>) {
    let data_iv: [u8; 16] = encrypted[DATA_IV_OFFSET..DATA_IV_OFFSET + 16]
        .try_into()
        .expect("16-byte slice");

    let mut hash_block: [u8; SECTOR_HASH_SIZE] = encrypted[..SECTOR_HASH_SIZE]
        .try_into()
        .expect("hash block slice");
    aes_decrypt(title_key, &[0u8; 16], &mut hash_block);

    let mut data = encrypted[SECTOR_HASH_SIZE..].to_vec();
    aes_decrypt(title_key, &data_iv, &mut data);

    (SectorHashes::parse(&hash_block), data)
}

/// Encrypt one sector given its plaintext data and already-computed hashes.
fn encrypt_sector(hashes: &SectorHashes, data: &[u8], title_key: &[u8; 16]) -> [u8; SECTOR_SIZE] {
    let mut hash_block = hashes.serialize();
    aes_encrypt(title_key, &[0u8; 16], &mut hash_block);

    // The data IV is the last 16 bytes of the *encrypted* H2 table, which is also the last 16
    // bytes of the encrypted hash block.
    let data_iv: [u8; 16] = hash_block[DATA_IV_OFFSET..DATA_IV_OFFSET + 16]
        .try_into()
        .expect("16-byte slice");

    let mut encrypted_data = data.to_vec();
    aes_encrypt(title_key, &data_iv, &mut encrypted_data);

    let mut out = [0u8; SECTOR_SIZE];
    out[..SECTOR_HASH_SIZE].copy_from_slice(&hash_block);
    out[SECTOR_HASH_SIZE..].copy_from_slice(&encrypted_data);
    out
}

/// Encrypt a single decrypted group, returning the 2 MiB ciphertext and the H3 slot
/// (`SHA-1(sector0.H2)`) it should be recorded under.
///
/// `decrypted` must be at most [`GROUP_SIZE_DEC`] bytes; a short final group is zero-padded.
pub fn encrypt_group(decrypted: &[u8], title_key: &[u8; 16]) -> Result<(Vec<u8>, [u8; 20]), GroupError> {
    if decrypted.len() > GROUP_SIZE_DEC {
        return Err(GroupError::BadDecryptedLength(decrypted.len()));
    }

    let mut padded = decrypted.to_vec();
    padded.resize(GROUP_SIZE_DEC, 0);

    let mut h1_table = [[0u8; 20]; SECTORS_PER_GROUP];
    let mut h2_table = [[0u8; 20]; SUBGROUPS_PER_GROUP];
    let mut sector_data: Vec<&[u8]> = Vec::with_capacity(SECTORS_PER_GROUP);
    let mut sector_h0s: Vec<[[u8; 20]; H0_ENTRIES]> = Vec::with_capacity(SECTORS_PER_GROUP);

    for sector in padded.chunks_exact(SECTOR_DATA_SIZE) {
        sector_data.push(sector);

        let mut h0 = [[0u8; 20]; H0_ENTRIES];
        for (k, chunk) in sector.chunks_exact(1024).enumerate() {
            h0[k] = hash::sha1(chunk);
        }
        sector_h0s.push(h0);
    }

    for (sg, h1_slot) in h1_table
        .chunks_exact_mut(SECTORS_PER_SUBGROUP)
        .enumerate()
    {
        // H1[i] within a subgroup hashes sector i's own H0 table (not the whole subgroup's).
        for local in 0..SECTORS_PER_SUBGROUP {
            let s = sg * SECTORS_PER_SUBGROUP + local;
            let mut buf = Vec::with_capacity(H0_ENTRIES * 20);
            for h in &sector_h0s[s] {
                buf.extend_from_slice(h);
            }
            h1_slot[local] = hash::sha1(&buf);
        }

        h2_table[sg] = hash::sha1(&flatten20(&h1_slot[..]));
    }

    let h2_table_bytes = flatten20(&h2_table);
    let h3_slot = hash::sha1(&h2_table_bytes);

    let mut out = Vec::with_capacity(GROUP_SIZE_ENC);
    for s in 0..SECTORS_PER_GROUP {
        let sg = s / SECTORS_PER_SUBGROUP;
        let hashes = SectorHashes {
            h0: sector_h0s[s],
            h1: h1_table[sg * SECTORS_PER_SUBGROUP..(sg + 1) * SECTORS_PER_SUBGROUP]
                .try_into()
                .expect("8 entries"),
            h2: h2_table,
        };
        out.extend_from_slice(&encrypt_sector(&hashes, sector_data[s], title_key));
    }

    Ok((out, h3_slot))
}

fn flatten20<const N: usize>(hashes: &[[u8; 20]; N]) -> Vec<u8> {
    let mut out = Vec::with_capacity(N * 20);
    for h in hashes {
        out.extend_from_slice(h);
    }
    out
}

/// Per-group Merkle check results, one bit per level per failure mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GroupHashErrors {
    /// A per-kilobyte H0 hash did not match its sector's data (level 0).
    pub h0_bad: bool,
    /// A sector's H1 table did not match its subgroup's replicated copy (level 1).
    pub h1_table_copy: bool,
    /// A subgroup's H1 hash did not match the rehashed H0 table (level 1).
    pub h1_bad: bool,
    /// A sector's H2 table did not match sector 0's copy (level 2).
    pub h2_table_copy: bool,
    /// A subgroup's H2 hash did not match the rehashed H1 table (level 2).
    pub h2_bad: bool,
    /// `SHA-1(sector0.H2)` did not match the group's H3 slot (level 3).
    pub h3_bad: bool,
}

impl GroupHashErrors {
    /// Whether any check failed.
    pub fn any(&self) -> bool {
        self.h0_bad || self.h1_table_copy || self.h1_bad || self.h2_table_copy || self.h2_bad || self.h3_bad
    }
}

/// Decrypt a group and verify its full H0-H3 chain against the external H3 slot recorded for it.
///
/// Returns the decrypted 2 MiB (padded) user data alongside the errors observed. A group of all
/// zero bytes (a scrubbed/never-written group) is reported via `is_zero` so callers can downgrade
/// it from a real integrity failure.
pub fn decrypt_and_verify_group(
    encrypted: &[u8],
    title_key: &[u8; 16],
    expected_h3: &[u8; 20],
) -> Result<(Vec<u8>, GroupHashErrors, bool), GroupError> {
    if encrypted.len() != GROUP_SIZE_ENC {
        return Err(GroupError::BadEncryptedLength(encrypted.len()));
    }

    let is_zero = encrypted.iter().all(|&b| b == 0);

    let mut errors = GroupHashErrors::default();
    let mut decrypted = Vec::with_capacity(GROUP_SIZE_DEC);
    let mut sector_hashes = Vec::with_capacity(SECTORS_PER_GROUP);

    for chunk in encrypted.chunks_exact(SECTOR_SIZE) {
        let sector: &[u8; SECTOR_SIZE] = chunk.try_into().expect("sector-sized chunk");
        let (hashes, data) = decrypt_sector(sector, title_key);

        for (k, piece) in data.chunks_exact(1024).enumerate() {
            if hash::sha1(piece) != hashes.h0[k] {
                errors.h0_bad = true;
            }
        }

        decrypted.extend_from_slice(&data);
        sector_hashes.push(hashes);
    }

    for sg in 0..SUBGROUPS_PER_GROUP {
        let base = sg * SECTORS_PER_SUBGROUP;
        let sector0_h1 = sector_hashes[base].h1;

        for local in 0..SECTORS_PER_SUBGROUP {
            let s = base + local;
            if sector_hashes[s].h1 != sector0_h1 {
                errors.h1_table_copy = true;
            }

            let rehashed = hash::sha1(&flatten20(&sector_hashes[s].h0));
            if rehashed != sector_hashes[s].h1[local] {
                errors.h1_bad = true;
            }
        }
    }

    let sector0_h2 = sector_hashes[0].h2;
    for hashes in sector_hashes.iter().skip(1) {
        if hashes.h2 != sector0_h2 {
            errors.h2_table_copy = true;
        }
    }

    for sg in 0..SUBGROUPS_PER_GROUP {
        let base = sg * SECTORS_PER_SUBGROUP;
        let subgroup_h1 = sector_hashes[base].h1;
        let rehashed = hash::sha1(&flatten20(&subgroup_h1));
        if rehashed != sector0_h2[sg] {
            errors.h2_bad = true;
        }
    }

    let h3 = hash::sha1(&flatten20(&sector0_h2));
    if &h3 != expected_h3 {
        errors.h3_bad = true;
    }

    Ok((decrypted, errors, is_zero))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TITLE_KEY: [u8; 16] = [0x42; 16];

    #[test]
    fn group_round_trips_and_verifies_clean() {
        let mut data = vec![0u8; GROUP_SIZE_DEC];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }

        let (encrypted, h3) = encrypt_group(&data, &TITLE_KEY).expect("encrypt");
        assert_eq!(encrypted.len(), GROUP_SIZE_ENC);

        let (decrypted, errors, is_zero) =
            decrypt_and_verify_group(&encrypted, &TITLE_KEY, &h3).expect("verify");

        assert_eq!(decrypted, data);
        assert!(!errors.any(), "{errors:?}");
        assert!(!is_zero);
    }

    #[test]
    fn tampered_data_flags_h0() {
        let data = vec![0xABu8; GROUP_SIZE_DEC];
        let (mut encrypted, h3) = encrypt_group(&data, &TITLE_KEY).expect("encrypt");

        // Flip a byte well inside the first sector's data region.
        encrypted[SECTOR_HASH_SIZE + 10] ^= 0xFF;

        let (_, errors, _) = decrypt_and_verify_group(&encrypted, &TITLE_KEY, &h3).expect("verify");
        assert!(errors.h0_bad);
    }

    #[test]
    fn wrong_h3_slot_flags_level_three() {
        let data = vec![0x11u8; GROUP_SIZE_DEC];
        let (encrypted, mut h3) = encrypt_group(&data, &TITLE_KEY).expect("encrypt");
        h3[0] ^= 0xFF;

        let (_, errors, _) = decrypt_and_verify_group(&encrypted, &TITLE_KEY, &h3).expect("verify");
        assert!(errors.h3_bad);
        assert!(!errors.h0_bad);
    }

    #[test]
    fn all_zero_group_is_reported_as_scrubbed() {
        let encrypted = vec![0u8; GROUP_SIZE_ENC];
        let expected_h3 = [0u8; 20];

        let (_, _, is_zero) = decrypt_and_verify_group(&encrypted, &TITLE_KEY, &expected_h3).expect("verify");
        assert!(is_zero);
    }

    #[test]
    fn short_group_is_zero_padded() {
        let data = vec![0x99u8; SECTOR_DATA_SIZE * 3];
        let (encrypted, h3) = encrypt_group(&data, &TITLE_KEY).expect("encrypt");

        let (decrypted, errors, _) =
            decrypt_and_verify_group(&encrypted, &TITLE_KEY, &h3).expect("verify");
        assert!(!errors.any());
        assert_eq!(&decrypted[..data.len()], &data[..]);
        assert!(decrypted[data.len()..].iter().all(|&b| b == 0));
    }
}
