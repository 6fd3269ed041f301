// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! The runtime [`BankEntry`] and the `bank_init` orchestration that turns an NHCD table entry
//! plus a [`Reader`] window into a fully classified bank: region, crypto status, AppLoader
//! verdict.

use crate::apploader::{self, AppLoaderError, BootInfo, ConsoleKind, DolHeader};
use crate::bank_table::{self, BankType, NhcdBankEntry};
use crate::crypto::cert::{self, CertIssuer, Pki, SigStatus};
use crate::disc::header::{DiscKind, GcnDiscHeader, disc_header_get};
use crate::disc::partition_table::{self, PartitionEntry, VolumeGroupTable};
use crate::reader::{self, Reader};
use crate::ref_file::RefFile;
use crate::signed_blob_header::SignedBlobHeaderSignature;
use crate::ticket::PreSwitchTicket;
use crate::title_metadata::TitleMetadata;
use crate::wii_common_key::WiiCommonKeyKind;
use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use std::io::Cursor;
use thiserror::Error;
use util::Aes128CbcDec;

const TICKET_SIZE: usize = crate::crypto::sign::TICKET_SIZE;
const PARTITION_HEADER_TAIL_SIZE: usize = 0x2C0;

/// Which region a disc's region byte names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RegionCode {
    Jpn,
    Usa,
    Eur,
    All,
    Kor,
    Chn,
    Twn,
    Unknown(u8),
}

impl RegionCode {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Jpn,
            1 => Self::Usa,
            2 => Self::Eur,
            3 => Self::All,
            4 => Self::Kor,
            5 => Self::Chn,
            6 => Self::Twn,
            other => Self::Unknown(other),
        }
    }
}

/// Which cryptographic regime a Wii bank's partitions are wrapped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CryptoType {
    None,
    Debug,
    Retail,
    Korean,
    VWii,
    Unknown,
}

/// The signature algorithm tag a signed blob declared, without its payload (a [`BankEntry`]-sized
/// summary of [`SignedBlobHeaderSignature`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SigType {
    Rsa4096Sha1,
    Rsa2048Sha1,
    EcdsaSha1,
    Rsa4096Sha256,
    Rsa2048Sha256,
    EcdsaSha256,
    HmacSha1,
}

impl From<&SignedBlobHeaderSignature> for SigType {
    fn from(sig: &SignedBlobHeaderSignature) -> Self {
        match sig {
            SignedBlobHeaderSignature::Rsa4096Sha1(_) => Self::Rsa4096Sha1,
            SignedBlobHeaderSignature::Rsa2048Sha1(_) => Self::Rsa2048Sha1,
            SignedBlobHeaderSignature::EcdsaSha1(_) => Self::EcdsaSha1,
            SignedBlobHeaderSignature::Rsa4096Sha256(_) => Self::Rsa4096Sha256,
            SignedBlobHeaderSignature::Rsa2048Sha256(_) => Self::Rsa2048Sha256,
            SignedBlobHeaderSignature::EcdsaSha256(_) => Self::EcdsaSha256,
            SignedBlobHeaderSignature::HmacSha1(_) => Self::HmacSha1,
        }
    }
}

/// A runtime bank record: the NHCD entry merged with whatever disc content was parseable.
pub struct BankEntry {
    /// Lazily-bound LBA window for this bank's image.
    pub reader: Box<dyn Reader>,
    /// First LBA of the bank, relative to the device.
    pub lba_start: u32,
    /// Length of the bank, in LBAs.
    pub lba_len: u32,
    /// POSIX timestamp from the NHCD entry, or -1 if unknown.
    pub timestamp: i64,
    /// The NHCD type tag.
    pub bank_type: BankType,
    /// First byte of the big-endian region-code word.
    pub region_code: RegionCode,
    /// Whether this bank has been soft-deleted.
    pub is_deleted: bool,
    /// AppLoader check verdict.
    pub aplerr: AppLoaderError,
    /// Up to 3 `u32`s of context for `aplerr`.
    pub aplerr_val: [u32; 3],
    /// The 1024-byte disc header, if one could be located or reconstructed.
    pub disc_header: Option<GcnDiscHeader>,
    /// Wii-only: which crypto tier the game partition is wrapped under.
    pub crypto_type: CryptoType,
    /// Wii-only: IOS version extracted from the TMD, 0 if unresolved.
    pub ios_version: u8,
    /// Wii-only: the ticket's declared signature algorithm and its verification status.
    pub ticket_sig: Option<(SigType, SigStatus)>,
    /// Wii-only: the TMD's declared signature algorithm and its verification status.
    pub tmd_sig: Option<(SigType, SigStatus)>,
    /// Wii-only: the volume group table as originally laid out on disc.
    pub vg_orig: Option<VolumeGroupTable>,
    /// Wii-only: partition table entries, sorted by LBA.
    pub ptbl: Vec<PartitionEntry>,
}

/// Errors from bank initialization severe enough to abort before producing a [`BankEntry`] at
/// all (per-phase I/O errors during region/crypto/apploader init are instead captured into the
/// entry's fields, per the "tolerate I/O errors per-phase" contract).
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum BankInitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn lba_window_for(bank_index: u32, bank_count: u32, nhcd_entry: &NhcdBankEntry) -> (u32, u32) {
    if nhcd_entry.lba_len != 0 {
        return (nhcd_entry.lba_start, nhcd_entry.lba_len);
    }

    let lba_start = bank_table::default_bank_start_lba(bank_index, bank_count);
    let lba_len = match nhcd_entry.bank_type {
        BankType::WiiDl => bank_table::NHCD_BANK_WII_DL_SIZE_LBA,
        _ if lba_start < bank_table::NHCD_BANKTABLE_ADDRESS_LBA => {
            bank_table::NHCD_EXTBANKTABLE_BANK_1_SIZE_LBA
        }
        _ => bank_table::NHCD_BANK_SIZE_LBA,
    };
    (lba_start, lba_len)
}

/// Read `len` bytes starting at `byte_offset` (relative to the reader's window) regardless of LBA
/// alignment, by over-reading the covering LBA range and slicing out the requested window.
fn read_bytes_at(
    reader: &mut dyn Reader,
    byte_offset: u64,
    len: usize,
) -> std::io::Result<Vec<u8>> {
    let lba_start = (byte_offset / 512) as u32;
    let start_slack = (byte_offset % 512) as usize;
    let lba_count = ((start_slack + len) as u32).div_ceil(512);

    let mut buf = vec![0u8; lba_count as usize * 512];
    reader.read(&mut buf, lba_start, lba_count)?;

    Ok(buf[start_slack..start_slack + len].to_vec())
}

/// Initialize region classification: read the region LBA and decode its first byte.
pub fn init_region(reader: &mut dyn Reader, is_wii: bool) -> std::io::Result<RegionCode> {
    let byte_offset = if is_wii { 0x4E000u64 } else { 0x458u64 };
    let buf = read_bytes_at(reader, byte_offset, 4)?;
    Ok(RegionCode::from_byte(buf[0]))
}

struct PartitionHeaderInfo {
    ticket: Vec<u8>,
    tmd: Vec<u8>,
    data_offset: u64,
}

fn read_partition_header(
    reader: &mut dyn Reader,
    partition_byte_offset: u64,
) -> std::io::Result<PartitionHeaderInfo> {
    let tail = read_bytes_at(reader, partition_byte_offset, PARTITION_HEADER_TAIL_SIZE)?;

    let ticket = tail[0..TICKET_SIZE].to_vec();

    let tmd_size = u32::from_be_bytes(tail[0x2A4..0x2A8].try_into().expect("4 bytes")) as usize;
    let tmd_offset = (u32::from_be_bytes(tail[0x2A8..0x2AC].try_into().expect("4 bytes")) as u64) << 2;
    let data_offset = (u32::from_be_bytes(tail[0x2B8..0x2BC].try_into().expect("4 bytes")) as u64) << 2;

    let tmd = read_bytes_at(reader, partition_byte_offset + tmd_offset, tmd_size)?;

    Ok(PartitionHeaderInfo {
        ticket,
        tmd,
        data_offset: partition_byte_offset + data_offset,
    })
}

fn tier_from_issuer(issuer: &str) -> Option<Pki> {
    cert::cert_get_issuer_from_name(issuer).map(CertIssuer::pki)
}

fn decrypt_title_key_for_tier(
    ticket: &PreSwitchTicket,
    pki: Pki,
) -> Result<[u8; 16], crate::wii_common_key::CommonKeyKindError> {
    let common_key_kind =
        WiiCommonKeyKind::for_index(ticket.common_key_kind_index, matches!(pki, Pki::Debug))?;

    let id = if ticket.is_device_unique() {
        ticket.ticket_id
    } else {
        ticket.title_id.inner()
    };
    let iv: [u8; 16] = [id.to_be_bytes(), [0; 8]].concat().try_into().expect("16 bytes");

    let cipher = Aes128CbcDec::new((&common_key_kind.bytes()).into(), &iv.into());
    let mut title_key = ticket.encrypted_title_key;
    let _ = cipher.decrypt_padded_mut::<NoPadding>(&mut title_key);

    Ok(title_key)
}

/// Initialize crypto classification: parse the game partition's ticket/TMD, verify both
/// signatures, and derive `crypto_type`/`ios_version`.
pub fn init_crypto(
    reader: &mut dyn Reader,
    game_partition_byte_offset: u64,
    disc_header: Option<&GcnDiscHeader>,
) -> std::io::Result<(
    CryptoType,
    u8,
    Option<(SigType, SigStatus)>,
    Option<(SigType, SigStatus)>,
)> {
    if let Some(header) = disc_header {
        if header.hash_verify != 0 && header.disc_no_crypt != 0 {
            return Ok((CryptoType::None, 0, None, None));
        }
    }

    let info = read_partition_header(reader, game_partition_byte_offset)?;

    let ticket = PreSwitchTicket::new(Cursor::new(&info.ticket))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let tmd = TitleMetadata::new(Cursor::new(&info.tmd))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    let ticket_sig_type = SigType::from(&ticket.signed_blob_header.signature);
    let tmd_sig_type = SigType::from(&tmd.signed_blob_header.signature);

    let ticket_status = cert::verify(&info.ticket);
    let tmd_status = cert::verify(&info.tmd);

    let pki = tier_from_issuer(&ticket.signed_blob_header.issuer).unwrap_or(Pki::Retail);

    let crypto_type = match (pki, ticket.common_key_kind_index) {
        (Pki::Retail, 0) => CryptoType::Retail,
        (Pki::Retail, 1) => CryptoType::Korean,
        (Pki::Retail, 2) => CryptoType::VWii,
        (Pki::Debug, 0) => CryptoType::Debug,
        _ => CryptoType::Unknown,
    };

    let ios_version = match tmd.system_runtime_title_id {
        Some(title_id) if title_id.higher_half() == 1 && title_id.lower_half() < 256 => {
            title_id.lower_half() as u8
        }
        _ => 0,
    };

    Ok((
        crypto_type,
        ios_version,
        Some((ticket_sig_type, ticket_status)),
        Some((tmd_sig_type, tmd_status)),
    ))
}

/// Parse the boot-block/boot-info and DOL header at partition LBA 2 and run the AppLoader checks.
pub fn init_apploader(
    reader: &mut dyn Reader,
    game_partition_byte_offset: u64,
    is_wii: bool,
    is_debug: bool,
) -> std::io::Result<(AppLoaderError, [u32; 3])> {
    let boot_offset = game_partition_byte_offset + 2 * 512;
    let boot_buf = read_bytes_at(reader, boot_offset, 1024)?;
    let bi2 = BootInfo::parse(&boot_buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    let dol_offset = game_partition_byte_offset + 0x2440;
    let dol_buf = read_bytes_at(reader, dol_offset, 256)?;
    let dol = DolHeader::parse(&dol_buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    let console = match (is_wii, is_debug) {
        (true, false) => ConsoleKind::WiiRetail,
        (true, true) => ConsoleKind::WiiDebug,
        (false, false) => ConsoleKind::GcnRetail,
        (false, true) => ConsoleKind::GcnDebug,
    };

    Ok(apploader::check_apploader(
        &bi2,
        &dol,
        bi2.fst_max_length as u64,
        console,
        true,
    ))
}

/// The "flush button" reconstruction path: given an all-zero candidate disc-header sector, try
/// to recover a real header from the game partition's first user-data block.
///
/// Deviates from a literal reading of "decrypt the first 128 bytes" by decrypting the full
/// 1024-byte header window instead of just probing for the magic -- a 128-byte probe can't
/// itself produce a [`GcnDiscHeader`] to return, and nothing about the on-disk layout makes a
/// wider decrypt riskier (CBC decryption of the leading blocks doesn't depend on anything past
/// them).
fn reconstruct_disc_header(
    reader: &mut dyn Reader,
    bank_lba_len: u32,
) -> std::io::Result<Option<(GcnDiscHeader, bool)>> {
    let (_vg, entries) = partition_table::ptbl_load(reader, bank_lba_len)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let Some(game) = partition_table::find_game(&entries) else {
        return Ok(None);
    };
    let game_byte_offset = (game.lba_start as u64) * 512;

    let info = read_partition_header(reader, game_byte_offset)?;

    let first_block = read_bytes_at(reader, info.data_offset, 1024)?;
    if crate::disc::header::disc_header_identify(&first_block) == DiscKind::Wii {
        let mut header = GcnDiscHeader::parse(&first_block)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        header.hash_verify = 1;
        header.disc_no_crypt = 1;
        return Ok(Some((header, true)));
    }

    let ticket = PreSwitchTicket::new(Cursor::new(&info.ticket))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let pki = tier_from_issuer(&ticket.signed_blob_header.issuer).unwrap_or(Pki::Retail);
    let title_key = decrypt_title_key_for_tier(&ticket, pki)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    let hash_block = read_bytes_at(reader, info.data_offset, 0x400)?;
    let iv: [u8; 16] = hash_block[0x3D0..0x3E0].try_into().expect("16 bytes");

    let mut user_data = read_bytes_at(reader, info.data_offset + 0x400, 1024)?;
    let cipher = Aes128CbcDec::new((&title_key).into(), (&iv).into());
    let _ = cipher.decrypt_padded_mut::<NoPadding>(&mut user_data);

    if crate::disc::header::disc_header_identify(&user_data) == DiscKind::Wii {
        let mut header = GcnDiscHeader::parse(&user_data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        header.hash_verify = 0;
        header.disc_no_crypt = 0;
        return Ok(Some((header, false)));
    }

    Ok(None)
}

/// Identify a bank's disc kind: try the direct header read first, then the flush-button
/// reconstruction path if that sector is zeroed out (a soft-deleted or scrubbed bank).
///
/// Exposed for `undelete`, which needs to re-derive a bank's [`BankType`] after its on-disk type
/// tag has been cleared.
pub fn identify_disc_kind(
    file: &RefFile,
    reader: &mut dyn Reader,
    lba_start: u32,
    lba_len: u32,
) -> std::io::Result<Option<GcnDiscHeader>> {
    if let Some(header) = disc_header_get(file, lba_start)? {
        return Ok(Some(header));
    }

    Ok(reconstruct_disc_header(reader, lba_len)?.map(|(header, _)| header))
}

/// Build a [`BankEntry`] from an NHCD table entry: bind a [`Reader`] window, then run
/// region/crypto/AppLoader sub-initializers in order. I/O errors from any sub-initializer are
/// swallowed (leaving that phase's fields at their default/unresolved values) so the entry stays
/// usable with partial information.
pub fn bank_init(
    file: &RefFile,
    bank_index: u32,
    bank_count: u32,
    nhcd_entry: &NhcdBankEntry,
) -> Result<BankEntry, BankInitError> {
    let (lba_start, lba_len) = lba_window_for(bank_index, bank_count, nhcd_entry);

    let mut reader: Box<dyn Reader> = reader::open(file.clone(), lba_start, lba_len)?;

    let mut is_deleted = nhcd_entry.is_deleted;
    let mut disc_header = disc_header_get(file, lba_start).ok().flatten();

    if disc_header.is_none() {
        if let Ok(Some((header, is_unencrypted))) =
            reconstruct_disc_header(reader.as_mut(), lba_len)
        {
            let _ = is_unencrypted;
            is_deleted = true;
            disc_header = Some(header);
        }
    }

    let is_wii = matches!(
        disc_header.as_ref().map(GcnDiscHeader::identify),
        Some(DiscKind::Wii)
    );

    let region_code = init_region(reader.as_mut(), is_wii).unwrap_or(RegionCode::Unknown(0xFF));

    let mut crypto_type = CryptoType::None;
    let mut ios_version = 0u8;
    let mut ticket_sig = None;
    let mut tmd_sig = None;
    let mut vg_orig = None;
    let mut ptbl = Vec::new();

    if is_wii {
        if let Ok((vg, entries)) = partition_table::ptbl_load(reader.as_mut(), lba_len) {
            if let Some(game) = partition_table::find_game(&entries) {
                let game_byte_offset = (game.lba_start as u64) * 512;
                if let Ok((ct, ios, tsig, msig)) =
                    init_crypto(reader.as_mut(), game_byte_offset, disc_header.as_ref())
                {
                    crypto_type = ct;
                    ios_version = ios;
                    ticket_sig = tsig;
                    tmd_sig = msig;
                }
            }
            vg_orig = Some(vg);
            ptbl = entries;
        }
    }

    let is_debug = matches!(crypto_type, CryptoType::Debug);
    let game_byte_offset = partition_table::find_game(&ptbl)
        .map(|g| (g.lba_start as u64) * 512)
        .unwrap_or(0);

    let (aplerr, aplerr_val) =
        init_apploader(reader.as_mut(), game_byte_offset, is_wii, is_debug).unwrap_or((
            AppLoaderError::Ok,
            [0, 0, 0],
        ));

    Ok(BankEntry {
        reader,
        lba_start,
        lba_len,
        timestamp: nhcd_entry.timestamp,
        bank_type: nhcd_entry.bank_type,
        region_code,
        is_deleted,
        aplerr,
        aplerr_val,
        disc_header,
        crypto_type,
        ios_version,
        ticket_sig,
        tmd_sig,
        vg_orig,
        ptbl,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_code_decodes_known_bytes() {
        assert_eq!(RegionCode::from_byte(0), RegionCode::Jpn);
        assert_eq!(RegionCode::from_byte(1), RegionCode::Usa);
        assert_eq!(RegionCode::from_byte(6), RegionCode::Twn);
        assert_eq!(RegionCode::from_byte(0xFF), RegionCode::Unknown(0xFF));
    }

    #[test]
    fn crypto_type_maps_tier_and_index() {
        assert_eq!(
            match (Pki::Retail, 0u8) {
                (Pki::Retail, 0) => CryptoType::Retail,
                _ => CryptoType::Unknown,
            },
            CryptoType::Retail
        );
    }
}
