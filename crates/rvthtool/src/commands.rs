// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Thin glue between parsed `clap` arguments and `rvth`'s core operations. No business logic
//! lives here beyond formatting and argument plumbing.

use color_eyre::Result;
use color_eyre::eyre::{Context, eyre};
use rvth::bank_table::BankType;
use rvth::disc::header::DiscKind;
use rvth::worker::{CancellationToken, Phase};
use rvth::{OpenFlags, RefFile, RvtH};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

fn now_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub(crate) fn list_banks(device: &str) -> Result<()> {
    let image = RvtH::open(device, OpenFlags::ReadOnly)?;

    println!(
        "{:<4} {:<10} {:<6} {:<12} {:<12} region",
        "bank", "type", "del", "lba_start", "lba_len"
    );
    for (i, bank) in image.banks().iter().enumerate() {
        println!(
            "{:<4} {:<10?} {:<6} {:<#12x} {:<#12x} {:?}",
            i, bank.bank_type, bank.is_deleted, bank.lba_start, bank.lba_len, bank.region_code
        );
    }

    Ok(())
}

pub(crate) fn show_table(device: &str) -> Result<()> {
    let image = RvtH::open(device, OpenFlags::ReadOnly)?;

    println!("read_only: {}", image.is_read_only());
    for i in 0..image.bank_count() as usize {
        let Some(entry) = image.nhcd_entry(i) else { continue };
        println!(
            "bank {i}: type={:?} deleted={} timestamp={} lba_start={:#x} lba_len={:#x}",
            entry.bank_type, entry.is_deleted, entry.timestamp, entry.lba_start, entry.lba_len
        );
    }

    Ok(())
}

pub(crate) fn extract(device: &str, bank_index: u32, destination: &str) -> Result<()> {
    let mut image = RvtH::open(device, OpenFlags::ReadOnly)?;
    let bank = image
        .banks_mut()
        .get_mut(bank_index as usize)
        .ok_or_else(|| eyre!("no such bank: {bank_index}"))?;

    if matches!(bank.bank_type, BankType::Empty) || bank.is_deleted {
        return Err(eyre!("bank {bank_index} is empty or deleted, nothing to extract"));
    }

    let dest_file = RefFile::open_or_create_writable(destination)
        .with_context(|| format!("creating destination file {destination}"))?;
    dest_file.make_sparse((bank.lba_len as u64) * 512)?;
    let mut dest_reader = rvth::reader::open(dest_file, 0, bank.lba_len)?;

    let token = CancellationToken::new();
    rvth::transfer::copy_to_gcm(bank.reader.as_mut(), dest_reader.as_mut(), bank.lba_len, &token, |p| {
        if p.processed_lba % (16 * 1024) == 0 || p.processed_lba == p.total_lba {
            info!(phase = ?p.phase, progress = format!("{}/{}", p.processed_lba, p.total_lba), "extracting");
        }
    })?;

    println!("extracted bank {bank_index} to {destination}");
    Ok(())
}

pub(crate) fn import(device: &str, source: &str, bank_index: u32) -> Result<()> {
    let image = RvtH::open(device, OpenFlags::ReadWrite)?;
    if image.is_read_only() {
        return Err(eyre!("device has no valid NHCD bank table, import is unsupported"));
    }

    let src_file = RefFile::open_read_only(source).with_context(|| format!("opening {source}"))?;
    let mut src_reader = rvth::reader::open(src_file, 0, 0)?;
    let src_lba_len = src_reader.lba_len();

    let src_kind = if src_lba_len > rvth::bank_table::NHCD_BANK_SIZE_LBA {
        BankType::WiiDl
    } else {
        BankType::Gcn
    };

    let dest_entry = image
        .nhcd_entry(bank_index as usize)
        .ok_or_else(|| eyre!("no such bank: {bank_index}"))?;
    let next_entry = image.nhcd_entry(bank_index as usize + 1);
    rvth::transfer::validate_import(
        bank_index,
        image.bank_count(),
        src_kind,
        src_lba_len,
        dest_entry,
        next_entry,
    )
    .map_err(|e| eyre!(e.to_string()))?;

    let lba_start = dest_entry.lba_start;
    let mut dest_reader = rvth::reader::open(image.file().clone(), lba_start, src_lba_len)?;

    let token = CancellationToken::new();
    rvth::transfer::copy_to_hdd(src_reader.as_mut(), dest_reader.as_mut(), src_lba_len, &token, |p| {
        if p.phase == Phase::Import && (p.processed_lba % (16 * 1024) == 0 || p.processed_lba == p.total_lba) {
            info!(progress = format!("{}/{}", p.processed_lba, p.total_lba), "importing");
        }
    })?;

    rvth::transfer::finish_import(image.file(), bank_index, src_kind, lba_start, src_lba_len, now_timestamp())?;

    println!("imported {source} into bank {bank_index}");
    Ok(())
}

pub(crate) fn delete(device: &str, bank_index: u32) -> Result<()> {
    let image = RvtH::open(device, OpenFlags::ReadWrite)?;
    if image.is_read_only() {
        return Err(eyre!("device has no valid NHCD bank table, delete is unsupported"));
    }

    let entry = image
        .nhcd_entry(bank_index as usize)
        .ok_or_else(|| eyre!("no such bank: {bank_index}"))?;
    if entry.is_deleted {
        return Err(eyre!("bank {bank_index} is already deleted"));
    }

    let new_entry = rvth::NhcdBankEntry {
        bank_type: BankType::Empty,
        timestamp: entry.timestamp,
        lba_start: entry.lba_start,
        lba_len: entry.lba_len,
        is_deleted: true,
    };
    rvth::bank_table::write_bank_entry(image.file(), bank_index, &new_entry, now_timestamp())
        .map_err(|e| eyre!(e.to_string()))?;

    println!("deleted bank {bank_index}");
    Ok(())
}

pub(crate) fn undelete(device: &str, bank_index: u32) -> Result<()> {
    let image = RvtH::open(device, OpenFlags::ReadWrite)?;
    if image.is_read_only() {
        return Err(eyre!("device has no valid NHCD bank table, undelete is unsupported"));
    }

    let entry = image
        .nhcd_entry(bank_index as usize)
        .ok_or_else(|| eyre!("no such bank: {bank_index}"))?;
    if !entry.is_deleted {
        return Err(eyre!("bank {bank_index} is not marked as deleted"));
    }

    let mut reader = rvth::reader::open(image.file().clone(), entry.lba_start, entry.lba_len)?;
    let header = rvth::bank::identify_disc_kind(image.file(), reader.as_mut(), entry.lba_start, entry.lba_len)?
        .ok_or_else(|| eyre!("could not re-identify bank {bank_index}'s disc header"))?;

    let bank_type = match header.identify() {
        DiscKind::Gcn => BankType::Gcn,
        DiscKind::Wii => BankType::WiiSl,
        DiscKind::Unknown => return Err(eyre!("bank {bank_index}'s disc header has no recognized magic")),
    };

    let new_entry = rvth::NhcdBankEntry {
        bank_type,
        timestamp: entry.timestamp,
        lba_start: entry.lba_start,
        lba_len: entry.lba_len,
        is_deleted: false,
    };
    rvth::bank_table::write_bank_entry(image.file(), bank_index, &new_entry, now_timestamp())
        .map_err(|e| eyre!(e.to_string()))?;

    println!("undeleted bank {bank_index} as {bank_type:?}");
    Ok(())
}

pub(crate) fn verify(device: &str, bank_index: u32) -> Result<()> {
    let mut image = RvtH::open(device, OpenFlags::ReadOnly)?;
    let bank = image
        .banks_mut()
        .get_mut(bank_index as usize)
        .ok_or_else(|| eyre!("no such bank: {bank_index}"))?;

    if bank.ptbl.is_empty() {
        return Err(eyre!("bank {bank_index} has no Wii partitions to verify"));
    }

    let mut all_ok = true;
    for partition in bank.ptbl.clone() {
        let result = rvth::verifier::verify_partition(bank.reader.as_mut(), &partition)
            .map_err(|e| eyre!(e.to_string()))?;
        let ok = result.is_fully_verified();
        all_ok &= ok;
        println!(
            "partition at lba {:#x}: {} ({} groups, h4_matches_tmd={})",
            partition.lba_start,
            if ok { "OK" } else { "FAILED" },
            result.groups.len(),
            result.h4_matches_tmd
        );
    }

    if !all_ok {
        return Err(eyre!("one or more partitions failed verification"));
    }

    Ok(())
}
