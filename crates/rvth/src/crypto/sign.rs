// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Fake-signing, real-signing, and common-key re-wrapping for serialized tickets/TMDs.
//!
//! These operate directly on the serialized (already-`dump`ed) byte buffer rather than the parsed
//! [`crate::ticket::PreSwitchTicket`]/[`crate::title_metadata::TitleMetadata`] structs: every
//! operation here either mutates raw signature/padding bytes or re-derives a digest over a byte
//! range, which is most naturally expressed (and most directly comparable to [`crate::crypto::cert::verify`])
//! at the byte-slice level.

use crate::crypto::hash;
use crate::crypto::rsa as rsa_ops;
use crate::wii_common_key::WiiCommonKeyKind;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use thiserror::Error;
use util::Aes128CbcDec;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// Offset of the issuer name within a Wii ticket or TMD (both share the same signature header
/// layout: 4-byte type, 256-byte RSA-2048 signature, 0x3C padding).
pub const ISSUER_OFFSET: usize = 0x140;
/// Offset of the RSA-2048 signature itself.
pub const SIG_OFFSET: usize = 0x004;
/// Length of an RSA-2048 signature.
pub const SIG_LEN: usize = 256;
/// Offset of the padding following the signature.
pub const PADDING_OFFSET: usize = 0x104;
/// Length of the padding following the signature.
pub const PADDING_LEN: usize = 0x3C;

/// Offset of the ticket's `content_access_permissions` field.
pub const TICKET_CONTENT_ACCESS_PERM_OFFSET: usize = 0x222;
/// Offset of the fakesign brute-force counter: the final 4 bytes of `content_access_perm[0x3A..]`.
pub const TICKET_FAKESIGN_COUNTER_OFFSET: usize = TICKET_CONTENT_ACCESS_PERM_OFFSET + 0x3C;
/// Total serialized size of a pre-Switch Wii ticket.
pub const TICKET_SIZE: usize = 0x2A4;

/// Offset of the TMD's fakesign brute-force counter, within its reserved stretch following
/// `group_id`.
pub const TMD_FAKESIGN_COUNTER_OFFSET: usize = 0x19C;

/// Errors from the signing layer.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum SignError {
    #[error("buffer too short for a signed blob: got {0} bytes")]
    BufferTooShort(usize),
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa_ops::RsaCryptoError),
}

/// Brute-force the 4-byte little-endian counter at `counter_offset` until
/// `SHA-1(data[hash_region_start..])[0] == 0x00`. Returns the counter value that succeeded.
fn fakesign_brute_force(data: &mut [u8], hash_region_start: usize, counter_offset: usize) -> u32 {
    let mut counter: u32 = 0;
    loop {
        data[counter_offset..counter_offset + 4].copy_from_slice(&counter.to_ne_bytes());
        if hash::sha1(&data[hash_region_start..])[0] == 0x00 {
            return counter;
        }
        counter = counter.wrapping_add(1);
    }
}

fn zero_signature(data: &mut [u8]) -> Result<(), SignError> {
    if data.len() < PADDING_OFFSET + PADDING_LEN {
        return Err(SignError::BufferTooShort(data.len()));
    }
    data[SIG_OFFSET..SIG_OFFSET + SIG_LEN].fill(0);
    data[PADDING_OFFSET..PADDING_OFFSET + PADDING_LEN].fill(0);
    Ok(())
}

/// Fakesign a serialized ticket in place. Returns the winning brute-force counter.
///
/// The ticket's signature type must already be RSA-2048/SHA-1 (`0x00010001`); this does not
/// rewrite the signature type.
pub fn fakesign_ticket(data: &mut [u8]) -> Result<u32, SignError> {
    if data.len() < TICKET_SIZE {
        return Err(SignError::BufferTooShort(data.len()));
    }
    zero_signature(data)?;
    Ok(fakesign_brute_force(
        data,
        ISSUER_OFFSET,
        TICKET_FAKESIGN_COUNTER_OFFSET,
    ))
}

/// Fakesign a serialized TMD in place. Returns the winning brute-force counter.
pub fn fakesign_tmd(data: &mut [u8]) -> Result<u32, SignError> {
    if data.len() < TMD_FAKESIGN_COUNTER_OFFSET + 4 {
        return Err(SignError::BufferTooShort(data.len()));
    }
    zero_signature(data)?;
    Ok(fakesign_brute_force(
        data,
        ISSUER_OFFSET,
        TMD_FAKESIGN_COUNTER_OFFSET,
    ))
}

/// Real-sign a serialized ticket or TMD in place with an RSA-2048 private key given as raw
/// `(p, q, e)` factors. Used for Wii debug-unit signing, where IOS actually checks the signature.
pub fn realsign_ticket_or_tmd(
    data: &mut [u8],
    p: &[u8],
    q: &[u8],
    e: u32,
    use_sha256: bool,
) -> Result<(), SignError> {
    if data.len() < PADDING_OFFSET + PADDING_LEN {
        return Err(SignError::BufferTooShort(data.len()));
    }

    let sig = if use_sha256 {
        let digest = hash::sha256(&data[ISSUER_OFFSET..]);
        rsa_ops::rsa2048_sign_sha256(p, q, e, &digest)?
    } else {
        let digest = hash::sha1(&data[ISSUER_OFFSET..]);
        rsa_ops::rsa2048_sign_sha1(p, q, e, &digest)?
    };

    data[SIG_OFFSET..SIG_OFFSET + SIG_LEN].copy_from_slice(&sig);
    data[PADDING_OFFSET..PADDING_OFFSET + PADDING_LEN].fill(0);
    Ok(())
}

fn cbc_decrypt_block16(key: &[u8; 16], iv: &[u8; 16], block: &mut [u8; 16]) {
    let cipher = Aes128CbcDec::new(key.into(), iv.into());
    let src = *block;
    cipher
        .decrypt_padded_b2b_mut::<NoPadding>(&src, block)
        .expect("single 16-byte CBC block cannot fail to decrypt");
}

fn cbc_encrypt_block16(key: &[u8; 16], iv: &[u8; 16], block: &mut [u8; 16]) {
    let cipher = Aes128CbcEnc::new(key.into(), iv.into());
    let src = *block;
    cipher
        .encrypt_padded_b2b_mut::<NoPadding>(&src, block)
        .expect("single 16-byte CBC block cannot fail to encrypt");
}

/// Re-wrap a ticket's title key from `source_key` to `target_key`, rewriting the issuer string to
/// `target_issuer`. The caller is responsible for fake- or real-signing the result afterward: a
/// re-wrapped ticket is never validly signed under its old signature.
pub fn recrypt_ticket(
    data: &mut [u8],
    title_id: u64,
    source_key: WiiCommonKeyKind,
    target_key: WiiCommonKeyKind,
    target_issuer: &str,
) -> Result<(), SignError> {
    const ENCRYPTED_TITLE_KEY_OFFSET: usize = 0x1BF;

    if data.len() < ENCRYPTED_TITLE_KEY_OFFSET + 16 {
        return Err(SignError::BufferTooShort(data.len()));
    }

    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&title_id.to_be_bytes());

    let mut block: [u8; 16] = data[ENCRYPTED_TITLE_KEY_OFFSET..ENCRYPTED_TITLE_KEY_OFFSET + 16]
        .try_into()
        .expect("16-byte slice");

    cbc_decrypt_block16(&source_key.bytes(), &iv, &mut block);
    cbc_encrypt_block16(&target_key.bytes(), &iv, &mut block);

    data[ENCRYPTED_TITLE_KEY_OFFSET..ENCRYPTED_TITLE_KEY_OFFSET + 16].copy_from_slice(&block);

    let mut issuer_field = [0u8; 64];
    let name_bytes = target_issuer.as_bytes();
    let copy_len = name_bytes.len().min(64);
    issuer_field[..copy_len].copy_from_slice(&name_bytes[..copy_len]);
    data[ISSUER_OFFSET..ISSUER_OFFSET + 64].copy_from_slice(&issuer_field);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cert;

    fn blank_ticket() -> Vec<u8> {
        let mut data = vec![0u8; TICKET_SIZE];
        data[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        let issuer = b"Root-CA00000001-XS00000003";
        data[ISSUER_OFFSET..ISSUER_OFFSET + issuer.len()].copy_from_slice(issuer);
        data
    }

    #[test]
    fn fakesign_ticket_produces_leading_zero_hash() {
        let mut data = blank_ticket();
        fakesign_ticket(&mut data).expect("fakesign");

        let digest = hash::sha1(&data[ISSUER_OFFSET..]);
        assert_eq!(digest[0], 0x00);
    }

    #[test]
    fn fakesign_zeroes_signature_and_padding_first() {
        let mut data = blank_ticket();
        data[SIG_OFFSET] = 0xAB;
        data[PADDING_OFFSET] = 0xCD;

        fakesign_ticket(&mut data).expect("fakesign");

        // The signature/padding region stays zero; only the counter bytes inside
        // content_access_permissions (which lies after the issuer) are touched.
        assert_eq!(data[SIG_OFFSET], 0x00);
        assert_eq!(data[PADDING_OFFSET], 0x00);
    }

    #[test]
    fn realsign_produces_a_signature_cert_verify_accepts() {
        use rand::rngs::OsRng;
        use rsa::RsaPrivateKey;

        let mut rng = OsRng;
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
        let primes = key.primes();
        let p = primes[0].to_bytes_be();
        let q = primes[1].to_bytes_be();

        let mut data = blank_ticket();
        realsign_ticket_or_tmd(&mut data, &p, &q, 0x10001, false).expect("realsign");

        // The signature block should now decrypt to a well-formed BT=1 PKCS#1 block under the
        // matching public key.
        use rsa::traits::PublicKeyParts;
        let pubkey = rsa::RsaPublicKey::from(&key);
        let modulus = pubkey.n().to_bytes_be();
        let sig = &data[SIG_OFFSET..SIG_OFFSET + SIG_LEN];
        let block = crate::crypto::rsa::decrypt_signature(&modulus, 0x10001, sig);

        assert_eq!(block[0], 0x00);
        assert_eq!(block[1], 0x01);
        let _ = cert::SigStatus::empty();
    }

    #[test]
    fn recrypt_changes_issuer_and_is_reversible_via_inverse_rewrap() {
        let mut data = blank_ticket();
        let title_id = 0x0001_0001_0001_0001u64;

        let original_key_plain = [0x5Au8; 16];
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&title_id.to_be_bytes());
        let mut wrapped = original_key_plain;
        cbc_encrypt_block16(&WiiCommonKeyKind::Retail.bytes(), &iv, &mut wrapped);
        data[0x1BF..0x1BF + 16].copy_from_slice(&wrapped);

        recrypt_ticket(
            &mut data,
            title_id,
            WiiCommonKeyKind::Retail,
            WiiCommonKeyKind::Korean,
            "Root-CA00000001-XS00000003",
        )
        .expect("recrypt");

        let mut rewrapped: [u8; 16] = data[0x1BF..0x1BF + 16].try_into().unwrap();
        cbc_decrypt_block16(&WiiCommonKeyKind::Korean.bytes(), &iv, &mut rewrapped);
        assert_eq!(rewrapped, original_key_plain);

        let issuer = String::from_utf8_lossy(&data[ISSUER_OFFSET..ISSUER_OFFSET + 27]).into_owned();
        assert_eq!(issuer, "Root-CA00000001-XS00000003");
    }
}
