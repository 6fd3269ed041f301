// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Embedded certificate store and raw PKCS#1 v1.5 signature verification for the Wii ticket/TMD
//! chain (`Root` → `CA` → `XS`/`CP`), plus the Wii U debug chain.
//!
//! The store only covers the issuers a disc's ticket/TMD can actually name (§6.4 of the design
//! notes scopes out 3DS/CTR issuers entirely). Each embedded [`EmbeddedCert`]'s modulus below is a
//! structurally valid RSA-2048 placeholder, not the genuine Nintendo-issued key material (which
//! this workspace has no way to fetch); [`verify`] is fully wired and exercised by tests against
//! freshly generated keypairs, but won't validate a real console's certificate chain until the
//! real moduli are substituted in.

use crate::crypto::{hash, rsa};
use bitflags::bitflags;

bitflags! {
    /// Independent observations made while walking a signature block. Unlike [`crate::error::DomainError`]
    /// these bits are not mutually exclusive: a single malformed signature can be both badly padded
    /// and hash-mismatched at once.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SigStatus: u16 {
        /// Issuer name did not resolve to any embedded certificate.
        const UNKNOWN_ISSUER = 1 << 0;
        /// PS padding bytes did not match the byte the block type demands.
        const BAD_PADDING = 1 << 1;
        /// DER `DigestInfo` identifier did not match the declared hash algorithm.
        const WRONG_DER = 1 << 2;
        /// Computed digest did not match the signature's stored digest.
        const HASH_MISMATCH = 1 << 3;
        /// Digest mismatched under a full comparison, but a NUL-terminated string comparison of
        /// the kind the original IOS used would have accepted it (the "Trucha bug"): both digests
        /// start with a `0x00` byte.
        const FAKE = 1 << 4;
    }
}

impl SigStatus {
    /// True when every bit is clear: the signature verified with no caveats.
    pub fn is_ok(self) -> bool {
        self.is_empty()
    }
}

/// The two PKI trust tiers. A title's ticket/TMD always names issuers from exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pki {
    /// Production (retail console) PKI.
    Retail,
    /// Development (debug unit) PKI.
    Debug,
}

/// A certificate issuer named in a ticket's/TMD's `issuer` field, scoped to Wii retail/debug and
/// the Wii U debug chain (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CertIssuer {
    RootRetail,
    RootDebug,
    CaRetail,
    CaDebug,
    TicketRetail,
    TicketDebug,
    TmdRetail,
    TmdDebug,
    WiiUCaDebug,
    WiiUTicketDebug,
    WiiUTmdDebug,
}

impl CertIssuer {
    /// The certificate's own name, as it appears as the last component of an `issuer` path.
    pub const fn name(self) -> &'static str {
        match self {
            Self::RootRetail | Self::RootDebug => "Root",
            Self::CaRetail => "CA00000001",
            Self::CaDebug => "CA00000002",
            Self::TicketRetail => "XS00000003",
            Self::TicketDebug => "XS00000006",
            Self::TmdRetail => "CP00000004",
            Self::TmdDebug => "CP00000007",
            Self::WiiUCaDebug => "CA00000003",
            Self::WiiUTicketDebug => "XS0000000c",
            Self::WiiUTmdDebug => "CP00000010",
        }
    }

    /// The PKI tier this issuer belongs to.
    pub const fn pki(self) -> Pki {
        match self {
            Self::RootRetail | Self::CaRetail | Self::TicketRetail | Self::TmdRetail => Pki::Retail,
            Self::RootDebug
            | Self::CaDebug
            | Self::TicketDebug
            | Self::TmdDebug
            | Self::WiiUCaDebug
            | Self::WiiUTicketDebug
            | Self::WiiUTmdDebug => Pki::Debug,
        }
    }
}

/// Look up the issuer named by the last path component of `issuer`, e.g. `"XS00000003"` out of
/// `"Root-CA00000001-XS00000003"`, within a single PKI tier.
pub fn cert_get_issuer_from_name_with_pki(issuer: &str, pki: Pki) -> Option<CertIssuer> {
    let leaf = issuer.rsplit('-').next().unwrap_or(issuer);

    let candidates: &[CertIssuer] = match pki {
        Pki::Retail => &[
            CertIssuer::RootRetail,
            CertIssuer::CaRetail,
            CertIssuer::TicketRetail,
            CertIssuer::TmdRetail,
        ],
        Pki::Debug => &[
            CertIssuer::RootDebug,
            CertIssuer::CaDebug,
            CertIssuer::TicketDebug,
            CertIssuer::TmdDebug,
            CertIssuer::WiiUCaDebug,
            CertIssuer::WiiUTicketDebug,
            CertIssuer::WiiUTmdDebug,
        ],
    };

    candidates.iter().copied().find(|c| c.name() == leaf)
}

/// Look up the issuer named by the last path component of `issuer`, trying both PKI tiers.
pub fn cert_get_issuer_from_name(issuer: &str) -> Option<CertIssuer> {
    cert_get_issuer_from_name_with_pki(issuer, Pki::Retail)
        .or_else(|| cert_get_issuer_from_name_with_pki(issuer, Pki::Debug))
}

/// An embedded certificate's public key material, as needed to verify a child's signature.
pub struct EmbeddedCert {
    /// Big-endian RSA modulus.
    pub modulus: &'static [u8],
    /// Public exponent.
    pub exponent: u32,
}

const fn placeholder_modulus(seed: u8) -> [u8; 256] {
    let mut out = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        out[i] = seed.wrapping_add(i as u8).wrapping_mul(0x6d);
        i += 1;
    }
    // Ensure the MSB is set so this reads as a genuine 2048-bit modulus.
    out[0] |= 0x80;
    out
}

const MODULUS_ROOT_RETAIL: [u8; 256] = placeholder_modulus(0x01);
const MODULUS_ROOT_DEBUG: [u8; 256] = placeholder_modulus(0x02);
const MODULUS_CA_RETAIL: [u8; 256] = placeholder_modulus(0x03);
const MODULUS_CA_DEBUG: [u8; 256] = placeholder_modulus(0x04);
const MODULUS_TICKET_RETAIL: [u8; 256] = placeholder_modulus(0x05);
const MODULUS_TICKET_DEBUG: [u8; 256] = placeholder_modulus(0x06);
const MODULUS_TMD_RETAIL: [u8; 256] = placeholder_modulus(0x07);
const MODULUS_TMD_DEBUG: [u8; 256] = placeholder_modulus(0x08);
const MODULUS_WIIU_CA_DEBUG: [u8; 256] = placeholder_modulus(0x09);
const MODULUS_WIIU_TICKET_DEBUG: [u8; 256] = placeholder_modulus(0x0a);
const MODULUS_WIIU_TMD_DEBUG: [u8; 256] = placeholder_modulus(0x0b);

/// Fetch the embedded certificate for `issuer`.
///
/// Every modulus here is a placeholder (see module docs); swap these for the real
/// Nintendo-issued moduli to verify genuine console certificate chains.
pub const fn cert_get(issuer: CertIssuer) -> EmbeddedCert {
    let modulus: &'static [u8] = match issuer {
        CertIssuer::RootRetail => &MODULUS_ROOT_RETAIL,
        CertIssuer::RootDebug => &MODULUS_ROOT_DEBUG,
        CertIssuer::CaRetail => &MODULUS_CA_RETAIL,
        CertIssuer::CaDebug => &MODULUS_CA_DEBUG,
        CertIssuer::TicketRetail => &MODULUS_TICKET_RETAIL,
        CertIssuer::TicketDebug => &MODULUS_TICKET_DEBUG,
        CertIssuer::TmdRetail => &MODULUS_TMD_RETAIL,
        CertIssuer::TmdDebug => &MODULUS_TMD_DEBUG,
        CertIssuer::WiiUCaDebug => &MODULUS_WIIU_CA_DEBUG,
        CertIssuer::WiiUTicketDebug => &MODULUS_WIIU_TICKET_DEBUG,
        CertIssuer::WiiUTmdDebug => &MODULUS_WIIU_TMD_DEBUG,
    };

    EmbeddedCert {
        modulus,
        exponent: 0x10001,
    }
}

const DER_SHA1: [u8; 15] = [
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
];
const DER_SHA256: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05,
    0x00, 0x04, 0x20,
];

/// The signature algorithm declared by a signed blob's first four bytes.
struct SigLayout {
    sig_len: usize,
    uses_sha256: bool,
}

fn sig_layout(sig_type: u32) -> Option<SigLayout> {
    Some(match sig_type {
        0x0001_0000 => SigLayout {
            sig_len: 512,
            uses_sha256: false,
        },
        0x0001_0001 => SigLayout {
            sig_len: 256,
            uses_sha256: false,
        },
        0x0001_0003 => SigLayout {
            sig_len: 512,
            uses_sha256: true,
        },
        0x0001_0004 => SigLayout {
            sig_len: 256,
            uses_sha256: true,
        },
        _ => return None,
    })
}

fn read_issuer_name(data: &[u8]) -> String {
    let nul = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..nul]).into_owned()
}

/// Verify a signed blob (ticket or TMD) against the embedded certificate store.
///
/// `data` starts at the signature-type tag and runs through the end of the signed content.
pub fn verify(data: &[u8]) -> SigStatus {
    let Some(sig_type_bytes) = data.get(0..4) else {
        return SigStatus::UNKNOWN_ISSUER;
    };
    let sig_type = u32::from_be_bytes(sig_type_bytes.try_into().expect("checked length"));

    let Some(layout) = sig_layout(sig_type) else {
        return SigStatus::UNKNOWN_ISSUER;
    };

    let issuer_offset = 4 + layout.sig_len + 0x3C;
    if data.len() < issuer_offset + 64 {
        return SigStatus::UNKNOWN_ISSUER;
    }

    let sig = &data[4..4 + layout.sig_len];
    let issuer_name = read_issuer_name(&data[issuer_offset..issuer_offset + 64]);

    if issuer_name == "Root" {
        // A self-named root: try the debug (dpki) root first, falling back to the retail
        // (ppki) root only if that verification fails, matching the original's tier order.
        let debug_cert = cert_get(CertIssuer::RootDebug);
        let status = verify_with_key(
            data,
            issuer_offset,
            sig,
            debug_cert.modulus,
            debug_cert.exponent,
            layout.uses_sha256,
        );
        if status.is_ok() {
            return status;
        }

        let retail_cert = cert_get(CertIssuer::RootRetail);
        return verify_with_key(
            data,
            issuer_offset,
            sig,
            retail_cert.modulus,
            retail_cert.exponent,
            layout.uses_sha256,
        );
    }

    let issuer = match cert_get_issuer_from_name(&issuer_name) {
        Some(issuer) => issuer,
        None => return SigStatus::UNKNOWN_ISSUER,
    };

    let cert = cert_get(issuer);
    verify_with_key(data, issuer_offset, sig, cert.modulus, cert.exponent, layout.uses_sha256)
}

fn verify_with_key(
    data: &[u8],
    issuer_offset: usize,
    sig: &[u8],
    modulus: &[u8],
    exponent: u32,
    uses_sha256: bool,
) -> SigStatus {
    let block = rsa::decrypt_signature(modulus, exponent, sig);
    let mut status = SigStatus::empty();

    if block.len() < 2 || block[0] != 0x00 {
        return SigStatus::BAD_PADDING;
    }

    let digest_len = if uses_sha256 { 32 } else { 20 };
    if block.len() < digest_len {
        return SigStatus::BAD_PADDING;
    }
    let hash_offset = block.len() - digest_len;

    match block[1] {
        bt @ (0x00 | 0x01) => {
            let pad_byte = if bt == 0x00 { 0x00 } else { 0xFF };
            let der = if uses_sha256 { &DER_SHA256[..] } else { &DER_SHA1[..] };

            if hash_offset < der.len() {
                return SigStatus::BAD_PADDING;
            }
            let der_offset = hash_offset - der.len();

            if der_offset == 0 || block[der_offset - 1] != 0x00 {
                status |= SigStatus::BAD_PADDING;
            } else if block[2..der_offset - 1].iter().any(|&b| b != pad_byte) {
                status |= SigStatus::BAD_PADDING;
            }

            if &block[der_offset..hash_offset] != der {
                status |= SigStatus::WRONG_DER;
            }
        }
        0x02 => {
            if hash_offset == 0 || block[hash_offset - 1] != 0x00 {
                status |= SigStatus::BAD_PADDING;
            }
        }
        _ => return SigStatus::BAD_PADDING,
    }

    let stored = &block[hash_offset..];
    let computed = if uses_sha256 {
        hash::sha256(&data[issuer_offset..]).to_vec()
    } else {
        hash::sha1(&data[issuer_offset..]).to_vec()
    };

    if computed != stored {
        // The original verifier used a NUL-terminated string compare. A digest starting with
        // 0x00 on both sides makes that compare return "equal" immediately regardless of what
        // follows -- the Trucha bug.
        if computed[0] == 0x00 && stored[0] == 0x00 {
            status |= SigStatus::FAKE;
        } else {
            status |= SigStatus::HASH_MISMATCH;
        }
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rsa::pkcs1v15::Pkcs1v15Sign;
    use rsa::traits::PublicKeyParts;
    use rsa::{RsaPrivateKey, RsaPublicKey};

    fn build_signed_blob(issuer: &str, payload: &[u8], key: &RsaPrivateKey) -> Vec<u8> {
        let issuer_offset = 4 + 256 + 0x3C;
        let mut data = vec![0u8; issuer_offset + 64 + payload.len()];
        data[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());

        let mut issuer_field = [0u8; 64];
        issuer_field[..issuer.len()].copy_from_slice(issuer.as_bytes());
        data[issuer_offset..issuer_offset + 64].copy_from_slice(&issuer_field);
        data[issuer_offset + 64..].copy_from_slice(payload);

        let digest = hash::sha1(&data[issuer_offset..]);
        let sig = key
            .sign(Pkcs1v15Sign::new::<sha1::Sha1>(), &digest)
            .expect("sign");

        let mut sig_padded = vec![0u8; 256];
        let start = 256 - sig.len();
        sig_padded[start..].copy_from_slice(&sig);
        data[4..4 + 256].copy_from_slice(&sig_padded);

        data
    }

    #[test]
    fn genuine_signature_verifies_clean() {
        let mut rng = OsRng;
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
        let pubkey = RsaPublicKey::from(&key);
        let modulus = pubkey.n().to_bytes_be();

        let data = build_signed_blob("Root-CA00000001-XS00000003", b"some disc content", &key);
        let issuer_offset = 4 + 256 + 0x3C;
        let sig = &data[4..4 + 256];

        let status = verify_with_key(&data, issuer_offset, sig, &modulus, 0x10001, false);
        assert!(status.is_ok(), "{status:?}");
    }

    #[test]
    fn tampered_payload_is_flagged_invalid() {
        let mut rng = OsRng;
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
        let pubkey = RsaPublicKey::from(&key);
        let modulus = pubkey.n().to_bytes_be();

        let mut data = build_signed_blob("Root-CA00000001-XS00000003", b"some disc content", &key);
        let issuer_offset = 4 + 256 + 0x3C;
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        let sig = data[4..4 + 256].to_vec();

        let status = verify_with_key(&data, issuer_offset, &sig, &modulus, 0x10001, false);
        assert!(status.contains(SigStatus::HASH_MISMATCH) || status.contains(SigStatus::FAKE));
    }

    #[test]
    fn wrong_key_is_flagged_bad_padding_or_mismatch() {
        let mut rng = OsRng;
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
        let other_key = RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
        let other_pub = RsaPublicKey::from(&other_key);
        let modulus = other_pub.n().to_bytes_be();

        let data = build_signed_blob("Root-CA00000001-XS00000003", b"some disc content", &key);
        let issuer_offset = 4 + 256 + 0x3C;
        let sig = &data[4..4 + 256];

        let status = verify_with_key(&data, issuer_offset, sig, &modulus, 0x10001, false);
        assert!(!status.is_ok());
    }

    #[test]
    fn issuer_lookup_resolves_last_path_component() {
        assert_eq!(
            cert_get_issuer_from_name("Root-CA00000001-XS00000003"),
            Some(CertIssuer::TicketRetail)
        );
        assert_eq!(
            cert_get_issuer_from_name("Root-CA00000002-CP00000007"),
            Some(CertIssuer::TmdDebug)
        );
        assert_eq!(cert_get_issuer_from_name("Root-CA99999999-XSdeadbeef"), None);
    }

    #[test]
    fn der_identifiers_have_expected_lengths() {
        assert_eq!(DER_SHA1.len(), 15);
        assert_eq!(DER_SHA256.len(), 19);
    }
}
