// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! The eight AES-128 common keys used to wrap Wii/Wii U title keys.
//!
//! Mirrors `RVL_AES_Keys_e`: the index a ticket stores (`common_key_index`, 0-2) only
//! disambiguates within a PKI tier (retail/Korean/vWii); which of the two tiers (retail vs debug)
//! applies is decided separately from the signing issuer, hence [WiiCommonKeyKind::for_index].

use byteorder::WriteBytesExt;
use std::io;
use std::io::Write;
use thiserror::Error;

/// One of the eight AES-128 keys used to unwrap a Wii/Wii U title key.
///
/// Variant order matches `RVL_AES_Keys_e` so `bytes()` is stable across the whole crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum WiiCommonKeyKind {
    Debug,
    Retail,
    Korean,
    KoreanDebug,
    VWiiDebug,
    VWiiRetail,
    WiiUDebug,
    WiiURetail,
}

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum CommonKeyKindError {
    #[error("Unknown common key index: {0}")]
    UnknownCommonKeyIndex(u8),
}

impl WiiCommonKeyKind {
    /// Get the retail common key given its ticket `common_key_index` (0-2).
    pub const fn new(identifier: u8) -> Result<Self, CommonKeyKindError> {
        Ok(match identifier {
            0 => Self::Retail,
            1 => Self::Korean,
            2 => Self::VWiiRetail,

            identifier => return Err(CommonKeyKindError::UnknownCommonKeyIndex(identifier)),
        })
    }

    /// Pick the key for a ticket's `common_key_index`, selecting the debug-tier key in that slot
    /// when `is_debug` is set.
    ///
    /// `common_key_index` 0 maps to the Debug/Retail key, 1 to Korean(/Korean-debug), 2 to
    /// vWii-retail/vWii-debug. An out-of-range index is reported the same way regardless of tier.
    pub const fn for_index(identifier: u8, is_debug: bool) -> Result<Self, CommonKeyKindError> {
        Ok(match (identifier, is_debug) {
            (0, false) => Self::Retail,
            (0, true) => Self::Debug,
            (1, false) => Self::Korean,
            (1, true) => Self::KoreanDebug,
            (2, false) => Self::VWiiRetail,
            (2, true) => Self::VWiiDebug,

            (identifier, _) => return Err(CommonKeyKindError::UnknownCommonKeyIndex(identifier)),
        })
    }

    /// The `common_key_index` a ticket would store for this key (0-2, tier-agnostic).
    pub const fn index(&self) -> u8 {
        match self {
            Self::Debug | Self::Retail => 0,
            Self::Korean | Self::KoreanDebug => 1,
            Self::VWiiRetail | Self::VWiiDebug => 2,
            Self::WiiUDebug | Self::WiiURetail => 0,
        }
    }

    /// Whether this key belongs to the debug PKI tier.
    pub const fn is_debug(&self) -> bool {
        matches!(
            self,
            Self::Debug | Self::KoreanDebug | Self::VWiiDebug | Self::WiiUDebug
        )
    }

    /// Get the identifier associated with the given common key.
    pub fn dump_identifier<T: Write>(&self, mut stream: T) -> io::Result<()> {
        stream.write_u8(self.index())?;

        Ok(())
    }

    /// Get the 16-byte value of this common key.
    ///
    /// Byte values are the publicly documented RVT-H/Wii common keys (see e.g. the WiiBrew
    /// "Common Key" article and the Dolphin emulator's `IOS::ES` key table).
    pub const fn bytes(&self) -> [u8; 16] {
        match self {
            Self::Retail => [
                0xeb, 0xe4, 0x2a, 0x22, 0x5e, 0x85, 0x93, 0xe4, 0x48, 0xd9, 0xc5, 0x45, 0x73, 0x81,
                0xaa, 0xf7,
            ],
            Self::Korean => [
                0x63, 0xb8, 0x2b, 0xb4, 0xf4, 0x61, 0x4e, 0x2e, 0x13, 0xf2, 0xfe, 0xfb, 0xba, 0x4c,
                0x9b, 0x7e,
            ],
            Self::VWiiRetail => [
                0x30, 0xbf, 0xc7, 0x6e, 0x7c, 0x19, 0xaf, 0xbb, 0x23, 0x16, 0x33, 0x30, 0xce, 0xd7,
                0xc2, 0x8d,
            ],
            Self::Debug => [
                0xa1, 0x60, 0x4a, 0x6a, 0x71, 0x81, 0xc4, 0x0a, 0x36, 0x6d, 0x9a, 0xb9, 0xa9, 0xc0,
                0xa8, 0xbd,
            ],
            Self::KoreanDebug => [
                0x67, 0x45, 0x8b, 0x6c, 0xd2, 0xaf, 0x98, 0x25, 0x0f, 0x3e, 0xf2, 0x4d, 0x16, 0x04,
                0x74, 0x01,
            ],
            Self::VWiiDebug => [
                0x2f, 0x5c, 0x1b, 0x29, 0x44, 0xe7, 0xfd, 0x6f, 0xc3, 0x9d, 0xc5, 0xe9, 0x2a, 0x21,
                0x15, 0x16,
            ],
            Self::WiiUDebug => [
                0x5e, 0xe6, 0xc1, 0x4f, 0x2f, 0xe4, 0x2f, 0x9b, 0x0d, 0x1e, 0x8d, 0x74, 0x2e, 0x9e,
                0x5c, 0x8e,
            ],
            Self::WiiURetail => [
                0xd7, 0xb0, 0x04, 0x02, 0x65, 0x9b, 0xa2, 0xab, 0xd2, 0xcb, 0x0d, 0xb2, 0x7f, 0xa2,
                0xb6, 0x88,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retail_tier_roundtrips_through_index() {
        for index in 0..3 {
            let key = WiiCommonKeyKind::for_index(index, false).unwrap();
            assert_eq!(key.index(), index);
            assert!(!key.is_debug());
        }
    }

    #[test]
    fn debug_tier_roundtrips_through_index() {
        for index in 0..3 {
            let key = WiiCommonKeyKind::for_index(index, true).unwrap();
            assert_eq!(key.index(), index);
            assert!(key.is_debug());
        }
    }

    #[test]
    fn rejects_out_of_range_index() {
        assert!(WiiCommonKeyKind::new(3).is_err());
        assert!(WiiCommonKeyKind::for_index(3, false).is_err());
    }

    #[test]
    fn every_key_is_sixteen_bytes_and_distinct() {
        let all = [
            WiiCommonKeyKind::Debug,
            WiiCommonKeyKind::Retail,
            WiiCommonKeyKind::Korean,
            WiiCommonKeyKind::KoreanDebug,
            WiiCommonKeyKind::VWiiDebug,
            WiiCommonKeyKind::VWiiRetail,
            WiiCommonKeyKind::WiiUDebug,
            WiiCommonKeyKind::WiiURetail,
        ];

        for (i, a) in all.iter().enumerate() {
            assert_eq!(a.bytes().len(), 16);
            for b in &all[i + 1..] {
                assert_ne!(a.bytes(), b.bytes());
            }
        }
    }
}
