// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! AES/SHA/RSA primitives, the embedded certificate store, hash-group (de/en)cryption, and
//! ticket/TMD signing -- the Wii cryptographic pipeline the bank initializer and transfer engine
//! build on.

pub mod cert;
pub mod group;
pub mod hash;
pub mod rsa;
pub mod sign;
