// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Disc-image structures read through a [`crate::reader::Reader`] window: the GameCube/Wii disc
//! header and the Wii volume-group/partition table.

pub mod header;
pub mod partition_table;
