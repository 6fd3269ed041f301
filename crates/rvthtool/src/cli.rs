// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgMatches, Command, command, value_parser};

pub(crate) fn get_matches() -> ArgMatches {
    command!()
        .subcommand_required(true)
        .subcommand(
            Command::new("list-banks")
                .about("List every bank on an RVT-H HDD image or device")
                .arg(Arg::new("device").required(true)),
        )
        .subcommand(
            Command::new("show-table")
                .about("Dump the raw NHCD bank table")
                .arg(Arg::new("device").required(true)),
        )
        .subcommand(
            Command::new("extract")
                .about("Extract a bank to a standalone GCM/ISO file")
                .arg(Arg::new("device").required(true))
                .arg(Arg::new("bank").required(true).value_parser(value_parser!(u32)))
                .arg(Arg::new("destination").required(true)),
        )
        .subcommand(
            Command::new("import")
                .about("Import a standalone disc image into a bank slot")
                .arg(Arg::new("device").required(true))
                .arg(Arg::new("source").required(true))
                .arg(Arg::new("bank").required(true).value_parser(value_parser!(u32))),
        )
        .subcommand(
            Command::new("delete")
                .about("Soft-delete a bank (keeps its data, clears its type tag)")
                .arg(Arg::new("device").required(true))
                .arg(Arg::new("bank").required(true).value_parser(value_parser!(u32))),
        )
        .subcommand(
            Command::new("undelete")
                .about("Recover a soft-deleted bank by re-identifying its disc header")
                .arg(Arg::new("device").required(true))
                .arg(Arg::new("bank").required(true).value_parser(value_parser!(u32))),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify every partition of a bank against its Merkle hash tree")
                .arg(Arg::new("device").required(true))
                .arg(Arg::new("bank").required(true).value_parser(value_parser!(u32))),
        )
        .get_matches()
}
