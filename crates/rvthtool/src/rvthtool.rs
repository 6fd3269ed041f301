// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

use color_eyre::Result;
use util::setup_logging_for_cli;

mod cli;
mod commands;

fn main() -> Result<()> {
    color_eyre::install()?;
    setup_logging_for_cli();

    let matches = cli::get_matches();

    match matches.subcommand() {
        Some(("list-banks", sub)) => {
            commands::list_banks(sub.get_one::<String>("device").unwrap())
        }
        Some(("show-table", sub)) => {
            commands::show_table(sub.get_one::<String>("device").unwrap())
        }
        Some(("extract", sub)) => commands::extract(
            sub.get_one::<String>("device").unwrap(),
            *sub.get_one::<u32>("bank").unwrap(),
            sub.get_one::<String>("destination").unwrap(),
        ),
        Some(("import", sub)) => commands::import(
            sub.get_one::<String>("device").unwrap(),
            sub.get_one::<String>("source").unwrap(),
            *sub.get_one::<u32>("bank").unwrap(),
        ),
        Some(("delete", sub)) => commands::delete(
            sub.get_one::<String>("device").unwrap(),
            *sub.get_one::<u32>("bank").unwrap(),
        ),
        Some(("undelete", sub)) => commands::undelete(
            sub.get_one::<String>("device").unwrap(),
            *sub.get_one::<u32>("bank").unwrap(),
        ),
        Some(("verify", sub)) => commands::verify(
            sub.get_one::<String>("device").unwrap(),
            *sub.get_one::<u32>("bank").unwrap(),
        ),
        _ => unreachable!("clap enforces subcommand_required"),
    }
}
