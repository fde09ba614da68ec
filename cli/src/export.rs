use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

use mailshot::Config;

use crate::util;

pub fn import_cmd() -> Command {
    Command::new("import")
        .about("Append recipients from a csv file to the batch")
        .long_about(
            "Append recipients from a csv file to the batch.\n\n\
            Columns are picked by header: one containing `email`, one containing \
            `image`, `link` or `url`, and optionally one containing `name`. Rows \
            without an address or an image link are skipped.",
        )
        .display_order(60)
        .arg(Arg::new("file").value_name("PATH").required(true))
}

pub fn cmd() -> Command {
    Command::new("export")
        .about("Export the batch as csv, with the status of every entry")
        .display_order(70)
        .arg(
            Arg::new("file")
                .value_name("PATH")
                .help("Output file, stdout if not given"),
        )
}

pub async fn run_import(matches: &ArgMatches, config: &Config) -> Result<()> {
    let controller = util::controller(config)?;

    if let Some(path) = matches.get_one::<String>("file") {
        let added = controller.import(BufReader::new(File::open(path)?))?;
        println!("Imported {added} entries from {path}");
        controller.store().db().flush().await?;
    }

    Ok(())
}

pub async fn run(matches: &ArgMatches, config: &Config) -> Result<()> {
    let controller = util::controller(config)?;

    match matches.get_one::<String>("file") {
        Some(path) => {
            controller.export(BufWriter::new(File::create(path)?))?;
            println!("Exported {} entries to {path}", controller.entries().len());
        }
        None => controller.export(std::io::stdout().lock())?,
    }

    Ok(())
}
