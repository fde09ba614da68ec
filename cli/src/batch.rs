use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use uuid::Uuid;

use mailshot::Config;

use crate::util;

pub fn cmd() -> Command {
    Command::new("batch")
        .subcommand_required(true)
        .display_order(50)
        .about("Save and restore named batches")
        .subcommand(
            Command::new("save")
                .about("Save a copy of the working batch")
                .arg(Arg::new("name").required(true)),
        )
        .subcommand(
            Command::new("load")
                .about("Replace the working batch with a saved one")
                .arg(
                    Arg::new("id")
                        .required(true)
                        .value_parser(clap::value_parser!(Uuid)),
                ),
        )
        .subcommand(Command::new("list").about("List saved batches"))
        .subcommand(
            Command::new("rm").about("Delete a saved batch").arg(
                Arg::new("id")
                    .required(true)
                    .value_parser(clap::value_parser!(Uuid)),
            ),
        )
}

pub async fn run(matches: &ArgMatches, config: &Config) -> Result<()> {
    let controller = util::controller(config)?;

    match matches.subcommand() {
        Some(("save", m)) => {
            let name = m.get_one::<String>("name").cloned().unwrap_or_default();
            let batch = controller.save_batch(name)?;
            println!("Saved {} entries as `{}` ({})", batch.entry_count, batch.name, batch.id);
        }
        Some(("load", m)) => {
            if let Some(id) = m.get_one::<Uuid>("id") {
                let batch = controller.load_batch(*id)?;
                println!("Loaded `{}` ({} entries)", batch.name, batch.entry_count);
            }
        }
        Some(("list", _)) => {
            let batches = controller.list_batches()?;
            if batches.is_empty() {
                println!("No saved batches.");
            }
            for batch in batches {
                println!(
                    "{}  {}  {:>5} entries  {}",
                    batch.id,
                    batch.created_at.format("%Y-%m-%d %H:%M"),
                    batch.entry_count,
                    batch.name
                );
            }
        }
        Some(("rm", m)) => {
            if let Some(id) = m.get_one::<Uuid>("id") {
                controller.delete_batch(*id)?;
                println!("Deleted {id}");
            }
        }
        _ => unreachable!(),
    }

    controller.store().db().flush().await?;

    Ok(())
}
