use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};

use mailshot::entry::EntryId;
use mailshot::Config;

use crate::util;

pub fn cmd() -> Command {
    Command::new("entry")
        .subcommand_required(true)
        .display_order(10)
        .about("Manage the working batch")
        .subcommand(
            Command::new("add")
                .about("Add a recipient to the batch")
                .arg(Arg::new("email").required(true))
                .arg(Arg::new("image_link").value_name("IMAGE_LINK").required(true))
                .arg(Arg::new("name").long("name").short('n')),
        )
        .subcommand(
            Command::new("list").about("List the entries of the batch").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Print the entries as json"),
            ),
        )
        .subcommand(
            Command::new("rm")
                .about("Remove entries by id")
                .arg(
                    Arg::new("id")
                        .required(true)
                        .num_args(1..)
                        .value_parser(clap::value_parser!(EntryId)),
                ),
        )
        .subcommand(
            Command::new("clear")
                .about("Remove every entry from the batch")
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .short('y')
                        .action(ArgAction::SetTrue)
                        .help("Don't ask for confirmation"),
                ),
        )
}

pub async fn run(matches: &ArgMatches, config: &Config) -> Result<()> {
    let controller = util::controller(config)?;

    match matches.subcommand() {
        Some(("add", m)) => {
            let email = m.get_one::<String>("email").cloned().unwrap_or_default();
            let image_link = m
                .get_one::<String>("image_link")
                .cloned()
                .unwrap_or_default();
            let entry = controller.add_entry(email, image_link, m.get_one::<String>("name").cloned())?;
            util::print_entry(&entry);
        }
        Some(("list", m)) if m.get_flag("json") => {
            println!("{}", serde_json::to_string_pretty(&controller.entries())?);
        }
        Some(("list", _)) => {
            util::print_entries(&controller.entries());
            let counts = controller.counts();
            println!(
                "{} total, {} pending, {} sent, {} failed",
                counts.total, counts.pending, counts.success, counts.error
            );
        }
        Some(("rm", m)) => {
            for id in m.get_many::<EntryId>("id").into_iter().flatten() {
                let entry = controller.remove_entry(*id)?;
                println!("Removed #{} {}", entry.id, entry.email);
            }
        }
        Some(("clear", m)) => {
            if !m.get_flag("yes") {
                let count = controller.entries().len();
                if !confirm(&format!("Remove all {count} entries?"))? {
                    return Ok(());
                }
            }
            controller.clear()?;
        }
        _ => unreachable!(),
    }

    controller.store().db().flush().await?;

    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    use std::io::Write;

    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
