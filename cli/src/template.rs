use anyhow::{Error, Result};
use clap::{Arg, ArgMatches, Command};

use mailshot::{Config, Template};

use crate::util;

pub fn cmd() -> Command {
    Command::new("template")
        .subcommand_required(true)
        .display_order(20)
        .about("Manage the message template")
        .long_about(
            "Manage the message template.\n\n\
            Subject and body may use the {{name}}, {{email}} and {{imageLink}} \
            tokens. A missing name falls back to the part of the address before \
            the @.",
        )
        .subcommand(
            Command::new("set")
                .about("Set the template")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .short('f')
                        .value_name("PATH")
                        .help("Toml file with `subject` and `htmlContent`, or an html body")
                        .conflicts_with("body"),
                )
                .arg(Arg::new("subject").long("subject").short('s'))
                .arg(Arg::new("body").long("body").short('b')),
        )
        .subcommand(Command::new("show").about("Print the current template"))
}

pub async fn run(matches: &ArgMatches, config: &Config) -> Result<()> {
    let controller = util::controller(config)?;

    match matches.subcommand() {
        Some(("set", m)) => {
            let mut template = match m.get_one::<String>("file") {
                Some(path) if path.ends_with(".toml") => {
                    Template::from_toml(&std::fs::read_to_string(path)?)?
                }
                Some(path) => Template {
                    html_content: std::fs::read_to_string(path)?,
                    ..controller.template()
                },
                None => controller.template(),
            };
            if let Some(subject) = m.get_one::<String>("subject") {
                template.subject = subject.clone();
            }
            if let Some(body) = m.get_one::<String>("body") {
                template.html_content = body.clone();
            }
            if template.subject.is_empty() && template.html_content.is_empty() {
                return Err(Error::msg("template needs a subject or a body"));
            }
            controller.set_template(template)?;
            controller.store().db().flush().await?;
        }
        Some(("show", _)) => {
            let template = controller.template();
            println!("Subject: {}\n\n{}", template.subject, template.html_content);
        }
        _ => unreachable!(),
    }

    Ok(())
}
