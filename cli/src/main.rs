#![allow(warnings)]

mod batch;
mod entry;
mod export;
mod mail;
mod serve;
mod template;

mod util;

use std::str::FromStr;

use clap::{Arg, ArgMatches, Command};
use mailshot::{config, Config};
use tokio_util::sync::CancellationToken;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // Commands that drive a run watch the token and cancel the run, letting
    // the entry in flight complete.
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Cancelling, waiting for the entry in flight...");
            ctrl_c.cancel();
        }
    });

    let matches = cmd().get_matches();

    // A missing config file is fine, defaults are used instead.
    let mut config: Config = match matches.get_one::<String>("config") {
        Some(path) => config::load_from(path)?,
        None => config::load().unwrap_or_default(),
    };

    if let Some(level) = matches.get_one::<String>("verbosity") {
        config.tracing.level = mailshot::tracing::Level::from_str(level)?;
    }
    // The server sets up tracing on its own.
    if !matches!(matches.subcommand_name(), Some("serve")) {
        mailshot::tracing::init(&config)?;
    }

    match matches.subcommand() {
        Some(("entry", m)) => entry::run(m, &config).await?,
        Some(("template", m)) => template::run(m, &config).await?,
        Some(("import", m)) => export::run_import(m, &config).await?,
        Some(("export", m)) => export::run(m, &config).await?,
        Some(("send", m)) => mail::run_send(m, &config, cancel.clone()).await?,
        Some(("retry", m)) => mail::run_retry(m, &config, cancel.clone()).await?,
        Some(("history", m)) => mail::run_history(m, &config).await?,
        Some(("batch", m)) => batch::run(m, &config).await?,
        Some(("serve", m)) => serve::run(m, config, cancel.clone()).await?,
        _ => unreachable!(),
    }

    Ok(())
}

pub fn cmd() -> Command {
    Command::new("mailshot")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .infer_subcommands(true)
        .version(VERSION)
        .author(AUTHORS)
        .about("Send one templated, personalized email per recipient, one at a time.")
        .subcommand(entry::cmd())
        .subcommand(template::cmd())
        .subcommand(export::import_cmd())
        .subcommand(export::cmd())
        .subcommand(mail::send_cmd())
        .subcommand(mail::retry_cmd())
        .subcommand(mail::history_cmd())
        .subcommand(batch::cmd())
        .subcommand(serve::cmd())
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .global(true)
                .help("Path to the config file"),
        )
        .arg(
            Arg::new("verbosity")
                .long("verbosity")
                .short('v')
                .display_order(100)
                .value_name("level")
                .value_parser(["trace", "debug", "info", "warn", "error", "none"])
                .global(true)
                .help("Set the verbosity of the log output"),
        )
}
