use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use tokio_util::sync::CancellationToken;

use mailshot::{BatchController, Config};

pub fn cmd() -> Command {
    Command::new("serve")
        .about("Serve the json api")
        .display_order(80)
        .arg(
            Arg::new("address")
                .long("address")
                .short('a')
                .value_name("ADDR")
                .value_parser(clap::value_parser!(SocketAddr))
                .help("Address to listen on, overrides the config"),
        )
}

pub async fn run(matches: &ArgMatches, mut config: Config, cancel: CancellationToken) -> Result<()> {
    if let Some(address) = matches.get_one::<SocketAddr>("address") {
        config.address = *address;
    }

    let controller = Arc::new(BatchController::from_config(&config)?);
    let server = mailshot::axum::start_with(controller.clone(), mailshot::axum::Router::new(), config);

    tokio::select! {
        result = server => result?,
        _ = cancel.cancelled() => {
            // Stop an active run before exiting.
            controller.cancel();
            controller.store().db().flush().await?;
        }
    }

    Ok(())
}
