use std::future::Future;

use anyhow::{Error, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use mailshot::email::render;
use mailshot::entry::{EntryId, EntryUpdate};
use mailshot::validate::join;
use mailshot::{BatchController, Config, Event, Status, Summary};

use crate::util;

pub fn send_cmd() -> Command {
    Command::new("send")
        .about("Send the message to every pending entry, one at a time")
        .display_order(30)
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Validate and render without sending anything"),
        )
}

pub fn retry_cmd() -> Command {
    Command::new("retry")
        .about("Send failed entries again")
        .long_about(
            "Send failed entries again.\n\n\
            Without `--id` every failed entry is retried. With `--id` only that \
            entry is retried, optionally after editing it.",
        )
        .display_order(31)
        .arg(
            Arg::new("id")
                .long("id")
                .value_name("ID")
                .value_parser(clap::value_parser!(EntryId)),
        )
        .arg(Arg::new("email").long("email").requires("id"))
        .arg(
            Arg::new("image_link")
                .long("image-link")
                .value_name("IMAGE_LINK")
                .requires("id"),
        )
        .arg(Arg::new("name").long("name").requires("id"))
}

pub fn history_cmd() -> Command {
    Command::new("history")
        .about("Show per-day send counts")
        .display_order(40)
        .arg(
            Arg::new("days")
                .long("days")
                .short('d')
                .value_parser(clap::value_parser!(usize))
                .default_value("30"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the records as json"),
        )
}

pub async fn run_send(matches: &ArgMatches, config: &Config, cancel: CancellationToken) -> Result<()> {
    let controller = util::controller(config)?;

    if matches.get_flag("dry-run") {
        return dry_run(&controller);
    }

    let run = controller.begin_send()?;
    let summary = drive(&controller, controller.drive(run), cancel).await?;
    report(&summary);
    controller.store().db().flush().await?;
    Ok(())
}

pub async fn run_retry(
    matches: &ArgMatches,
    config: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    let controller = util::controller(config)?;

    let run = match matches.get_one::<EntryId>("id") {
        Some(id) => {
            let update = EntryUpdate {
                email: matches.get_one::<String>("email").cloned(),
                image_link: matches.get_one::<String>("image_link").cloned(),
                name: matches.get_one::<String>("name").cloned(),
                selected: None,
            };
            controller.begin_retry_entry(*id, update)?
        }
        None => controller.begin_retry_failed()?,
    };
    let summary = drive(&controller, controller.drive(run), cancel).await?;
    report(&summary);
    controller.store().db().flush().await?;
    Ok(())
}

pub async fn run_history(matches: &ArgMatches, config: &Config) -> Result<()> {
    let controller = util::controller(config)?;
    let days = matches.get_one::<usize>("days").copied().unwrap_or(30);

    let ledger = controller.history()?;
    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&ledger.latest(days))?);
        return Ok(());
    }
    if ledger.records.is_empty() {
        println!("Nothing sent yet.");
        return Ok(());
    }
    for record in ledger.latest(days) {
        println!(
            "{}  {:>5} total  {:>5} sent  {:>5} failed",
            record.date, record.count, record.success, record.failed
        );
    }
    let totals = ledger.totals();
    println!(
        "all time    {:>5} total  {:>5} sent  {:>5} failed",
        totals.count, totals.success, totals.failed
    );
    Ok(())
}

/// Runs a claimed run to completion while printing every finished entry.
/// Cancelling the token stops the run after the entry in flight.
async fn drive(
    controller: &BatchController,
    run: impl Future<Output = mailshot::Result<Summary>>,
    cancel: CancellationToken,
) -> Result<Summary> {
    let mut events = controller.dispatcher().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::Updated(entry)) => match entry.status {
                    Status::Success => println!("sent    #{} {}", entry.id, entry.email),
                    Status::Error => println!(
                        "failed  #{} {}: {}",
                        entry.id,
                        entry.email,
                        entry.error_message.unwrap_or_default()
                    ),
                    _ => (),
                },
                Ok(Event::Halted { message, affected }) => {
                    println!("halted: {message} ({affected} entries not sent)")
                }
                Ok(Event::Drained(_)) | Err(RecvError::Closed) => break,
                _ => (),
            }
        }
    });

    tokio::pin!(run);
    let summary = tokio::select! {
        summary = &mut run => summary,
        _ = cancel.cancelled() => {
            controller.cancel();
            run.await
        }
    };
    match summary {
        // A run that started always drains, which ends the printer.
        Ok(summary) => {
            let _ = printer.await;
            Ok(summary)
        }
        Err(e) => {
            printer.abort();
            Err(e.into())
        }
    }
}

fn report(summary: &Summary) {
    println!(
        "{} sent, {} failed this run ({} sent, {} failed overall)",
        summary.run.success, summary.run.failed, summary.success, summary.error
    );
    if summary.cancelled {
        println!("Run was cancelled, {} entries left pending.", summary.pending);
    }
    if summary.all_failed {
        println!("Every entry failed.");
    }
}

fn dry_run(controller: &BatchController) -> Result<()> {
    let report = controller.validate();
    let entries = controller.entries();
    let template = controller.template();

    for entry in &entries {
        if let Some(violations) = report.get(entry.id) {
            println!("invalid #{} {}: {}", entry.id, entry.email, join(violations));
            continue;
        }
        if matches!(entry.status, Status::Pending | Status::Error) {
            let rendered = render(&template, &entry.recipient());
            println!("would send #{} {}: {}", entry.id, entry.email, rendered.subject);
        }
    }

    if !report.is_valid() {
        return Err(Error::msg(format!(
            "{} entries failed validation",
            report.len()
        )));
    }
    Ok(())
}
