mod common;

use std::io::Write;
use std::sync::Arc;

use tokio::sync::Semaphore;

use mailshot::config::{Db, DevMode};
use mailshot::entry::EntryUpdate;
use mailshot::{BatchController, Config, Database, ErrorKind, Settings, Status, Store};

use common::{options, template, wait_sending, Scripted};

fn controller(store: Store, sender: Arc<Scripted>) -> BatchController {
    BatchController::new(store, sender, options()).unwrap()
}

fn store() -> Store {
    Store::new(Database::temporary().unwrap())
}

fn fill(controller: &BatchController, emails: &[&str]) {
    for email in emails {
        controller
            .add_entry(*email, "http://img/1.png", None)
            .unwrap();
    }
}

#[tokio::test]
async fn send_retry_and_reload() -> anyhow::Result<()> {
    let store = store();
    let sender = Scripted::new();
    sender.fail("b@x.com", "bad address");

    let c = controller(store.clone(), sender.clone());
    c.set_template(template())?;
    fill(&c, &["a@x.com", "b@x.com", "c@x.com"]);

    let summary = c.send().await?;
    assert_eq!((summary.success, summary.error), (2, 1));

    sender.clear("b@x.com");
    let summary = c.retry_failed().await?;
    assert_eq!(summary.success, 3);
    assert_eq!(
        sender.calls(),
        ["a@x.com", "b@x.com", "c@x.com", "b@x.com"]
    );

    // A fresh controller over the same store sees the persisted outcome.
    let reloaded = controller(store, Scripted::new());
    assert!(reloaded
        .entries()
        .iter()
        .all(|e| e.status == Status::Success));
    assert_eq!(reloaded.template(), template());
    let totals = reloaded.history()?.totals();
    assert_eq!((totals.count, totals.success, totals.failed), (4, 3, 1));

    Ok(())
}

#[tokio::test]
async fn send_requeues_failures_but_keeps_successes() -> anyhow::Result<()> {
    let sender = Scripted::new();
    sender.fail("b@x.com", "bad address");
    let c = controller(store(), sender.clone());
    fill(&c, &["a@x.com", "b@x.com"]);

    c.send().await?;
    sender.clear("b@x.com");
    c.send().await?;

    assert_eq!(sender.calls(), ["a@x.com", "b@x.com", "b@x.com"]);
    assert_eq!(c.counts().success, 2);
    Ok(())
}

#[tokio::test]
async fn edit_and_retry_single_entry() -> anyhow::Result<()> {
    let sender = Scripted::new();
    sender.fail("d@x.com", "mailbox full");
    let c = controller(store(), sender.clone());
    fill(&c, &["a@x.com", "d@x.com"]);
    c.send().await?;
    let d = c.entries()[1].clone();
    assert_eq!(d.status, Status::Error);

    // A bad edit is caught before anything is sent.
    let err = c
        .retry_entry(
            d.id,
            EntryUpdate {
                email: Some("not an address".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Validation { first, count: 1 } if first == d.id));
    assert_eq!(
        c.entry(d.id)?.error_message.as_deref(),
        Some("Invalid email format")
    );

    let summary = c
        .retry_entry(
            d.id,
            EntryUpdate {
                email: Some("dee@x.com".to_string()),
                name: Some("Dee".to_string()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(summary.run.success, 1);
    let d = c.entry(d.id)?;
    assert_eq!(d.email, "dee@x.com");
    assert_eq!(d.name.as_deref(), Some("Dee"));
    assert_eq!(d.status, Status::Success);
    assert_eq!(sender.calls().last().map(String::as_str), Some("dee@x.com"));
    Ok(())
}

#[tokio::test]
async fn retry_entry_leaves_other_failures_alone() -> anyhow::Result<()> {
    let sender = Scripted::new();
    sender.fail("a@x.com", "bad address");
    sender.fail("b@x.com", "bad address");
    let c = controller(store(), sender.clone());
    fill(&c, &["a@x.com", "b@x.com"]);
    c.send().await?;

    sender.clear("b@x.com");
    let b = c.entries()[1].clone();
    c.retry_entry(b.id, EntryUpdate::default()).await?;

    let entries = c.entries();
    assert_eq!(entries[0].status, Status::Error);
    assert_eq!(entries[1].status, Status::Success);
    assert_eq!(sender.calls(), ["a@x.com", "b@x.com", "b@x.com"]);
    Ok(())
}

#[tokio::test]
async fn edits_are_rejected_during_a_run() -> anyhow::Result<()> {
    let gate = Arc::new(Semaphore::new(0));
    let sender = Scripted::gated(gate.clone());
    let c = Arc::new(controller(store(), sender.clone()));
    fill(&c, &["a@x.com", "b@x.com"]);
    let mut events = c.dispatcher().subscribe();

    let run = tokio::spawn({
        let c = c.clone();
        async move { c.send().await }
    });
    wait_sending(&mut events, "a@x.com").await;

    assert!(c.is_running());
    let err = c.add_entry("z@x.com", "http://i", None).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RunInProgress));
    let err = c.send().await.unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RunInProgress));
    assert!(c.progress().running);

    gate.add_permits(2);
    let summary = run.await??;
    assert_eq!(summary.success, 2);
    assert!(!c.is_running());
    c.add_entry("z@x.com", "http://i", None)?;
    Ok(())
}

#[tokio::test]
async fn import_appends_after_existing_ids() -> anyhow::Result<()> {
    let c = controller(store(), Scripted::new());
    fill(&c, &["a@x.com"]);

    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "Name,Email,Image URL")?;
    writeln!(file, "Bob,bob@x.com,http://img/b.png")?;
    writeln!(file, "Nobody,,http://img/n.png")?;
    writeln!(file, ",carol@x.com,http://img/c.png")?;
    file.flush()?;

    let added = c.import(std::fs::File::open(file.path())?)?;
    assert_eq!(added, 2);
    let entries = c.entries();
    let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, [1, 2, 3]);
    assert_eq!(entries[1].name.as_deref(), Some("Bob"));

    let out = tempfile::NamedTempFile::new()?;
    c.export(std::fs::File::create(out.path())?)?;
    let exported = std::fs::read_to_string(out.path())?;
    let mut lines = exported.lines();
    assert_eq!(lines.next(), Some("Email,Image Link,Name,Status"));
    assert_eq!(lines.next(), Some("a@x.com,http://img/1.png,,pending"));
    assert_eq!(lines.count(), 2);
    Ok(())
}

#[tokio::test]
async fn saved_batches_restore_the_working_batch() -> anyhow::Result<()> {
    let c = controller(store(), Scripted::new());
    fill(&c, &["a@x.com", "b@x.com"]);
    let saved = c.save_batch("spring")?;
    assert_eq!(saved.entry_count, 2);

    c.clear()?;
    fill(&c, &["z@x.com"]);
    assert_eq!(c.entries()[0].id, 3);

    let loaded = c.load_batch(saved.id)?;
    assert_eq!(loaded.name, "spring");
    let emails: Vec<_> = c.entries().into_iter().map(|e| e.email).collect();
    assert_eq!(emails, ["a@x.com", "b@x.com"]);

    // Ids keep counting past everything handed out before the load.
    let fresh = c.add_entry("n@x.com", "http://i", None)?;
    assert_eq!(fresh.id, 4);

    assert_eq!(c.list_batches()?.len(), 1);
    c.delete_batch(saved.id)?;
    assert!(c.list_batches()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn without_auto_persist_runs_stay_in_memory() -> anyhow::Result<()> {
    let store = store();
    let c = controller(store.clone(), Scripted::new());
    fill(&c, &["a@x.com"]);
    c.set_settings(Settings {
        auto_persist: false,
        ..Default::default()
    })?;

    c.send().await?;
    assert_eq!(c.entries()[0].status, Status::Success);
    assert_eq!(store.entries()?[0].status, Status::Pending);
    Ok(())
}

#[tokio::test]
async fn dev_mode_seeds_and_only_logs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = Config {
        db: Db {
            path: dir.path().join("db").to_string_lossy().to_string(),
            temporary: true,
        },
        dev: DevMode {
            enabled: true,
            mock: true,
        },
        ..Default::default()
    };
    config.dispatch.delay_ms = 0;

    let c = BatchController::from_config(&config)?;
    assert_eq!(c.entries().len(), 3);
    assert!(!c.template().subject.is_empty());

    let summary = c.send().await?;
    assert_eq!(summary.success, 3);
    Ok(())
}

#[tokio::test]
async fn cancel_between_claim_and_start_is_kept() -> anyhow::Result<()> {
    let sender = Scripted::new();
    let c = controller(store(), sender.clone());
    fill(&c, &["a@x.com", "b@x.com"]);

    let run = c.begin_send()?;
    assert!(c.is_running());
    c.cancel();
    let summary = c.drive(run).await?;

    assert!(summary.cancelled);
    assert!(sender.calls().is_empty());
    assert!(c.entries().iter().all(|e| e.status == Status::Pending));
    assert!(c.history()?.records.is_empty());
    assert!(!c.is_running());
    Ok(())
}

#[tokio::test]
async fn cancel_through_the_controller_stops_after_the_entry_in_flight() -> anyhow::Result<()> {
    let gate = Arc::new(Semaphore::new(0));
    let sender = Scripted::gated(gate.clone());
    let c = Arc::new(controller(store(), sender.clone()));
    fill(&c, &["a@x.com", "b@x.com", "c@x.com"]);
    let mut events = c.dispatcher().subscribe();

    let run = tokio::spawn({
        let c = c.clone();
        async move { c.send().await }
    });
    wait_sending(&mut events, "a@x.com").await;
    c.cancel();
    gate.add_permits(3);

    let summary = run.await??;
    assert!(summary.cancelled);
    assert_eq!(sender.calls(), ["a@x.com"]);
    let statuses: Vec<_> = c.entries().into_iter().map(|e| e.status).collect();
    assert_eq!(statuses, [Status::Success, Status::Pending, Status::Pending]);
    Ok(())
}

#[tokio::test]
async fn second_run_is_rejected_once_the_first_is_claimed() -> anyhow::Result<()> {
    let sender = Scripted::new();
    let c = controller(store(), sender.clone());
    fill(&c, &["a@x.com"]);

    let run = c.begin_send()?;
    let err = c.send().await.unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RunInProgress));
    let err = c.begin_retry_failed().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RunInProgress));

    // Dropping an undriven claim frees the controller.
    drop(run);
    assert!(!c.is_running());
    assert_eq!(c.send().await?.success, 1);
    assert_eq!(sender.calls(), ["a@x.com"]);
    Ok(())
}

#[tokio::test]
async fn edited_addresses_are_trimmed_before_sending() -> anyhow::Result<()> {
    let sender = Scripted::new();
    let c = controller(store(), sender.clone());
    fill(&c, &["a@x.com"]);
    let id = c.entries()[0].id;

    c.update_entry(
        id,
        EntryUpdate {
            email: Some(" b@x.com ".to_string()),
            ..Default::default()
        },
    )?;
    c.send().await?;
    assert_eq!(sender.calls(), ["b@x.com"]);
    Ok(())
}
