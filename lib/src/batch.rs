//! Working batch controller.
//!
//! Holds the working entry list, the template and the user settings, and
//! drives the dispatcher over them. Edits to the entry list are rejected while
//! a run is active. During a run the controller's copy of the list is kept up
//! to date from the dispatcher's events and replaced by the dispatcher's final
//! copy once the run drains.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{Dispatcher, Event, Options, Progress, Summary};
use crate::email::list::{BatchId, SavedBatch};
use crate::email::{LogSender, Sender, SmtpSender, Template};
use crate::entry::{self, Counts, Entry, EntryId, EntryUpdate, Status};
use crate::history::Ledger;
use crate::store::{Settings, Store};
use crate::validate::{self, Report};
use crate::{table, Config, Database, ErrorKind, Result};

struct State {
    entries: Vec<Entry>,
    template: Template,
    settings: Settings,
    /// Ids are never handed out twice, even after the entry holding the
    /// highest one was removed.
    next_id: EntryId,
    /// Cancels the active run. Set from the moment a run is claimed until it
    /// has been written back.
    run: Option<CancellationToken>,
}

impl State {
    fn allocate_id(&mut self) -> EntryId {
        let id = self.next_id.max(entry::next_id(&self.entries));
        self.next_id = id + 1;
        id
    }

    fn entry_mut(&mut self, id: EntryId) -> Result<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ErrorKind::EntryNotFound(id).into())
    }
}

/// A run claimed on the controller but not driven yet.
///
/// While it exists no other run can start and the entry list cannot be
/// edited. Dropping it without driving it releases the claim.
pub struct Run {
    state: Arc<Mutex<State>>,
    work: Vec<Entry>,
    template: Template,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("work", &self.work)
            .field("template", &self.template)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        lock(&self.state).run = None;
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct BatchController {
    state: Arc<Mutex<State>>,
    dispatcher: Arc<Dispatcher>,
    store: Store,
}

impl BatchController {
    /// Loads the working batch from the store. The store also receives the
    /// history of every run.
    pub fn new(store: Store, sender: Arc<dyn Sender>, options: Options) -> Result<Self> {
        let entries = store.entries()?;
        let state = State {
            next_id: entry::next_id(&entries),
            entries,
            template: store.template()?,
            settings: store.settings()?,
            run: None,
        };
        let dispatcher = Dispatcher::new(sender, options).with_history(Arc::new(store.clone()));

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            dispatcher: Arc::new(dispatcher),
            store,
        })
    }

    /// Sets everything up as described by the config: opens the store, seeds
    /// it in dev mock mode and picks the sender. In dev mode sends are only
    /// logged.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Store::new(Database::new(&config.db)?);

        if config.dev.mock {
            crate::mock::generate(&store)?;
        }

        let sender: Arc<dyn Sender> = if config.dev.enabled {
            tracing::warn!("dev mode enabled, emails will only be logged");
            Arc::new(LogSender)
        } else {
            Arc::new(SmtpSender::new(config.email.clone()))
        };

        Self::new(store, sender, Options::from(&config.dispatch))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn persist(&self, state: &State) -> Result<()> {
        if state.settings.auto_persist {
            self.store.set_entries(&state.entries)?;
        }
        Ok(())
    }

    /// Applies an edit to the entry list, unless a run is active.
    fn edit<T>(&self, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut state = self.state();
        if state.run.is_some() {
            return Err(ErrorKind::RunInProgress.into());
        }
        let out = f(&mut *state)?;
        self.persist(&state)?;
        Ok(out)
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.state().entries.clone()
    }

    pub fn entry(&self, id: EntryId) -> Result<Entry> {
        self.state()
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| ErrorKind::EntryNotFound(id).into())
    }

    pub fn add_entry(
        &self,
        email: impl Into<String>,
        image_link: impl Into<String>,
        name: Option<String>,
    ) -> Result<Entry> {
        let email = email.into().trim().to_string();
        let image_link = image_link.into().trim().to_string();
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        self.edit(|state| {
            let entry = Entry::new(state.allocate_id(), email, image_link, name);
            state.entries.push(entry.clone());
            Ok(entry)
        })
    }

    pub fn update_entry(&self, id: EntryId, update: EntryUpdate) -> Result<Entry> {
        self.edit(|state| {
            let entry = state.entry_mut(id)?;
            update.apply(entry);
            Ok(entry.clone())
        })
    }

    pub fn remove_entry(&self, id: EntryId) -> Result<Entry> {
        self.edit(|state| {
            let idx = state
                .entries
                .iter()
                .position(|e| e.id == id)
                .ok_or(ErrorKind::EntryNotFound(id))?;
            Ok(state.entries.remove(idx))
        })
    }

    /// Empties the working batch.
    pub fn clear(&self) -> Result<()> {
        self.edit(|state| {
            state.next_id = state.next_id.max(entry::next_id(&state.entries));
            state.entries.clear();
            Ok(())
        })
    }

    pub fn select_all(&self, selected: bool) -> Result<()> {
        self.edit(|state| {
            for entry in &mut state.entries {
                entry.selected = selected;
            }
            Ok(())
        })
    }

    /// Removes the selected entries, returning how many were removed.
    pub fn remove_selected(&self) -> Result<usize> {
        self.edit(|state| {
            state.next_id = state.next_id.max(entry::next_id(&state.entries));
            let before = state.entries.len();
            state.entries.retain(|e| !e.selected);
            Ok(before - state.entries.len())
        })
    }

    pub fn template(&self) -> Template {
        self.state().template.clone()
    }

    pub fn set_template(&self, template: Template) -> Result<()> {
        let mut state = self.state();
        self.store.set_template(&template)?;
        state.template = template;
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        self.state().settings.clone()
    }

    pub fn set_settings(&self, settings: Settings) -> Result<()> {
        let mut state = self.state();
        self.store.set_settings(&settings)?;
        state.settings = settings;
        Ok(())
    }

    /// Validates the working batch without touching it.
    pub fn validate(&self) -> Report {
        validate::validate(&self.state().entries)
    }

    /// Checks that a run could start now: no run is active and the batch is
    /// valid. Violating entries are flagged as failed.
    pub fn preflight(&self) -> Result<()> {
        let mut state = self.state();
        if state.run.is_some() {
            return Err(ErrorKind::RunInProgress.into());
        }
        let checked = preflight(state.entries.as_mut_slice());
        self.persist(&state)?;
        checked
    }

    /// Validates the batch, puts previously failed entries back in the queue
    /// and sends everything pending. Entries that already succeeded are kept.
    pub async fn send(&self) -> Result<Summary> {
        let run = self.begin_send()?;
        self.drive(run).await
    }

    /// Sends the failed entries again.
    pub async fn retry_failed(&self) -> Result<Summary> {
        let run = self.begin_retry_failed()?;
        self.drive(run).await
    }

    /// Edits a failed entry and sends it again. Other failed entries stay
    /// failed.
    pub async fn retry_entry(&self, id: EntryId, update: EntryUpdate) -> Result<Summary> {
        let run = self.begin_retry_entry(id, update)?;
        self.drive(run).await
    }

    /// Claims a [`BatchController::send`] run without starting it.
    pub fn begin_send(&self) -> Result<Run> {
        self.begin(|entries| {
            preflight(entries)?;
            for entry in entries
                .iter_mut()
                .filter(|e| matches!(e.status, Status::Sending | Status::Error))
            {
                entry.reset();
            }
            Ok(())
        })
    }

    /// Claims a [`BatchController::retry_failed`] run without starting it.
    pub fn begin_retry_failed(&self) -> Result<Run> {
        self.begin(|entries| {
            preflight(entries)?;
            for entry in entries.iter_mut().filter(|e| e.status == Status::Error) {
                entry.reset();
            }
            Ok(())
        })
    }

    /// Claims a [`BatchController::retry_entry`] run without starting it.
    pub fn begin_retry_entry(&self, id: EntryId, update: EntryUpdate) -> Result<Run> {
        self.begin(|entries| {
            let entry = entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or(ErrorKind::EntryNotFound(id))?;
            if entry.status != Status::Error {
                return Err(ErrorKind::BadInput(format!(
                    "entry #{id} is {}, only failed entries can be retried",
                    entry.status
                ))
                .into());
            }

            update.apply(entry);
            let violations = validate::check(entry);
            if !violations.is_empty() {
                entry.mark_error(validate::join(&violations));
                return Err(ErrorKind::Validation {
                    first: id,
                    count: 1,
                }
                .into());
            }
            entry.reset();
            Ok(())
        })
    }

    /// Stops the active run after the entry in flight.
    pub fn cancel(&self) {
        if let Some(cancel) = &self.state().run {
            tracing::info!("cancelling run");
            cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().run.is_some()
    }

    pub fn progress(&self) -> Progress {
        if self.dispatcher.is_running() {
            return *self.dispatcher.progress().borrow();
        }
        let state = self.state();
        Progress::of(&state.entries, state.run.is_some())
    }

    pub fn counts(&self) -> Counts {
        Counts::of(&self.state().entries)
    }

    pub fn history(&self) -> Result<Ledger> {
        self.store.history()
    }

    /// Saves a copy of the working batch under the given name.
    pub fn save_batch(&self, name: impl Into<String>) -> Result<SavedBatch> {
        let entries = self.entries();
        let batch = self.store.save_batch(name, &entries)?;
        tracing::info!(batch = %batch.id, entries = batch.entry_count, "saved batch");
        Ok(batch)
    }

    /// Replaces the working batch with a saved one.
    pub fn load_batch(&self, id: BatchId) -> Result<SavedBatch> {
        let (batch, entries) = self.store.batch(id)?;
        self.edit(|state| {
            state.next_id = state
                .next_id
                .max(entry::next_id(&state.entries))
                .max(entry::next_id(&entries));
            state.entries = entries;
            Ok(())
        })?;
        Ok(batch)
    }

    pub fn list_batches(&self) -> Result<Vec<SavedBatch>> {
        self.store.batches()
    }

    pub fn delete_batch(&self, id: BatchId) -> Result<()> {
        self.store.delete_batch(id)
    }

    /// Appends the entries of a delimited table to the working batch,
    /// returning how many were added.
    pub fn import<R: io::Read>(&self, reader: R) -> Result<usize> {
        self.edit(|state| {
            let first = state.next_id.max(entry::next_id(&state.entries));
            let imported = table::import(reader, first)?;
            let count = imported.len();
            state.next_id = first + count as EntryId;
            state.entries.extend(imported);
            Ok(count)
        })
    }

    pub fn export<W: io::Write>(&self, writer: W) -> Result<()> {
        table::export(&self.entries(), writer)
    }

    /// Prepares the working batch and takes the run slot. Entries flagged by
    /// a failed preflight stay flagged.
    fn begin<F>(&self, prepare: F) -> Result<Run>
    where
        F: FnOnce(&mut [Entry]) -> Result<()>,
    {
        let mut state = self.state();
        if state.run.is_some() {
            return Err(ErrorKind::RunInProgress.into());
        }
        let prepared = prepare(state.entries.as_mut_slice());
        self.persist(&state)?;
        prepared?;

        let cancel = CancellationToken::new();
        state.run = Some(cancel.clone());
        Ok(Run {
            state: self.state.clone(),
            work: state.entries.clone(),
            template: state.template.clone(),
            cancel,
        })
    }

    /// Drives a claimed run to completion and writes the outcome back.
    pub async fn drive(&self, mut run: Run) -> Result<Summary> {
        let mirror = self.mirror();
        let summary = self
            .dispatcher
            .start_with(&mut run.work, &run.template, run.cancel.clone())
            .await;
        mirror.abort();
        let _ = mirror.await;

        let mut state = self.state();
        state.entries = std::mem::take(&mut run.work);
        self.persist(&state)?;
        drop(state);
        summary
    }

    /// Follows entry updates of the active run into the controller's copy.
    fn mirror(&self) -> JoinHandle<()> {
        let mut events = self.dispatcher.subscribe();
        let state = self.state.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(Event::Updated(updated)) => {
                        let mut state = lock(&state);
                        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == updated.id) {
                            *entry = updated;
                        }
                    }
                    Ok(Event::Drained(_)) | Err(RecvError::Closed) => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => (),
                }
            }
        })
    }
}

/// Validates the batch, flagging violators. A run only starts on a clean
/// batch.
fn preflight(entries: &mut [Entry]) -> Result<()> {
    let report = validate::validate_batch(entries);
    match report.first_violator() {
        Some(first) => {
            tracing::warn!(first, count = report.len(), "batch failed validation");
            Err(ErrorKind::Validation {
                first,
                count: report.len(),
            }
            .into())
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use crate::email::LogSender;
    use crate::Database;

    use super::*;

    fn controller() -> BatchController {
        let options = Options {
            delay: std::time::Duration::ZERO,
            ..Default::default()
        };
        BatchController::new(
            Store::new(Database::temporary().unwrap()),
            Arc::new(LogSender),
            options,
        )
        .unwrap()
    }

    #[test]
    fn ids_are_not_reused() {
        let controller = controller();
        controller.add_entry("a@x.com", "http://i", None).unwrap();
        let b = controller.add_entry("b@x.com", "http://i", None).unwrap();
        controller.remove_entry(b.id).unwrap();
        let c = controller.add_entry("c@x.com", "http://i", None).unwrap();
        assert_eq!(c.id, 3);

        controller.clear().unwrap();
        let d = controller.add_entry("d@x.com", "http://i", None).unwrap();
        assert_eq!(d.id, 4);
    }

    #[test]
    fn add_trims_and_drops_blank_name() {
        let controller = controller();
        let entry = controller
            .add_entry(" a@x.com ", "http://i ", Some(" ".into()))
            .unwrap();
        assert_eq!(entry.email, "a@x.com");
        assert_eq!(entry.image_link, "http://i");
        assert!(entry.name.is_none());
    }

    #[test]
    fn unknown_entry() {
        let controller = controller();
        let err = controller.remove_entry(42).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::EntryNotFound(42)));
    }

    #[test]
    fn edits_persist_when_enabled() {
        let controller = controller();
        controller.add_entry("a@x.com", "http://i", None).unwrap();
        assert_eq!(controller.store().entries().unwrap().len(), 1);

        controller
            .set_settings(Settings {
                auto_persist: false,
                ..Default::default()
            })
            .unwrap();
        controller.add_entry("b@x.com", "http://i", None).unwrap();
        assert_eq!(controller.store().entries().unwrap().len(), 1);
        assert_eq!(controller.entries().len(), 2);
    }

    #[test]
    fn selection() {
        let controller = controller();
        controller.add_entry("a@x.com", "http://i", None).unwrap();
        let b = controller.add_entry("b@x.com", "http://i", None).unwrap();
        controller
            .update_entry(
                b.id,
                EntryUpdate {
                    selected: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(controller.remove_selected().unwrap(), 1);
        assert_eq!(controller.entries().len(), 1);

        controller.select_all(true).unwrap();
        assert!(controller.entries().iter().all(|e| e.selected));
    }

    #[tokio::test]
    async fn invalid_batch_blocks_the_run() {
        let controller = controller();
        controller.add_entry("a@x.com", "http://i", None).unwrap();
        let bad = controller.add_entry("nope", "", None).unwrap();

        let err = controller.send().await.unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::Validation { first, count: 1 } if first == bad.id
        ));

        let entries = controller.entries();
        assert_eq!(entries[0].status, Status::Pending);
        assert_eq!(entries[1].status, Status::Error);
        assert!(!controller.is_running());
        assert!(controller.history().unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn send_writes_back_and_records_history() {
        let controller = controller();
        controller.add_entry("a@x.com", "http://i", None).unwrap();
        controller.add_entry("b@x.com", "http://i", None).unwrap();

        let summary = controller.send().await.unwrap();
        assert_eq!(summary.success, 2);
        assert!(controller
            .store()
            .entries()
            .unwrap()
            .iter()
            .all(|e| e.status == Status::Success));
        assert_eq!(controller.history().unwrap().totals().count, 2);

        let progress = controller.progress();
        assert!(!progress.running);
        assert_eq!(progress.percent, 100.);
    }

    #[tokio::test]
    async fn retry_entry_requires_failed_entry() {
        let controller = controller();
        let a = controller.add_entry("a@x.com", "http://i", None).unwrap();
        let err = controller
            .retry_entry(a.id, EntryUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::BadInput(_)));
    }
}
