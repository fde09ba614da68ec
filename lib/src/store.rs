//! Persistence of the working batch and everything around it.
//!
//! Singleton values (the working entry list, template, settings and the
//! history ledger) are stored whole under the nil id of their own collection,
//! every write overwriting the previous value.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::db::{Collectable, Database};
use crate::email::list::{BatchId, SavedBatch, BATCH_ENTRIES};
use crate::email::Template;
use crate::entry::Entry;
use crate::history::{Delta, HistorySink, Ledger};
use crate::{ErrorKind, Result};

const ENTRIES: &str = "entries";
const TEMPLATE: &str = "template";
const SETTINGS: &str = "settings";
const HISTORY: &str = "history";

/// User preferences. Consulted by the controller, never enforced by the
/// dispatch engine.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Write the working entry list back after every change and run.
    pub auto_persist: bool,
    /// Stored for the ui only. Failed entries are never retried without an
    /// explicit request.
    pub auto_retry: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_persist: true,
            auto_retry: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Store {
    db: Database,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn get_or_default<T: serde::de::DeserializeOwned + Default>(&self, collection: &str) -> Result<T> {
        Ok(self
            .db
            .try_get_at(collection, Uuid::nil())?
            .unwrap_or_default())
    }

    pub fn entries(&self) -> Result<Vec<Entry>> {
        self.get_or_default(ENTRIES)
    }

    pub fn set_entries(&self, entries: &[Entry]) -> Result<()> {
        self.db.set_raw_at(ENTRIES, &entries, Uuid::nil())
    }

    pub fn template(&self) -> Result<Template> {
        self.get_or_default(TEMPLATE)
    }

    pub fn set_template(&self, template: &Template) -> Result<()> {
        self.db.set_raw_at(TEMPLATE, template, Uuid::nil())
    }

    pub fn has_template(&self) -> Result<bool> {
        Ok(self
            .db
            .try_get_at::<Template>(TEMPLATE, Uuid::nil())?
            .is_some())
    }

    pub fn settings(&self) -> Result<Settings> {
        self.get_or_default(SETTINGS)
    }

    pub fn set_settings(&self, settings: &Settings) -> Result<()> {
        self.db.set_raw_at(SETTINGS, settings, Uuid::nil())
    }

    pub fn history(&self) -> Result<Ledger> {
        self.get_or_default(HISTORY)
    }

    /// Merges a run's counts into the persisted ledger.
    pub fn record_history(&self, day: NaiveDate, delta: Delta) -> Result<Ledger> {
        let mut ledger = self.history()?;
        ledger.record(day, delta);
        self.db.set_raw_at(HISTORY, &ledger, Uuid::nil())?;
        Ok(ledger)
    }

    /// Saves a copy of the given entries as a named batch.
    pub fn save_batch(&self, name: impl Into<String>, entries: &[Entry]) -> Result<SavedBatch> {
        let batch = SavedBatch::new(name, entries.len());
        self.db.set_raw_at(BATCH_ENTRIES, &entries, batch.id)?;
        self.db.set(&batch)?;
        Ok(batch)
    }

    pub fn batch(&self, id: BatchId) -> Result<(SavedBatch, Vec<Entry>)> {
        let batch = self
            .db
            .try_get_at::<SavedBatch>(SavedBatch::get_collection_name(), id)?
            .ok_or_else(|| ErrorKind::BatchNotFound(id.to_string()))?;
        let entries = self
            .db
            .try_get_at(BATCH_ENTRIES, id)?
            .unwrap_or_default();
        Ok((batch, entries))
    }

    /// Saved batches, oldest first.
    pub fn batches(&self) -> Result<Vec<SavedBatch>> {
        let mut batches = self.db.get_collection::<SavedBatch>()?;
        batches.sort_by_key(|b| b.created_at);
        Ok(batches)
    }

    pub fn delete_batch(&self, id: BatchId) -> Result<()> {
        let (batch, _) = self.batch(id)?;
        self.db.remove_at(BATCH_ENTRIES, id)?;
        self.db.remove(&batch)
    }
}

impl HistorySink for Store {
    fn record(&self, day: NaiveDate, delta: Delta) -> Result<()> {
        self.record_history(day, delta).map(|_| ())
    }
}
