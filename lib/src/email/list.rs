//! Saved recipient lists.
//!
//! The working batch can be saved under a name and restored later. Each saved
//! batch keeps only its metadata in the `batches` collection, the entries
//! themselves are stored as a separate blob keyed by the batch id.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{Collectable, Identifiable};

pub type BatchId = Uuid;

/// Collection holding the entry list blob of every saved batch.
pub const BATCH_ENTRIES: &str = "batch_entries";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedBatch {
    pub id: BatchId,

    pub name: String,

    pub created_at: DateTime<Utc>,

    /// Number of entries at the time of saving.
    pub entry_count: usize,
}

impl SavedBatch {
    pub fn new(name: impl Into<String>, entry_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            entry_count,
        }
    }
}

impl Collectable for SavedBatch {
    fn get_collection_name() -> &'static str {
        "batches"
    }
}

impl Identifiable for SavedBatch {
    fn get_id(&self) -> Uuid {
        self.id
    }
}
