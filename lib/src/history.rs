//! Day-bucketed send history.
//!
//! Each completed run adds its outcome counts to the record of the local
//! calendar day it drained on. A second run on the same day increments the
//! existing record instead of appending a new one.

use std::sync::Mutex;

use chrono::{Local, NaiveDate};

use crate::{ErrorKind, Result};

/// Outcome counts contributed by a single run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Delta {
    pub count: u64,
    pub success: u64,
    pub failed: u64,
}

impl Delta {
    pub fn new(success: u64, failed: u64) -> Self {
        Self {
            count: success + failed,
            success,
            failed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0 && self.success == 0 && self.failed == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Record {
    pub date: NaiveDate,
    pub count: u64,
    pub success: u64,
    pub failed: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Ledger {
    pub records: Vec<Record>,
}

impl Ledger {
    /// Adds `delta` to the record for `day`, creating it if needed.
    pub fn record(&mut self, day: NaiveDate, delta: Delta) -> &Record {
        let idx = match self.records.iter().position(|r| r.date == day) {
            Some(idx) => {
                let record = &mut self.records[idx];
                record.count += delta.count;
                record.success += delta.success;
                record.failed += delta.failed;
                idx
            }
            None => {
                self.records.push(Record {
                    date: day,
                    count: delta.count,
                    success: delta.success,
                    failed: delta.failed,
                });
                self.records.len() - 1
            }
        };
        &self.records[idx]
    }

    pub fn get(&self, day: NaiveDate) -> Option<&Record> {
        self.records.iter().find(|r| r.date == day)
    }

    /// Sums over every recorded day.
    pub fn totals(&self) -> Delta {
        self.records.iter().fold(Delta::default(), |acc, r| Delta {
            count: acc.count + r.count,
            success: acc.success + r.success,
            failed: acc.failed + r.failed,
        })
    }

    /// Records sorted newest first, at most `n` of them.
    pub fn latest(&self, n: usize) -> Vec<Record> {
        let mut records = self.records.clone();
        records.sort_by(|a, b| b.date.cmp(&a.date));
        records.truncate(n);
        records
    }
}

/// Current local calendar day, the bucket a draining run records into.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Anything a finished run can report its counts to.
pub trait HistorySink: Send + Sync {
    fn record(&self, day: NaiveDate, delta: Delta) -> Result<()>;
}

/// Ledger kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    ledger: Mutex<Ledger>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> Ledger {
        self.ledger
            .lock()
            .map(|l| l.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl HistorySink for MemoryHistory {
    fn record(&self, day: NaiveDate, delta: Delta) -> Result<()> {
        let mut ledger = self
            .ledger
            .lock()
            .map_err(|e| ErrorKind::Other(e.to_string()))?;
        ledger.record(day, delta);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn same_day_runs_merge() {
        let mut ledger = Ledger::default();
        ledger.record(day(1), Delta::new(2, 1));
        let merged = ledger.record(day(1), Delta::new(1, 0)).clone();

        assert_eq!(ledger.records.len(), 1);
        assert_eq!(
            merged,
            Record {
                date: day(1),
                count: 4,
                success: 3,
                failed: 1
            }
        );
    }

    #[test]
    fn new_day_appends() {
        let mut ledger = Ledger::default();
        ledger.record(day(1), Delta::new(2, 0));
        ledger.record(day(2), Delta::new(0, 3));
        assert_eq!(ledger.records.len(), 2);
        assert_eq!(ledger.get(day(2)).unwrap().failed, 3);
        assert_eq!(ledger.totals(), Delta::new(2, 3));
        assert_eq!(ledger.latest(1)[0].date, day(2));
    }

    #[test]
    fn ledger_serializes_as_plain_array() {
        let mut ledger = Ledger::default();
        ledger.record(day(3), Delta::new(1, 1));
        let json = serde_json::to_string(&ledger).unwrap();
        assert_eq!(
            json,
            r#"[{"date":"2024-05-03","count":2,"success":1,"failed":1}]"#
        );
    }

    #[test]
    fn memory_sink_accumulates() {
        let sink = MemoryHistory::new();
        sink.record(day(1), Delta::new(2, 1)).unwrap();
        sink.record(day(1), Delta::new(1, 0)).unwrap();
        assert_eq!(sink.ledger().get(day(1)).unwrap().count, 4);
    }
}
