//! Sequential dispatch of a batch.
//!
//! The dispatcher walks the batch in order and sends one entry at a time. A
//! single entry is in flight at any moment, so the per-entry states and the
//! counts derived from them can be read between ticks without locking.
//!
//! Failures fall in two classes. A per-entry failure is recorded on the entry
//! and the run moves on. A systemic failure (by default one that mentions
//! credentials, authentication or login) is taken to affect every entry that
//! has not completed yet: all of them are failed with the same message and the
//! run halts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::email::{SendOutcome, Sender, Template};
use crate::entry::{Counts, Entry, Status};
use crate::history::{self, Delta, HistorySink};
use crate::{ErrorKind, Result};

/// Substrings that mark a failure as systemic unless configured otherwise.
pub const DEFAULT_SYSTEMIC_SIGNALS: &[&str] = &["credentials", "authentication", "login"];

/// Error message recorded when the send boundary faults instead of reporting
/// an outcome.
pub const UNEXPECTED_FAILURE: &str = "Unexpected error while sending";

/// Message used when the transport fails without saying why.
pub const UNKNOWN_FAILURE: &str = "Failed to send";

/// Decides whether a failure message describes a systemic fault.
pub type SystemicPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Predicate matching any of the given substrings, case-sensitively.
pub fn signals<S: AsRef<str>>(signals: &[S]) -> SystemicPredicate {
    let signals: Vec<String> = signals.iter().map(|s| s.as_ref().to_string()).collect();
    Arc::new(move |message: &str| signals.iter().any(|s| message.contains(s.as_str())))
}

#[derive(Clone)]
pub struct Options {
    /// Pause after each entry before the next one is started.
    pub delay: Duration,
    pub systemic: SystemicPredicate,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            systemic: signals(DEFAULT_SYSTEMIC_SIGNALS),
        }
    }
}

impl From<&crate::config::Dispatch> for Options {
    fn from(config: &crate::config::Dispatch) -> Self {
        Self {
            delay: config.delay(),
            systemic: signals(&config.systemic_signals),
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Result of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Entries in `success` across the whole batch after the run.
    pub success: usize,
    /// Entries in `error` across the whole batch after the run.
    pub error: usize,
    /// Entries left `pending`, only non-zero for cancelled runs.
    pub pending: usize,
    /// Every entry of the batch ended in `error`.
    pub all_failed: bool,
    /// Message of the systemic failure that halted the run.
    pub halted: Option<String>,
    pub cancelled: bool,
    /// Outcomes produced by this run alone, as reported to the history.
    pub run: Delta,
}

/// Observable run events, in the order they happen.
#[derive(Clone, Debug)]
pub enum Event {
    Started { total: usize, pending: usize },
    /// An entry changed state.
    Updated(Entry),
    /// A systemic failure failed `affected` unfinished entries at once.
    Halted { message: String, affected: usize },
    Drained(Summary),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Progress {
    pub running: bool,
    pub counts: Counts,
    pub percent: f64,
}

impl Progress {
    pub fn of(entries: &[Entry], running: bool) -> Self {
        let counts = Counts::of(entries);
        Self {
            running,
            counts,
            percent: counts.percent(),
        }
    }
}

enum Attempt {
    Outcome(SendOutcome),
    Fault,
}

pub struct Dispatcher {
    sender: Arc<dyn Sender>,
    history: Option<Arc<dyn HistorySink>>,
    options: Options,

    running: AtomicBool,
    cancel: Mutex<CancellationToken>,

    events: broadcast::Sender<Event>,
    progress: watch::Sender<Progress>,
}

/// Clears the running flag however the run ends, including when its future
/// is dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn Sender>, options: Options) -> Self {
        let (events, _) = broadcast::channel(1024);
        let (progress, _) = watch::channel(Progress::default());
        Self {
            sender,
            history: None,
            options,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            events,
            progress,
        }
    }

    /// Sink receiving the counts of every run that made progress.
    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the active run once the entry in flight, if any, completes.
    /// Does nothing when no run is active.
    pub fn cancel(&self) {
        let token = self.token();
        if self.is_running() {
            token.cancel();
        }
    }

    fn token(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sends every pending entry, in order.
    ///
    /// The exclusive borrow makes the dispatcher the only writer of the batch
    /// for the duration of the run. Fails with `RunInProgress` if another run
    /// is active on this dispatcher.
    pub async fn start(&self, entries: &mut [Entry], template: &Template) -> Result<Summary> {
        self.start_with(entries, template, CancellationToken::new())
            .await
    }

    /// Like [`Dispatcher::start`], stopping when `cancel` fires. A token
    /// cancelled before the run begins yields a run that sends nothing.
    pub async fn start_with(
        &self,
        entries: &mut [Entry],
        template: &Template,
        cancel: CancellationToken,
    ) -> Result<Summary> {
        {
            // `cancel()` holds the same lock, so it either sees no run or
            // this run's token.
            let mut current = self.token();
            if self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return Err(ErrorKind::RunInProgress.into());
            }
            *current = cancel.clone();
        }
        let _guard = RunGuard(&self.running);

        let span = tracing::info_span!("dispatch", run = %Uuid::new_v4());
        Ok(self
            .run(entries, template.clone(), cancel)
            .instrument(span)
            .await)
    }

    /// Puts every failed entry back in the queue and starts a run. Entries
    /// that already succeeded are not sent again.
    pub async fn retry_failed(&self, entries: &mut [Entry], template: &Template) -> Result<Summary> {
        if self.is_running() {
            return Err(ErrorKind::RunInProgress.into());
        }
        for entry in entries.iter_mut().filter(|e| e.status == Status::Error) {
            entry.reset();
        }
        self.start(entries, template).await
    }

    async fn run(
        &self,
        entries: &mut [Entry],
        template: Template,
        cancel: CancellationToken,
    ) -> Summary {
        // Nothing can be in flight when a run begins; a `sending` entry is a
        // leftover of an interrupted run.
        for entry in entries.iter_mut().filter(|e| e.status == Status::Sending) {
            entry.reset();
        }

        let template = Arc::new(template);
        let mut delta = Delta::default();
        let mut halted = None;
        let mut cancelled = false;

        let start_counts = Counts::of(entries);
        tracing::info!(
            total = start_counts.total,
            pending = start_counts.pending,
            "dispatch run started"
        );
        self.emit(Event::Started {
            total: start_counts.total,
            pending: start_counts.pending,
        });
        self.publish(entries, true);

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                tracing::info!("dispatch run cancelled");
                break;
            }

            let Some(idx) = entries.iter().position(Entry::is_pending) else {
                break;
            };

            entries[idx].mark_sending();
            self.updated(entries, idx);
            tracing::debug!(entry = entries[idx].id, to = %entries[idx].email, "sending");

            let attempt = self.attempt(&entries[idx], &template).await;
            match attempt {
                Attempt::Outcome(SendOutcome::Sent) => {
                    entries[idx].mark_success(Utc::now());
                    delta = Delta::new(delta.success + 1, delta.failed);
                    self.updated(entries, idx);
                }
                Attempt::Outcome(SendOutcome::Failed(message)) if (self.options.systemic)(&message) => {
                    tracing::error!(entry = entries[idx].id, %message, "systemic failure, halting run");
                    let mut affected = 0;
                    for i in 0..entries.len() {
                        if matches!(entries[i].status, Status::Pending | Status::Sending) {
                            entries[i].mark_error(message.clone());
                            affected += 1;
                            self.updated(entries, i);
                        }
                    }
                    delta = Delta::new(delta.success, delta.failed + affected as u64);
                    self.emit(Event::Halted {
                        message: message.clone(),
                        affected,
                    });
                    halted = Some(message);
                    break;
                }
                Attempt::Outcome(SendOutcome::Failed(message)) => {
                    let message = if message.trim().is_empty() {
                        UNKNOWN_FAILURE.to_string()
                    } else {
                        message
                    };
                    tracing::warn!(entry = entries[idx].id, %message, "send failed");
                    entries[idx].mark_error(message);
                    delta = Delta::new(delta.success, delta.failed + 1);
                    self.updated(entries, idx);
                }
                Attempt::Fault => {
                    entries[idx].mark_error(UNEXPECTED_FAILURE);
                    delta = Delta::new(delta.success, delta.failed + 1);
                    self.updated(entries, idx);
                }
            }

            if !self.options.delay.is_zero() && entries.iter().any(Entry::is_pending) {
                tokio::select! {
                    _ = tokio::time::sleep(self.options.delay) => (),
                    _ = cancel.cancelled() => (),
                }
            }
        }

        self.drain(entries, delta, halted, cancelled)
    }

    /// Sends on a separate task, so a panicking transport is contained and
    /// shows up as a fault of this entry only.
    async fn attempt(&self, entry: &Entry, template: &Arc<Template>) -> Attempt {
        let sender = self.sender.clone();
        let recipient = entry.recipient();
        let template = template.clone();
        let task = tokio::spawn(async move { sender.send(&recipient, &template).await });

        match task.await {
            Ok(Ok(outcome)) => Attempt::Outcome(outcome),
            Ok(Err(e)) => {
                tracing::warn!(entry = entry.id, error = %e.kind, "send boundary faulted");
                Attempt::Fault
            }
            Err(e) => {
                tracing::error!(entry = entry.id, error = %e, "send task panicked");
                Attempt::Fault
            }
        }
    }

    fn drain(
        &self,
        entries: &[Entry],
        delta: Delta,
        halted: Option<String>,
        cancelled: bool,
    ) -> Summary {
        let counts = Counts::of(entries);
        let summary = Summary {
            success: counts.success,
            error: counts.error,
            pending: counts.pending,
            all_failed: counts.total > 0 && counts.error == counts.total,
            halted,
            cancelled,
            run: delta,
        };

        // A run that never got to send anything leaves no trace.
        if !delta.is_empty() {
            if let Some(history) = &self.history {
                if let Err(e) = history.record(history::today(), delta) {
                    tracing::error!(error = %e.kind, "failed recording send history");
                }
            }
        }

        tracing::info!(
            success = summary.success,
            error = summary.error,
            sent = delta.success,
            failed = delta.failed,
            "dispatch run drained"
        );
        self.publish(entries, false);
        self.emit(Event::Drained(summary.clone()));
        summary
    }

    fn updated(&self, entries: &[Entry], idx: usize) {
        self.emit(Event::Updated(entries[idx].clone()));
        self.publish(entries, true);
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self, entries: &[Entry], running: bool) {
        self.progress.send_replace(Progress::of(entries, running));
    }
}
