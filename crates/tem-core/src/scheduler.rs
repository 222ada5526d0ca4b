//! Debounced, cancelling persistence
//!
//! Runs as a spawned task that owns the save status and the in-flight request:
//! - Every edit marks the record unsaved and restarts the debounce window
//! - When the window elapses one save carries a snapshot of the whole record
//! - An edit during a save cancels it; the stale result is ignored by id
//! - `save_now` skips the window, `retry` re-arms it
//!
//! At most one request is current at any time, and a result only counts as a
//! save when the [`Draft`] revision it carried is still the latest.

use crate::cancel::CancelToken;
use crate::config::SessionConfig;
use crate::error::{SessionError, TransportError};
use crate::transport::RecordTransport;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tem_model::{AnnotationRecord, RecordId, RequestId, SaveState, SaveStatus};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How a `save_now` request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The save completed
    Saved,
    /// Nothing was dirty; the transport was not called
    NothingToSave,
    /// A newer edit replaced the save before it completed
    Superseded,
}

/// Record shared by a session and its persistence task
///
/// Every committed edit bumps `revision`, under the same lock as the record.
#[derive(Debug, Clone)]
pub struct Draft {
    record: AnnotationRecord,
    revision: u64,
}

impl Draft {
    /// Draft at revision 0
    #[must_use]
    pub fn new(record: AnnotationRecord) -> Self {
        Self {
            record,
            revision: 0,
        }
    }

    /// Current record
    #[inline]
    #[must_use]
    pub fn record(&self) -> &AnnotationRecord {
        &self.record
    }

    /// Number of edits committed
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the record with an edited one
    pub fn commit(&mut self, record: AnnotationRecord) {
        self.record = record;
        self.revision += 1;
    }

    /// Take the server id of a saved record if the draft has none yet
    ///
    /// Not an edit; the revision is unchanged.
    fn adopt_id(&mut self, saved: &AnnotationRecord) -> Option<RecordId> {
        if self.record.id.is_none() {
            self.record.id = saved.id;
        }
        self.record.id
    }
}

/// One recorded status transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    /// When the state was entered
    pub at: DateTime<Utc>,
    /// State entered
    pub state: SaveState,
}

type Reply = oneshot::Sender<Result<SaveOutcome, TransportError>>;

#[derive(Debug)]
enum Command {
    Edited,
    SaveNow(Reply),
    Retry,
    Shutdown,
}

#[derive(Debug)]
struct Completion {
    request: RequestId,
    result: Result<AnnotationRecord, TransportError>,
}

#[derive(Debug)]
struct InFlight {
    request: RequestId,
    revision: u64,
    cancel: CancelToken,
    waiter: Option<Reply>,
}

/// Handle to the persistence task of one record
#[derive(Debug)]
pub struct PersistenceScheduler {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SaveStatus>,
    history: Arc<Mutex<VecDeque<StatusChange>>>,
    task: JoinHandle<()>,
}

impl PersistenceScheduler {
    /// Spawn the persistence task for `draft`
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(
        draft: Arc<RwLock<Draft>>,
        transport: Arc<dyn RecordTransport>,
        config: &SessionConfig,
    ) -> Self {
        let initial = SaveStatus::idle(draft.read().record().id);
        let (status_tx, status_rx) = watch::channel(initial);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let history_limit = config.status_history.max(1);
        let mut history = VecDeque::with_capacity(history_limit);
        history.push_back(StatusChange {
            at: Utc::now(),
            state: SaveState::Idle,
        });
        let history = Arc::new(Mutex::new(history));

        let worker = SchedulerTask {
            draft,
            transport,
            debounce: config.debounce(),
            commands: commands_rx,
            completions_tx,
            completions: completions_rx,
            status: status_tx,
            history: Arc::clone(&history),
            history_limit,
            deadline: None,
            dirty: false,
            in_flight: None,
        };
        let task = tokio::spawn(worker.run());

        Self {
            commands: commands_tx,
            status: status_rx,
            history,
            task,
        }
    }

    /// Report that the record changed
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SchedulerStopped`] after shutdown.
    pub fn mark_dirty(&self) -> Result<(), SessionError> {
        self.send(Command::Edited)
    }

    /// Re-arm the debounce window for dirty data
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SchedulerStopped`] after shutdown.
    pub fn retry(&self) -> Result<(), SessionError> {
        self.send(Command::Retry)
    }

    /// Save immediately, cancelling any in-flight request
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Save`] if the save fails and
    /// [`SessionError::SchedulerStopped`] after shutdown.
    pub async fn save_now(&self) -> Result<SaveOutcome, SessionError> {
        let (reply, outcome) = oneshot::channel();
        self.send(Command::SaveNow(reply))?;
        match outcome.await {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => Err(SessionError::SchedulerStopped),
        }
    }

    /// Current status
    #[inline]
    #[must_use]
    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    /// Recent status transitions, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<StatusChange> {
        self.history.lock().iter().cloned().collect()
    }

    /// Cancel in-flight work, drop any pending debounce and stop the task
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "persistence task ended abnormally");
        }
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::SchedulerStopped)
    }
}

struct SchedulerTask {
    draft: Arc<RwLock<Draft>>,
    transport: Arc<dyn RecordTransport>,
    debounce: Duration,
    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    status: watch::Sender<SaveStatus>,
    history: Arc<Mutex<VecDeque<StatusChange>>>,
    history_limit: usize,
    deadline: Option<Instant>,
    dirty: bool,
    in_flight: Option<InFlight>,
}

impl SchedulerTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                // queued edits supersede before any completion is looked at
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Edited) => self.touch(),
                    Some(Command::Retry) => self.retry(),
                    Some(Command::SaveNow(reply)) => self.save_now(reply),
                    Some(Command::Shutdown) | None => break,
                },
                Some(done) = self.completions.recv() => self.complete(done),
                () = debounce_elapsed(self.deadline) => {
                    self.deadline = None;
                    self.issue(None);
                }
            }
        }
        self.teardown();
    }

    /// Mark dirty, supersede any in-flight save and restart the window
    fn touch(&mut self) {
        self.dirty = true;
        self.supersede();
        self.deadline = Some(Instant::now() + self.debounce);
        tracing::debug!(debounce_ms = self.debounce.as_millis(), "debounce armed");
        self.update(|status| {
            status.state = SaveState::Unsaved;
            status.error = None;
            status.dirty = true;
        });
    }

    fn retry(&mut self) {
        if self.dirty {
            self.touch();
        } else {
            tracing::debug!("retry with nothing dirty ignored");
        }
    }

    fn save_now(&mut self, reply: Reply) {
        if !self.dirty {
            let _ = reply.send(Ok(SaveOutcome::NothingToSave));
            return;
        }
        self.deadline = None;
        self.supersede();
        self.issue(Some(reply));
    }

    /// Issue a save of the current record
    fn issue(&mut self, waiter: Option<Reply>) {
        if !self.dirty {
            if let Some(waiter) = waiter {
                let _ = waiter.send(Ok(SaveOutcome::NothingToSave));
            }
            return;
        }

        let (snapshot, revision) = {
            let draft = self.draft.read();
            (draft.record().clone(), draft.revision())
        };
        let request = RequestId::new();
        let cancel = CancelToken::new();
        tracing::debug!(%request, revision, record_id = ?snapshot.id, "save issued");
        self.update(|status| status.state = SaveState::Saving);

        let transport = Arc::clone(&self.transport);
        let completions = self.completions_tx.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let result = match snapshot.id {
                Some(id) => transport.update(id, &snapshot, &token).await,
                None => transport.create(&snapshot, &token).await,
            };
            let _ = completions.send(Completion { request, result });
        });

        self.in_flight = Some(InFlight {
            request,
            revision,
            cancel,
            waiter,
        });
    }

    /// Cancel the in-flight save, if any
    fn supersede(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            tracing::debug!(request = %flight.request, "in-flight save superseded");
            flight.cancel.cancel();
            if let Some(waiter) = flight.waiter {
                let _ = waiter.send(Ok(SaveOutcome::Superseded));
            }
        }
    }

    fn complete(&mut self, done: Completion) {
        let current = self
            .in_flight
            .as_ref()
            .is_some_and(|flight| flight.request == done.request);
        if !current {
            tracing::debug!(request = %done.request, "stale save result discarded");
            return;
        }
        let Some(flight) = self.in_flight.take() else {
            return;
        };

        let (record_id, latest) = {
            let mut draft = self.draft.write();
            let record_id = match &done.result {
                Ok(saved) => draft.adopt_id(saved),
                Err(_) => draft.record().id,
            };
            (record_id, draft.revision() == flight.revision)
        };
        if !latest {
            tracing::debug!(request = %done.request, revision = flight.revision, "save result predates the latest edit");
            self.update(|status| status.record_id = record_id);
            reply(flight.waiter, Ok(SaveOutcome::Superseded));
            self.touch();
            return;
        }

        match done.result {
            Ok(_) => {
                self.dirty = false;
                tracing::info!(request = %done.request, record_id = ?record_id, "record saved");
                self.update(|status| {
                    status.state = SaveState::Saved;
                    status.last_saved = Some(Utc::now());
                    status.error = None;
                    status.dirty = false;
                    status.record_id = record_id;
                });
                reply(flight.waiter, Ok(SaveOutcome::Saved));
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!(request = %done.request, "save cancelled by transport, re-arming");
                reply(flight.waiter, Ok(SaveOutcome::Superseded));
                self.touch();
            }
            Err(e) => {
                tracing::error!(request = %done.request, error = %e, "save failed");
                let message = e.to_string();
                self.update(|status| {
                    status.state = SaveState::Error;
                    status.error = Some(message);
                });
                reply(flight.waiter, Err(e));
            }
        }
    }

    fn teardown(&mut self) {
        self.deadline = None;
        self.supersede();
        tracing::debug!(dirty = self.dirty, "persistence task stopped");
    }

    /// Modify the published status, recording state changes
    fn update(&mut self, modify: impl FnOnce(&mut SaveStatus)) {
        let previous = self.status.borrow().state;
        self.status.send_modify(modify);
        let next = self.status.borrow().state;
        if previous == next {
            return;
        }
        if !previous.can_transition_to(next) {
            tracing::warn!(from = %previous, to = %next, "unexpected save state transition");
        }
        let mut history = self.history.lock();
        if history.len() == self.history_limit {
            history.pop_front();
        }
        history.push_back(StatusChange {
            at: Utc::now(),
            state: next,
        });
    }
}

fn reply(waiter: Option<Reply>, result: Result<SaveOutcome, TransportError>) {
    if let Some(waiter) = waiter {
        let _ = waiter.send(result);
    }
}

async fn debounce_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
