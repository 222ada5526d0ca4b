//! External collaborators
//!
//! - [`RecordTransport`]: create / update / fetch-by-task, async and cancellable
//! - [`OptionSource`]: flat dropdown option lists per category
//!
//! [`MemoryTransport`] and [`StaticOptionSource`] are in-process
//! implementations used by the CLI and the tests.

use crate::cancel::CancelToken;
use crate::error::TransportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tem_model::{AnnotationRecord, Category, DropdownOption, RecordId, TaskId};

/// Incident metadata delivered alongside the record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentMetadata(pub Map<String, Value>);

impl IncidentMetadata {
    /// Metadata field
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// With field
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

/// Result of fetching a task's annotation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedTask {
    /// Current record; `None` if not yet created
    pub record: Option<AnnotationRecord>,
    /// Incident the task belongs to
    pub incident: IncidentMetadata,
}

/// Record persistence
#[async_trait]
pub trait RecordTransport: Send + Sync {
    /// Create the record; returns it with its server-issued id
    async fn create(
        &self,
        record: &AnnotationRecord,
        cancel: &CancelToken,
    ) -> Result<AnnotationRecord, TransportError>;

    /// Update record `id`
    async fn update(
        &self,
        id: RecordId,
        record: &AnnotationRecord,
        cancel: &CancelToken,
    ) -> Result<AnnotationRecord, TransportError>;

    /// Current record and incident metadata of `task`
    async fn fetch_for_task(&self, task: &TaskId) -> Result<FetchedTask, TransportError>;
}

/// Dropdown option lists
#[async_trait]
pub trait OptionSource: Send + Sync {
    /// Flat option list of `category`
    async fn options(&self, category: Category) -> Result<Vec<DropdownOption>, TransportError>;
}

/// One call observed by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    /// `create` with the record it carried
    Create(AnnotationRecord),
    /// `update` with the record it carried
    Update(RecordId, AnnotationRecord),
    /// `fetch_for_task`
    Fetch(TaskId),
}

impl TransportCall {
    /// Record carried by a save call
    #[must_use]
    pub fn payload(&self) -> Option<&AnnotationRecord> {
        match self {
            Self::Create(record) | Self::Update(_, record) => Some(record),
            Self::Fetch(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    records: HashMap<RecordId, AnnotationRecord>,
    incidents: HashMap<TaskId, IncidentMetadata>,
    calls: Vec<TransportCall>,
    failures: VecDeque<TransportError>,
}

/// In-process record store
///
/// Records every call, assigns sequential ids, optionally delays each save
/// and can be scripted to fail the next saves. Cancellation is honoured while
/// the simulated latency elapses.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    latency: Duration,
}

impl MemoryTransport {
    /// Empty store with no latency
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With per-save latency
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// With a stored record (it must carry an id)
    #[must_use]
    pub fn with_record(self, record: AnnotationRecord) -> Self {
        {
            let mut state = self.state.lock();
            if let Some(id) = record.id {
                state.next_id = state.next_id.max(id.0);
                state.records.insert(id, record);
            }
        }
        self
    }

    /// With incident metadata for `task`
    #[must_use]
    pub fn with_incident(self, task: TaskId, incident: IncidentMetadata) -> Self {
        self.state.lock().incidents.insert(task, incident);
        self
    }

    /// Fail the next save with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.state.lock().failures.push_back(error);
    }

    /// Every call so far
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    /// Create and update calls so far, cancelled ones included
    #[must_use]
    pub fn save_calls(&self) -> Vec<TransportCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.payload().is_some())
            .cloned()
            .collect()
    }

    /// Stored record `id`
    #[must_use]
    pub fn stored(&self, id: RecordId) -> Option<AnnotationRecord> {
        self.state.lock().records.get(&id).cloned()
    }

    async fn save(
        &self,
        id: Option<RecordId>,
        record: &AnnotationRecord,
        cancel: &CancelToken,
    ) -> Result<AnnotationRecord, TransportError> {
        self.state.lock().calls.push(match id {
            Some(id) => TransportCall::Update(id, record.clone()),
            None => TransportCall::Create(record.clone()),
        });

        tokio::select! {
            () = cancel.cancelled() => return Err(TransportError::Cancelled),
            () = tokio::time::sleep(self.latency) => {}
        }

        let mut state = self.state.lock();
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        let id = match id {
            Some(id) if state.records.contains_key(&id) => id,
            Some(id) => return Err(TransportError::Server {
                status: 404,
                message: format!("record {id} not found"),
            }),
            None => {
                state.next_id += 1;
                RecordId(state.next_id)
            }
        };
        let mut saved = record.clone();
        saved.id = Some(id);
        state.records.insert(id, saved.clone());
        Ok(saved)
    }
}

#[async_trait]
impl RecordTransport for MemoryTransport {
    async fn create(
        &self,
        record: &AnnotationRecord,
        cancel: &CancelToken,
    ) -> Result<AnnotationRecord, TransportError> {
        self.save(None, record, cancel).await
    }

    async fn update(
        &self,
        id: RecordId,
        record: &AnnotationRecord,
        cancel: &CancelToken,
    ) -> Result<AnnotationRecord, TransportError> {
        self.save(Some(id), record, cancel).await
    }

    async fn fetch_for_task(&self, task: &TaskId) -> Result<FetchedTask, TransportError> {
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Fetch(task.clone()));
        Ok(FetchedTask {
            record: state
                .records
                .values()
                .find(|record| record.task_id == *task)
                .cloned(),
            incident: state.incidents.get(task).cloned().unwrap_or_default(),
        })
    }
}

/// Option lists held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticOptionSource {
    options: HashMap<Category, Vec<DropdownOption>>,
}

impl StaticOptionSource {
    /// Source from per-category lists
    #[inline]
    #[must_use]
    pub fn new(options: HashMap<Category, Vec<DropdownOption>>) -> Self {
        Self { options }
    }

    /// With the list of `category`
    #[must_use]
    pub fn with(mut self, category: Category, options: Vec<DropdownOption>) -> Self {
        self.options.insert(category, options);
        self
    }

    /// Parse `{"threat": [...], "error": [...], "uas": [...]}`
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the document does not match.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::new)
    }
}

#[async_trait]
impl OptionSource for StaticOptionSource {
    async fn options(&self, category: Category) -> Result<Vec<DropdownOption>, TransportError> {
        Ok(self.options.get(&category).cloned().unwrap_or_default())
    }
}
