use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tem_core::{
    AnnotationSession, CancelToken, Draft, FetchedTask, IncidentMetadata, PersistenceScheduler,
    RecordTransport, SaveOutcome, SessionConfig, SessionError, TransportCall, TransportError,
};
use tem_model::{
    AnnotationRecord, Category, FieldUpdate, OptionId, RecordId, RecordPatch, SaveState, TaskId,
};
use tem_test_utils::{empty_record, patch, sample_engine, TestSession};
use tokio::sync::Notify;
use tokio_test::assert_ok;

fn description(text: &str) -> RecordPatch {
    RecordPatch::new().with(FieldUpdate::Description {
        category: Category::Threat,
        text: text.into(),
    })
}

/// Transport that holds every save until released and never looks at the
/// cancel token, so superseded requests still resolve
#[derive(Debug, Default)]
struct GatedTransport {
    gate: Notify,
    failures: Mutex<VecDeque<TransportError>>,
    saved: Mutex<Vec<AnnotationRecord>>,
}

impl GatedTransport {
    fn release(&self) {
        self.gate.notify_one();
    }

    fn fail_next(&self, error: TransportError) {
        self.failures.lock().push_back(error);
    }

    fn saved(&self) -> Vec<AnnotationRecord> {
        self.saved.lock().clone()
    }

    async fn store(&self, record: &AnnotationRecord) -> Result<AnnotationRecord, TransportError> {
        self.gate.notified().await;
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        let mut saved = record.clone();
        saved.id.get_or_insert(RecordId(1));
        self.saved.lock().push(saved.clone());
        Ok(saved)
    }
}

#[async_trait]
impl RecordTransport for GatedTransport {
    async fn create(
        &self,
        record: &AnnotationRecord,
        _cancel: &CancelToken,
    ) -> Result<AnnotationRecord, TransportError> {
        self.store(record).await
    }

    async fn update(
        &self,
        _id: RecordId,
        record: &AnnotationRecord,
        _cancel: &CancelToken,
    ) -> Result<AnnotationRecord, TransportError> {
        self.store(record).await
    }

    async fn fetch_for_task(&self, _task: &TaskId) -> Result<FetchedTask, TransportError> {
        Ok(FetchedTask::default())
    }
}

fn gated_session(transport: &Arc<GatedTransport>) -> AnnotationSession {
    AnnotationSession::start(
        sample_engine(),
        empty_record(),
        IncidentMetadata::default(),
        transport.clone(),
        &SessionConfig::new().with_debounce_ms(100),
    )
    .unwrap()
}

fn saved_count(session: &AnnotationSession) -> usize {
    session
        .status_history()
        .iter()
        .filter(|change| change.state == SaveState::Saved)
        .count()
}

async fn settle() {
    // let the scheduler drain its queue without moving the clock
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn edits_within_window_coalesce_into_one_save() {
    let (mut session, transport) = TestSession::builder().debounce_ms(2000).open().await;

    for text in ["first", "second", "third"] {
        assert_ok!(session.apply_patch(description(text)));
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    settle().await;
    assert!(transport.save_calls().is_empty());
    assert_eq!(session.status().state, SaveState::Unsaved);

    tokio::time::sleep(Duration::from_millis(2000)).await;
    settle().await;

    let calls = transport.save_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload().unwrap().threat.description, "third");
    let status = session.status();
    assert_eq!(status.state, SaveState::Saved);
    assert!(status.last_saved.is_some());
    assert!(!status.dirty);

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn edit_during_save_supersedes_it() {
    let (mut session, transport) = TestSession::builder()
        .debounce_ms(100)
        .latency(Duration::from_millis(1000))
        .open()
        .await;

    assert_ok!(session.apply_patch(description("old")));
    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;
    assert_eq!(session.status().state, SaveState::Saving);

    assert_ok!(session.apply_patch(description("new")));
    settle().await;
    let status = session.status();
    assert_eq!(status.state, SaveState::Unsaved);
    assert!(status.last_saved.is_none());
    assert!(status.error.is_none());

    tokio::time::sleep(Duration::from_millis(1200)).await;
    settle().await;

    let calls = transport.save_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].payload().unwrap().threat.description, "new");
    let status = session.status();
    assert_eq!(status.state, SaveState::Saved);
    assert_eq!(
        transport.stored(status.record_id.unwrap()).unwrap().threat.description,
        "new"
    );
    assert!(!session
        .status_history()
        .iter()
        .any(|change| change.state == SaveState::Error));

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_save_is_retried_with_same_data() {
    let (mut session, transport) = TestSession::builder().debounce_ms(2000).open().await;
    transport.fail_next(TransportError::Network("connection reset".into()));

    assert_ok!(session.apply_patch(description("gusting crosswind")));
    tokio::time::sleep(Duration::from_millis(2100)).await;
    settle().await;

    let status = session.status();
    assert_eq!(status.state, SaveState::Error);
    assert_eq!(status.error.as_deref(), Some("network error: connection reset"));
    assert!(status.dirty);
    assert!(status.can_retry());
    assert_eq!(session.record().threat.description, "gusting crosswind");

    assert_ok!(session.retry());
    tokio::time::sleep(Duration::from_millis(2100)).await;
    settle().await;

    let calls = transport.save_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].payload(), calls[1].payload());
    assert_eq!(session.status().state, SaveState::Saved);
    assert!(session.status().error.is_none());

    session.teardown().await;
}

#[tokio::test]
async fn save_now_without_changes_skips_transport() {
    let (session, transport) = TestSession::builder().open().await;
    assert_eq!(session.save_now().await.unwrap(), SaveOutcome::NothingToSave);
    assert!(transport.save_calls().is_empty());
    assert_eq!(transport.calls(), vec![TransportCall::Fetch(tem_model::TaskId::new(tem_test_utils::TASK))]);
    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn save_now_bypasses_debounce_and_reports_failure() {
    let (mut session, transport) = TestSession::builder().debounce_ms(60_000).open().await;

    assert_ok!(session.select(Category::Threat, OptionId(3)));
    assert_eq!(session.save_now().await.unwrap(), SaveOutcome::Saved);
    assert_eq!(transport.save_calls().len(), 1);
    assert!(matches!(transport.save_calls()[0], TransportCall::Create(_)));

    assert_ok!(session.apply_json(&json!({"threat_description": "cb on final"})));
    transport.fail_next(TransportError::Server {
        status: 503,
        message: "unavailable".into(),
    });
    let err = session.save_now().await.unwrap_err();
    assert!(matches!(err, SessionError::Save(_)));
    assert!(err.is_retryable());
    assert_eq!(session.status().state, SaveState::Error);

    assert_eq!(session.save_now().await.unwrap(), SaveOutcome::Saved);
    assert!(matches!(transport.save_calls()[2], TransportCall::Update(_, _)));

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn teardown_discards_pending_and_in_flight_saves() {
    let (mut session, transport) = TestSession::builder()
        .debounce_ms(100)
        .latency(Duration::from_millis(5000))
        .open()
        .await;

    assert_ok!(session.apply_patch(patch(json!({"threat_description": "in flight"}))));
    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;
    assert_eq!(transport.save_calls().len(), 1);

    let status = session.subscribe();
    session.teardown().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(status.borrow().state, SaveState::Saving);
    assert!(status.borrow().last_saved.is_none());
    assert_eq!(transport.save_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn noop_edit_does_not_dirty() {
    let (mut session, transport) = TestSession::builder().debounce_ms(100).open().await;
    let outcome = session.apply_patch(description("")).unwrap();
    assert!(outcome.is_noop());
    tokio::time::sleep(Duration::from_millis(500)).await;
    settle().await;
    assert_eq!(session.status().state, SaveState::Idle);
    assert!(transport.save_calls().is_empty());
    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn late_success_of_superseded_save_is_ignored() {
    let transport = Arc::new(GatedTransport::default());
    let mut session = gated_session(&transport);

    assert_ok!(session.apply_patch(description("old")));
    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;
    assert_eq!(session.status().state, SaveState::Saving);

    transport.release();
    assert_ok!(session.apply_patch(description("new")));
    settle().await;

    assert_eq!(transport.saved().len(), 1);
    let status = session.status();
    assert_eq!(status.state, SaveState::Unsaved);
    assert!(status.last_saved.is_none());
    assert!(status.dirty);
    assert_eq!(saved_count(&session), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;
    transport.release();
    settle().await;

    let saved = transport.saved();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[1].threat.description, "new");
    assert_eq!(session.status().state, SaveState::Saved);
    assert_eq!(saved_count(&session), 1);

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn late_failure_of_superseded_save_is_ignored() {
    let transport = Arc::new(GatedTransport::default());
    let mut session = gated_session(&transport);
    transport.fail_next(TransportError::Network("timed out".into()));

    assert_ok!(session.apply_patch(description("old")));
    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;

    transport.release();
    assert_ok!(session.apply_patch(description("new")));
    settle().await;

    let status = session.status();
    assert_eq!(status.state, SaveState::Unsaved);
    assert!(status.error.is_none());
    assert!(!session
        .status_history()
        .iter()
        .any(|change| change.state == SaveState::Error));

    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;
    transport.release();
    settle().await;

    let saved = transport.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].threat.description, "new");
    assert_eq!(session.status().state, SaveState::Saved);

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn result_for_an_older_revision_does_not_count_as_saved() {
    let transport = Arc::new(GatedTransport::default());
    let draft = Arc::new(RwLock::new(Draft::new(empty_record())));
    let config = SessionConfig::new().with_debounce_ms(100);
    let scheduler = PersistenceScheduler::spawn(Arc::clone(&draft), transport.clone(), &config);

    let mut record = empty_record();
    record.threat.description = "old".into();
    draft.write().commit(record.clone());
    assert_ok!(scheduler.mark_dirty());
    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;
    assert_eq!(scheduler.status().state, SaveState::Saving);

    // the edit is committed but its notification has not reached the task
    record.threat.description = "new".into();
    draft.write().commit(record);
    transport.release();
    settle().await;

    let status = scheduler.status();
    assert_eq!(status.state, SaveState::Unsaved);
    assert!(status.last_saved.is_none());
    assert!(status.dirty);
    assert_eq!(status.record_id, Some(RecordId(1)));
    assert_eq!(draft.read().record().id, Some(RecordId(1)));

    assert_ok!(scheduler.mark_dirty());
    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;
    transport.release();
    settle().await;

    let saved = transport.saved();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[1].threat.description, "new");
    assert_eq!(saved[1].id, Some(RecordId(1)));
    assert_eq!(scheduler.status().state, SaveState::Saved);

    scheduler.shutdown().await;
}
