//! Editing session
//!
//! Owns one record and everything derived from it. All rule evaluation runs
//! synchronously inside [`AnnotationSession::apply_patch`], so no other reader
//! ever sees a half-applied edit; only saving is asynchronous.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::scheduler::{Draft, PersistenceScheduler, SaveOutcome, StatusChange};
use crate::transport::{IncidentMetadata, OptionSource, RecordTransport};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tem_model::{
    AnnotationRecord, Category, DropdownOption, FieldUpdate, OptionId, RecordPatch, SaveStatus,
    Selection, TaskId, TaxonomyLevel,
};
use tem_rules::{
    AnnotationEngine, DerivedTopics, EditOutcome, ImpactControl, ImpactRuleTable,
    TaxonomyCatalog, TaxonomySelection, ValidationError,
};
use tokio::sync::watch;

/// One record being annotated
#[derive(Debug)]
pub struct AnnotationSession {
    engine: AnnotationEngine,
    draft: Arc<RwLock<Draft>>,
    topics: DerivedTopics,
    incident: IncidentMetadata,
    scheduler: PersistenceScheduler,
}

impl AnnotationSession {
    /// Start a session for `task`
    ///
    /// Loads the three option lists concurrently, fetches the record (a new
    /// one is started if the task has none), repairs legacy shapes and
    /// refreshes derived topics. A repair is scheduled for saving.
    ///
    /// # Errors
    ///
    /// Returns an error if options or the record cannot be loaded, or the
    /// configured rule table is invalid.
    pub async fn open(
        task: TaskId,
        config: SessionConfig,
        options: Arc<dyn OptionSource>,
        transport: Arc<dyn RecordTransport>,
    ) -> Result<Self, SessionError> {
        let rules = match &config.rules_path {
            Some(path) => {
                let yaml = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| SessionError::config(format!("{}: {e}", path.display())))?;
                ImpactRuleTable::from_yaml_str(&yaml)?
            }
            None => ImpactRuleTable::builtin(),
        };

        let load = |category: Category| {
            let options = Arc::clone(&options);
            async move {
                options
                    .options(category)
                    .await
                    .map(|list| (category, list))
                    .map_err(|source| SessionError::Options { category, source })
            }
        };
        let (threat, error, uas) = futures::try_join!(
            load(Category::Threat),
            load(Category::Error),
            load(Category::Uas)
        )?;
        let catalog = TaxonomyCatalog::from_options(HashMap::from([threat, error, uas]));

        let fetched = transport
            .fetch_for_task(&task)
            .await
            .map_err(SessionError::Fetch)?;
        let record = fetched.record.unwrap_or_else(|| {
            tracing::debug!(%task, "no record yet, starting a new one");
            AnnotationRecord::new(task.clone())
        });

        let engine = AnnotationEngine::new(Arc::new(catalog), Arc::new(rules));
        Self::start(engine, record, fetched.incident, transport, &config)
    }

    /// Start a session over an already loaded record
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SchedulerStopped`] if the persistence task
    /// could not be reached.
    pub fn start(
        engine: AnnotationEngine,
        record: AnnotationRecord,
        incident: IncidentMetadata,
        transport: Arc<dyn RecordTransport>,
        config: &SessionConfig,
    ) -> Result<Self, SessionError> {
        let loaded = engine.load(record);
        let draft = Arc::new(RwLock::new(Draft::new(loaded.record)));
        let scheduler = PersistenceScheduler::spawn(Arc::clone(&draft), transport, config);
        if loaded.repaired {
            scheduler.mark_dirty()?;
        }
        tracing::info!(task = %draft.read().record().task_id, repaired = loaded.repaired, "session opened");

        Ok(Self {
            engine,
            draft,
            topics: loaded.topics,
            incident,
            scheduler,
        })
    }

    /// Single mutation entry point
    ///
    /// Runs the edit through every rule and hands a changed record to the
    /// scheduler. An edit that changes nothing does not make the record dirty.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SchedulerStopped`] if the edit could not be
    /// scheduled; the record is updated regardless.
    pub fn apply_patch(&mut self, patch: RecordPatch) -> Result<EditOutcome, SessionError> {
        let outcome = {
            let mut draft = self.draft.write();
            let outcome = self.engine.apply(draft.record(), patch);
            if !outcome.is_noop() {
                draft.commit(outcome.record.clone());
            }
            outcome
        };
        self.topics.clone_from(&outcome.topics);
        if !outcome.is_noop() {
            self.scheduler.mark_dirty()?;
        }
        Ok(outcome)
    }

    /// Apply a partial record in its JSON wire form
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Patch`] if the JSON is not a valid patch.
    pub fn apply_json(&mut self, patch: &Value) -> Result<EditOutcome, SessionError> {
        let patch = RecordPatch::from_json(patch)?;
        self.apply_patch(patch)
    }

    /// Select taxonomy node `id`, cascading to deeper levels
    ///
    /// # Errors
    ///
    /// See [`Self::apply_patch`].
    pub fn select(&mut self, category: Category, id: OptionId) -> Result<EditOutcome, SessionError> {
        let patch = self
            .engine
            .selection(category)
            .select(self.draft.read().record().fields(category), id);
        self.apply_patch(patch)
    }

    /// Select the taxonomy node with `code`
    ///
    /// # Errors
    ///
    /// See [`Self::apply_patch`].
    pub fn select_code(&mut self, category: Category, code: &str) -> Result<EditOutcome, SessionError> {
        let patch = self
            .engine
            .selection(category)
            .select_code(self.draft.read().record().fields(category), code);
        self.apply_patch(patch)
    }

    /// Clear all three taxonomy levels of `category`
    ///
    /// # Errors
    ///
    /// See [`Self::apply_patch`].
    pub fn clear_taxonomy(&mut self, category: Category) -> Result<EditOutcome, SessionError> {
        self.apply_patch(TaxonomySelection::clear(category))
    }

    /// Set the management value of `category`
    ///
    /// # Errors
    ///
    /// See [`Self::apply_patch`].
    pub fn set_management(
        &mut self,
        category: Category,
        value: Selection,
    ) -> Result<EditOutcome, SessionError> {
        self.apply_patch(RecordPatch::new().with(FieldUpdate::Management { category, value }))
    }

    /// Set the impact value of `category`
    ///
    /// # Errors
    ///
    /// See [`Self::apply_patch`].
    pub fn set_impact(&mut self, category: Category, value: Selection) -> Result<EditOutcome, SessionError> {
        self.apply_patch(RecordPatch::new().with(FieldUpdate::Impact { category, value }))
    }

    /// Impact control for the current management value of `category`
    #[must_use]
    pub fn impact_control(&self, category: Category) -> ImpactControl {
        self.engine.impact_control(self.draft.read().record(), category)
    }

    /// Dropdown contents for `level` of `category` under the current selection
    #[must_use]
    pub fn options_for(&self, category: Category, level: TaxonomyLevel) -> Vec<DropdownOption> {
        self.engine
            .selection(category)
            .options_at(self.draft.read().record().fields(category), level)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Snapshot of the current record
    #[must_use]
    pub fn record(&self) -> AnnotationRecord {
        self.draft.read().record().clone()
    }

    /// Derived topics of the current record
    #[inline]
    #[must_use]
    pub fn topics(&self) -> &DerivedTopics {
        &self.topics
    }

    /// Incident metadata fetched at start
    #[inline]
    #[must_use]
    pub fn incident(&self) -> &IncidentMetadata {
        &self.incident
    }

    /// Rules in use
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &AnnotationEngine {
        &self.engine
    }

    /// Current save status
    #[inline]
    #[must_use]
    pub fn status(&self) -> SaveStatus {
        self.scheduler.status()
    }

    /// Receiver notified on every status change
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.scheduler.subscribe()
    }

    /// Recent status transitions, oldest first
    #[must_use]
    pub fn status_history(&self) -> Vec<StatusChange> {
        self.scheduler.history()
    }

    /// Save now, bypassing the debounce window
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Save`] if the save fails.
    pub async fn save_now(&self) -> Result<SaveOutcome, SessionError> {
        self.scheduler.save_now().await
    }

    /// Schedule another attempt at saving dirty data
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SchedulerStopped`] after teardown.
    pub fn retry(&self) -> Result<(), SessionError> {
        self.scheduler.retry()
    }

    /// Check the record is complete enough to submit
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing the missing fields.
    pub fn validate_submission(&self) -> Result<(), ValidationError> {
        tem_rules::validate_submission(
            self.draft.read().record(),
            self.engine.catalog(),
            self.engine.rules(),
        )
    }

    /// End the session, cancelling in-flight and pending saves
    pub async fn teardown(self) {
        tracing::debug!(task = %self.draft.read().record().task_id, "session closing");
        self.scheduler.shutdown().await;
    }
}
