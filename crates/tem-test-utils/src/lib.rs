//! Testing utilities for the TEM annotation workspace
//!
//! Shared fixtures: a small taxonomy per category (threat ids match the
//! worked examples: TE=1, TE-01=2, TE-01-A=3, TC=4) and session builders over
//! [`MemoryTransport`].

#![allow(missing_docs)]

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tem_core::{AnnotationSession, MemoryTransport, SessionConfig, StaticOptionSource};
use tem_model::{AnnotationRecord, Category, DropdownOption, RecordPatch, TaskId, TaxonomyLevel};
use tem_rules::{AnnotationEngine, ImpactRuleTable, TaxonomyCatalog};

pub const TASK: &str = "task-1";

pub fn threat_options() -> Vec<DropdownOption> {
    vec![
        DropdownOption::new(1, "TE", "Environmental", TaxonomyLevel::L1),
        DropdownOption::new(2, "TE-01", "Weather", TaxonomyLevel::L2).with_parent(1),
        DropdownOption::new(3, "TE-01-A", "Thunderstorm", TaxonomyLevel::L3)
            .with_parent(2)
            .with_topics(["convective weather", "decision making"]),
        DropdownOption::new(4, "TC", "Crew", TaxonomyLevel::L1),
        DropdownOption::new(5, "TC-01", "Fatigue", TaxonomyLevel::L2).with_parent(4),
        DropdownOption::new(6, "TC-01-A", "Extended duty", TaxonomyLevel::L3)
            .with_parent(5)
            .with_topics(["fatigue management", "crew resource management"]),
    ]
}

pub fn error_options() -> Vec<DropdownOption> {
    vec![
        DropdownOption::new(10, "EH", "Aircraft handling", TaxonomyLevel::L1),
        DropdownOption::new(11, "EH-01", "Manual control", TaxonomyLevel::L2).with_parent(10),
        DropdownOption::new(12, "EH-01-A", "Unstable approach", TaxonomyLevel::L3)
            .with_parent(11)
            .with_topics(["stabilized approach", "decision making"]),
    ]
}

pub fn uas_options() -> Vec<DropdownOption> {
    vec![
        DropdownOption::new(20, "UA", "Aircraft state", TaxonomyLevel::L1),
        DropdownOption::new(21, "UA-01", "Vertical deviation", TaxonomyLevel::L2).with_parent(20),
        DropdownOption::new(22, "UA-01-A", "Below glidepath", TaxonomyLevel::L3)
            .with_parent(21)
            .with_topics(["energy management", "stabilized approach"]),
    ]
}

pub fn sample_options() -> HashMap<Category, Vec<DropdownOption>> {
    HashMap::from([
        (Category::Threat, threat_options()),
        (Category::Error, error_options()),
        (Category::Uas, uas_options()),
    ])
}

pub fn sample_catalog() -> TaxonomyCatalog {
    TaxonomyCatalog::from_options(sample_options())
}

pub fn sample_engine() -> AnnotationEngine {
    AnnotationEngine::new(
        Arc::new(sample_catalog()),
        Arc::new(ImpactRuleTable::builtin()),
    )
}

pub fn empty_record() -> AnnotationRecord {
    AnnotationRecord::new(TaskId::new(TASK))
}

pub fn patch(json: Value) -> RecordPatch {
    RecordPatch::from_json(&json).unwrap()
}

/// Builder for a session over an in-memory transport
#[derive(Debug, Default)]
pub struct TestSession {
    config: SessionConfig,
    latency: Duration,
    record: Option<AnnotationRecord>,
}

impl TestSession {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.config = self.config.with_debounce_ms(debounce_ms);
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Stored record the session will fetch; must carry an id
    pub fn record(mut self, record: AnnotationRecord) -> Self {
        self.record = Some(record);
        self
    }

    pub async fn open(self) -> (AnnotationSession, Arc<MemoryTransport>) {
        let mut transport = MemoryTransport::new().with_latency(self.latency);
        if let Some(record) = self.record {
            transport = transport.with_record(record);
        }
        let transport = Arc::new(transport);
        let session = AnnotationSession::open(
            TaskId::new(TASK),
            self.config,
            Arc::new(StaticOptionSource::new(sample_options())),
            transport.clone(),
        )
        .await
        .unwrap();
        (session, transport)
    }
}
