//! Annotation record
//!
//! In memory the record groups fields per category; on the wire it uses the
//! flat `threat_type_l1`, `error_impact`, ... names, converted through
//! [`RecordWire`].

use crate::category::{Category, TaxonomyLevel};
use crate::fields::{CopingAbilities, Selection, Shaped};
use crate::ids::{OptionId, RecordId, TaskId};
use crate::patch::{FieldKey, FieldUpdate, RecordPatch};
use serde::{Deserialize, Serialize};

/// Fields repeated for each category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryFields {
    pub type_l1: Option<OptionId>,
    pub type_l2: Option<OptionId>,
    pub type_l3: Option<OptionId>,
    pub management: Shaped<Selection>,
    pub impact: Shaped<Selection>,
    pub coping_abilities: Shaped<CopingAbilities>,
    pub description: String,
}

impl CategoryFields {
    /// Selected node at `level`
    #[inline]
    #[must_use]
    pub fn type_at(&self, level: TaxonomyLevel) -> Option<OptionId> {
        match level {
            TaxonomyLevel::L1 => self.type_l1,
            TaxonomyLevel::L2 => self.type_l2,
            TaxonomyLevel::L3 => self.type_l3,
        }
    }

    fn type_slot(&mut self, level: TaxonomyLevel) -> &mut Option<OptionId> {
        match level {
            TaxonomyLevel::L1 => &mut self.type_l1,
            TaxonomyLevel::L2 => &mut self.type_l2,
            TaxonomyLevel::L3 => &mut self.type_l3,
        }
    }

    /// Deepest non-null selection, with its level
    #[must_use]
    pub fn deepest_selected(&self) -> Option<(TaxonomyLevel, OptionId)> {
        TaxonomyLevel::ALL
            .iter()
            .rev()
            .find_map(|&level| self.type_at(level).map(|id| (level, id)))
    }

    /// Whether the structured fields all hold their expected shapes
    #[inline]
    #[must_use]
    pub fn is_well_shaped(&self) -> bool {
        self.management.is_valid() && self.impact.is_valid() && self.coping_abilities.is_valid()
    }

    /// Whether every field is empty
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.type_l1.is_none()
            && self.type_l2.is_none()
            && self.type_l3.is_none()
            && self.management.value().is_none()
            && self.impact.value().is_none()
            && self.coping_abilities.values().is_empty()
            && self.description.is_empty()
    }
}

/// One annotation per task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordWire", into = "RecordWire")]
pub struct AnnotationRecord {
    /// Server id, `None` until first created
    pub id: Option<RecordId>,
    pub task_id: TaskId,
    pub threat: CategoryFields,
    pub error: CategoryFields,
    pub uas: CategoryFields,
    pub uas_applicable: bool,
    pub uas_relevance: String,
    pub error_relevance: String,
    pub calculated_threat_topics: Vec<String>,
    pub calculated_error_topics: Vec<String>,
    pub calculated_uas_topics: Vec<String>,
}

impl AnnotationRecord {
    /// Create a blank, canonical record for `task_id`
    #[must_use]
    pub fn new(task_id: TaskId) -> Self {
        Self {
            id: None,
            task_id,
            threat: CategoryFields::default(),
            error: CategoryFields::default(),
            uas: CategoryFields::default(),
            uas_applicable: false,
            uas_relevance: String::new(),
            error_relevance: String::new(),
            calculated_threat_topics: Vec::new(),
            calculated_error_topics: Vec::new(),
            calculated_uas_topics: Vec::new(),
        }
    }

    /// Fields of `category`
    #[inline]
    #[must_use]
    pub fn fields(&self, category: Category) -> &CategoryFields {
        match category {
            Category::Threat => &self.threat,
            Category::Error => &self.error,
            Category::Uas => &self.uas,
        }
    }

    /// Mutable fields of `category`
    #[inline]
    pub fn fields_mut(&mut self, category: Category) -> &mut CategoryFields {
        match category {
            Category::Threat => &mut self.threat,
            Category::Error => &mut self.error,
            Category::Uas => &mut self.uas,
        }
    }

    /// Derived topic list of `category`
    #[inline]
    #[must_use]
    pub fn calculated_topics(&self, category: Category) -> &[String] {
        match category {
            Category::Threat => &self.calculated_threat_topics,
            Category::Error => &self.calculated_error_topics,
            Category::Uas => &self.calculated_uas_topics,
        }
    }

    fn calculated_topics_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::Threat => &mut self.calculated_threat_topics,
            Category::Error => &mut self.calculated_error_topics,
            Category::Uas => &mut self.calculated_uas_topics,
        }
    }

    /// Current impact value of `category`
    #[inline]
    #[must_use]
    pub fn impact_value(&self, category: Category) -> Option<&str> {
        self.fields(category).impact.value()
    }

    /// Current management value of `category`
    #[inline]
    #[must_use]
    pub fn management_value(&self, category: Category) -> Option<&str> {
        self.fields(category).management.value()
    }

    /// Whether applying `update` would change this record
    #[must_use]
    pub fn differs(&self, update: &FieldUpdate) -> bool {
        match update {
            FieldUpdate::Type {
                category,
                level,
                id,
            } => self.fields(*category).type_at(*level) != *id,
            FieldUpdate::Management { category, value } => {
                self.fields(*category).management.valid() != Some(value)
            }
            FieldUpdate::Impact { category, value } => {
                self.fields(*category).impact.valid() != Some(value)
            }
            FieldUpdate::CopingAbilities { category, value } => {
                self.fields(*category).coping_abilities.valid() != Some(value)
            }
            FieldUpdate::Description { category, text } => {
                self.fields(*category).description != *text
            }
            FieldUpdate::UasApplicable(flag) => self.uas_applicable != *flag,
            FieldUpdate::UasRelevance(text) => self.uas_relevance != *text,
            FieldUpdate::ErrorRelevance(text) => self.error_relevance != *text,
            FieldUpdate::CalculatedTopics { category, topics } => {
                self.calculated_topics(*category) != topics.as_slice()
            }
        }
    }

    /// Apply a single update
    pub fn apply_update(&mut self, update: &FieldUpdate) {
        match update {
            FieldUpdate::Type {
                category,
                level,
                id,
            } => *self.fields_mut(*category).type_slot(*level) = *id,
            FieldUpdate::Management { category, value } => {
                self.fields_mut(*category).management = Shaped::Valid(value.clone());
            }
            FieldUpdate::Impact { category, value } => {
                self.fields_mut(*category).impact = Shaped::Valid(value.clone());
            }
            FieldUpdate::CopingAbilities { category, value } => {
                self.fields_mut(*category).coping_abilities = Shaped::Valid(value.clone());
            }
            FieldUpdate::Description { category, text } => {
                self.fields_mut(*category).description.clone_from(text);
            }
            FieldUpdate::UasApplicable(flag) => self.uas_applicable = *flag,
            FieldUpdate::UasRelevance(text) => self.uas_relevance.clone_from(text),
            FieldUpdate::ErrorRelevance(text) => self.error_relevance.clone_from(text),
            FieldUpdate::CalculatedTopics { category, topics } => {
                self.calculated_topics_mut(*category).clone_from(topics);
            }
        }
    }

    /// Apply every update of `patch`, in order
    pub fn apply(&mut self, patch: &RecordPatch) {
        for update in patch.iter() {
            self.apply_update(update);
        }
    }

    /// Copy of this record with `patch` applied
    #[must_use]
    pub fn patched(&self, patch: &RecordPatch) -> Self {
        let mut next = self.clone();
        next.apply(patch);
        next
    }

    /// Subset of `patch` that would change this record
    #[must_use]
    pub fn effective(&self, patch: &RecordPatch) -> RecordPatch {
        let mut working = self.clone();
        let mut effective = RecordPatch::new();
        for update in patch.iter() {
            if working.differs(update) {
                working.apply_update(update);
                effective.push(update.clone());
            }
        }
        effective
    }

    /// Whether `key` currently holds a non-empty value
    #[must_use]
    pub fn is_set(&self, key: FieldKey) -> bool {
        match key {
            FieldKey::Type(c, level) => self.fields(c).type_at(level).is_some(),
            FieldKey::Management(c) => self.fields(c).management.value().is_some(),
            FieldKey::Impact(c) => self.fields(c).impact.value().is_some(),
            FieldKey::CopingAbilities(c) => !self.fields(c).coping_abilities.values().is_empty(),
            FieldKey::Description(c) => !self.fields(c).description.trim().is_empty(),
            FieldKey::UasApplicable => self.uas_applicable,
            FieldKey::UasRelevance => !self.uas_relevance.is_empty(),
            FieldKey::ErrorRelevance => !self.error_relevance.is_empty(),
            FieldKey::CalculatedTopics(c) => !self.calculated_topics(c).is_empty(),
        }
    }
}

/// Flat wire form of [`AnnotationRecord`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
    task_id: TaskId,

    #[serde(default)]
    threat_type_l1: Option<OptionId>,
    #[serde(default)]
    threat_type_l2: Option<OptionId>,
    #[serde(default)]
    threat_type_l3: Option<OptionId>,
    #[serde(default = "Shaped::missing", skip_serializing_if = "Shaped::is_missing")]
    threat_management: Shaped<Selection>,
    #[serde(default = "Shaped::missing", skip_serializing_if = "Shaped::is_missing")]
    threat_impact: Shaped<Selection>,
    #[serde(default = "Shaped::missing", skip_serializing_if = "Shaped::is_missing")]
    threat_coping_abilities: Shaped<CopingAbilities>,
    #[serde(default)]
    threat_description: String,

    #[serde(default)]
    error_type_l1: Option<OptionId>,
    #[serde(default)]
    error_type_l2: Option<OptionId>,
    #[serde(default)]
    error_type_l3: Option<OptionId>,
    #[serde(default = "Shaped::missing", skip_serializing_if = "Shaped::is_missing")]
    error_management: Shaped<Selection>,
    #[serde(default = "Shaped::missing", skip_serializing_if = "Shaped::is_missing")]
    error_impact: Shaped<Selection>,
    #[serde(default = "Shaped::missing", skip_serializing_if = "Shaped::is_missing")]
    error_coping_abilities: Shaped<CopingAbilities>,
    #[serde(default)]
    error_description: String,

    #[serde(default)]
    uas_type_l1: Option<OptionId>,
    #[serde(default)]
    uas_type_l2: Option<OptionId>,
    #[serde(default)]
    uas_type_l3: Option<OptionId>,
    #[serde(default = "Shaped::missing", skip_serializing_if = "Shaped::is_missing")]
    uas_management: Shaped<Selection>,
    #[serde(default = "Shaped::missing", skip_serializing_if = "Shaped::is_missing")]
    uas_impact: Shaped<Selection>,
    #[serde(default = "Shaped::missing", skip_serializing_if = "Shaped::is_missing")]
    uas_coping_abilities: Shaped<CopingAbilities>,
    #[serde(default)]
    uas_description: String,

    #[serde(default)]
    uas_applicable: bool,
    #[serde(default)]
    uas_relevance: String,
    #[serde(default)]
    error_relevance: String,
    #[serde(default)]
    calculated_threat_topics: Vec<String>,
    #[serde(default)]
    calculated_error_topics: Vec<String>,
    #[serde(default)]
    calculated_uas_topics: Vec<String>,
}

impl From<RecordWire> for AnnotationRecord {
    fn from(w: RecordWire) -> Self {
        Self {
            id: w.id,
            task_id: w.task_id,
            threat: CategoryFields {
                type_l1: w.threat_type_l1,
                type_l2: w.threat_type_l2,
                type_l3: w.threat_type_l3,
                management: w.threat_management,
                impact: w.threat_impact,
                coping_abilities: w.threat_coping_abilities,
                description: w.threat_description,
            },
            error: CategoryFields {
                type_l1: w.error_type_l1,
                type_l2: w.error_type_l2,
                type_l3: w.error_type_l3,
                management: w.error_management,
                impact: w.error_impact,
                coping_abilities: w.error_coping_abilities,
                description: w.error_description,
            },
            uas: CategoryFields {
                type_l1: w.uas_type_l1,
                type_l2: w.uas_type_l2,
                type_l3: w.uas_type_l3,
                management: w.uas_management,
                impact: w.uas_impact,
                coping_abilities: w.uas_coping_abilities,
                description: w.uas_description,
            },
            uas_applicable: w.uas_applicable,
            uas_relevance: w.uas_relevance,
            error_relevance: w.error_relevance,
            calculated_threat_topics: w.calculated_threat_topics,
            calculated_error_topics: w.calculated_error_topics,
            calculated_uas_topics: w.calculated_uas_topics,
        }
    }
}

impl From<AnnotationRecord> for RecordWire {
    fn from(r: AnnotationRecord) -> Self {
        Self {
            id: r.id,
            task_id: r.task_id,
            threat_type_l1: r.threat.type_l1,
            threat_type_l2: r.threat.type_l2,
            threat_type_l3: r.threat.type_l3,
            threat_management: r.threat.management,
            threat_impact: r.threat.impact,
            threat_coping_abilities: r.threat.coping_abilities,
            threat_description: r.threat.description,
            error_type_l1: r.error.type_l1,
            error_type_l2: r.error.type_l2,
            error_type_l3: r.error.type_l3,
            error_management: r.error.management,
            error_impact: r.error.impact,
            error_coping_abilities: r.error.coping_abilities,
            error_description: r.error.description,
            uas_type_l1: r.uas.type_l1,
            uas_type_l2: r.uas.type_l2,
            uas_type_l3: r.uas.type_l3,
            uas_management: r.uas.management,
            uas_impact: r.uas.impact,
            uas_coping_abilities: r.uas.coping_abilities,
            uas_description: r.uas.description,
            uas_applicable: r.uas_applicable,
            uas_relevance: r.uas_relevance,
            error_relevance: r.error_relevance,
            calculated_threat_topics: r.calculated_threat_topics,
            calculated_error_topics: r.calculated_error_topics,
            calculated_uas_topics: r.calculated_uas_topics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::LegacyShape;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn new_record_is_canonical() {
        let record = AnnotationRecord::new(TaskId::new("t-1"));
        for category in Category::ALL {
            assert!(record.fields(category).is_well_shaped());
            assert!(record.fields(category).is_blank());
        }
        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["threat_management"], json!({}));
        assert_eq!(wire["uas_coping_abilities"], json!({"values": []}));
        assert_eq!(wire["threat_type_l1"], json!(null));
        assert!(wire.get("id").is_none());
    }

    #[test]
    fn reads_legacy_shapes_without_failing() {
        let record: AnnotationRecord = serde_json::from_value(json!({
            "id": 12,
            "task_id": "t-9",
            "threat_management": [],
            "threat_impact": null,
            "error_type_l1": 7,
        }))
        .unwrap();

        assert_eq!(record.id, Some(RecordId(12)));
        assert_eq!(
            record.threat.management,
            Shaped::Legacy(LegacyShape::Array(vec![]))
        );
        assert_eq!(record.threat.impact, Shaped::Legacy(LegacyShape::Null));
        assert!(record.threat.coping_abilities.is_missing());
        assert_eq!(record.error.type_l1, Some(OptionId(7)));
        assert!(!record.threat.is_well_shaped());
    }

    #[test]
    fn effective_patch_skips_no_op_updates() {
        let mut record = AnnotationRecord::new(TaskId::new("t-1"));
        record.threat.description = "same".into();

        let patch = RecordPatch::new()
            .with(FieldUpdate::Description {
                category: Category::Threat,
                text: "same".into(),
            })
            .with(FieldUpdate::Type {
                category: Category::Threat,
                level: TaxonomyLevel::L2,
                id: None,
            })
            .with(FieldUpdate::UasApplicable(true));

        let effective = record.effective(&patch);
        assert_eq!(effective.keys().collect::<Vec<_>>(), vec![FieldKey::UasApplicable]);
    }

    #[test]
    fn canonical_update_differs_from_legacy_value() {
        let mut record = AnnotationRecord::new(TaskId::new("t-1"));
        record.error.management = Shaped::Legacy(LegacyShape::Null);
        let update = FieldUpdate::Management {
            category: Category::Error,
            value: Selection::unset(),
        };
        assert!(record.differs(&update));
        record.apply_update(&update);
        assert!(!record.differs(&update));
    }

    #[test]
    fn deepest_selected_prefers_level_three() {
        let mut fields = CategoryFields::default();
        assert_eq!(fields.deepest_selected(), None);
        fields.type_l1 = Some(OptionId(1));
        fields.type_l2 = Some(OptionId(2));
        assert_eq!(
            fields.deepest_selected(),
            Some((TaxonomyLevel::L2, OptionId(2)))
        );
    }
}
