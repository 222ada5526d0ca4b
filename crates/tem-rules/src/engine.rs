//! Edit pipeline
//!
//! [`AnnotationEngine::apply`] turns one raw patch into the complete,
//! consistent update of the record, in a single synchronous step:
//!
//! 1. legacy shapes are repaired ([`DataShapeGuard`])
//! 2. edits the user may not make directly are dropped
//! 3. taxonomy edits are cascaded ([`TaxonomySelection`])
//! 4. management edits rewrite impact ([`ImpactRuleTable`])
//! 5. impact changes propagate to uas and error relevance ([`RelevancePropagation`])
//! 6. derived topics are recomputed ([`TrainingTopicAggregator`])
//!
//! The returned patch holds only the fields whose value actually changed.

use crate::impact::{ImpactControl, ImpactRuleTable};
use crate::relevance::RelevancePropagation;
use crate::selection::TaxonomySelection;
use crate::shape_guard::DataShapeGuard;
use crate::taxonomy::TaxonomyCatalog;
use crate::topics::{DerivedTopics, TrainingTopicAggregator};
use std::sync::Arc;
use tem_model::{AnnotationRecord, Category, FieldKey, FieldUpdate, RecordPatch};

/// Result of running one edit through the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    /// Record after the edit
    pub record: AnnotationRecord,
    /// Fields that changed, in application order
    pub patch: RecordPatch,
    /// Whether a legacy shape repair was part of the edit
    pub repaired: bool,
    /// Derived topics of the new record
    pub topics: DerivedTopics,
}

impl EditOutcome {
    /// Whether the edit left the record unchanged
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.patch.is_empty()
    }
}

/// Shared rules of one editing session
#[derive(Debug, Clone)]
pub struct AnnotationEngine {
    catalog: Arc<TaxonomyCatalog>,
    rules: Arc<ImpactRuleTable>,
}

impl AnnotationEngine {
    /// Engine over a taxonomy catalog and rule table
    #[must_use]
    pub fn new(catalog: Arc<TaxonomyCatalog>, rules: Arc<ImpactRuleTable>) -> Self {
        Self { catalog, rules }
    }

    /// Taxonomy catalog
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &TaxonomyCatalog {
        &self.catalog
    }

    /// Impact rule table
    #[inline]
    #[must_use]
    pub fn rules(&self) -> &ImpactRuleTable {
        &self.rules
    }

    /// Selection logic for `category`
    #[inline]
    #[must_use]
    pub fn selection(&self, category: Category) -> TaxonomySelection<'_> {
        TaxonomySelection::new(self.catalog.tree(category))
    }

    /// Impact control for `record`'s current management value
    #[must_use]
    pub fn impact_control(&self, record: &AnnotationRecord, category: Category) -> ImpactControl {
        self.rules.resolve(category, record.management_value(category))
    }

    /// Prepare a freshly fetched record
    ///
    /// Repairs legacy shapes and refreshes derived topics. Only the repair is
    /// reported in the outcome's patch; refreshed topics alone do not make the
    /// record dirty.
    #[must_use]
    pub fn load(&self, mut record: AnnotationRecord) -> EditOutcome {
        let repair = DataShapeGuard::inspect_all(&record).unwrap_or_default();
        let patch = record.effective(&repair);
        record.apply(&patch);

        let topics = TrainingTopicAggregator::derive(&self.catalog, &record);
        record.apply(&topics.patch_against(&record));

        EditOutcome {
            record,
            repaired: !patch.is_empty(),
            patch,
            topics,
        }
    }

    /// Run `patch` through the full pipeline against `current`
    #[must_use]
    pub fn apply(&self, current: &AnnotationRecord, patch: RecordPatch) -> EditOutcome {
        let repair = DataShapeGuard::inspect_all(current);
        let repaired = repair.is_some();
        let mut combined = repair.unwrap_or_default();
        let before = current.patched(&combined);

        let mut patch = self.sanitize(&before, patch);
        self.cascade(&before, &mut patch);
        self.apply_management_rules(&before, &mut patch);
        combined.merge(patch);

        let mut after = current.patched(&combined);
        for category in [Category::Threat, Category::Error] {
            let previous = before.impact_value(category);
            if previous != after.impact_value(category) {
                let follow_up = RelevancePropagation::on_impact_change(&after, category, previous);
                after.apply(&follow_up);
                combined.merge(follow_up);
            }
        }

        let topics = TrainingTopicAggregator::derive(&self.catalog, &after);
        let topic_patch = topics.patch_against(&after);
        after.apply(&topic_patch);
        combined.merge(topic_patch);

        let effective = current.effective(&combined);
        tracing::debug!(
            task = %current.task_id,
            fields = effective.len(),
            repaired,
            "edit applied"
        );
        EditOutcome {
            record: after,
            patch: effective,
            repaired,
            topics,
        }
    }

    /// Drop updates that only the engine may make
    ///
    /// An impact edit alongside a management edit is settled later by
    /// [`Self::apply_management_rules`].
    fn sanitize(&self, record: &AnnotationRecord, mut patch: RecordPatch) -> RecordPatch {
        let management_edited: Vec<Category> = Category::ALL
            .into_iter()
            .filter(|&c| patch.contains(FieldKey::Management(c)))
            .collect();
        patch.retain(|update| {
            let keep = match update {
                FieldUpdate::CalculatedTopics { .. } | FieldUpdate::UasApplicable(_) => false,
                FieldUpdate::UasRelevance(_) => record.uas_applicable,
                FieldUpdate::Impact { category, value } => {
                    management_edited.contains(category)
                        || self.impact_edit_allowed(record, *category, value.value())
                }
                _ => true,
            };
            if !keep {
                tracing::warn!(field = %update.key(), "dropping edit the rules do not allow");
            }
            keep
        });
        patch
    }

    fn impact_edit_allowed(
        &self,
        record: &AnnotationRecord,
        category: Category,
        value: Option<&str>,
    ) -> bool {
        let control = self.impact_control(record, category);
        match value {
            Some(value) => control.allows(value),
            None => !control.is_locked() || control == ImpactControl::Disabled,
        }
    }

    /// Replace raw taxonomy updates with their cascaded form
    fn cascade(&self, record: &AnnotationRecord, patch: &mut RecordPatch) {
        for category in Category::ALL {
            let Some(normalized) = self
                .selection(category)
                .normalize(record.fields(category), patch)
            else {
                continue;
            };
            patch.retain(|update| {
                !matches!(update, FieldUpdate::Type { category: c, .. } if *c == category)
            });
            patch.merge(normalized);
        }
    }

    /// Expand management edits with the impact they imply
    ///
    /// An explicit impact in the same patch survives only when the new
    /// control is open and offers it.
    fn apply_management_rules(&self, record: &AnnotationRecord, patch: &mut RecordPatch) {
        for category in Category::ALL {
            let Some(FieldUpdate::Management { value, .. }) =
                patch.get(FieldKey::Management(category)).cloned()
            else {
                continue;
            };
            let explicit = patch.remove(FieldKey::Impact(category));
            if record.fields(category).management.valid() == Some(&value) && explicit.is_none() {
                continue;
            }

            let control = self.rules.resolve(category, value.value());
            let mut rule_patch = self.rules.on_management_change(category, value);
            if let Some(FieldUpdate::Impact { value: chosen, .. }) = explicit {
                if chosen.value().is_some_and(|v| control.allows(v))
                    && matches!(control, ImpactControl::Open { .. })
                {
                    rule_patch.push(FieldUpdate::Impact {
                        category,
                        value: chosen,
                    });
                } else {
                    tracing::warn!(%category, "impact edit overridden by management rule");
                }
            }
            patch.merge(rule_patch);
        }
    }
}
