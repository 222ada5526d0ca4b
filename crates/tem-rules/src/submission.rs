//! Submission readiness
//!
//! Autosave accepts any partial record; submission requires each applicable
//! category to be fully annotated. Threat is always applicable, error when
//! anything in it (or `error_relevance`) is filled in, uas when
//! `uas_applicable` is set.

use crate::error::{MissingField, RequiredField, ValidationError};
use crate::impact::{ImpactControl, ImpactRuleTable};
use crate::taxonomy::TaxonomyCatalog;
use tem_model::{AnnotationRecord, Category};

/// Categories a submission must cover
#[must_use]
pub fn required_categories(record: &AnnotationRecord) -> Vec<Category> {
    Category::ALL
        .into_iter()
        .filter(|&category| match category {
            Category::Threat => true,
            Category::Error => !record.error.is_blank() || !record.error_relevance.is_empty(),
            Category::Uas => record.uas_applicable,
        })
        .collect()
}

/// Check `record` is complete enough to submit
///
/// # Errors
///
/// Returns [`ValidationError`] listing every missing field.
pub fn validate_submission(
    record: &AnnotationRecord,
    catalog: &TaxonomyCatalog,
    rules: &ImpactRuleTable,
) -> Result<(), ValidationError> {
    let mut missing = Vec::new();
    for category in required_categories(record) {
        let fields = record.fields(category);
        let mut require = |ok: bool, field: RequiredField| {
            if !ok {
                missing.push(MissingField { category, field });
            }
        };

        let tree = catalog.tree(category);
        let leaf_selected = fields
            .deepest_selected()
            .is_some_and(|(_, id)| !tree.has_children(id));
        require(leaf_selected, RequiredField::Taxonomy);

        let management = fields.management.value();
        require(management.is_some(), RequiredField::Management);

        let impact_needed = rules.resolve(category, management) != ImpactControl::Disabled;
        require(
            !impact_needed || fields.impact.value().is_some(),
            RequiredField::Impact,
        );

        require(
            !fields.description.trim().is_empty(),
            RequiredField::Description,
        );
    }

    if missing.is_empty() {
        Ok(())
    } else {
        tracing::debug!(count = missing.len(), task = %record.task_id, "record not ready for submission");
        Err(ValidationError { missing })
    }
}
