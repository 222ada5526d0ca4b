//! Cross-category relevance
//!
//! `uas_applicable` holds exactly when the threat impact is
//! [`THREAT_LEADS_TO_UAS`] or the error impact is [`ERROR_LEADS_TO_UAS`].
//! Either category alone justifies the UAS annotation, so when one trigger
//! goes away the UAS fields are cleared only if the other is not holding.
//!
//! Threat impacts also feed `error_relevance`: becoming
//! [`THREAT_LEADS_TO_ERROR`] fills an empty reason with [`ERROR_FROM_THREAT`],
//! and leaving it clears the reason only while it still holds that code.

use tem_model::{
    AnnotationRecord, Category, CopingAbilities, FieldUpdate, RecordPatch, Selection,
    TaxonomyLevel,
};

/// Threat impact that makes the UAS category applicable
pub const THREAT_LEADS_TO_UAS: &str = "leads_to_uas_t";
/// Error impact that makes the UAS category applicable
pub const ERROR_LEADS_TO_UAS: &str = "leads_to_uas_e";
/// Threat impact that makes the error category relevant
pub const THREAT_LEADS_TO_ERROR: &str = "leads_to_error";
/// `uas_relevance` reason set by a threat trigger
pub const UAS_FROM_THREAT: &str = "from_threat";
/// `uas_relevance` reason set by an error trigger
pub const UAS_FROM_ERROR: &str = "from_error";
/// `error_relevance` reason set by a threat trigger
pub const ERROR_FROM_THREAT: &str = "from_threat";

/// Derives UAS applicability and relevance reasons from impact changes
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevancePropagation;

impl RelevancePropagation {
    /// Impact value of `category` that triggers UAS, with its reason code
    #[must_use]
    pub fn uas_trigger(category: Category) -> Option<(&'static str, &'static str)> {
        match category {
            Category::Threat => Some((THREAT_LEADS_TO_UAS, UAS_FROM_THREAT)),
            Category::Error => Some((ERROR_LEADS_TO_UAS, UAS_FROM_ERROR)),
            Category::Uas => None,
        }
    }

    /// Whether `impact` on `category` makes UAS applicable
    #[must_use]
    pub fn triggers_uas(category: Category, impact: Option<&str>) -> bool {
        matches!(
            (Self::uas_trigger(category), impact),
            (Some((trigger, _)), Some(value)) if trigger == value
        )
    }

    /// Whether either category currently makes UAS applicable
    #[must_use]
    pub fn uas_triggered(record: &AnnotationRecord) -> bool {
        [Category::Threat, Category::Error]
            .into_iter()
            .any(|c| Self::triggers_uas(c, record.impact_value(c)))
    }

    /// Follow-up patch for an impact change on `category`
    ///
    /// `record` already carries the new impact; `before` is the value it
    /// replaced. Returns an empty patch for the uas category or when the
    /// value did not change.
    #[must_use]
    pub fn on_impact_change(
        record: &AnnotationRecord,
        category: Category,
        before: Option<&str>,
    ) -> RecordPatch {
        let after = record.impact_value(category);
        let mut patch = RecordPatch::new();
        let Some((trigger, reason)) = Self::uas_trigger(category) else {
            return patch;
        };
        if before == after {
            return patch;
        }

        if category == Category::Threat {
            patch.merge(Self::error_relevance(record, before, after));
        }

        if after == Some(trigger) {
            tracing::debug!(%category, reason, "impact makes uas applicable");
            patch.push(FieldUpdate::UasApplicable(true));
            patch.push(FieldUpdate::UasRelevance(reason.to_string()));
            return patch;
        }

        let other = match category {
            Category::Threat => Category::Error,
            _ => Category::Threat,
        };
        if Self::triggers_uas(other, record.impact_value(other)) {
            tracing::debug!(%category, %other, "uas still justified by other category");
        } else if !Self::uas_is_clear(record) {
            tracing::debug!(%category, "no uas trigger left, clearing uas fields");
            patch.merge(Self::clear_uas());
        }
        patch
    }

    fn error_relevance(
        record: &AnnotationRecord,
        before: Option<&str>,
        after: Option<&str>,
    ) -> RecordPatch {
        let mut patch = RecordPatch::new();
        let was = before == Some(THREAT_LEADS_TO_ERROR);
        let is = after == Some(THREAT_LEADS_TO_ERROR);
        if is && !was && record.error_relevance.is_empty() {
            patch.push(FieldUpdate::ErrorRelevance(ERROR_FROM_THREAT.to_string()));
        } else if was && !is && record.error_relevance == ERROR_FROM_THREAT {
            patch.push(FieldUpdate::ErrorRelevance(String::new()));
        }
        patch
    }

    /// Whether every uas field already holds its empty value
    #[must_use]
    pub fn uas_is_clear(record: &AnnotationRecord) -> bool {
        !record.uas_applicable && record.uas_relevance.is_empty() && record.uas.is_blank()
    }

    /// Patch resetting every uas field to its canonical empty value
    #[must_use]
    pub fn clear_uas() -> RecordPatch {
        let category = Category::Uas;
        let mut patch = RecordPatch::new()
            .with(FieldUpdate::UasApplicable(false))
            .with(FieldUpdate::UasRelevance(String::new()));
        for level in TaxonomyLevel::ALL {
            patch.push(FieldUpdate::Type {
                category,
                level,
                id: None,
            });
        }
        patch
            .with(FieldUpdate::Management {
                category,
                value: Selection::unset(),
            })
            .with(FieldUpdate::Impact {
                category,
                value: Selection::unset(),
            })
            .with(FieldUpdate::CopingAbilities {
                category,
                value: CopingAbilities::default(),
            })
            .with(FieldUpdate::Description {
                category,
                text: String::new(),
            })
    }
}
