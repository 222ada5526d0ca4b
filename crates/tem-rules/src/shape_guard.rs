//! Legacy shape normalization
//!
//! Historical records may store `management`, `impact` or `coping_abilities`
//! as arrays, `null`, or not at all. Before any rule reads these fields the
//! guard rewrites all three of a category to their canonical empty shapes.
//! A category is always repaired as a whole, never field by field.

use tem_model::{
    AnnotationRecord, Category, CategoryFields, CopingAbilities, FieldUpdate, RecordPatch,
    Selection,
};

/// Detects and repairs malformed structured fields
#[derive(Debug, Clone, Copy, Default)]
pub struct DataShapeGuard;

impl DataShapeGuard {
    /// Whether any structured field of `fields` is malformed
    #[inline]
    #[must_use]
    pub fn needs_repair(fields: &CategoryFields) -> bool {
        !fields.is_well_shaped()
    }

    /// Canonical empty shapes for one category
    #[must_use]
    pub fn repair_patch(category: Category) -> RecordPatch {
        RecordPatch::new()
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
    }

    /// Repair patch for `category`, if it needs one
    #[must_use]
    pub fn inspect(record: &AnnotationRecord, category: Category) -> Option<RecordPatch> {
        Self::needs_repair(record.fields(category)).then(|| {
            tracing::info!(%category, task = %record.task_id, "normalizing legacy field shapes");
            Self::repair_patch(category)
        })
    }

    /// Repair patch covering every malformed category; `None` when all are canonical
    #[must_use]
    pub fn inspect_all(record: &AnnotationRecord) -> Option<RecordPatch> {
        let mut patch = RecordPatch::new();
        for category in Category::ALL {
            if let Some(repair) = Self::inspect(record, category) {
                patch.merge(repair);
            }
        }
        (!patch.is_empty()).then_some(patch)
    }
}
