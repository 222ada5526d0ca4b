//! Training topic derivation
//!
//! Each category's topics are those of its deepest selected taxonomy node.
//! The combined list is their union in threat, error, uas order with later
//! duplicates dropped. Derivation is pure and re-run after every selection
//! change; the `calculated_*_topics` fields are never edited directly.

use crate::taxonomy::{TaxonomyCatalog, TaxonomyTree};
use indexmap::IndexSet;
use serde::Serialize;
use tem_model::{
    AnnotationRecord, Category, CategoryFields, FieldUpdate, RecordPatch, TaxonomyLevel,
};

/// Derived topics of one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivedTopics {
    /// Topics of the threat selection
    pub threat: Vec<String>,
    /// Topics of the error selection
    pub error: Vec<String>,
    /// Topics of the uas selection
    pub uas: Vec<String>,
    /// Deduplicated union, first occurrence wins
    pub combined: Vec<String>,
}

impl DerivedTopics {
    /// Topics of `category`
    #[inline]
    #[must_use]
    pub fn get(&self, category: Category) -> &[String] {
        match category {
            Category::Threat => &self.threat,
            Category::Error => &self.error,
            Category::Uas => &self.uas,
        }
    }

    /// Updates bringing `record`'s calculated fields in line with these topics
    #[must_use]
    pub fn patch_against(&self, record: &AnnotationRecord) -> RecordPatch {
        Category::ALL
            .into_iter()
            .filter(|&c| record.calculated_topics(c) != self.get(c))
            .map(|category| FieldUpdate::CalculatedTopics {
                category,
                topics: self.get(category).to_vec(),
            })
            .collect()
    }
}

/// Computes [`DerivedTopics`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrainingTopicAggregator;

impl TrainingTopicAggregator {
    /// Topics of the deepest selected node of `fields`
    ///
    /// A selected id missing from the tree is skipped in favour of the next
    /// shallower selection.
    #[must_use]
    pub fn topics_for(tree: &TaxonomyTree, fields: &CategoryFields) -> Vec<String> {
        TaxonomyLevel::ALL
            .iter()
            .rev()
            .filter_map(|&level| fields.type_at(level))
            .find_map(|id| {
                let node = tree.by_id(id);
                if node.is_none() {
                    tracing::debug!(category = %tree.category(), %id, "selected node not in taxonomy");
                }
                node
            })
            .map(|node| node.training_topics.clone())
            .unwrap_or_default()
    }

    /// Topics of every category of `record`
    #[must_use]
    pub fn derive(catalog: &TaxonomyCatalog, record: &AnnotationRecord) -> DerivedTopics {
        let per = |c: Category| Self::topics_for(catalog.tree(c), record.fields(c));
        let threat = per(Category::Threat);
        let error = per(Category::Error);
        let uas = per(Category::Uas);
        let combined = Self::combine([&threat, &error, &uas]);
        DerivedTopics {
            threat,
            error,
            uas,
            combined,
        }
    }

    /// Order-stable union of `lists`
    #[must_use]
    pub fn combine<'a>(lists: impl IntoIterator<Item = &'a Vec<String>>) -> Vec<String> {
        lists
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<IndexSet<&str>>()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tem_model::{DropdownOption, OptionId, TaskId};

    fn catalog() -> TaxonomyCatalog {
        let mut options = HashMap::new();
        options.insert(
            Category::Threat,
            vec![
                DropdownOption::new(1, "TE", "Environmental", TaxonomyLevel::L1)
                    .with_topics(["weather awareness"]),
                DropdownOption::new(2, "TE-01", "Weather", TaxonomyLevel::L2).with_parent(1),
                DropdownOption::new(3, "TE-01-A", "Thunderstorm", TaxonomyLevel::L3)
                    .with_parent(2)
                    .with_topics(["convective weather", "decision making"]),
            ],
        );
        options.insert(
            Category::Error,
            vec![
                DropdownOption::new(10, "EH", "Handling", TaxonomyLevel::L1),
                DropdownOption::new(11, "EH-01", "Manual", TaxonomyLevel::L2).with_parent(10),
                DropdownOption::new(12, "EH-01-A", "Flare", TaxonomyLevel::L3)
                    .with_parent(11)
                    .with_topics(["decision making", "manual flying"]),
            ],
        );
        TaxonomyCatalog::from_options(options)
    }

    #[test]
    fn deepest_node_wins_and_combined_dedups() {
        let mut record = AnnotationRecord::new(TaskId::new("t-1"));
        record.threat.type_l1 = Some(OptionId(1));
        record.threat.type_l2 = Some(OptionId(2));
        record.threat.type_l3 = Some(OptionId(3));
        record.error.type_l1 = Some(OptionId(10));
        record.error.type_l2 = Some(OptionId(11));
        record.error.type_l3 = Some(OptionId(12));

        let topics = TrainingTopicAggregator::derive(&catalog(), &record);
        assert_eq!(topics.threat, vec!["convective weather", "decision making"]);
        assert_eq!(
            topics.combined,
            vec!["convective weather", "decision making", "manual flying"]
        );
        assert!(topics.uas.is_empty());
    }

    #[test]
    fn shallower_selection_uses_its_own_topics() {
        let mut record = AnnotationRecord::new(TaskId::new("t-1"));
        record.threat.type_l1 = Some(OptionId(1));
        let topics = TrainingTopicAggregator::derive(&catalog(), &record);
        assert_eq!(topics.threat, vec!["weather awareness"]);

        record.threat.type_l2 = Some(OptionId(2));
        let topics = TrainingTopicAggregator::derive(&catalog(), &record);
        assert!(topics.threat.is_empty());
    }

    #[test]
    fn unknown_ids_fall_back_to_shallower_level() {
        let mut record = AnnotationRecord::new(TaskId::new("t-1"));
        record.threat.type_l1 = Some(OptionId(1));
        record.threat.type_l2 = Some(OptionId(99));
        let topics = TrainingTopicAggregator::derive(&catalog(), &record);
        assert_eq!(topics.threat, vec!["weather awareness"]);
    }

    #[test]
    fn patch_only_touches_stale_categories() {
        let mut record = AnnotationRecord::new(TaskId::new("t-1"));
        record.threat.type_l1 = Some(OptionId(1));
        let topics = TrainingTopicAggregator::derive(&catalog(), &record);
        let patch = topics.patch_against(&record);
        assert_eq!(patch.len(), 1);
        record.apply(&patch);
        assert!(topics.patch_against(&record).is_empty());
    }
}
