//! Cascading taxonomy selection
//!
//! Per category the selection is the triple (l1, l2, l3). A non-null level
//! implies every enclosing level is non-null and forms a parent chain in the
//! tree. Acting at a level always resets the deeper levels in the same patch:
//!
//! | action          | l1         | l2         | l3     |
//! |-----------------|------------|------------|--------|
//! | select level 1  | node       | null       | null   |
//! | select level 2  | unchanged* | node       | null   |
//! | select level 3  | unchanged* | unchanged* | node   |
//! | clear           | null       | null       | null   |
//!
//! \* unless the current ancestors disagree with the node's path in the tree,
//! in which case they are realigned to that path in the same patch.

use crate::taxonomy::TaxonomyTree;
use tem_model::{
    Category, CategoryFields, DropdownOption, FieldKey, FieldUpdate, OptionId, RecordPatch,
    TaxonomyLevel,
};

/// Cascade logic for one category's tree
#[derive(Debug, Clone, Copy)]
pub struct TaxonomySelection<'a> {
    tree: &'a TaxonomyTree,
}

impl<'a> TaxonomySelection<'a> {
    /// Selection over `tree`
    #[inline]
    #[must_use]
    pub fn new(tree: &'a TaxonomyTree) -> Self {
        Self { tree }
    }

    /// Category being selected
    #[inline]
    #[must_use]
    pub fn category(&self) -> Category {
        self.tree.category()
    }

    /// Patch selecting node `id` at its own level
    ///
    /// Unknown ids produce an empty patch. An orphan node cannot be realigned,
    /// so it is set only when every enclosing level is already selected.
    #[must_use]
    pub fn select(&self, current: &CategoryFields, id: OptionId) -> RecordPatch {
        let category = self.category();
        let Some(node) = self.tree.by_id(id) else {
            tracing::warn!(%category, %id, "ignoring selection of unknown taxonomy node");
            return RecordPatch::new();
        };

        let mut patch = RecordPatch::new();
        if self.tree.is_attached(id) {
            for ancestor in self.tree.path_of(id).iter().filter(|n| n.id != id) {
                if current.type_at(ancestor.level) != Some(ancestor.id) {
                    patch.push(type_update(category, ancestor.level, Some(ancestor.id)));
                }
            }
        } else if Self::enclosing_selected(current, &[], node.level) {
            tracing::debug!(%category, %id, "selecting orphan node without ancestor alignment");
        } else {
            tracing::warn!(%category, %id, "ignoring orphan node with unselected ancestors");
            return RecordPatch::new();
        }
        patch.merge(Self::cascade_at(category, node.level, Some(id)));
        patch
    }

    /// Patch selecting the node with `code`
    #[must_use]
    pub fn select_code(&self, current: &CategoryFields, code: &str) -> RecordPatch {
        match self.tree.by_code(code) {
            Some(node) => self.select(current, node.id),
            None => {
                tracing::warn!(category = %self.category(), code, "ignoring selection of unknown taxonomy code");
                RecordPatch::new()
            }
        }
    }

    /// Patch clearing all three levels
    #[must_use]
    pub fn clear(category: Category) -> RecordPatch {
        Self::cascade_at(category, TaxonomyLevel::L1, None)
    }

    /// Patch setting `level` to `id` and nulling every deeper level
    #[must_use]
    pub fn cascade_at(category: Category, level: TaxonomyLevel, id: Option<OptionId>) -> RecordPatch {
        let mut patch = RecordPatch::new().with(type_update(category, level, id));
        for &deeper in level.deeper() {
            patch.push(type_update(category, deeper, None));
        }
        patch
    }

    /// Canonical replacement for the raw taxonomy updates of this category in
    /// `patch`, or `None` if the patch has none
    ///
    /// The deepest non-null update is treated as a selection of that node;
    /// when every update is a null, the shallowest one clears downwards.
    #[must_use]
    pub fn normalize(&self, current: &CategoryFields, patch: &RecordPatch) -> Option<RecordPatch> {
        let category = self.category();
        let raw: Vec<(TaxonomyLevel, Option<OptionId>)> = TaxonomyLevel::ALL
            .iter()
            .filter_map(|&level| match patch.get(FieldKey::Type(category, level)) {
                Some(FieldUpdate::Type { id, .. }) => Some((level, *id)),
                _ => None,
            })
            .collect();

        if raw.is_empty() {
            return None;
        }

        let deepest_set = raw
            .iter()
            .rev()
            .find_map(|&(level, id)| id.map(|id| (level, id)));

        let normalized = match deepest_set {
            Some((level, id)) => match self.tree.by_id(id) {
                Some(node) if node.level != level => {
                    tracing::warn!(%category, %id, expected = level.depth(), actual = node.level.depth(), "dropping taxonomy node used at the wrong level");
                    RecordPatch::new()
                }
                Some(_) if self.tree.is_attached(id) => self.select(current, id),
                _ => self.detached(current, &raw, level, id),
            },
            None => {
                let (shallowest, _) = raw[0];
                Self::cascade_at(category, shallowest, None)
            }
        };
        Some(normalized)
    }

    /// Patch for an id whose ancestry the tree cannot confirm
    ///
    /// Kept only when every enclosing level ends up selected, taking the raw
    /// updates of the same patch over `current`.
    fn detached(
        &self,
        current: &CategoryFields,
        raw: &[(TaxonomyLevel, Option<OptionId>)],
        level: TaxonomyLevel,
        id: OptionId,
    ) -> RecordPatch {
        let category = self.category();
        if !Self::enclosing_selected(current, raw, level) {
            tracing::warn!(%category, %id, level = level.depth(), "dropping taxonomy id without selected ancestors");
            return RecordPatch::new();
        }
        let mut patch = RecordPatch::new();
        for &(outer, outer_id) in raw.iter().filter(|(l, _)| l.depth() < level.depth()) {
            patch.push(type_update(category, outer, outer_id));
        }
        patch.merge(Self::cascade_at(category, level, Some(id)));
        patch
    }

    fn enclosing_selected(
        current: &CategoryFields,
        raw: &[(TaxonomyLevel, Option<OptionId>)],
        level: TaxonomyLevel,
    ) -> bool {
        TaxonomyLevel::ALL
            .iter()
            .filter(|outer| outer.depth() < level.depth())
            .all(|&outer| {
                raw.iter()
                    .find(|(l, _)| *l == outer)
                    .map_or(current.type_at(outer), |&(_, id)| id)
                    .is_some()
            })
    }

    /// Options for the dropdown at `level`, given the current selection
    #[must_use]
    pub fn options_at(&self, current: &CategoryFields, level: TaxonomyLevel) -> Vec<&'a DropdownOption> {
        match level.parent() {
            None => self.tree.roots(),
            Some(parent_level) => current
                .type_at(parent_level)
                .map(|parent| self.tree.children_of(Some(parent), level))
                .unwrap_or_default(),
        }
    }
}

fn type_update(category: Category, level: TaxonomyLevel, id: Option<OptionId>) -> FieldUpdate {
    FieldUpdate::Type {
        category,
        level,
        id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tem_model::DropdownOption;

    fn tree() -> TaxonomyTree {
        TaxonomyTree::new(
            Category::Threat,
            vec![
                DropdownOption::new(1, "TE", "Environmental", TaxonomyLevel::L1),
                DropdownOption::new(2, "TE-01", "Weather", TaxonomyLevel::L2).with_parent(1),
                DropdownOption::new(3, "TE-01-A", "Thunderstorm", TaxonomyLevel::L3).with_parent(2),
                DropdownOption::new(4, "TC", "Crew", TaxonomyLevel::L1),
                DropdownOption::new(5, "TC-01", "Fatigue", TaxonomyLevel::L2).with_parent(4),
                DropdownOption::new(6, "TC-01-A", "Long duty", TaxonomyLevel::L3).with_parent(5),
                DropdownOption::new(7, "TE-02", "Terrain", TaxonomyLevel::L2).with_parent(1),
            ],
        )
    }

    fn selected(l1: i64, l2: i64, l3: i64) -> CategoryFields {
        CategoryFields {
            type_l1: Some(OptionId(l1)),
            type_l2: Some(OptionId(l2)),
            type_l3: Some(OptionId(l3)),
            ..CategoryFields::default()
        }
    }

    #[test]
    fn level_one_resets_deeper_levels() {
        let tree = tree();
        let patch = TaxonomySelection::new(&tree).select(&selected(1, 2, 3), OptionId(4));
        assert_eq!(
            patch.to_json(),
            json!({"threat_type_l1": 4, "threat_type_l2": null, "threat_type_l3": null})
        );
    }

    #[test]
    fn level_two_resets_level_three() {
        let tree = tree();
        let patch = TaxonomySelection::new(&tree).select(&selected(1, 2, 3), OptionId(7));
        assert_eq!(
            patch.to_json(),
            json!({"threat_type_l2": 7, "threat_type_l3": null})
        );
    }

    #[test]
    fn level_three_changes_only_level_three() {
        let tree = tree();
        let mut current = selected(1, 2, 3);
        current.type_l3 = None;
        let patch = TaxonomySelection::new(&tree).select(&current, OptionId(3));
        assert_eq!(patch.to_json(), json!({"threat_type_l3": 3}));
    }

    #[test]
    fn misaligned_ancestors_are_realigned() {
        let tree = tree();
        let patch = TaxonomySelection::new(&tree).select(&selected(1, 2, 3), OptionId(6));
        assert_eq!(
            patch.to_json(),
            json!({"threat_type_l1": 4, "threat_type_l2": 5, "threat_type_l3": 6})
        );
    }

    #[test]
    fn clear_nulls_everything() {
        assert_eq!(
            TaxonomySelection::clear(Category::Threat).to_json(),
            json!({"threat_type_l1": null, "threat_type_l2": null, "threat_type_l3": null})
        );
    }

    #[test]
    fn select_by_code_and_unknown_inputs() {
        let tree = tree();
        let sel = TaxonomySelection::new(&tree);
        let current = CategoryFields::default();
        assert_eq!(
            sel.select_code(&current, "TC").to_json(),
            json!({"threat_type_l1": 4, "threat_type_l2": null, "threat_type_l3": null})
        );
        assert!(sel.select_code(&current, "ZZ").is_empty());
        assert!(sel.select(&current, OptionId(99)).is_empty());
    }

    #[test]
    fn normalize_cascades_raw_level_one_edit() {
        let tree = tree();
        let raw = RecordPatch::from_json(&json!({"threat_type_l1": 4})).unwrap();
        let normalized = TaxonomySelection::new(&tree)
            .normalize(&selected(1, 2, 3), &raw)
            .unwrap();
        assert_eq!(
            normalized.to_json(),
            json!({"threat_type_l1": 4, "threat_type_l2": null, "threat_type_l3": null})
        );
    }

    #[test]
    fn normalize_clears_from_shallowest_null() {
        let tree = tree();
        let raw = RecordPatch::from_json(&json!({"threat_type_l2": null})).unwrap();
        let normalized = TaxonomySelection::new(&tree)
            .normalize(&selected(1, 2, 3), &raw)
            .unwrap();
        assert_eq!(
            normalized.to_json(),
            json!({"threat_type_l2": null, "threat_type_l3": null})
        );
    }

    #[test]
    fn normalize_keeps_unknown_ids_under_selected_ancestors() {
        let tree = tree();
        let raw = RecordPatch::from_json(&json!({"threat_type_l2": 500})).unwrap();
        let normalized = TaxonomySelection::new(&tree)
            .normalize(&selected(1, 2, 3), &raw)
            .unwrap();
        assert_eq!(
            normalized.to_json(),
            json!({"threat_type_l2": 500, "threat_type_l3": null})
        );
        assert!(TaxonomySelection::new(&tree)
            .normalize(&CategoryFields::default(), &RecordPatch::new())
            .is_none());
    }

    #[test]
    fn normalize_drops_unknown_ids_without_ancestors() {
        let tree = tree();
        let sel = TaxonomySelection::new(&tree);
        let empty = CategoryFields::default();

        let raw = RecordPatch::from_json(&json!({"threat_type_l2": 500})).unwrap();
        assert!(sel.normalize(&empty, &raw).unwrap().is_empty());

        let raw = RecordPatch::from_json(&json!({"threat_type_l1": 1, "threat_type_l2": 500})).unwrap();
        assert_eq!(
            sel.normalize(&empty, &raw).unwrap().to_json(),
            json!({"threat_type_l1": 1, "threat_type_l2": 500, "threat_type_l3": null})
        );
    }

    #[test]
    fn normalize_drops_nodes_at_the_wrong_level() {
        let tree = tree();
        let sel = TaxonomySelection::new(&tree);
        let raw = RecordPatch::from_json(&json!({"threat_type_l2": 1})).unwrap();
        assert!(sel.normalize(&CategoryFields::default(), &raw).unwrap().is_empty());
        assert!(sel.normalize(&selected(1, 2, 3), &raw).unwrap().is_empty());
    }

    #[test]
    fn orphan_needs_selected_ancestors() {
        let tree = TaxonomyTree::new(
            Category::Threat,
            vec![
                DropdownOption::new(1, "TE", "Environmental", TaxonomyLevel::L1),
                DropdownOption::new(8, "TX-01", "Detached", TaxonomyLevel::L2).with_parent(40),
            ],
        );
        let sel = TaxonomySelection::new(&tree);
        assert!(sel.select(&CategoryFields::default(), OptionId(8)).is_empty());

        let current = CategoryFields {
            type_l1: Some(OptionId(1)),
            ..CategoryFields::default()
        };
        assert_eq!(
            sel.select(&current, OptionId(8)).to_json(),
            json!({"threat_type_l2": 8, "threat_type_l3": null})
        );
    }

    #[test]
    fn dropdown_options_follow_selection() {
        let tree = tree();
        let sel = TaxonomySelection::new(&tree);
        let mut current = CategoryFields::default();
        assert_eq!(sel.options_at(&current, TaxonomyLevel::L1).len(), 2);
        assert!(sel.options_at(&current, TaxonomyLevel::L2).is_empty());

        current.type_l1 = Some(OptionId(1));
        let codes: Vec<_> = sel
            .options_at(&current, TaxonomyLevel::L2)
            .iter()
            .map(|n| n.code.clone())
            .collect();
        assert_eq!(codes, vec!["TE-01", "TE-02"]);
    }
}
