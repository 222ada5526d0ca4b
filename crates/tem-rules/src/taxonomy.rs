//! Taxonomy index
//!
//! Provides [`TaxonomyTree`] for O(1) lookup of a category's options by id and
//! by code, plus parent/child navigation.
//!
//! Option sets may be partially loaded. A node whose `parent_id` does not
//! resolve to a node one level up is an orphan: it is left out of
//! [`TaxonomyTree::children_of`] but stays reachable by id and code.

use std::collections::HashMap;
use tem_model::{Category, DropdownOption, OptionId, TaxonomyLevel};

/// Immutable hierarchical index over one category's option list
#[derive(Debug, Clone)]
pub struct TaxonomyTree {
    category: Category,
    nodes: Vec<DropdownOption>,
    by_id: HashMap<OptionId, usize>,
    by_code: HashMap<String, usize>,
    /// parent id (None for roots) -> child positions in input order
    children: HashMap<Option<OptionId>, Vec<usize>>,
}

impl TaxonomyTree {
    /// Build index from a flat option list
    #[must_use]
    pub fn new(category: Category, options: Vec<DropdownOption>) -> Self {
        let mut by_id = HashMap::with_capacity(options.len());
        let mut by_code = HashMap::with_capacity(options.len());

        for (idx, option) in options.iter().enumerate() {
            if by_id.contains_key(&option.id) {
                tracing::warn!(%category, id = %option.id, "duplicate option id, keeping first");
                continue;
            }
            by_id.insert(option.id, idx);
            if by_code.contains_key(&option.code) {
                tracing::warn!(%category, code = %option.code, "duplicate option code, keeping first");
            } else {
                by_code.insert(option.code.clone(), idx);
            }
        }

        let mut children: HashMap<Option<OptionId>, Vec<usize>> = HashMap::new();
        for (&id, &idx) in &by_id {
            let option = &options[idx];
            debug_assert_eq!(option.id, id);
            let attached = match option.parent_id {
                None => option.level == TaxonomyLevel::L1,
                Some(parent) => by_id
                    .get(&parent)
                    .is_some_and(|&p| Some(options[p].level) == option.level.parent()),
            };
            if attached {
                children.entry(option.parent_id).or_default().push(idx);
            } else {
                tracing::debug!(%category, id = %option.id, "orphan option excluded from tree");
            }
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }

        Self {
            category,
            nodes: options,
            by_id,
            by_code,
            children,
        }
    }

    /// Empty tree (options not loaded)
    #[inline]
    #[must_use]
    pub fn empty(category: Category) -> Self {
        Self::new(category, Vec::new())
    }

    /// Category this tree indexes
    #[inline]
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Node by id
    #[inline]
    #[must_use]
    pub fn by_id(&self, id: OptionId) -> Option<&DropdownOption> {
        self.by_id.get(&id).map(|&idx| &self.nodes[idx])
    }

    /// Node by code
    #[inline]
    #[must_use]
    pub fn by_code(&self, code: &str) -> Option<&DropdownOption> {
        self.by_code.get(code).map(|&idx| &self.nodes[idx])
    }

    /// Attached children of `parent` at `level` (`None` parent for roots)
    #[must_use]
    pub fn children_of(
        &self,
        parent: Option<OptionId>,
        level: TaxonomyLevel,
    ) -> Vec<&DropdownOption> {
        self.children
            .get(&parent)
            .map(|list| {
                list.iter()
                    .map(|&idx| &self.nodes[idx])
                    .filter(|node| node.level == level)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Level-1 nodes
    #[inline]
    #[must_use]
    pub fn roots(&self) -> Vec<&DropdownOption> {
        self.children_of(None, TaxonomyLevel::L1)
    }

    /// Whether `id` has attached children
    #[must_use]
    pub fn has_children(&self, id: OptionId) -> bool {
        self.children.get(&Some(id)).is_some_and(|list| !list.is_empty())
    }

    /// Ancestor chain of `id`, root first, ending with the node itself
    ///
    /// The chain stops early at a missing parent, so an orphan yields a path
    /// shorter than its level.
    #[must_use]
    pub fn path_of(&self, id: OptionId) -> Vec<&DropdownOption> {
        let mut path = Vec::with_capacity(3);
        let mut current = self.by_id(id);
        while let Some(node) = current {
            path.push(node);
            if path.len() == TaxonomyLevel::ALL.len() {
                break;
            }
            current = node.parent_id.and_then(|parent| self.by_id(parent));
        }
        path.reverse();
        path
    }

    /// Whether `id`'s ancestors are all present and one level apart
    #[must_use]
    pub fn is_attached(&self, id: OptionId) -> bool {
        let path = self.path_of(id);
        path.last().is_some_and(|node| node.level.depth() as usize == path.len())
            && path
                .iter()
                .zip(TaxonomyLevel::ALL.iter())
                .all(|(node, &level)| node.level == level)
    }

    /// Number of indexed nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no options are loaded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All nodes in input order
    pub fn iter(&self) -> impl Iterator<Item = &DropdownOption> {
        self.nodes.iter()
    }
}

/// The three category trees of one editing session
#[derive(Debug, Clone)]
pub struct TaxonomyCatalog {
    threat: TaxonomyTree,
    error: TaxonomyTree,
    uas: TaxonomyTree,
}

impl TaxonomyCatalog {
    /// Catalog from per-category trees
    #[inline]
    #[must_use]
    pub fn new(threat: TaxonomyTree, error: TaxonomyTree, uas: TaxonomyTree) -> Self {
        Self { threat, error, uas }
    }

    /// Build from per-category option lists; missing categories stay empty
    #[must_use]
    pub fn from_options(mut options: HashMap<Category, Vec<DropdownOption>>) -> Self {
        let mut tree = |category: Category| {
            TaxonomyTree::new(category, options.remove(&category).unwrap_or_default())
        };
        Self {
            threat: tree(Category::Threat),
            error: tree(Category::Error),
            uas: tree(Category::Uas),
        }
    }

    /// Tree of `category`
    #[inline]
    #[must_use]
    pub fn tree(&self, category: Category) -> &TaxonomyTree {
        match category {
            Category::Threat => &self.threat,
            Category::Error => &self.error,
            Category::Uas => &self.uas,
        }
    }
}

impl Default for TaxonomyCatalog {
    fn default() -> Self {
        Self::new(
            TaxonomyTree::empty(Category::Threat),
            TaxonomyTree::empty(Category::Error),
            TaxonomyTree::empty(Category::Uas),
        )
    }
}
