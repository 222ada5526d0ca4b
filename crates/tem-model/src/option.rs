//! Taxonomy option nodes

use crate::category::TaxonomyLevel;
use crate::ids::OptionId;
use serde::{Deserialize, Serialize};

/// One node of a category's taxonomy, as supplied by the option source
///
/// Children are not stored; the taxonomy index computes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropdownOption {
    /// Unique node id
    pub id: OptionId,
    /// Unique code within the category (e.g. `TE-01-A`)
    pub code: String,
    /// Display label
    pub label: String,
    /// Depth in the tree
    pub level: TaxonomyLevel,
    /// Parent node; `None` iff level 1
    #[serde(default)]
    pub parent_id: Option<OptionId>,
    /// Training topics, normally only on level-3 leaves
    #[serde(default)]
    pub training_topics: Vec<String>,
}

impl DropdownOption {
    /// Create root-less node without topics
    #[inline]
    #[must_use]
    pub fn new(
        id: i64,
        code: impl Into<String>,
        label: impl Into<String>,
        level: TaxonomyLevel,
    ) -> Self {
        Self {
            id: OptionId(id),
            code: code.into(),
            label: label.into(),
            level,
            parent_id: None,
            training_topics: Vec::new(),
        }
    }

    /// With parent
    #[inline]
    #[must_use]
    pub fn with_parent(mut self, parent: i64) -> Self {
        self.parent_id = Some(OptionId(parent));
        self
    }

    /// With training topics
    #[inline]
    #[must_use]
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.training_topics = topics.into_iter().map(Into::into).collect();
        self
    }
}
