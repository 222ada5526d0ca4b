//! Annotation categories and taxonomy levels

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Annotation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Threat recognition
    Threat,
    /// Error recognition
    Error,
    /// Undesired aircraft state
    Uas,
}

impl Category {
    /// All categories in aggregation order
    pub const ALL: [Category; 3] = [Category::Threat, Category::Error, Category::Uas];

    /// Field prefix / option-source key
    #[inline]
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Category::Threat => "threat",
            Category::Error => "error",
            Category::Uas => "uas",
        }
    }

    /// Whether the category carries an impact dimension
    #[inline]
    #[must_use]
    pub fn has_impact(self) -> bool {
        !matches!(self, Category::Uas)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threat" => Ok(Category::Threat),
            "error" => Ok(Category::Error),
            "uas" => Ok(Category::Uas),
            other => Err(ModelError::UnknownCategory(other.to_string())),
        }
    }
}

/// Depth of a taxonomy node (1 = root)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaxonomyLevel {
    L1,
    L2,
    L3,
}

impl TaxonomyLevel {
    /// All levels, root first
    pub const ALL: [TaxonomyLevel; 3] = [TaxonomyLevel::L1, TaxonomyLevel::L2, TaxonomyLevel::L3];

    /// Numeric depth
    #[inline]
    #[must_use]
    pub fn depth(self) -> u8 {
        match self {
            TaxonomyLevel::L1 => 1,
            TaxonomyLevel::L2 => 2,
            TaxonomyLevel::L3 => 3,
        }
    }

    /// Level of this node's parent
    #[inline]
    #[must_use]
    pub fn parent(self) -> Option<TaxonomyLevel> {
        match self {
            TaxonomyLevel::L1 => None,
            TaxonomyLevel::L2 => Some(TaxonomyLevel::L1),
            TaxonomyLevel::L3 => Some(TaxonomyLevel::L2),
        }
    }

    /// Level of this node's children
    #[inline]
    #[must_use]
    pub fn child(self) -> Option<TaxonomyLevel> {
        match self {
            TaxonomyLevel::L1 => Some(TaxonomyLevel::L2),
            TaxonomyLevel::L2 => Some(TaxonomyLevel::L3),
            TaxonomyLevel::L3 => None,
        }
    }

    /// Levels strictly deeper than this one
    #[must_use]
    pub fn deeper(self) -> &'static [TaxonomyLevel] {
        match self {
            TaxonomyLevel::L1 => &[TaxonomyLevel::L2, TaxonomyLevel::L3],
            TaxonomyLevel::L2 => &[TaxonomyLevel::L3],
            TaxonomyLevel::L3 => &[],
        }
    }
}

impl TryFrom<u8> for TaxonomyLevel {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TaxonomyLevel::L1),
            2 => Ok(TaxonomyLevel::L2),
            3 => Ok(TaxonomyLevel::L3),
            other => Err(ModelError::InvalidLevel(other)),
        }
    }
}

impl From<TaxonomyLevel> for u8 {
    fn from(level: TaxonomyLevel) -> Self {
        level.depth()
    }
}
