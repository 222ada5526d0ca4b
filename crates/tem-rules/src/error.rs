//! Error types for rule configuration and submission checks

use serde::Serialize;
use tem_model::Category;

/// Errors loading a rule table
///
/// Rule evaluation itself never fails; only configuration can be rejected.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// YAML did not parse into a rule table
    #[error("invalid rule table: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A category without an impact dimension declared impact options
    #[error("category {category} has no impact dimension, but '{management}' lists impact options")]
    ImpactOnUnimpactedCategory {
        category: Category,
        management: String,
    },

    /// Same impact value listed twice for one management value
    #[error("duplicate impact '{value}' for {category}/{management}")]
    DuplicateImpact {
        category: Category,
        management: String,
        value: String,
    },
}

/// Field a submission requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    /// Taxonomy path down to a leaf
    Taxonomy,
    /// Management value
    Management,
    /// Impact value, when the impact control is not disabled
    Impact,
    /// Non-empty description
    Description,
}

impl RequiredField {
    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RequiredField::Taxonomy => "taxonomy",
            RequiredField::Management => "management",
            RequiredField::Impact => "impact",
            RequiredField::Description => "description",
        }
    }
}

/// One missing required field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MissingField {
    /// Category the field belongs to
    pub category: Category,
    /// Which field
    pub field: RequiredField,
}

impl std::fmt::Display for MissingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.category, self.field.as_str())
    }
}

/// Record is not ready for submission
///
/// Computed on demand, outside the autosave path; never blocks saving.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} required field(s) missing: {}", .missing.len(), display_list(.missing))]
pub struct ValidationError {
    /// Missing fields in category order
    pub missing: Vec<MissingField>,
}

impl ValidationError {
    /// Missing fields of `category`
    pub fn for_category(&self, category: Category) -> impl Iterator<Item = RequiredField> + '_ {
        self.missing
            .iter()
            .filter(move |m| m.category == category)
            .map(|m| m.field)
    }
}

fn display_list(missing: &[MissingField]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
