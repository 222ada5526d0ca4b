//! Management → impact rule table
//!
//! The valid impact values of a category are a function of its management
//! value alone. Rules are plain data: a map of category → management value →
//! ordered impact options. A single option is auto-selected and locks the
//! control; several leave it open; none (or an unknown / unset management
//! value) disables it.
//!
//! # Example
//!
//! ```yaml
//! threat:
//!   managed:
//!     - { value: none, label: Inconsequential }
//!   unmanaged:
//!     - { value: leads_to_error, label: Leads to error }
//!     - { value: none, label: Inconsequential }
//! ```

use crate::error::RuleError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tem_model::{Category, FieldUpdate, RecordPatch, Selection};

/// One selectable impact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactOption {
    /// Stored value
    pub value: String,
    /// Display label
    pub label: String,
}

impl ImpactOption {
    /// Create option
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Impact control state for a management value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImpactControl {
    /// No impact dimension or no valid value
    Disabled,
    /// Exactly one valid value, auto-selected
    Locked { value: String },
    /// User chooses among several values
    Open { options: Vec<ImpactOption> },
}

impl ImpactControl {
    /// Whether the user has no choice to make
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        !matches!(self, ImpactControl::Open { .. })
    }

    /// Auto-selected value
    #[inline]
    #[must_use]
    pub fn auto_select(&self) -> Option<&str> {
        match self {
            ImpactControl::Locked { value } => Some(value.as_str()),
            _ => None,
        }
    }

    /// Whether `value` is a valid user choice
    #[must_use]
    pub fn allows(&self, value: &str) -> bool {
        match self {
            ImpactControl::Disabled => false,
            ImpactControl::Locked { value: locked } => locked == value,
            ImpactControl::Open { options } => options.iter().any(|o| o.value == value),
        }
    }

    /// Impact value a management change leaves behind
    #[must_use]
    pub fn resulting_impact(&self) -> Selection {
        self.auto_select().map_or_else(Selection::unset, Selection::of)
    }
}

/// Category → management value → ordered impact options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImpactRuleTable {
    rules: BTreeMap<Category, IndexMap<String, Vec<ImpactOption>>>,
}

impl ImpactRuleTable {
    /// Create empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default TEM rule table
    #[must_use]
    pub fn builtin() -> Self {
        let none = || ImpactOption::new("none", "Inconsequential");
        let to_error = || ImpactOption::new("leads_to_error", "Leads to error");
        let to_uas_t = || ImpactOption::new("leads_to_uas_t", "Leads to undesired aircraft state");
        let to_uas_e = || ImpactOption::new("leads_to_uas_e", "Leads to undesired aircraft state");
        let to_additional =
            || ImpactOption::new("leads_to_additional_error", "Leads to additional error");

        let mut table = Self::new();
        table.insert(Category::Threat, "managed", vec![none()]);
        table.insert(
            Category::Threat,
            "unmanaged",
            vec![to_error(), to_uas_t(), none()],
        );
        table.insert(Category::Threat, "mismanaged", vec![to_error(), to_uas_t()]);

        table.insert(Category::Error, "managed", vec![none()]);
        table.insert(
            Category::Error,
            "unmanaged",
            vec![to_uas_e(), to_additional(), none()],
        );
        table.insert(Category::Error, "mismanaged", vec![to_uas_e(), to_additional()]);

        for management in ["managed", "unmanaged", "mismanaged"] {
            table.insert(Category::Uas, management, Vec::new());
        }
        table
    }

    /// Load a table from YAML
    ///
    /// # Errors
    /// - `RuleError::Parse` on malformed YAML or an unknown category key
    /// - `RuleError::ImpactOnUnimpactedCategory` if `uas` lists impact options
    /// - `RuleError::DuplicateImpact` on repeated impact values
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RuleError> {
        let table: Self = serde_yaml::from_str(yaml)?;
        table.check()?;
        Ok(table)
    }

    fn check(&self) -> Result<(), RuleError> {
        for (&category, rules) in &self.rules {
            for (management, options) in rules {
                if !category.has_impact() && !options.is_empty() {
                    return Err(RuleError::ImpactOnUnimpactedCategory {
                        category,
                        management: management.clone(),
                    });
                }
                let mut seen = HashSet::new();
                for option in options {
                    if !seen.insert(option.value.as_str()) {
                        return Err(RuleError::DuplicateImpact {
                            category,
                            management: management.clone(),
                            value: option.value.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Add or replace a rule
    pub fn insert(
        &mut self,
        category: Category,
        management: impl Into<String>,
        options: Vec<ImpactOption>,
    ) {
        self.rules
            .entry(category)
            .or_default()
            .insert(management.into(), options);
    }

    /// Management values known for `category`, in table order
    #[must_use]
    pub fn management_values(&self, category: Category) -> Vec<&str> {
        self.rules
            .get(&category)
            .map(|rules| rules.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Impact options for a management value (empty when unknown or unset)
    #[must_use]
    pub fn options(&self, category: Category, management: Option<&str>) -> &[ImpactOption] {
        if !category.has_impact() {
            return &[];
        }
        management
            .and_then(|m| self.rules.get(&category)?.get(m))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Control state for a management value
    #[must_use]
    pub fn resolve(&self, category: Category, management: Option<&str>) -> ImpactControl {
        match self.options(category, management) {
            [] => ImpactControl::Disabled,
            [only] => ImpactControl::Locked {
                value: only.value.clone(),
            },
            many => ImpactControl::Open {
                options: many.to_vec(),
            },
        }
    }

    /// Patch for a management change: the new management value and, for
    /// categories with an impact dimension, the impact it implies
    ///
    /// The impact is always overwritten, with the auto-selected value or `{}`.
    #[must_use]
    pub fn on_management_change(&self, category: Category, management: Selection) -> RecordPatch {
        let control = self.resolve(category, management.value());
        let mut patch = RecordPatch::new();
        patch.push(FieldUpdate::Management {
            category,
            value: management,
        });
        if category.has_impact() {
            patch.push(FieldUpdate::Impact {
                category,
                value: control.resulting_impact(),
            });
        }
        patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn managed_threat_locks_to_none() {
        let table = ImpactRuleTable::builtin();
        let patch = table.on_management_change(Category::Threat, Selection::of("managed"));
        assert_eq!(
            patch.to_json(),
            json!({"threat_management": {"value": "managed"}, "threat_impact": {"value": "none"}})
        );
        assert!(table.resolve(Category::Threat, Some("managed")).is_locked());
    }

    #[test]
    fn several_options_leave_control_open_and_clear_impact() {
        let table = ImpactRuleTable::builtin();
        let control = table.resolve(Category::Error, Some("unmanaged"));
        assert!(!control.is_locked());
        assert!(control.allows("leads_to_uas_e"));
        assert!(!control.allows("leads_to_uas_t"));

        let patch = table.on_management_change(Category::Error, Selection::of("unmanaged"));
        assert_eq!(patch.to_json()["error_impact"], json!({}));
    }

    #[test]
    fn unknown_or_unset_management_disables() {
        let table = ImpactRuleTable::builtin();
        assert_eq!(table.resolve(Category::Threat, Some("ignored")), ImpactControl::Disabled);
        assert_eq!(table.resolve(Category::Threat, None), ImpactControl::Disabled);
        let patch = table.on_management_change(Category::Threat, Selection::unset());
        assert_eq!(patch.to_json()["threat_impact"], json!({}));
    }

    #[test]
    fn uas_never_touches_impact() {
        let table = ImpactRuleTable::builtin();
        assert_eq!(table.resolve(Category::Uas, Some("managed")), ImpactControl::Disabled);
        let patch = table.on_management_change(Category::Uas, Selection::of("managed"));
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.to_json(), json!({"uas_management": {"value": "managed"}}));
    }

    #[test]
    fn loads_yaml_table() {
        let table = ImpactRuleTable::from_yaml_str(
            r"
threat:
  managed:
    - { value: none, label: Inconsequential }
  monitored:
    - { value: none, label: Inconsequential }
    - { value: leads_to_error, label: Leads to error }
uas:
  managed: []
",
        )
        .unwrap();
        assert_eq!(table.management_values(Category::Threat), vec!["managed", "monitored"]);
        assert!(!table.resolve(Category::Threat, Some("monitored")).is_locked());
        assert!(table.management_values(Category::Error).is_empty());
    }

    #[test]
    fn rejects_impact_on_uas_and_duplicates() {
        let err = ImpactRuleTable::from_yaml_str(
            "uas:\n  managed:\n    - { value: none, label: x }\n",
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::ImpactOnUnimpactedCategory { .. }));

        let err = ImpactRuleTable::from_yaml_str(
            "error:\n  managed:\n    - { value: none, label: a }\n    - { value: none, label: b }\n",
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateImpact { .. }));

        assert!(matches!(
            ImpactRuleTable::from_yaml_str("drone:\n  managed: []\n"),
            Err(RuleError::Parse(_))
        ));
    }
}
