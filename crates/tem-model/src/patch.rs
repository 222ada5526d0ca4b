//! Record patches
//!
//! A [`RecordPatch`] is the only way the annotation record changes. Patches are
//! keyed by field: pushing a second update for the same field replaces the
//! first, so a patch always describes a single consistent update.

use crate::category::{Category, TaxonomyLevel};
use crate::error::ModelError;
use crate::fields::{CopingAbilities, Selection};
use crate::ids::OptionId;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Addressable record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    /// `c_type_l1` / `c_type_l2` / `c_type_l3`
    Type(Category, TaxonomyLevel),
    /// `c_management`
    Management(Category),
    /// `c_impact`
    Impact(Category),
    /// `c_coping_abilities`
    CopingAbilities(Category),
    /// `c_description`
    Description(Category),
    /// `uas_applicable`
    UasApplicable,
    /// `uas_relevance`
    UasRelevance,
    /// `error_relevance`
    ErrorRelevance,
    /// `calculated_c_topics` (derived)
    CalculatedTopics(Category),
}

impl FieldKey {
    /// Flat wire name
    #[must_use]
    pub fn name(self) -> String {
        match self {
            FieldKey::Type(c, level) => format!("{c}_type_l{}", level.depth()),
            FieldKey::Management(c) => format!("{c}_management"),
            FieldKey::Impact(c) => format!("{c}_impact"),
            FieldKey::CopingAbilities(c) => format!("{c}_coping_abilities"),
            FieldKey::Description(c) => format!("{c}_description"),
            FieldKey::UasApplicable => "uas_applicable".to_string(),
            FieldKey::UasRelevance => "uas_relevance".to_string(),
            FieldKey::ErrorRelevance => "error_relevance".to_string(),
            FieldKey::CalculatedTopics(c) => format!("calculated_{c}_topics"),
        }
    }

    /// Parse a flat wire name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "uas_applicable" => return Some(FieldKey::UasApplicable),
            "uas_relevance" => return Some(FieldKey::UasRelevance),
            "error_relevance" => return Some(FieldKey::ErrorRelevance),
            _ => {}
        }
        if let Some(category) = name
            .strip_prefix("calculated_")
            .and_then(|rest| rest.strip_suffix("_topics"))
        {
            return category.parse().ok().map(FieldKey::CalculatedTopics);
        }

        let (prefix, field) = name.split_once('_')?;
        let category: Category = prefix.parse().ok()?;
        match field {
            "type_l1" => Some(FieldKey::Type(category, TaxonomyLevel::L1)),
            "type_l2" => Some(FieldKey::Type(category, TaxonomyLevel::L2)),
            "type_l3" => Some(FieldKey::Type(category, TaxonomyLevel::L3)),
            "management" => Some(FieldKey::Management(category)),
            "impact" => Some(FieldKey::Impact(category)),
            "coping_abilities" => Some(FieldKey::CopingAbilities(category)),
            "description" => Some(FieldKey::Description(category)),
            _ => None,
        }
    }

    /// Category the field belongs to, if any
    #[must_use]
    pub fn category(self) -> Option<Category> {
        match self {
            FieldKey::Type(c, _)
            | FieldKey::Management(c)
            | FieldKey::Impact(c)
            | FieldKey::CopingAbilities(c)
            | FieldKey::Description(c)
            | FieldKey::CalculatedTopics(c) => Some(c),
            FieldKey::UasApplicable | FieldKey::UasRelevance => Some(Category::Uas),
            FieldKey::ErrorRelevance => Some(Category::Error),
        }
    }

    /// Whether the field is recomputed rather than edited
    #[inline]
    #[must_use]
    pub fn is_derived(self) -> bool {
        matches!(self, FieldKey::CalculatedTopics(_))
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// New value for one record field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Type {
        category: Category,
        level: TaxonomyLevel,
        id: Option<OptionId>,
    },
    Management {
        category: Category,
        value: Selection,
    },
    Impact {
        category: Category,
        value: Selection,
    },
    CopingAbilities {
        category: Category,
        value: CopingAbilities,
    },
    Description {
        category: Category,
        text: String,
    },
    UasApplicable(bool),
    UasRelevance(String),
    ErrorRelevance(String),
    CalculatedTopics {
        category: Category,
        topics: Vec<String>,
    },
}

impl FieldUpdate {
    /// Field this update targets
    #[must_use]
    pub fn key(&self) -> FieldKey {
        match self {
            FieldUpdate::Type { category, level, .. } => FieldKey::Type(*category, *level),
            FieldUpdate::Management { category, .. } => FieldKey::Management(*category),
            FieldUpdate::Impact { category, .. } => FieldKey::Impact(*category),
            FieldUpdate::CopingAbilities { category, .. } => FieldKey::CopingAbilities(*category),
            FieldUpdate::Description { category, .. } => FieldKey::Description(*category),
            FieldUpdate::UasApplicable(_) => FieldKey::UasApplicable,
            FieldUpdate::UasRelevance(_) => FieldKey::UasRelevance,
            FieldUpdate::ErrorRelevance(_) => FieldKey::ErrorRelevance,
            FieldUpdate::CalculatedTopics { category, .. } => FieldKey::CalculatedTopics(*category),
        }
    }

    /// Wire value
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            FieldUpdate::Type { id, .. } => id.map_or(Value::Null, |id| Value::from(id.0)),
            FieldUpdate::Management { value, .. } | FieldUpdate::Impact { value, .. } => {
                serde_json::to_value(value).unwrap_or(Value::Null)
            }
            FieldUpdate::CopingAbilities { value, .. } => {
                serde_json::to_value(value).unwrap_or(Value::Null)
            }
            FieldUpdate::Description { text, .. } => Value::from(text.as_str()),
            FieldUpdate::UasApplicable(flag) => Value::from(*flag),
            FieldUpdate::UasRelevance(text) | FieldUpdate::ErrorRelevance(text) => {
                Value::from(text.as_str())
            }
            FieldUpdate::CalculatedTopics { topics, .. } => Value::from(topics.clone()),
        }
    }

    /// Parse the wire value for `key`
    ///
    /// `null` is accepted for every field and means the field's canonical empty
    /// value.
    ///
    /// # Errors
    /// Returns `ModelError::InvalidValue` if the JSON type does not fit the field
    pub fn from_json(key: FieldKey, value: &Value) -> Result<Self, ModelError> {
        let update = match key {
            FieldKey::Type(category, level) => {
                let id = match value {
                    Value::Null => None,
                    other => Some(OptionId(other.as_i64().ok_or_else(|| {
                        ModelError::invalid_value(key.name(), "expected integer id or null")
                    })?)),
                };
                FieldUpdate::Type {
                    category,
                    level,
                    id,
                }
            }
            FieldKey::Management(category) => FieldUpdate::Management {
                category,
                value: parse_object(key, value)?,
            },
            FieldKey::Impact(category) => FieldUpdate::Impact {
                category,
                value: parse_object(key, value)?,
            },
            FieldKey::CopingAbilities(category) => FieldUpdate::CopingAbilities {
                category,
                value: parse_object(key, value)?,
            },
            FieldKey::Description(category) => FieldUpdate::Description {
                category,
                text: parse_text(key, value)?,
            },
            FieldKey::UasApplicable => FieldUpdate::UasApplicable(match value {
                Value::Null => false,
                other => other
                    .as_bool()
                    .ok_or_else(|| ModelError::invalid_value(key.name(), "expected boolean"))?,
            }),
            FieldKey::UasRelevance => FieldUpdate::UasRelevance(parse_text(key, value)?),
            FieldKey::ErrorRelevance => FieldUpdate::ErrorRelevance(parse_text(key, value)?),
            FieldKey::CalculatedTopics(category) => FieldUpdate::CalculatedTopics {
                category,
                topics: match value {
                    Value::Null => Vec::new(),
                    other => serde_json::from_value(other.clone())
                        .map_err(|e| ModelError::invalid_value(key.name(), e.to_string()))?,
                },
            },
        };
        Ok(update)
    }
}

fn parse_object<T: serde::de::DeserializeOwned + Default>(
    key: FieldKey,
    value: &Value,
) -> Result<T, ModelError> {
    match value {
        Value::Null => Ok(T::default()),
        Value::Object(_) => serde_json::from_value(value.clone())
            .map_err(|e| ModelError::invalid_value(key.name(), e.to_string())),
        _ => Err(ModelError::invalid_value(key.name(), "expected object")),
    }
}

fn parse_text(key: FieldKey, value: &Value) -> Result<String, ModelError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(text) => Ok(text.clone()),
        _ => Err(ModelError::invalid_value(key.name(), "expected string")),
    }
}

/// Ordered set of field updates applied atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    updates: IndexMap<FieldKey, FieldUpdate>,
}

impl RecordPatch {
    /// Create empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add update, replacing any earlier update of the same field
    pub fn push(&mut self, update: FieldUpdate) {
        self.updates.insert(update.key(), update);
    }

    /// Builder form of [`RecordPatch::push`]
    #[inline]
    #[must_use]
    pub fn with(mut self, update: FieldUpdate) -> Self {
        self.push(update);
        self
    }

    /// Merge `other` into this patch; `other` wins on shared fields
    pub fn merge(&mut self, other: RecordPatch) {
        for update in other {
            self.push(update);
        }
    }

    /// Update for `key`
    #[inline]
    #[must_use]
    pub fn get(&self, key: FieldKey) -> Option<&FieldUpdate> {
        self.updates.get(&key)
    }

    /// Whether `key` is updated
    #[inline]
    #[must_use]
    pub fn contains(&self, key: FieldKey) -> bool {
        self.updates.contains_key(&key)
    }

    /// Remove update for `key`, keeping the order of the rest
    pub fn remove(&mut self, key: FieldKey) -> Option<FieldUpdate> {
        self.updates.shift_remove(&key)
    }

    /// Keep only updates matching `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&FieldUpdate) -> bool) {
        self.updates.retain(|_, update| keep(update));
    }

    /// Whether any update touches `category`
    #[must_use]
    pub fn touches(&self, category: Category) -> bool {
        self.updates.keys().any(|k| k.category() == Some(category))
    }

    /// Updates in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &FieldUpdate> {
        self.updates.values()
    }

    /// Updated fields in insertion order
    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.updates.keys().copied()
    }

    /// Number of updated fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Whether nothing is updated
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Render as a partial record object
    #[must_use]
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .updates
            .iter()
            .map(|(key, update)| (key.name(), update.to_json()))
            .collect();
        Value::Object(map)
    }

    /// Parse a partial record object
    ///
    /// Identity fields (`id`, `task_id`) are ignored. Derived topic fields are
    /// dropped with a warning; they are recomputed, never edited.
    ///
    /// # Errors
    /// - `ModelError::NotAnObject` if `value` is not an object
    /// - `ModelError::UnknownField` for names outside the record
    /// - `ModelError::InvalidValue` for mistyped values
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let Value::Object(map) = value else {
            return Err(ModelError::NotAnObject(json_type_name(value)));
        };

        let mut patch = RecordPatch::new();
        for (name, raw) in map {
            if name == "id" || name == "task_id" {
                continue;
            }
            let key =
                FieldKey::parse(name).ok_or_else(|| ModelError::UnknownField(name.clone()))?;
            if key.is_derived() {
                tracing::warn!(field = %key, "ignoring direct edit of derived field");
                continue;
            }
            patch.push(FieldUpdate::from_json(key, raw)?);
        }
        Ok(patch)
    }
}

impl IntoIterator for RecordPatch {
    type Item = FieldUpdate;
    type IntoIter = indexmap::map::IntoValues<FieldKey, FieldUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.into_values()
    }
}

impl FromIterator<FieldUpdate> for RecordPatch {
    fn from_iter<I: IntoIterator<Item = FieldUpdate>>(iter: I) -> Self {
        let mut patch = RecordPatch::new();
        for update in iter {
            patch.push(update);
        }
        patch
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn field_names_round_trip() {
        let keys = [
            FieldKey::Type(Category::Threat, TaxonomyLevel::L2),
            FieldKey::Management(Category::Error),
            FieldKey::Impact(Category::Threat),
            FieldKey::CopingAbilities(Category::Uas),
            FieldKey::Description(Category::Error),
            FieldKey::UasApplicable,
            FieldKey::UasRelevance,
            FieldKey::ErrorRelevance,
            FieldKey::CalculatedTopics(Category::Uas),
        ];
        for key in keys {
            assert_eq!(FieldKey::parse(&key.name()), Some(key));
        }
        assert_eq!(FieldKey::parse("threat_severity"), None);
        assert_eq!(FieldKey::parse("drone_type_l1"), None);
    }

    #[test]
    fn later_update_replaces_earlier_in_place() {
        let mut patch = RecordPatch::new();
        patch.push(FieldUpdate::Description {
            category: Category::Threat,
            text: "first".into(),
        });
        patch.push(FieldUpdate::UasApplicable(true));
        patch.push(FieldUpdate::Description {
            category: Category::Threat,
            text: "third".into(),
        });

        assert_eq!(patch.len(), 2);
        assert_eq!(
            patch.keys().collect::<Vec<_>>(),
            vec![FieldKey::Description(Category::Threat), FieldKey::UasApplicable]
        );
        assert_eq!(
            patch.to_json(),
            json!({"threat_description": "third", "uas_applicable": true})
        );
    }

    #[test]
    fn parses_partial_record() {
        let patch = RecordPatch::from_json(&json!({
            "id": 9,
            "threat_type_l1": 4,
            "threat_type_l2": null,
            "error_management": {"value": "unmanaged"},
            "uas_coping_abilities": null,
        }))
        .unwrap();

        assert_eq!(patch.len(), 3);
        assert_eq!(
            patch.get(FieldKey::Type(Category::Threat, TaxonomyLevel::L1)),
            Some(&FieldUpdate::Type {
                category: Category::Threat,
                level: TaxonomyLevel::L1,
                id: Some(OptionId(4)),
            })
        );
        assert_eq!(
            patch.get(FieldKey::CopingAbilities(Category::Uas)),
            Some(&FieldUpdate::CopingAbilities {
                category: Category::Uas,
                value: CopingAbilities::default(),
            })
        );
    }

    #[test]
    fn drops_derived_fields() {
        let patch = RecordPatch::from_json(&json!({
            "calculated_threat_topics": ["CRM"],
            "threat_description": "x",
        }))
        .unwrap();
        assert_eq!(patch.len(), 1);
        assert!(!patch.contains(FieldKey::CalculatedTopics(Category::Threat)));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            RecordPatch::from_json(&json!([1, 2])),
            Err(ModelError::NotAnObject("array"))
        ));
        assert!(matches!(
            RecordPatch::from_json(&json!({"threat_colour": "red"})),
            Err(ModelError::UnknownField(_))
        ));
        assert!(matches!(
            RecordPatch::from_json(&json!({"threat_type_l1": "TE"})),
            Err(ModelError::InvalidValue { .. })
        ));
        assert!(matches!(
            RecordPatch::from_json(&json!({"error_impact": ["none"]})),
            Err(ModelError::InvalidValue { .. })
        ));
    }

    #[test]
    fn touches_reports_category() {
        let patch = RecordPatch::new().with(FieldUpdate::UasRelevance("from_error".into()));
        assert!(patch.touches(Category::Uas));
        assert!(!patch.touches(Category::Threat));
    }
}
