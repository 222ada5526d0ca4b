//! Structured per-category field values
//!
//! `management` and `impact` are `{value?: string}` objects, `coping_abilities`
//! is `{values: string[]}`. Historical records may hold other shapes in these
//! slots (arrays, `null`, nothing at all); [`Shaped`] keeps such values readable
//! until they are normalized.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Single-choice field: `{}` means unset
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Selection {
    /// Canonical unset value (`{}`)
    #[inline]
    #[must_use]
    pub fn unset() -> Self {
        Self::default()
    }

    /// Selection holding `value`
    #[inline]
    #[must_use]
    pub fn of(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }

    /// Selected value; an empty string counts as unset
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }

    /// Whether nothing is selected
    #[inline]
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.value().is_none()
    }
}

/// Multi-choice field: `{values: []}` means none selected
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopingAbilities {
    #[serde(default)]
    pub values: Vec<String>,
}

impl CopingAbilities {
    /// Abilities from values
    #[must_use]
    pub fn of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether no ability is selected
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A stored value that is not a plain key-value object
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyShape {
    /// Field absent from the stored record
    Missing,
    /// Explicit `null`
    Null,
    /// Array-based legacy representation
    Array(Vec<Value>),
    /// Any other non-conforming value (scalar, or an object of the wrong inner shape)
    Other(Value),
}

/// A structured field as read from storage
#[derive(Debug, Clone, PartialEq)]
pub enum Shaped<T> {
    /// Plain object in the expected shape (the empty object included)
    Valid(T),
    /// Anything else
    Legacy(LegacyShape),
}

impl<T> Shaped<T> {
    /// Absent field
    #[inline]
    #[must_use]
    pub fn missing() -> Self {
        Shaped::Legacy(LegacyShape::Missing)
    }

    /// Whether the stored value has the expected shape
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Shaped::Valid(_))
    }

    /// Whether the field was absent
    #[inline]
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Shaped::Legacy(LegacyShape::Missing))
    }

    /// Borrow the value if well-shaped
    #[inline]
    #[must_use]
    pub fn valid(&self) -> Option<&T> {
        match self {
            Shaped::Valid(value) => Some(value),
            Shaped::Legacy(_) => None,
        }
    }
}

impl<T: Default> Default for Shaped<T> {
    fn default() -> Self {
        Shaped::Valid(T::default())
    }
}

impl Shaped<Selection> {
    /// Selected value, `None` for unset or malformed data
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.valid().and_then(Selection::value)
    }
}

impl Shaped<CopingAbilities> {
    /// Selected abilities, empty for malformed data
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[String] {
        self.valid()
            .map(|c| c.values.as_slice())
            .unwrap_or_default()
    }
}

impl<T> From<T> for Shaped<T> {
    fn from(value: T) -> Self {
        Shaped::Valid(value)
    }
}

impl<T: Serialize> Serialize for Shaped<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Shaped::Valid(value) => value.serialize(serializer),
            Shaped::Legacy(LegacyShape::Missing | LegacyShape::Null) => serializer.serialize_none(),
            Shaped::Legacy(LegacyShape::Array(items)) => items.serialize(serializer),
            Shaped::Legacy(LegacyShape::Other(value)) => value.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Shaped<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(classify(raw))
    }
}

fn classify<T: DeserializeOwned>(raw: Value) -> Shaped<T> {
    match raw {
        Value::Null => Shaped::Legacy(LegacyShape::Null),
        Value::Array(items) => Shaped::Legacy(LegacyShape::Array(items)),
        Value::Object(_) => match serde_json::from_value::<T>(raw.clone()) {
            Ok(value) => Shaped::Valid(value),
            Err(_) => Shaped::Legacy(LegacyShape::Other(raw)),
        },
        other => Shaped::Legacy(LegacyShape::Other(other)),
    }
}
