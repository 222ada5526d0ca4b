//! Error types for the data model

/// Errors raised while reading partial records or taxonomy metadata
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Patch input was not a JSON object
    #[error("patch must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Field name not part of the annotation record
    #[error("unknown record field: '{0}'")]
    UnknownField(String),

    /// Field present but holding the wrong JSON type
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Taxonomy level outside 1..=3
    #[error("invalid taxonomy level: {0}")]
    InvalidLevel(u8),

    /// Category key not one of threat / error / uas
    #[error("unknown category: '{0}'")]
    UnknownCategory(String),
}

impl ModelError {
    /// Create invalid value error for field
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
