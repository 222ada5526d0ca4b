//! Error types for the editing session
//!
//! Provides error handling for:
//! - Transport failures while saving or fetching
//! - Option-source failures at session start
//! - Malformed patches and rule configuration
//! - Session configuration

use tem_model::{Category, ModelError};
use tem_rules::RuleError;

/// Failure of a record or option transport call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with an error status
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Server refused the payload
    #[error("rejected: {0}")]
    Rejected(String),

    /// Request was cancelled by its caller
    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Check if the call was cancelled rather than failed
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if repeating the call may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Rejected(_) | Self::Cancelled => false,
        }
    }
}

/// Main session error type
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Option list of a category could not be loaded
    #[error("loading {category} options failed: {source}")]
    Options {
        category: Category,
        #[source]
        source: TransportError,
    },

    /// Record could not be fetched
    #[error("fetching record failed: {0}")]
    Fetch(#[source] TransportError),

    /// Save failed
    #[error("save failed: {0}")]
    Save(#[from] TransportError),

    /// Patch could not be parsed
    #[error("invalid patch: {0}")]
    Patch(#[from] ModelError),

    /// Rule table could not be loaded
    #[error("rule table error: {0}")]
    Rules(#[from] RuleError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence scheduler is no longer running
    #[error("persistence scheduler stopped")]
    SchedulerStopped,
}

impl SessionError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Options { source, .. } | Self::Fetch(source) | Self::Save(source) => {
                source.is_retryable()
            }
            _ => false,
        }
    }

    /// Create configuration error
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
