//! Save status lifecycle
//!
//! ```text
//! idle ──edit──▶ unsaved ──debounce──▶ saving ──ok──▶ saved
//!                  ▲  ▲                  │  │           │
//!                  │  └──────edit────────┘  └─fail─▶ error
//!                  └──────────edit / retry────────────┘
//! ```

use crate::ids::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistence state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveState {
    /// Nothing edited since the session opened
    #[default]
    Idle,
    /// A save request is outstanding
    Saving,
    /// Last save succeeded and nothing changed since
    Saved,
    /// Edits pending, waiting for the debounce window
    Unsaved,
    /// Last save failed; edits still pending
    Error,
}

impl SaveState {
    /// States reachable from this one in a single step
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [SaveState] {
        use SaveState::*;
        match self {
            Idle => &[Unsaved],
            Unsaved => &[Saving],
            Saving => &[Saved, Error, Unsaved],
            Saved => &[Unsaved],
            Error => &[Unsaved, Saving],
        }
    }

    /// Whether `next` may follow this state; staying put is always allowed
    #[inline]
    #[must_use]
    pub fn can_transition_to(self, next: SaveState) -> bool {
        self == next || self.allowed_transitions().contains(&next)
    }

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SaveState::Idle => "idle",
            SaveState::Saving => "saving",
            SaveState::Saved => "saved",
            SaveState::Unsaved => "unsaved",
            SaveState::Error => "error",
        }
    }
}

impl std::fmt::Display for SaveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable persistence status of one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStatus {
    pub state: SaveState,
    /// Completion time of the last successful save
    pub last_saved: Option<DateTime<Utc>>,
    /// Message of the last transport failure
    pub error: Option<String>,
    /// Whether edits are waiting to be persisted
    pub dirty: bool,
    /// Server id once the record exists remotely
    pub record_id: Option<RecordId>,
}

impl SaveStatus {
    /// Fresh status for a session
    #[inline]
    #[must_use]
    pub fn idle(record_id: Option<RecordId>) -> Self {
        Self {
            record_id,
            ..Self::default()
        }
    }

    /// Whether a retry makes sense
    #[inline]
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.dirty && self.state != SaveState::Saving
    }
}
