//! TEM Core - annotation editing session
//!
//! The stateful half of the annotation engine:
//! - Owns the record of one editing session and runs every edit through the rules
//! - Debounces edits into saves and supersedes in-flight requests
//! - Publishes save status for the UI layer
//! - Talks to the record store and option source through traits
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tem_core::{AnnotationSession, MemoryTransport, SessionConfig, StaticOptionSource};
//! use tem_model::{Category, TaskId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = AnnotationSession::open(
//!     TaskId::new("task-17"),
//!     SessionConfig::new(),
//!     Arc::new(StaticOptionSource::default()),
//!     Arc::new(MemoryTransport::new()),
//! )
//! .await?;
//!
//! session.select_code(Category::Threat, "TE-01-A")?;
//! session.save_now().await?;
//! session.teardown().await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use cancel::CancelToken;
pub use config::SessionConfig;
pub use error::{SessionError, TransportError};
pub use scheduler::{Draft, PersistenceScheduler, SaveOutcome, StatusChange};
pub use session::AnnotationSession;
pub use transport::{
    FetchedTask, IncidentMetadata, MemoryTransport, OptionSource, RecordTransport,
    StaticOptionSource, TransportCall,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with an annotation session
    pub use crate::{
        AnnotationSession, MemoryTransport, SaveOutcome, SessionConfig, SessionError,
        StaticOptionSource,
    };
    pub use tem_model::{Category, OptionId, RecordPatch, SaveState, Selection, TaskId};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
