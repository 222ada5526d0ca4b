//! TEM annotation data model
//!
//! Types shared by the rule engines and the editing session.
//!
//! # Core Concepts
//!
//! - [`Category`]: threat / error / uas, three parallel instances of the same sub-model
//! - [`DropdownOption`]: one node of a category's 3-level taxonomy
//! - [`AnnotationRecord`]: the annotated event, serialized with flat `c_field` names
//! - [`Shaped`]: a structured field as read from storage, legacy shapes included
//! - [`RecordPatch`]: an ordered set of field updates, the unit of mutation
//! - [`SaveStatus`]: persistence state of one record
//!
//! # Example
//!
//! ```rust,ignore
//! use tem_model::{AnnotationRecord, Category, FieldUpdate, RecordPatch, TaskId};
//!
//! let mut record = AnnotationRecord::new(TaskId::new("task-17"));
//! let mut patch = RecordPatch::new();
//! patch.push(FieldUpdate::Description {
//!     category: Category::Threat,
//!     text: "Runway incursion".into(),
//! });
//! record.apply(&patch);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod category;
mod error;
mod fields;
mod ids;
mod option;
mod patch;
mod record;
mod status;

pub use category::{Category, TaxonomyLevel};
pub use error::ModelError;
pub use fields::{CopingAbilities, LegacyShape, Selection, Shaped};
pub use ids::{OptionId, RecordId, RequestId, TaskId};
pub use option::DropdownOption;
pub use patch::{FieldKey, FieldUpdate, RecordPatch};
pub use record::{AnnotationRecord, CategoryFields};
pub use status::{SaveState, SaveStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
