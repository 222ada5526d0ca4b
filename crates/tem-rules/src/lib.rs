//! TEM annotation rules
//!
//! Pure, total rule engines that keep an annotation record consistent under
//! arbitrary edit order and partial data.
//!
//! # Core Concepts
//!
//! - [`TaxonomyTree`]: indexed 3-level option hierarchy of one category
//! - [`DataShapeGuard`]: repairs legacy-shaped structured fields
//! - [`ImpactRuleTable`]: management value → valid impacts, as data
//! - [`TaxonomySelection`]: cascading l1/l2/l3 selection
//! - [`RelevancePropagation`]: threat/error impacts driving uas applicability
//! - [`TrainingTopicAggregator`]: derived topic lists
//! - [`AnnotationEngine`]: runs one edit through all of the above
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tem_rules::{AnnotationEngine, ImpactRuleTable, TaxonomyCatalog};
//!
//! let engine = AnnotationEngine::new(Arc::new(catalog), Arc::new(ImpactRuleTable::builtin()));
//! let outcome = engine.apply(&record, RecordPatch::from_json(&edit)?);
//! assert!(outcome.record.uas_applicable || !outcome.patch.contains(FieldKey::UasApplicable));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod engine;
mod error;
mod impact;
mod relevance;
mod selection;
mod shape_guard;
mod submission;
mod taxonomy;
mod topics;

pub use engine::{AnnotationEngine, EditOutcome};
pub use error::{MissingField, RequiredField, RuleError, ValidationError};
pub use impact::{ImpactControl, ImpactOption, ImpactRuleTable};
pub use relevance::{
    RelevancePropagation, ERROR_FROM_THREAT, ERROR_LEADS_TO_UAS, THREAT_LEADS_TO_ERROR,
    THREAT_LEADS_TO_UAS, UAS_FROM_ERROR, UAS_FROM_THREAT,
};
pub use selection::TaxonomySelection;
pub use shape_guard::DataShapeGuard;
pub use submission::{required_categories, validate_submission};
pub use taxonomy::{TaxonomyCatalog, TaxonomyTree};
pub use topics::{DerivedTopics, TrainingTopicAggregator};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
