//! Sensitivity labeling
//!
//! Authored base-column labels, view label propagation through lineage, and
//! the completeness check against the live schema.

mod catalog;
mod column_labeling;
mod label;
mod propagation;

pub use catalog::LabelCatalog;
pub use column_labeling::{ColumnLabeling, LabelingErrors};
pub use label::{LabelOrder, SensitivityLabel};
pub use propagation::{DerivedViewLabels, LabelPropagator, ViewDependencyGraph};
