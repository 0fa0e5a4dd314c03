//! Managed views
//!
//! View definitions loaded from disk, the transactional rebuild that keeps
//! view lineage current, and label-filtered projection schemas.

mod definition;
mod projection;
mod rebuild;

pub use definition::{discover, ViewDefinition};
pub use projection::ProjectionPublisher;
pub use rebuild::{RebuildSummary, ViewRebuilder};
