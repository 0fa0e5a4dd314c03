//! schemaguard - column-level sensitivity governance for PostgreSQL
//!
//! Every column of every table and view carries exactly one sensitivity
//! label. Base-table labels are authored in a catalog; view labels are
//! derived from lineage. Roles get column-level `SELECT` strictly according
//! to the labels they are cleared for.
//!
//! - [`labeling`]: catalog, propagation through view dependencies, completeness check
//! - [`roles`]: role policy and privilege SQL generation
//! - [`views`]: transactional rebuild of managed views, projection schemas
//! - [`introspection`]: the catalog queries everything above is computed from

pub mod config;
pub mod db;
pub mod error;
pub mod introspection;
pub mod labeling;
pub mod roles;
pub mod views;

pub use error::{GovernanceError, GovernanceResult};
