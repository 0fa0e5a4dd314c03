//! Error handling module
//!
//! Provides the unified error type for labeling, provisioning and view rebuilds.

use crate::config::ConfigError;
use crate::introspection::{ColumnRef, ViewRef};
use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Database error: {}", db_message(.0))]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A live column reached partitioning without a labeling entry.
    #[error("Column {0} has no label; run the completeness check first")]
    UnlabeledColumn(ColumnRef),

    /// A view reads a base column the catalog does not declare.
    #[error("View {view} reads {column}, which is missing from the label catalog")]
    UncataloguedColumn { view: ViewRef, column: ColumnRef },

    #[error("Unknown sensitivity label: {0}")]
    UnknownLabel(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("View rebuild failed: {0}")]
    Rebuild(String),
}

impl GovernanceError {
    /// Stable machine-readable code, used in CLI output
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::Database(_) => "DATABASE_ERROR",
            GovernanceError::Pool(_) => "POOL_EXHAUSTED",
            GovernanceError::Io(_) => "IO_ERROR",
            GovernanceError::Config(_) => "CONFIG_ERROR",
            GovernanceError::UnlabeledColumn(_) | GovernanceError::UncataloguedColumn { .. } => {
                "LOOKUP_FAULT"
            }
            GovernanceError::UnknownLabel(_) => "UNKNOWN_LABEL",
            GovernanceError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            GovernanceError::Rebuild(_) => "REBUILD_ERROR",
        }
    }
}

/// Result type alias used across the crate
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// The server's message when there is one, the client error otherwise
pub fn db_message(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    }
}

/// Helper function to create a rebuild error from any displayable cause
pub fn rebuild_error(cause: impl std::fmt::Display) -> GovernanceError {
    GovernanceError::Rebuild(cause.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_faults_share_a_code() {
        let column = ColumnRef::new("public", "users", "email");
        let view = ViewRef::new("reporting", "emails");

        assert_eq!(GovernanceError::UnlabeledColumn(column.clone()).code(), "LOOKUP_FAULT");
        assert_eq!(
            GovernanceError::UncataloguedColumn { view, column }.code(),
            "LOOKUP_FAULT"
        );
    }

    #[test]
    fn test_rebuild_error_keeps_message() {
        let err = rebuild_error("relation \"non_existing_table\" does not exist");
        assert_eq!(
            err.to_string(),
            "View rebuild failed: relation \"non_existing_table\" does not exist"
        );
    }
}
