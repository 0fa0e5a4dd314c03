//! Managed view rebuild
//!
//! Drops every view stamped with the marker comment and recreates the given
//! definitions, all inside one transaction. Any failure rolls the whole
//! rebuild back, so other sessions only ever see the old or the new set.

use super::definition::ViewDefinition;
use crate::db::queries::{self, one_line};
use crate::error::{db_message, rebuild_error, GovernanceResult};
use crate::introspection::ViewRef;
use deadpool_postgres::{Pool, Transaction};
use serde::Serialize;
use tracing::{info, warn};

/// What a successful rebuild changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub dropped: Vec<ViewRef>,
    pub created: Vec<ViewRef>,
}

pub struct ViewRebuilder {
    marker: String,
}

impl ViewRebuilder {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Replace all managed views with `views`, created in the given order
    pub async fn rebuild(
        &self,
        pool: &Pool,
        views: &[ViewDefinition],
    ) -> GovernanceResult<RebuildSummary> {
        let mut client = pool.get().await?;
        let transaction = client
            .transaction()
            .await
            .map_err(|e| rebuild_error(db_message(&e)))?;

        match self.run(&transaction, views).await {
            Ok(summary) => {
                transaction
                    .commit()
                    .await
                    .map_err(|e| rebuild_error(db_message(&e)))?;
                info!(
                    "Rebuilt managed views: {} dropped, {} created",
                    summary.dropped.len(),
                    summary.created.len()
                );
                Ok(summary)
            }
            Err(e) => {
                let message = db_message(&e);
                warn!("View rebuild failed, rolling back: {}", message);
                if let Err(rollback) = transaction.rollback().await {
                    warn!("Rollback failed: {}", rollback);
                }
                Err(rebuild_error(message))
            }
        }
    }

    async fn run(
        &self,
        transaction: &Transaction<'_>,
        views: &[ViewDefinition],
    ) -> Result<RebuildSummary, tokio_postgres::Error> {
        let dropped = self.drop_managed_views(transaction).await?;

        let mut created = Vec::new();
        for view in views {
            for statement in view.create_statements(&self.marker) {
                execute(transaction, &statement).await?;
            }
            if !view.is_placeholder() {
                created.push(view.view_ref());
            }
        }

        // Some errors only surface once the view is referenced
        for view in views.iter().filter(|v| !v.is_placeholder()) {
            transaction
                .query_one(queries::RESOLVE_RELATION, &[&view.qualified_name()])
                .await?;
        }

        Ok(RebuildSummary { dropped, created })
    }

    async fn drop_managed_views(
        &self,
        transaction: &Transaction<'_>,
    ) -> Result<Vec<ViewRef>, tokio_postgres::Error> {
        let rows = transaction
            .query(queries::LIST_MANAGED_VIEWS, &[&self.marker])
            .await?;

        let mut dropped = Vec::with_capacity(rows.len());
        for row in rows {
            let view = ViewRef::new(
                row.get::<_, String>("table_schema"),
                row.get::<_, String>("table_name"),
            );
            execute(
                transaction,
                &queries::SqlBuilder::drop_view_cascade(&view.schema, &view.name),
            )
            .await?;
            dropped.push(view);
        }
        Ok(dropped)
    }
}

async fn execute(transaction: &Transaction<'_>, sql: &str) -> Result<(), tokio_postgres::Error> {
    transaction.batch_execute(sql).await?;
    info!("VIEWS: {}", one_line(sql));
    Ok(())
}
