//! Label-filtered projection schema
//!
//! Publishes one view per base table exposing only the catalog columns whose
//! label is in an allowed set, e.g. a `looker` schema of `normal` columns.

use crate::config::ProjectionConfig;
use crate::db::queries::{one_line, SqlBuilder};
use crate::error::GovernanceResult;
use crate::labeling::{LabelCatalog, LabelOrder, SensitivityLabel};
use deadpool_postgres::Pool;
use std::collections::BTreeSet;
use tracing::info;

pub struct ProjectionPublisher {
    schema: String,
    source_schema: String,
    labels: BTreeSet<SensitivityLabel>,
}

impl ProjectionPublisher {
    pub fn new(
        schema: impl Into<String>,
        source_schema: impl Into<String>,
        labels: impl IntoIterator<Item = SensitivityLabel>,
    ) -> Self {
        Self {
            schema: schema.into(),
            source_schema: source_schema.into(),
            labels: labels.into_iter().collect(),
        }
    }

    pub fn from_config(config: &ProjectionConfig, order: &LabelOrder) -> GovernanceResult<Self> {
        let labels = config
            .labels
            .iter()
            .map(|name| order.parse(name))
            .collect::<GovernanceResult<Vec<_>>>()?;
        Ok(Self::new(config.schema.clone(), config.source_schema.clone(), labels))
    }

    /// Recreate the projection schema from scratch
    pub fn statements(&self, catalog: &LabelCatalog) -> Vec<String> {
        let mut statements = vec![
            SqlBuilder::drop_schema_cascade(&self.schema),
            SqlBuilder::create_schema(&self.schema),
        ];

        for (table, columns) in catalog.columns_by_table(&self.source_schema, &self.labels) {
            let columns = columns
                .iter()
                .map(|c| SqlBuilder::ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            let body = format!(
                "SELECT {} FROM {}",
                columns,
                SqlBuilder::qualified(&self.source_schema, &table)
            );
            statements.push(SqlBuilder::create_view(&self.schema, &table, &body));
        }

        statements
    }

    /// Publish the projection in one transaction; returns the number of views
    pub async fn publish(&self, pool: &Pool, catalog: &LabelCatalog) -> GovernanceResult<usize> {
        let statements = self.statements(catalog);

        let mut client = pool.get().await?;
        let transaction = client.transaction().await?;
        for sql in &statements {
            transaction.batch_execute(sql).await?;
            info!("PROJECTION: {}", one_line(sql));
        }
        transaction.commit().await?;

        let views = statements.len().saturating_sub(2);
        info!("Published {} views into schema {}", views, self.schema);
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::ColumnRef;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_projection_keeps_only_allowed_labels() {
        let order = LabelOrder::default();
        let catalog = LabelCatalog::new(
            &order,
            [
                (ColumnRef::new("public", "users", "id"), "normal".into()),
                (ColumnRef::new("public", "users", "email"), "pii".into()),
                (ColumnRef::new("public", "users", "created_at"), "normal".into()),
                (ColumnRef::new("public", "secret_keyphrases", "keyphrase"), "secret".into()),
                (ColumnRef::new("audit", "events", "id"), "normal".into()),
            ],
        )
        .unwrap();

        let publisher = ProjectionPublisher::new("looker", "public", [SensitivityLabel::from("normal")]);

        assert_eq!(
            publisher.statements(&catalog),
            vec![
                "DROP SCHEMA IF EXISTS looker CASCADE".to_string(),
                "CREATE SCHEMA looker".to_string(),
                "CREATE VIEW looker.users AS SELECT created_at, id FROM public.users".to_string(),
            ]
        );
    }

    #[test]
    fn test_from_config_rejects_unknown_labels() {
        let config = ProjectionConfig {
            schema: "looker".to_string(),
            source_schema: "public".to_string(),
            labels: vec!["everything".to_string()],
        };
        assert!(ProjectionPublisher::from_config(&config, &LabelOrder::default()).is_err());
    }
}
