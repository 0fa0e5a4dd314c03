//! Schema Introspection Module
//!
//! The four read-only catalog queries that labeling depends on, behind a
//! trait so the live database and fixtures are interchangeable.

use crate::db::queries;
use crate::error::GovernanceResult;
use serde::{Serialize, Serializer};
use std::fmt;
use tokio_postgres::{GenericClient, Row};
use tracing::debug;

/// Identity of a table or view column
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    /// The table or view this column belongs to
    pub fn relation(&self) -> ViewRef {
        ViewRef::new(self.schema.clone(), self.table.clone())
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.table, self.column)
    }
}

impl Serialize for ColumnRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Identity of a view (or any relation)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewRef {
    pub schema: String,
    pub name: String,
}

impl ViewRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ViewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl Serialize for ViewRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A view reading a base-table column directly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewColumnUsage {
    pub view: ViewRef,
    pub column: ColumnRef,
}

/// A view selecting from another view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDependency {
    pub child: ViewRef,
    pub parent: ViewRef,
}

/// Read-only access to the live schema, system schemas excluded
#[allow(async_fn_in_trait)]
pub trait SchemaIntrospector {
    /// Every table and view column, ordered by schema, table, column
    async fn columns(&self) -> GovernanceResult<Vec<ColumnRef>>;

    async fn views(&self) -> GovernanceResult<Vec<ViewRef>>;

    /// Base-table columns read directly by each view
    async fn view_column_usage(&self) -> GovernanceResult<Vec<ViewColumnUsage>>;

    /// View-to-view edges
    async fn view_dependencies(&self) -> GovernanceResult<Vec<ViewDependency>>;
}

/// Introspector over a live PostgreSQL client or transaction
pub struct PostgresIntrospector<'a, C> {
    client: &'a C,
}

impl<'a, C> PostgresIntrospector<'a, C>
where
    C: GenericClient + Sync,
{
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    async fn rows(&self, query: &str) -> GovernanceResult<Vec<Row>> {
        Ok(self.client.query(query, &[]).await?)
    }
}

impl<C> SchemaIntrospector for PostgresIntrospector<'_, C>
where
    C: GenericClient + Sync,
{
    async fn columns(&self) -> GovernanceResult<Vec<ColumnRef>> {
        let rows = self.rows(queries::LIST_COLUMNS).await?;
        let columns: Vec<ColumnRef> = rows
            .iter()
            .map(|row| ColumnRef::new(
                row.get::<_, String>("table_schema"),
                row.get::<_, String>("table_name"),
                row.get::<_, String>("column_name"),
            ))
            .collect();

        debug!("Introspected {} columns", columns.len());
        Ok(columns)
    }

    async fn views(&self) -> GovernanceResult<Vec<ViewRef>> {
        let rows = self.rows(queries::LIST_VIEWS).await?;
        let views: Vec<ViewRef> = rows
            .iter()
            .map(|row| ViewRef::new(
                row.get::<_, String>("table_schema"),
                row.get::<_, String>("table_name"),
            ))
            .collect();

        debug!("Introspected {} views", views.len());
        Ok(views)
    }

    async fn view_column_usage(&self) -> GovernanceResult<Vec<ViewColumnUsage>> {
        let rows = self.rows(queries::LIST_VIEW_COLUMN_USAGE).await?;
        let usage: Vec<ViewColumnUsage> = rows
            .iter()
            .map(|row| ViewColumnUsage {
                view: ViewRef::new(
                    row.get::<_, String>("view_schema"),
                    row.get::<_, String>("view_name"),
                ),
                column: ColumnRef::new(
                    row.get::<_, String>("table_schema"),
                    row.get::<_, String>("table_name"),
                    row.get::<_, String>("column_name"),
                ),
            })
            .collect();

        debug!("Introspected {} view column usages", usage.len());
        Ok(usage)
    }

    async fn view_dependencies(&self) -> GovernanceResult<Vec<ViewDependency>> {
        let rows = self.rows(queries::LIST_VIEW_DEPENDENCIES).await?;
        let dependencies: Vec<ViewDependency> = rows
            .iter()
            .map(|row| ViewDependency {
                child: ViewRef::new(
                    row.get::<_, String>("view_schema"),
                    row.get::<_, String>("view_name"),
                ),
                parent: ViewRef::new(
                    row.get::<_, String>("table_schema"),
                    row.get::<_, String>("table_name"),
                ),
            })
            .collect();

        debug!("Introspected {} view dependencies", dependencies.len());
        Ok(dependencies)
    }
}

/// Fixed schema description, for tests and offline checks
#[derive(Debug, Clone, Default)]
pub struct InMemoryIntrospector {
    pub columns: Vec<ColumnRef>,
    pub views: Vec<ViewRef>,
    pub view_column_usage: Vec<ViewColumnUsage>,
    pub view_dependencies: Vec<ViewDependency>,
}

impl InMemoryIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a base table with the given columns
    pub fn with_table(mut self, schema: &str, table: &str, columns: &[&str]) -> Self {
        self.columns
            .extend(columns.iter().map(|c| ColumnRef::new(schema, table, *c)));
        self
    }

    /// Add a view exposing `columns`, reading the base columns in `reads`
    /// and selecting from the views in `parents`
    pub fn with_view(
        mut self,
        schema: &str,
        name: &str,
        columns: &[&str],
        reads: &[ColumnRef],
        parents: &[ViewRef],
    ) -> Self {
        let view = ViewRef::new(schema, name);
        self.columns
            .extend(columns.iter().map(|c| ColumnRef::new(schema, name, *c)));
        self.view_column_usage.extend(reads.iter().map(|column| ViewColumnUsage {
            view: view.clone(),
            column: column.clone(),
        }));
        self.view_dependencies.extend(parents.iter().map(|parent| ViewDependency {
            child: view.clone(),
            parent: parent.clone(),
        }));
        self.views.push(view);
        self
    }
}

impl SchemaIntrospector for InMemoryIntrospector {
    async fn columns(&self) -> GovernanceResult<Vec<ColumnRef>> {
        let mut columns = self.columns.clone();
        columns.sort();
        Ok(columns)
    }

    async fn views(&self) -> GovernanceResult<Vec<ViewRef>> {
        Ok(self.views.clone())
    }

    async fn view_column_usage(&self) -> GovernanceResult<Vec<ViewColumnUsage>> {
        Ok(self.view_column_usage.clone())
    }

    async fn view_dependencies(&self) -> GovernanceResult<Vec<ViewDependency>> {
        Ok(self.view_dependencies.clone())
    }
}
