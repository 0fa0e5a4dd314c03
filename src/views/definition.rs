//! View definitions and their on-disk naming convention
//!
//! Files are named `<order>.[<schema>.]<name>.sql`; the numeric prefix puts
//! parents before children. Anything else in the directory is ignored.

use crate::db::queries::SqlBuilder;
use crate::error::GovernanceResult;
use crate::introspection::ViewRef;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

static VIEW_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\.((\w+)\.)?(\w+)\.sql$").expect("view file pattern is valid")
});

/// A view to create during a rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefinition {
    pub order: u64,
    pub schema: String,
    pub name: String,
    /// View body; empty means "only ensure the schema exists"
    pub query: String,
}

impl ViewDefinition {
    pub fn new(
        order: u64,
        schema: impl Into<String>,
        name: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            order,
            schema: schema.into(),
            name: name.into(),
            query: query.into(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.query.trim().is_empty()
    }

    pub fn view_ref(&self) -> ViewRef {
        ViewRef::new(self.schema.clone(), self.name.clone())
    }

    /// `schema.name` as it is written in SQL
    pub fn qualified_name(&self) -> String {
        SqlBuilder::qualified(&self.schema, &self.name)
    }

    /// DDL creating this view and stamping it with `marker`
    pub fn create_statements(&self, marker: &str) -> Vec<String> {
        let mut statements = vec![SqlBuilder::create_schema_if_not_exists(&self.schema)];
        if !self.is_placeholder() {
            statements.push(SqlBuilder::create_view(&self.schema, &self.name, &self.query));
            statements.push(SqlBuilder::comment_on_view(&self.schema, &self.name, marker));
        }
        statements
    }

    /// Parse `<order>.[<schema>.]<name>.sql` into (order, schema, name)
    pub fn parse_file_name(file_name: &str, default_schema: &str) -> Option<(u64, String, String)> {
        let captures = VIEW_FILE.captures(file_name)?;
        let Ok(order) = captures.get(1)?.as_str().parse::<u64>() else {
            warn!("Skipping {}: order prefix does not fit in u64", file_name);
            return None;
        };
        let schema = captures
            .get(3)
            .map(|m| m.as_str())
            .unwrap_or(default_schema)
            .to_string();
        let name = captures.get(4)?.as_str().to_string();
        Some((order, schema, name))
    }
}

/// Load every view definition in `dir`, sorted by order, schema, name
pub fn discover(dir: &Path, default_schema: &str) -> GovernanceResult<Vec<ViewDefinition>> {
    let mut definitions = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some((order, schema, name)) = ViewDefinition::parse_file_name(file_name, default_schema)
        else {
            debug!("Skipping {} in {}", file_name, dir.display());
            continue;
        };
        // follows symlinks
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let query = std::fs::read_to_string(&path)?;
        definitions.push(ViewDefinition::new(order, schema, name, query.trim_end()));
    }

    definitions.sort_by(|a, b| {
        (a.order, &a.schema, &a.name).cmp(&(b.order, &b.schema, &b.name))
    });

    debug!("Discovered {} view definitions in {}", definitions.len(), dir.display());
    Ok(definitions)
}
