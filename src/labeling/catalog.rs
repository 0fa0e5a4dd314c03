//! Authored label catalog for base-table columns

use super::label::{LabelOrder, SensitivityLabel};
use crate::config::{ConfigError, LabelsConfig};
use crate::error::{GovernanceError, GovernanceResult};
use crate::introspection::ColumnRef;
use std::collections::{BTreeMap, BTreeSet};

/// Immutable mapping from base-table column to its declared label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCatalog {
    entries: BTreeMap<ColumnRef, SensitivityLabel>,
}

impl LabelCatalog {
    /// Build a catalog; every label must belong to `order` and every column
    /// may be declared only once
    pub fn new<I>(order: &LabelOrder, entries: I) -> GovernanceResult<Self>
    where
        I: IntoIterator<Item = (ColumnRef, SensitivityLabel)>,
    {
        let mut catalog = BTreeMap::new();
        for (column, label) in entries {
            if !order.contains(&label) {
                return Err(GovernanceError::UnknownLabel(label.to_string()));
            }
            if let Some(previous) = catalog.insert(column.clone(), label.clone()) {
                return Err(ConfigError::InvalidValue(format!(
                    "column {} is labeled both '{}' and '{}'",
                    column, previous, label
                ))
                .into());
            }
        }
        Ok(Self { entries: catalog })
    }

    /// Build the catalog declared in the policy file
    pub fn from_config(
        config: &LabelsConfig,
        order: &LabelOrder,
        default_schema: &str,
    ) -> GovernanceResult<Self> {
        for name in config.columns.keys() {
            order.parse(name)?;
        }

        let mut entries = Vec::new();
        // walk labels in precedence order so error reporting is deterministic
        for label in order.labels() {
            let Some(declared) = config.columns.get(label.as_str()) else {
                continue;
            };
            for entry in declared {
                entries.push((parse_column(entry, default_schema)?, label.clone()));
            }
        }

        Self::new(order, entries)
    }

    pub fn get(&self, column: &ColumnRef) -> Option<&SensitivityLabel> {
        self.entries.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnRef, &SensitivityLabel)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Catalog columns of `schema` carrying one of `labels`, grouped by table
    pub fn columns_by_table(
        &self,
        schema: &str,
        labels: &BTreeSet<SensitivityLabel>,
    ) -> BTreeMap<String, Vec<String>> {
        let mut tables: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (column, label) in &self.entries {
            if column.schema == schema && labels.contains(label) {
                tables
                    .entry(column.table.clone())
                    .or_default()
                    .push(column.column.clone());
            }
        }
        tables
    }
}

/// Parse `table.column` or `schema.table.column`
fn parse_column(entry: &str, default_schema: &str) -> Result<ColumnRef, ConfigError> {
    let parts: Vec<&str> = entry.split('.').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(ConfigError::InvalidValue(format!(
            "malformed catalog entry '{}'",
            entry
        )));
    }

    match parts.as_slice() {
        [table, column] => Ok(ColumnRef::new(default_schema, *table, *column)),
        [schema, table, column] => Ok(ColumnRef::new(*schema, *table, *column)),
        _ => Err(ConfigError::InvalidValue(format!(
            "catalog entry '{}' must be table.column or schema.table.column",
            entry
        ))),
    }
}
