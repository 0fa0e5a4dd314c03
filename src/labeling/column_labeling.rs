//! Full column labeling and the completeness check

use super::catalog::LabelCatalog;
use super::label::{LabelOrder, SensitivityLabel};
use super::propagation::LabelPropagator;
use crate::error::{GovernanceError, GovernanceResult};
use crate::introspection::{ColumnRef, SchemaIntrospector, ViewRef};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Result of the completeness check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelingErrors {
    /// Labeled columns that no longer exist
    pub unknown: Vec<ColumnRef>,
    /// Live columns nobody classified
    pub unlabeled: Vec<ColumnRef>,
}

impl LabelingErrors {
    pub fn is_consistent(&self) -> bool {
        self.unknown.is_empty() && self.unlabeled.is_empty()
    }
}

/// Every column's label, checked against the live column list
#[derive(Debug, Clone)]
pub struct ColumnLabeling {
    labeling: BTreeMap<ColumnRef, SensitivityLabel>,
    columns: Vec<ColumnRef>,
}

impl ColumnLabeling {
    pub fn new(labeling: BTreeMap<ColumnRef, SensitivityLabel>, columns: Vec<ColumnRef>) -> Self {
        Self { labeling, columns }
    }

    /// Introspect the schema and merge catalog labels with derived view labels
    pub async fn introspect<I>(
        catalog: &LabelCatalog,
        order: &LabelOrder,
        introspector: &I,
    ) -> GovernanceResult<Self>
    where
        I: SchemaIntrospector,
    {
        let columns = introspector.columns().await?;
        let views = introspector.views().await?;
        let usage = introspector.view_column_usage().await?;
        let dependencies = introspector.view_dependencies().await?;

        let derived = LabelPropagator::derive(catalog, &views, &usage, &dependencies, order)?;

        let mut labeling: BTreeMap<ColumnRef, SensitivityLabel> = catalog
            .iter()
            .map(|(column, label)| (column.clone(), label.clone()))
            .collect();

        let view_set: HashSet<&ViewRef> = views.iter().collect();
        for column in &columns {
            let relation = column.relation();
            if !view_set.contains(&relation) {
                continue;
            }
            if let Some(label) = derived.get(&relation) {
                labeling.insert(column.clone(), label.clone());
            }
        }

        info!(
            "Labeled {} columns ({} live, {} views)",
            labeling.len(),
            columns.len(),
            views.len()
        );

        Ok(Self::new(labeling, columns))
    }

    pub fn labeling(&self) -> &BTreeMap<ColumnRef, SensitivityLabel> {
        &self.labeling
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn label_of(&self, column: &ColumnRef) -> Option<&SensitivityLabel> {
        self.labeling.get(column)
    }

    /// Labels without a live column, and live columns without a label
    pub fn errors(&self) -> LabelingErrors {
        let live: HashSet<&ColumnRef> = self.columns.iter().collect();

        let unknown = self
            .labeling
            .keys()
            .filter(|column| !live.contains(column))
            .cloned()
            .collect();

        let unlabeled = self
            .columns
            .iter()
            .filter(|column| !self.labeling.contains_key(*column))
            .cloned()
            .collect();

        let errors = LabelingErrors { unknown, unlabeled };
        debug!(
            "Completeness check: {} unknown, {} unlabeled",
            errors.unknown.len(),
            errors.unlabeled.len()
        );
        errors
    }

    /// Split the live columns into those whose label is in `labels` and the
    /// rest, keeping the original order in both halves
    pub fn partition_by_labels<'a, I>(
        &self,
        labels: I,
    ) -> GovernanceResult<(Vec<ColumnRef>, Vec<ColumnRef>)>
    where
        I: IntoIterator<Item = &'a SensitivityLabel>,
    {
        let labels: HashSet<&SensitivityLabel> = labels.into_iter().collect();

        let mut allowed = Vec::new();
        let mut disallowed = Vec::new();
        for column in &self.columns {
            let label = self
                .labeling
                .get(column)
                .ok_or_else(|| GovernanceError::UnlabeledColumn(column.clone()))?;

            if labels.contains(label) {
                allowed.push(column.clone());
            } else {
                disallowed.push(column.clone());
            }
        }

        Ok((allowed, disallowed))
    }
}
