//! View label propagation
//!
//! A view is as sensitive as the most sensitive base column read anywhere in
//! its ancestry: its own query, its parent views, their parents, and so on.
//! Distance does not weaken a label.

use super::catalog::LabelCatalog;
use super::label::{LabelOrder, SensitivityLabel};
use crate::error::{GovernanceError, GovernanceResult};
use crate::introspection::{ViewColumnUsage, ViewDependency, ViewRef};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Label derived for each view
pub type DerivedViewLabels = BTreeMap<ViewRef, SensitivityLabel>;

/// Directed `child -> parents` graph over views
#[derive(Debug, Clone, Default)]
pub struct ViewDependencyGraph {
    parents: HashMap<ViewRef, BTreeSet<ViewRef>>,
}

impl ViewDependencyGraph {
    pub fn from_dependencies(dependencies: &[ViewDependency]) -> Self {
        let mut parents: HashMap<ViewRef, BTreeSet<ViewRef>> = HashMap::new();
        for dep in dependencies {
            parents
                .entry(dep.child.clone())
                .or_default()
                .insert(dep.parent.clone());
        }
        Self { parents }
    }

    pub fn parents(&self, view: &ViewRef) -> impl Iterator<Item = &ViewRef> {
        self.parents.get(view).into_iter().flatten()
    }

    /// `view` plus every view reachable through parent edges.
    ///
    /// Iterative with a visited set, so it terminates even if the graph
    /// contains a cycle.
    pub fn ancestors<'a>(&'a self, view: &'a ViewRef) -> HashSet<&'a ViewRef> {
        let mut visited: HashSet<&ViewRef> = HashSet::new();
        let mut stack = vec![view];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.parents(current).filter(|p| !visited.contains(*p)));
        }

        visited
    }
}

/// Derives view labels from the catalog and view lineage
pub struct LabelPropagator;

impl LabelPropagator {
    /// Compute the label of every view in `views`.
    ///
    /// Fails with [`GovernanceError::UncataloguedColumn`] when a view reads a
    /// base column the catalog does not declare.
    pub fn derive(
        catalog: &LabelCatalog,
        views: &[ViewRef],
        view_column_usage: &[ViewColumnUsage],
        view_dependencies: &[ViewDependency],
        label_order: &LabelOrder,
    ) -> GovernanceResult<DerivedViewLabels> {
        let direct_labels = Self::direct_labels(catalog, view_column_usage)?;
        let graph = ViewDependencyGraph::from_dependencies(view_dependencies);

        let mut derived = BTreeMap::new();
        for view in views {
            let mut labels: BTreeSet<&SensitivityLabel> = BTreeSet::new();
            labels.insert(label_order.least());

            for ancestor in graph.ancestors(view) {
                if let Some(used) = direct_labels.get(ancestor) {
                    labels.extend(used.iter());
                }
            }

            let label = label_order
                .max(labels.iter().copied())
                .unwrap_or_else(|| label_order.least())
                .clone();

            derived.insert(view.clone(), label);
        }

        debug!("Derived labels for {} views", derived.len());
        Ok(derived)
    }

    /// Labels of the base columns each view reads directly
    fn direct_labels<'c>(
        catalog: &'c LabelCatalog,
        view_column_usage: &[ViewColumnUsage],
    ) -> GovernanceResult<HashMap<ViewRef, BTreeSet<&'c SensitivityLabel>>> {
        let mut direct: HashMap<ViewRef, BTreeSet<&SensitivityLabel>> = HashMap::new();
        for usage in view_column_usage {
            let label = catalog.get(&usage.column).ok_or_else(|| {
                GovernanceError::UncataloguedColumn {
                    view: usage.view.clone(),
                    column: usage.column.clone(),
                }
            })?;
            direct.entry(usage.view.clone()).or_default().insert(label);
        }
        Ok(direct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::ColumnRef;
    use pretty_assertions::assert_eq;

    fn catalog() -> LabelCatalog {
        LabelCatalog::new(
            &LabelOrder::default(),
            [
                (ColumnRef::new("public", "users", "id"), "normal".into()),
                (ColumnRef::new("public", "users", "email"), "pii".into()),
                (ColumnRef::new("public", "secret_keyphrases", "keyphrase"), "secret".into()),
            ],
        )
        .unwrap()
    }

    fn view(name: &str) -> ViewRef {
        ViewRef::new("test", name)
    }

    fn reads(view_name: &str, table: &str, column: &str) -> ViewColumnUsage {
        ViewColumnUsage {
            view: view(view_name),
            column: ColumnRef::new("public", table, column),
        }
    }

    fn depends(child: &str, parent: &str) -> ViewDependency {
        ViewDependency {
            child: view(child),
            parent: view(parent),
        }
    }

    fn label_of<'a>(derived: &'a DerivedViewLabels, name: &str) -> &'a str {
        derived[&view(name)].as_str()
    }

    #[test]
    fn test_direct_sensitivity() {
        let views = vec![view("secret_view"), view("pii_view"), view("plain_view")];
        let usage = vec![
            reads("secret_view", "secret_keyphrases", "keyphrase"),
            reads("pii_view", "users", "email"),
            reads("plain_view", "users", "id"),
        ];

        let derived =
            LabelPropagator::derive(&catalog(), &views, &usage, &[], &LabelOrder::default()).unwrap();

        assert_eq!(label_of(&derived, "secret_view"), "secret");
        assert_eq!(label_of(&derived, "pii_view"), "pii");
        assert_eq!(label_of(&derived, "plain_view"), "normal");
    }

    #[test]
    fn test_union_of_pii_and_secret_views_is_secret() {
        let views = vec![view("pii_view"), view("secret_view"), view("both")];
        let usage = vec![
            reads("pii_view", "users", "email"),
            reads("secret_view", "secret_keyphrases", "keyphrase"),
        ];
        let deps = vec![depends("both", "secret_view"), depends("both", "pii_view")];

        let derived =
            LabelPropagator::derive(&catalog(), &views, &usage, &deps, &LabelOrder::default()).unwrap();

        assert_eq!(label_of(&derived, "both"), "secret");
    }

    #[test]
    fn test_grandparent_sensitivity_does_not_decay() {
        let views = vec![view("root"), view("middle"), view("leaf")];
        let usage = vec![reads("root", "users", "email"), reads("leaf", "users", "id")];
        let deps = vec![depends("middle", "root"), depends("leaf", "middle")];

        let derived =
            LabelPropagator::derive(&catalog(), &views, &usage, &deps, &LabelOrder::default()).unwrap();

        assert_eq!(label_of(&derived, "middle"), "pii");
        assert_eq!(label_of(&derived, "leaf"), "pii");
    }

    #[test]
    fn test_view_without_base_columns_gets_least_label() {
        let views = vec![view("constant")];
        let derived =
            LabelPropagator::derive(&catalog(), &views, &[], &[], &LabelOrder::default()).unwrap();

        assert_eq!(label_of(&derived, "constant"), "normal");
    }

    #[test]
    fn test_uncatalogued_usage_is_a_lookup_fault() {
        let views = vec![view("broken")];
        let usage = vec![reads("broken", "users", "password_hash")];

        let result = LabelPropagator::derive(&catalog(), &views, &usage, &[], &LabelOrder::default());

        match result {
            Err(GovernanceError::UncataloguedColumn { view: v, column }) => {
                assert_eq!(v, view("broken"));
                assert_eq!(column, ColumnRef::new("public", "users", "password_hash"));
            }
            other => panic!("expected lookup fault, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_terminates() {
        let views = vec![view("a"), view("b"), view("c")];
        let usage = vec![reads("c", "secret_keyphrases", "keyphrase")];
        let deps = vec![depends("a", "b"), depends("b", "a"), depends("b", "c"), depends("c", "c")];

        let derived =
            LabelPropagator::derive(&catalog(), &views, &usage, &deps, &LabelOrder::default()).unwrap();

        assert_eq!(label_of(&derived, "a"), "secret");
        assert_eq!(label_of(&derived, "b"), "secret");
        assert_eq!(label_of(&derived, "c"), "secret");
    }

    #[test]
    fn test_ancestors_are_reflexive() {
        let graph = ViewDependencyGraph::from_dependencies(&[depends("child", "parent")]);
        let child = view("child");
        let ancestors = graph.ancestors(&child);

        assert_eq!(ancestors.len(), 2);
        assert!(ancestors.contains(&view("child")));
        assert!(ancestors.contains(&view("parent")));
    }
}
