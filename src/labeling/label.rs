//! Sensitivity labels and their precedence order

use crate::config::ConfigError;
use crate::error::{GovernanceError, GovernanceResult};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// A sensitivity classification such as `normal`, `pii` or `secret`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SensitivityLabel(String);

impl SensitivityLabel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensitivityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensitivityLabel {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SensitivityLabel {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Total precedence order over labels, least sensitive first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelOrder {
    labels: Vec<SensitivityLabel>,
}

impl LabelOrder {
    /// Build an order; it must be non-empty and free of duplicates
    pub fn new<I, L>(labels: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = L>,
        L: Into<SensitivityLabel>,
    {
        let labels: Vec<SensitivityLabel> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(ConfigError::InvalidValue(
                "label order must contain at least one label".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for label in &labels {
            if !seen.insert(label) {
                return Err(ConfigError::InvalidValue(format!(
                    "label '{}' appears twice in the label order",
                    label
                )));
            }
        }

        Ok(Self { labels })
    }

    /// Position in the order; higher is more sensitive
    pub fn rank(&self, label: &SensitivityLabel) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn contains(&self, label: &SensitivityLabel) -> bool {
        self.rank(label).is_some()
    }

    /// The least sensitive label, assigned when nothing stricter applies
    pub fn least(&self) -> &SensitivityLabel {
        &self.labels[0]
    }

    pub fn labels(&self) -> &[SensitivityLabel] {
        &self.labels
    }

    /// Resolve a label name against this order
    pub fn parse(&self, name: &str) -> GovernanceResult<SensitivityLabel> {
        let label = SensitivityLabel::new(name);
        if self.contains(&label) {
            Ok(label)
        } else {
            Err(GovernanceError::UnknownLabel(name.to_string()))
        }
    }

    /// The most sensitive of `candidates`; labels outside the order are ignored
    pub fn max<'a, I>(&self, candidates: I) -> Option<&'a SensitivityLabel>
    where
        I: IntoIterator<Item = &'a SensitivityLabel>,
    {
        candidates
            .into_iter()
            .filter_map(|label| self.rank(label).map(|rank| (rank, label)))
            .max_by_key(|(rank, _)| *rank)
            .map(|(_, label)| label)
    }
}

impl Default for LabelOrder {
    fn default() -> Self {
        Self {
            labels: vec!["normal".into(), "pii".into(), "secret".into()],
        }
    }
}
