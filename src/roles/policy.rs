//! Role policy: which labels each database role may read

use crate::config::RoleConfig;
use crate::db::queries::SqlBuilder;
use crate::error::{GovernanceError, GovernanceResult};
use crate::labeling::{LabelOrder, SensitivityLabel};
use std::fmt;
use tracing::warn;

/// A role password; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// A database role and the labels it is cleared for
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub credential: Option<Credential>,
    pub accessible_labels: Vec<SensitivityLabel>,
}

impl Role {
    /// Role names are interpolated into SQL, so they must be plain identifiers
    pub fn new(
        name: impl Into<String>,
        credential: Option<Credential>,
        accessible_labels: Vec<SensitivityLabel>,
    ) -> GovernanceResult<Self> {
        let name = name.into();
        if !SqlBuilder::is_simple_ident(&name) {
            return Err(GovernanceError::InvalidIdentifier(name));
        }
        Ok(Self {
            name,
            credential,
            accessible_labels,
        })
    }

    /// A role without a usable credential is not set up in this environment
    pub fn is_configured(&self) -> bool {
        self.credential.as_ref().is_some_and(|c| !c.is_blank())
    }
}

/// Roles in provisioning order
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    roles: Vec<Role>,
}

impl RolePolicy {
    pub fn new(roles: Vec<Role>) -> Self {
        Self { roles }
    }

    /// Build the policy from configuration, reading each password from the
    /// environment variable the role names
    pub fn from_config(configs: &[RoleConfig], order: &LabelOrder) -> GovernanceResult<Self> {
        Self::from_config_with(configs, order, |var| std::env::var(var).ok())
    }

    pub fn from_config_with<F>(
        configs: &[RoleConfig],
        order: &LabelOrder,
        lookup: F,
    ) -> GovernanceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut roles = Vec::with_capacity(configs.len());
        for config in configs {
            let accessible_labels = config
                .accessible_labels
                .iter()
                .map(|name| order.parse(name))
                .collect::<GovernanceResult<Vec<_>>>()?;

            let credential = lookup(&config.password_env).map(Credential::new);
            let role = Role::new(config.name.clone(), credential, accessible_labels)?;
            if !role.is_configured() {
                warn!(
                    "Role {} skipped: {} is not set",
                    role.name, config.password_env
                );
            }
            roles.push(role);
        }
        Ok(Self::new(roles))
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Roles with a credential, in declaration order
    pub fn configured(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter().filter(|role| role.is_configured())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn configs() -> Vec<RoleConfig> {
        vec![
            RoleConfig {
                name: "looker".to_string(),
                password_env: "DATABASE_PASSWORD_LOOKER".to_string(),
                accessible_labels: vec!["normal".to_string()],
            },
            RoleConfig {
                name: "spy".to_string(),
                password_env: "DATABASE_PASSWORD_SPY".to_string(),
                accessible_labels: vec!["pii".to_string(), "normal".to_string()],
            },
        ]
    }

    #[test]
    fn test_roles_without_password_are_skipped() {
        let env: HashMap<&str, &str> =
            [("DATABASE_PASSWORD_SPY", "hunter2"), ("DATABASE_PASSWORD_LOOKER", "  ")].into();

        let policy = RolePolicy::from_config_with(&configs(), &LabelOrder::default(), |var| {
            env.get(var).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(policy.roles().len(), 2);
        let configured: Vec<&str> = policy.configured().map(|r| r.name.as_str()).collect();
        assert_eq!(configured, vec!["spy"]);
    }

    #[test]
    fn test_unknown_accessible_label_rejected() {
        let mut configs = configs();
        configs[0].accessible_labels.push("public".to_string());

        let result = RolePolicy::from_config_with(&configs, &LabelOrder::default(), |_| None);
        assert!(matches!(result, Err(GovernanceError::UnknownLabel(l)) if l == "public"));
    }

    #[test]
    fn test_role_name_must_be_plain_identifier() {
        let result = Role::new("looker; DROP TABLE users", None, vec![]);
        assert!(matches!(result, Err(GovernanceError::InvalidIdentifier(_))));
        assert!(Role::new("Looker", None, vec![]).is_err());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let role = Role::new("looker", Some(Credential::new("such'S3cr3t")), vec![]).unwrap();
        let rendered = format!("{:?}", role);
        assert!(!rendered.contains("S3cr3t"));
        assert!(rendered.contains("Credential(****)"));
    }
}
