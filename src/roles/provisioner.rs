//! Privilege provisioning
//!
//! Turns a role policy and the column labeling into the statements that
//! converge each role to exactly the column access its labels allow.
//! Revokes are emitted as well as grants, so repeated runs strip access that
//! drifted in by hand.

use super::policy::{Credential, Role, RolePolicy};
use crate::db::queries::{self, one_line, SqlBuilder};
use crate::error::GovernanceResult;
use crate::introspection::ColumnRef;
use crate::labeling::ColumnLabeling;
use deadpool_postgres::{Pool, Transaction};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

const DO_TAG: &str = "$do$";

/// A SQL statement and the values bound to its `?` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Credential>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: Credential) -> Self {
        self.params.push(param);
        self
    }
}

pub struct PrivilegeProvisioner;

impl PrivilegeProvisioner {
    /// Every statement for every configured role, in policy order
    pub fn all_queries(
        policy: &RolePolicy,
        labeling: &ColumnLabeling,
    ) -> GovernanceResult<Vec<SqlStatement>> {
        let mut statements = Vec::new();

        for role in policy.configured() {
            statements.push(Self::ensure_role_configured_sql(role));

            let (allowed, disallowed) = labeling.partition_by_labels(&role.accessible_labels)?;

            statements.extend(Self::grant_schema_usage_sql(&role.name, &allowed));
            statements.extend(Self::revoke_select_columns_sql(&role.name, &disallowed));
            statements.extend(Self::grant_select_columns_sql(&role.name, &allowed));

            debug!(
                "Role {}: {} columns allowed, {} disallowed",
                role.name,
                allowed.len(),
                disallowed.len()
            );
        }

        Ok(statements)
    }

    /// Create the role if missing, then reapply the fixed attribute profile
    pub fn ensure_role_configured_sql(role: &Role) -> SqlStatement {
        let sql = format!(
            r#"DO
$do$
BEGIN
  IF NOT EXISTS (
    SELECT FROM pg_catalog.pg_roles WHERE rolname = '{role}'
  ) THEN
    CREATE ROLE {role} WITH
      NOSUPERUSER
      NOREPLICATION
    ;
  END IF;

  ALTER ROLE {role} WITH
    NOCREATEDB
    NOCREATEROLE
    NOINHERIT
    NOBYPASSRLS
    LOGIN
    PASSWORD ?
    VALID UNTIL 'infinity'
  ;
END
$do$"#,
            role = role.name
        );

        let mut statement = SqlStatement::new(sql);
        if let Some(credential) = &role.credential {
            statement = statement.with_param(credential.clone());
        }
        statement
    }

    /// One `GRANT USAGE` listing every schema the role can read from
    pub fn grant_schema_usage_sql(role: &str, allowed: &[ColumnRef]) -> Option<SqlStatement> {
        let schemas: BTreeSet<&str> = allowed.iter().map(|c| c.schema.as_str()).collect();
        if schemas.is_empty() {
            return None;
        }

        let schemas = schemas
            .into_iter()
            .map(SqlBuilder::ident)
            .collect::<Vec<_>>()
            .join(", ");

        Some(SqlStatement::new(format!(
            "GRANT USAGE ON SCHEMA {} TO {}",
            schemas, role
        )))
    }

    pub fn grant_select_columns_sql(role: &str, allowed: &[ColumnRef]) -> Vec<SqlStatement> {
        Self::per_table(allowed, |table, columns| {
            format!("GRANT SELECT ({}) ON TABLE {} TO {}", columns, table, role)
        })
    }

    pub fn revoke_select_columns_sql(role: &str, disallowed: &[ColumnRef]) -> Vec<SqlStatement> {
        Self::per_table(disallowed, |table, columns| {
            format!("REVOKE SELECT ({}) ON TABLE {} FROM {}", columns, table, role)
        })
    }

    /// One statement per `(schema, table)`, tables and columns sorted
    fn per_table<F>(columns: &[ColumnRef], render: F) -> Vec<SqlStatement>
    where
        F: Fn(&str, &str) -> String,
    {
        let mut tables: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
        for column in columns {
            tables
                .entry((column.schema.as_str(), column.table.as_str()))
                .or_default()
                .push(column.column.as_str());
        }

        tables
            .into_iter()
            .map(|((schema, table), mut names)| {
                names.sort_unstable();
                names.dedup();
                let names = names
                    .into_iter()
                    .map(SqlBuilder::ident)
                    .collect::<Vec<_>>()
                    .join(", ");
                SqlStatement::new(render(&SqlBuilder::qualified(schema, table), &names))
            })
            .collect()
    }

    /// SHA-256 over the statement text; bound values are left out
    pub fn fingerprint(statements: &[SqlStatement]) -> String {
        let mut hasher = Sha256::new();
        for statement in statements {
            hasher.update(statement.sql.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    /// Execute the statements in a single transaction
    pub async fn apply(pool: &Pool, statements: &[SqlStatement]) -> GovernanceResult<usize> {
        let mut client = pool.get().await?;
        let transaction = client.transaction().await?;

        for statement in statements {
            let sql = Self::bind(&transaction, statement).await?;
            // Rollback is automatic when the transaction is dropped
            transaction.batch_execute(&sql).await?;
            info!("PRIVILEGES: {}", one_line(&statement.sql));
        }

        transaction.commit().await?;
        info!(
            "Applied {} privilege statements (fingerprint {})",
            statements.len(),
            Self::fingerprint(statements)
        );
        Ok(statements.len())
    }

    /// Substitute each placeholder with a literal quoted by the server
    async fn bind(transaction: &Transaction<'_>, statement: &SqlStatement) -> GovernanceResult<String> {
        let mut sql = Self::retag(&statement.sql, &statement.params);
        for param in &statement.params {
            let row = transaction
                .query_one(queries::BIND_LITERAL, &[&sql, &param.expose()])
                .await?;
            sql = row.get(0);
        }
        Ok(sql)
    }

    /// Rename the `$do$` body delimiter to a tag none of `params` contain,
    /// so a bound value can never close the body early
    fn retag(sql: &str, params: &[Credential]) -> String {
        let clashes = |tag: &str| params.iter().any(|p| p.expose().contains(tag));

        let mut tag = DO_TAG.to_string();
        let mut suffix = 0;
        while clashes(tag.as_str()) {
            suffix += 1;
            tag = format!("$do_{}$", suffix);
        }

        if tag == DO_TAG {
            sql.to_string()
        } else {
            sql.replace(DO_TAG, &tag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeling::SensitivityLabel;
    use pretty_assertions::assert_eq;

    const PASSWORD: &str = "such'S3cr3t";

    fn col(table: &str, column: &str) -> ColumnRef {
        ColumnRef::new("public", table, column)
    }

    fn labeling() -> ColumnLabeling {
        let columns = vec![
            col("users", "id"),
            col("users", "email"),
            col("users", "password_hash"),
            col("tags", "name"),
        ];
        let labels: Vec<SensitivityLabel> =
            vec!["normal".into(), "pii".into(), "secret".into(), "normal".into()];
        ColumnLabeling::new(columns.iter().cloned().zip(labels).collect(), columns)
    }

    fn policy(labels: &[&str]) -> RolePolicy {
        RolePolicy::new(vec![Role::new(
            "rouser",
            Some(Credential::new(PASSWORD)),
            labels.iter().map(|l| SensitivityLabel::from(*l)).collect(),
        )
        .unwrap()])
    }

    #[test]
    fn test_example_usage() {
        let statements = PrivilegeProvisioner::all_queries(&policy(&["normal"]), &labeling()).unwrap();

        let upsert = r#"DO
$do$
BEGIN
  IF NOT EXISTS (
    SELECT FROM pg_catalog.pg_roles WHERE rolname = 'rouser'
  ) THEN
    CREATE ROLE rouser WITH
      NOSUPERUSER
      NOREPLICATION
    ;
  END IF;

  ALTER ROLE rouser WITH
    NOCREATEDB
    NOCREATEROLE
    NOINHERIT
    NOBYPASSRLS
    LOGIN
    PASSWORD ?
    VALID UNTIL 'infinity'
  ;
END
$do$"#;

        assert_eq!(
            statements,
            vec![
                SqlStatement::new(upsert).with_param(Credential::new(PASSWORD)),
                SqlStatement::new("GRANT USAGE ON SCHEMA public TO rouser"),
                SqlStatement::new("REVOKE SELECT (email, password_hash) ON TABLE public.users FROM rouser"),
                SqlStatement::new("GRANT SELECT (name) ON TABLE public.tags TO rouser"),
                SqlStatement::new("GRANT SELECT (id) ON TABLE public.users TO rouser"),
            ]
        );
    }

    #[test]
    fn test_password_never_in_sql_text() {
        let statements = PrivilegeProvisioner::all_queries(&policy(&["normal"]), &labeling()).unwrap();
        assert!(statements.iter().all(|s| !s.sql.contains("S3cr3t")));
    }

    #[test]
    fn test_body_delimiter_avoids_credential_contents() {
        let role = |secret: &str| {
            Role::new("rouser", Some(Credential::new(secret)), vec![]).unwrap()
        };

        let plain = PrivilegeProvisioner::ensure_role_configured_sql(&role(PASSWORD));
        assert_eq!(PrivilegeProvisioner::retag(&plain.sql, &plain.params), plain.sql);

        let clashing = PrivilegeProvisioner::ensure_role_configured_sql(&role("pa$do$ss"));
        let sql = PrivilegeProvisioner::retag(&clashing.sql, &clashing.params);
        assert!(sql.starts_with("DO\n$do_1$\nBEGIN"));
        assert!(sql.ends_with("END\n$do_1$"));
        assert!(!sql.contains("$do$"));

        let both = PrivilegeProvisioner::ensure_role_configured_sql(&role("$do$ and $do_1$"));
        let sql = PrivilegeProvisioner::retag(&both.sql, &both.params);
        assert_eq!(sql.matches("$do_2$").count(), 2);
    }

    #[test]
    fn test_unconfigured_roles_emit_nothing() {
        let policy = RolePolicy::new(vec![
            Role::new("looker", None, vec!["normal".into()]).unwrap(),
            Role::new("spy", Some(Credential::new("")), vec!["pii".into()]).unwrap(),
        ]);

        let statements = PrivilegeProvisioner::all_queries(&policy, &labeling()).unwrap();
        assert!(statements.is_empty());
    }

    #[test]
    fn test_role_without_access_gets_only_revokes() {
        let statements = PrivilegeProvisioner::all_queries(&policy(&[]), &labeling()).unwrap();
        let sql: Vec<&str> = statements.iter().skip(1).map(|s| s.sql.as_str()).collect();

        assert_eq!(
            sql,
            vec![
                "REVOKE SELECT (name) ON TABLE public.tags FROM rouser",
                "REVOKE SELECT (email, id, password_hash) ON TABLE public.users FROM rouser",
            ]
        );
    }

    #[test]
    fn test_multiple_schemas_and_quoted_identifiers() {
        let columns = vec![
            ColumnRef::new("reporting", "Daily Totals", "amount"),
            ColumnRef::new("public", "tags", "name"),
            ColumnRef::new("reporting", "Daily Totals", "Region"),
        ];
        let labeling = ColumnLabeling::new(
            columns.iter().cloned().map(|c| (c, "normal".into())).collect(),
            columns,
        );

        let statements = PrivilegeProvisioner::all_queries(&policy(&["normal"]), &labeling).unwrap();
        let sql: Vec<&str> = statements.iter().skip(1).map(|s| s.sql.as_str()).collect();

        assert_eq!(
            sql,
            vec![
                "GRANT USAGE ON SCHEMA public, reporting TO rouser",
                "GRANT SELECT (name) ON TABLE public.tags TO rouser",
                "GRANT SELECT (\"Region\", amount) ON TABLE reporting.\"Daily Totals\" TO rouser",
            ]
        );
    }

    #[test]
    fn test_output_is_deterministic() {
        let first = PrivilegeProvisioner::all_queries(&policy(&["normal", "pii"]), &labeling()).unwrap();
        let second = PrivilegeProvisioner::all_queries(&policy(&["pii", "normal"]), &labeling()).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            PrivilegeProvisioner::fingerprint(&first),
            PrivilegeProvisioner::fingerprint(&second)
        );

        let narrower = PrivilegeProvisioner::all_queries(&policy(&["normal"]), &labeling()).unwrap();
        assert_ne!(
            PrivilegeProvisioner::fingerprint(&first),
            PrivilegeProvisioner::fingerprint(&narrower)
        );
    }

    #[test]
    fn test_unlabeled_column_fails_generation() {
        let mut columns = labeling().columns().to_vec();
        columns.push(col("users", "last_login_ip"));
        let labeling = ColumnLabeling::new(labeling().labeling().clone(), columns);

        assert!(PrivilegeProvisioner::all_queries(&policy(&["normal"]), &labeling).is_err());
    }
}
