//! SQL query constants and builders
//!
//! Contains all catalog queries and identifier rendering used by the crate.

use once_cell::sync::Lazy;
use regex::Regex;

/// All user-schema columns of tables and views
pub const LIST_COLUMNS: &str = r#"
    SELECT
        table_schema::text AS table_schema,
        table_name::text AS table_name,
        column_name::text AS column_name
    FROM information_schema.columns
    WHERE table_schema NOT IN ('information_schema', 'pg_catalog')
    ORDER BY 1, 2, 3
"#;

/// All user-schema views
pub const LIST_VIEWS: &str = r#"
    SELECT
        table_schema::text AS table_schema,
        table_name::text AS table_name
    FROM information_schema.views
    WHERE table_schema NOT IN ('information_schema', 'pg_catalog')
    ORDER BY 1, 2
"#;

/// Base-table columns read directly by each view
pub const LIST_VIEW_COLUMN_USAGE: &str = r#"
    SELECT
        c.view_schema::text AS view_schema,
        c.view_name::text AS view_name,
        c.table_schema::text AS table_schema,
        c.table_name::text AS table_name,
        c.column_name::text AS column_name
    FROM information_schema.view_column_usage c
    INNER JOIN information_schema.tables t
        ON t.table_catalog = c.table_catalog
        AND t.table_schema = c.table_schema
        AND t.table_name = c.table_name
        AND t.table_type = 'BASE TABLE'
    WHERE c.table_schema NOT IN ('information_schema', 'pg_catalog')
    ORDER BY 1, 2, 3, 4, 5
"#;

/// View-to-view edges: the child view selects from the parent view.
/// Relation-level usage, so a child that names none of the parent's
/// columns (`SELECT count(*) FROM parent`) still gets its edge.
pub const LIST_VIEW_DEPENDENCIES: &str = r#"
    SELECT DISTINCT
        u.view_schema::text AS view_schema,
        u.view_name::text AS view_name,
        u.table_schema::text AS table_schema,
        u.table_name::text AS table_name
    FROM information_schema.view_table_usage u
    INNER JOIN information_schema.tables t
        ON t.table_catalog = u.table_catalog
        AND t.table_schema = u.table_schema
        AND t.table_name = u.table_name
        AND t.table_type = 'VIEW'
    WHERE u.table_schema NOT IN ('information_schema', 'pg_catalog')
    ORDER BY 1, 2, 3, 4
"#;

/// Views carrying the managed-view marker comment ($1)
pub const LIST_MANAGED_VIEWS: &str = r#"
    SELECT
        table_schema::text AS table_schema,
        table_name::text AS table_name
    FROM information_schema.views
    WHERE table_schema NOT IN ('information_schema', 'pg_catalog')
        AND obj_description(
            format('%I.%I', table_schema, table_name)::regclass,
            'pg_class'
        ) = $1
    ORDER BY 1, 2
"#;

/// Resolve a qualified relation name ($1), failing if it does not exist
pub const RESOLVE_RELATION: &str = "SELECT $1::text::regclass::text";

/// Substitute the first `?` placeholder in $1 with the quoted literal of $2
pub const BIND_LITERAL: &str = r#"
    SELECT overlay(
        $1::text
        PLACING quote_literal($2::text)
        FROM position('?' IN $1::text)
        FOR 1
    )
"#;

static SIMPLE_IDENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_$]*$").expect("identifier pattern is valid")
});

/// Fully reserved PostgreSQL keywords; these need quoting even when simple
const RESERVED_KEYWORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "both", "case", "cast", "check", "collate", "column", "constraint", "create",
    "current_catalog", "current_date", "current_role", "current_time",
    "current_timestamp", "current_user", "default", "deferrable", "desc", "distinct",
    "do", "else", "end", "except", "false", "fetch", "for", "foreign", "from", "grant",
    "group", "having", "in", "initially", "intersect", "into", "lateral", "leading",
    "limit", "localtime", "localtimestamp", "not", "null", "offset", "on", "only", "or",
    "order", "placing", "primary", "references", "returning", "select", "session_user",
    "some", "symmetric", "system_user", "table", "then", "to", "trailing", "true",
    "union", "unique", "user", "using", "variadic", "when", "where", "window", "with",
];

/// SQL builder for safe identifier rendering
pub struct SqlBuilder;

impl SqlBuilder {
    /// Quote an identifier (table/column name) safely
    pub fn quote_ident(ident: &str) -> String {
        // PostgreSQL identifier quoting
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Quote a string literal
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// True when the identifier can be written without quotes
    pub fn is_simple_ident(ident: &str) -> bool {
        SIMPLE_IDENT.is_match(ident) && !RESERVED_KEYWORDS.contains(&ident)
    }

    /// Render an identifier bare when it is simple, quoted otherwise
    pub fn ident(ident: &str) -> String {
        if Self::is_simple_ident(ident) {
            ident.to_string()
        } else {
            Self::quote_ident(ident)
        }
    }

    /// Render `schema.name`
    pub fn qualified(schema: &str, name: &str) -> String {
        format!("{}.{}", Self::ident(schema), Self::ident(name))
    }

    pub fn create_schema_if_not_exists(schema: &str) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", Self::ident(schema))
    }

    pub fn drop_schema_cascade(schema: &str) -> String {
        format!("DROP SCHEMA IF EXISTS {} CASCADE", Self::ident(schema))
    }

    pub fn create_schema(schema: &str) -> String {
        format!("CREATE SCHEMA {}", Self::ident(schema))
    }

    pub fn create_view(schema: &str, name: &str, body: &str) -> String {
        format!("CREATE VIEW {} AS {}", Self::qualified(schema, name), body)
    }

    pub fn comment_on_view(schema: &str, name: &str, comment: &str) -> String {
        format!(
            "COMMENT ON VIEW {} IS {}",
            Self::qualified(schema, name),
            Self::quote_literal(comment)
        )
    }

    pub fn drop_view_cascade(schema: &str, name: &str) -> String {
        format!("DROP VIEW IF EXISTS {} CASCADE", Self::qualified(schema, name))
    }
}

/// Collapse whitespace so multi-line SQL logs on one line
pub fn one_line(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_identifiers_stay_bare() {
        assert_eq!(SqlBuilder::ident("password_hash"), "password_hash");
        assert_eq!(SqlBuilder::qualified("public", "users"), "public.users");
    }

    #[test]
    fn test_other_identifiers_are_quoted() {
        assert_eq!(SqlBuilder::ident("Users"), "\"Users\"");
        assert_eq!(SqlBuilder::ident("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(SqlBuilder::ident("1st"), "\"1st\"");
        assert_eq!(SqlBuilder::qualified("public", "user"), "public.\"user\"");
    }

    #[test]
    fn test_comment_literal_is_escaped() {
        assert_eq!(
            SqlBuilder::comment_on_view("test", "view", "it's managed"),
            "COMMENT ON VIEW test.view IS 'it''s managed'"
        );
    }

    #[test]
    fn test_one_line() {
        assert_eq!(one_line("GRANT SELECT (id)\n  ON TABLE public.users\n"), "GRANT SELECT (id) ON TABLE public.users");
    }
}
