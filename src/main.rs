//! schemaguard command runner
//!
//! Usage: `schemaguard <command> [--dry-run]`
//!
//! - `check`              fail unless every live column has exactly one label
//! - `labels`             print the full column labeling as JSON
//! - `rebuild-views`      drop and recreate managed views from the views directory
//! - `setup-roles`        provision role privileges (`--dry-run` prints the SQL)
//! - `publish-projection` recreate the label-filtered projection schema

use anyhow::{bail, Context};
use deadpool_postgres::Pool;
use schemaguard::config::Settings;
use schemaguard::db;
use schemaguard::introspection::PostgresIntrospector;
use schemaguard::labeling::{ColumnLabeling, LabelCatalog, LabelOrder};
use schemaguard::roles::{PrivilegeProvisioner, RolePolicy};
use schemaguard::views::{self, ProjectionPublisher, ViewRebuilder};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("check");
    let dry_run = args.iter().any(|a| a == "--dry-run");

    let settings = Settings::load().context("failed to load settings")?;
    let policy = &settings.policy;
    let order = LabelOrder::new(policy.labels.order.clone())?;
    let catalog = LabelCatalog::from_config(&policy.labels, &order, &policy.default_schema)?;
    info!("Loaded label catalog with {} columns", catalog.len());

    let pool = db::create_pool(&settings.database).await?;

    match command {
        "check" => {
            let labeling = introspect(&pool, &catalog, &order).await?;
            let errors = labeling.errors();
            println!("{}", serde_json::to_string_pretty(&errors)?);
            if !errors.is_consistent() {
                error!(
                    "Labeling incomplete: {} unknown, {} unlabeled",
                    errors.unknown.len(),
                    errors.unlabeled.len()
                );
                bail!("labeling is incomplete");
            }
            info!("All columns are labeled");
        }
        "labels" => {
            let labeling = introspect(&pool, &catalog, &order).await?;
            println!("{}", serde_json::to_string_pretty(labeling.labeling())?);
        }
        "rebuild-views" => {
            let definitions = views::discover(&policy.views_dir, &policy.default_schema)
                .with_context(|| format!("failed to read {}", policy.views_dir.display()))?;
            let summary = ViewRebuilder::new(policy.managed_view_marker.clone())
                .rebuild(&pool, &definitions)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        "setup-roles" => {
            let labeling = introspect(&pool, &catalog, &order).await?;
            let errors = labeling.errors();
            if !errors.is_consistent() {
                println!("{}", serde_json::to_string_pretty(&errors)?);
                bail!("refusing to provision roles while labeling is incomplete");
            }

            let roles = RolePolicy::from_config(&policy.roles, &order)?;
            let statements = PrivilegeProvisioner::all_queries(&roles, &labeling)?;
            info!(
                "Generated {} privilege statements (fingerprint {})",
                statements.len(),
                PrivilegeProvisioner::fingerprint(&statements)
            );

            if dry_run {
                for statement in &statements {
                    println!("{};\n", statement.sql);
                }
            } else {
                PrivilegeProvisioner::apply(&pool, &statements).await?;
            }
        }
        "publish-projection" => {
            let Some(projection) = &policy.projection else {
                bail!("no [projection] section in the policy file");
            };
            let publisher = ProjectionPublisher::from_config(projection, &order)?;
            if dry_run {
                for sql in publisher.statements(&catalog) {
                    println!("{};", sql);
                }
            } else {
                publisher.publish(&pool, &catalog).await?;
            }
        }
        other => bail!(
            "unknown command '{}' (expected check, labels, rebuild-views, setup-roles, publish-projection)",
            other
        ),
    }

    Ok(())
}

async fn introspect(
    pool: &Pool,
    catalog: &LabelCatalog,
    order: &LabelOrder,
) -> anyhow::Result<ColumnLabeling> {
    let client = pool.get().await?;
    let pg: &tokio_postgres::Client = &client;
    let labeling = ColumnLabeling::introspect(catalog, order, &PostgresIntrospector::new(pg)).await?;
    Ok(labeling)
}

/// Initialize tracing with structured logging; stdout stays free for reports
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schemaguard=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}
