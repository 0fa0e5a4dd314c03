//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables
//! and the governance policy file.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

impl From<::config::ConfigError> for ConfigError {
    fn from(err: ::config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
    pub require_tls: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            max_pool_size: 4,
            require_tls: false,
        }
    }
}

/// Label order and the authored base-column catalog
#[derive(Debug, Clone, Deserialize)]
pub struct LabelsConfig {
    /// Least sensitive first
    pub order: Vec<String>,
    /// label -> `table.column` or `schema.table.column` entries
    #[serde(default)]
    pub columns: HashMap<String, Vec<String>>,
}

/// One database role and the labels it may read
#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    /// Environment variable holding the role's password
    pub password_env: String,
    pub accessible_labels: Vec<String>,
}

/// Label-filtered projection schema
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default = "default_projection_schema")]
    pub schema: String,
    #[serde(default = "default_schema")]
    pub source_schema: String,
    pub labels: Vec<String>,
}

/// Governance policy file
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_schema")]
    pub default_schema: String,
    #[serde(default = "default_views_dir")]
    pub views_dir: PathBuf,
    #[serde(default = "default_marker")]
    pub managed_view_marker: String,
    pub labels: LabelsConfig,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub projection: Option<ProjectionConfig>,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_projection_schema() -> String {
    "looker".to_string()
}

fn default_views_dir() -> PathBuf {
    PathBuf::from("db/views")
}

fn default_marker() -> String {
    "VERSIONED".to_string()
}

impl PolicyConfig {
    /// Load the policy file, with `GOVERNANCE__*` environment overrides
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let policy = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("GOVERNANCE").separator("__"))
            .build()?
            .try_deserialize::<PolicyConfig>()?;

        policy.validate()?;
        Ok(policy)
    }

    /// Parse a policy from TOML text
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let policy = ::config::Config::builder()
            .add_source(::config::File::from_str(source, ::config::FileFormat::Toml))
            .build()?
            .try_deserialize::<PolicyConfig>()?;

        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.labels.order.is_empty() {
            return Err(ConfigError::InvalidValue(
                "labels.order must name at least one label".to_string(),
            ));
        }
        if self.managed_view_marker.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "managed_view_marker must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub policy: PolicyConfig,
}

impl Settings {
    /// Load settings from environment variables and the policy file
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let database = Self::parse_database_url(&database_url)?;

        let policy_path =
            std::env::var("GOVERNANCE_CONFIG").unwrap_or_else(|_| "governance.toml".to_string());
        let policy = PolicyConfig::load(&policy_path)?;

        Ok(Self { database, policy })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    pub fn parse_database_url(url: &str) -> Result<DatabaseConfig, ConfigError> {
        let parsed = url::Url::parse(url).map_err(|_| {
            ConfigError::InvalidValue(
                "Invalid DATABASE_URL format (expected postgresql://...)".to_string(),
            )
        })?;

        if parsed.scheme() != "postgres" && parsed.scheme() != "postgresql" {
            return Err(ConfigError::InvalidValue(format!(
                "Unsupported DATABASE_URL scheme: {}",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(ConfigError::InvalidValue(
                "Missing database name in DATABASE_URL".to_string(),
            ));
        }

        let require_tls = host.contains("neon.tech")
            || parsed
                .query_pairs()
                .any(|(key, value)| key == "sslmode" && value == "require");

        Ok(DatabaseConfig {
            port: parsed.port().unwrap_or(5432),
            user: parsed.username().to_string(),
            password: parsed.password().map(|p| p.to_string()).unwrap_or_default(),
            host,
            database,
            max_pool_size: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DatabaseConfig::default().max_pool_size),
            require_tls,
        })
    }
}
