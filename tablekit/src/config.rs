//! Database options loaded from YAML, `.env` files, and environment variables.
//!
//! Resolution order (lowest to highest priority):
//! 1. the `database:` section of a YAML file
//! 2. `.env` file (loaded into process environment, never overwriting set variables)
//! 3. environment variables (`database.url` <-> `DATABASE_URL`)

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

const SECTION: &str = "database";
const FIELDS: &[&str] = &[
    "url",
    "max_connections",
    "command_timeout_secs",
    "lower_case_table_names",
    "id_column",
    "items_per_page",
];

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
    /// The `database` section did not match the expected shape.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::Invalid(msg) => write!(f, "Invalid database config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Options shared by a [`Database`](crate::Database) and its tables.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseOptions {
    /// Connection URL, used by backend crates that open their own pool.
    pub url: Option<String>,
    pub max_connections: u32,
    /// Per-statement timeout handed to the executor.
    pub command_timeout_secs: Option<u64>,
    /// Lower-case likely names and entity names before probing the schema.
    pub lower_case_table_names: bool,
    /// Primary key column used by the id-based table operations.
    pub id_column: String,
    /// Page size used by the `page*` helpers when none is given.
    pub items_per_page: u32,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            command_timeout_secs: None,
            lower_case_table_names: true,
            id_column: "id".to_string(),
            items_per_page: 10,
        }
    }
}

impl DatabaseOptions {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Parse the `database:` section of a YAML document (useful for testing).
    ///
    /// A document without that section yields the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let root: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::from_section(section_of(&root))
    }

    /// Load options from a YAML file (if it exists), `.env`, and the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut section = serde_yaml::Mapping::new();
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
            let root: serde_yaml::Value =
                serde_yaml::from_str(&content).map_err(|e| ConfigError::Load(e.to_string()))?;
            if let serde_yaml::Value::Mapping(map) = section_of(&root) {
                section = map;
            }
        }

        let _ = dotenvy::dotenv();

        // Convention: `database.url` <-> `DATABASE_URL`
        for field in FIELDS {
            let env_key = format!("{}_{}", SECTION, field).to_uppercase();
            if let Ok(raw) = std::env::var(&env_key) {
                let value = match serde_yaml::from_str::<serde_yaml::Value>(&raw) {
                    Ok(v @ (serde_yaml::Value::Number(_) | serde_yaml::Value::Bool(_))) => v,
                    _ => serde_yaml::Value::String(raw),
                };
                section.insert(serde_yaml::Value::String(field.to_string()), value);
            }
        }

        Self::from_section(serde_yaml::Value::Mapping(section))
    }

    fn from_section(section: serde_yaml::Value) -> Result<Self, ConfigError> {
        if section.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(section).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn section_of(root: &serde_yaml::Value) -> serde_yaml::Value {
    root.get(SECTION).cloned().unwrap_or(serde_yaml::Value::Null)
}
